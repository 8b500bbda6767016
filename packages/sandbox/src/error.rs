// ABOUTME: Error types for the sandbox runtime and command bridge
// ABOUTME: Keeps missing/stopped containers distinct from engine transport faults

use std::time::Duration;
use thiserror::Error;

use crate::providers::{MappingError, ProviderError};

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Container {0} not found")]
    ContainerNotFound(String),

    #[error("Container {name} is not running (status: {status})")]
    ContainerNotRunning { name: String, status: String },

    #[error("Container engine error: {0}")]
    Engine(#[from] ProviderError),

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Image build failed for {tag}: {message}")]
    BuildFailed {
        tag: String,
        message: String,
        logs: Vec<String>,
    },

    #[error("Container {name} did not reach running state within {timeout:?}")]
    LaunchTimeout { name: String, timeout: Duration },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Transport faults are worth retrying; everything else needs a change first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SandboxError::Engine(ProviderError::ConnectionError(_))
        )
    }

    /// Translate a provider error for an operation on `container`.
    pub(crate) fn from_provider(container: &str, err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(_) => SandboxError::ContainerNotFound(container.to_string()),
            ProviderError::NotRunning(_) => SandboxError::ContainerNotRunning {
                name: container.to_string(),
                status: "not running".to_string(),
            },
            other => SandboxError::Engine(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_provider_maps_missing_container() {
        let err = SandboxError::from_provider("box", ProviderError::NotFound("abc123".into()));
        assert!(matches!(err, SandboxError::ContainerNotFound(name) if name == "box"));
        assert_eq!(
            SandboxError::ContainerNotFound("box".into()).to_string(),
            "Container box not found"
        );
    }

    #[test]
    fn test_retryable_only_for_transport_faults() {
        assert!(SandboxError::Engine(ProviderError::ConnectionError("reset".into())).is_retryable());
        assert!(!SandboxError::ContainerNotFound("box".into()).is_retryable());
        assert!(!SandboxError::Engine(ProviderError::ImageError("nope".into())).is_retryable());
    }
}
