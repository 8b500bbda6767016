// ABOUTME: Provisioning errors and the process exit codes they map to
// ABOUTME: Folder and port validation failures get their own exit codes

use shellbox_config::ConfigError;
use shellbox_sandbox::{MappingError, SandboxError};
use thiserror::Error;

/// No folder given to `start` exists on the host
pub const EXIT_NO_VALID_FOLDERS: i32 = 6;
/// A port mapping given to `start` is malformed
pub const EXIT_INVALID_PORT: i32 = 7;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("No valid folders to mount")]
    NoValidFolders,

    #[error("Invalid port mapping '{0}', expected HOST:CONTAINER")]
    InvalidPort(String),

    #[error("Invalid environment variable '{0}', expected KEY=VALUE")]
    InvalidEnv(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProvisionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::NoValidFolders => EXIT_NO_VALID_FOLDERS,
            ProvisionError::InvalidPort(_) => EXIT_INVALID_PORT,
            _ => 1,
        }
    }

    /// Engine output worth showing in full, e.g. the log of a failed build
    pub fn engine_output(&self) -> Option<&[String]> {
        match self {
            ProvisionError::Sandbox(SandboxError::BuildFailed { logs, .. }) => Some(logs),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
