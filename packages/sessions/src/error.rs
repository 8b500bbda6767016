// ABOUTME: Error type for session actors and the registry
// ABOUTME: Wraps storage and sandbox failures behind one enum

use shellbox_sandbox::SandboxError;
use shellbox_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Storage(e) => e.is_retryable(),
            RegistryError::Sandbox(e) => e.is_retryable(),
            RegistryError::InvalidSessionId(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
