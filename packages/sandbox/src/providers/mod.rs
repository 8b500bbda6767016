// ABOUTME: Provider trait and shared types for container engine backends
// ABOUTME: Defines the engine-facing interface used by the runtime and the command bridge

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub mod docker;

pub use docker::DockerProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("No such container: {0}")]
    NotFound(String),

    #[error("Container is not running: {0}")]
    NotRunning(String),

    #[error("Container error: {0}")]
    ContainerError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Image build failed: {message}")]
    BuildFailed { message: String, logs: Vec<String> },

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Everything needed to create a container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub env_vars: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub ports: Vec<PortMapping>,
    pub command: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub privileged: bool,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub readonly: bool,
}

impl VolumeMount {
    pub fn read_only(host_path: impl AsRef<Path>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.as_ref().display().to_string(),
            container_path: container_path.into(),
            readonly: true,
        }
    }

    pub fn read_write(host_path: impl AsRef<Path>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.as_ref().display().to_string(),
            container_path: container_path.into(),
            readonly: false,
        }
    }

    /// Engine bind string, e.g. `/home/me/.aws:/root/.aws:ro`
    pub fn to_bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path,
            self.container_path,
            if self.readonly { "ro" } else { "rw" }
        )
    }
}

/// Parses `HOST:CONTAINER` or `HOST:CONTAINER:ro|rw`
impl FromStr for VolumeMount {
    type Err = MappingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (host, container, readonly) = match parts.as_slice() {
            [host, container] => (*host, *container, false),
            [host, container, "ro"] => (*host, *container, true),
            [host, container, "rw"] => (*host, *container, false),
            _ => return Err(MappingError::Volume(s.to_string())),
        };
        if host.is_empty() || !container.starts_with('/') {
            return Err(MappingError::Volume(s.to_string()));
        }
        Ok(Self {
            host_path: host.to_string(),
            container_path: container.to_string(),
            readonly,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String, // tcp or udp
}

/// Parses `HOST:CONTAINER`, optionally suffixed with `/tcp` or `/udp`
impl FromStr for PortMapping {
    type Err = MappingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || MappingError::Port(s.to_string());

        let (ports, protocol) = match s.split_once('/') {
            Some((ports, proto @ ("tcp" | "udp"))) => (ports, proto),
            Some(_) => return Err(invalid()),
            None => (s, "tcp"),
        };
        let (host, container) = ports.split_once(':').ok_or_else(invalid)?;
        let host_port = host.trim().parse::<u16>().map_err(|_| invalid())?;
        let container_port = container.trim().parse::<u16>().map_err(|_| invalid())?;
        if host_port == 0 || container_port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            host_port,
            container_port,
            protocol: protocol.to_string(),
        })
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum MappingError {
    #[error("Invalid port mapping '{0}', expected HOST:CONTAINER")]
    Port(String),
    #[error("Invalid volume mapping '{0}', expected HOST:CONTAINER[:ro|rw]")]
    Volume(String),
}

/// Container runtime information
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub status: ContainerStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Stopped,
    Dead,
    Unknown(String),
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Created => f.write_str("created"),
            ContainerStatus::Running => f.write_str("running"),
            ContainerStatus::Paused => f.write_str("paused"),
            ContainerStatus::Restarting => f.write_str("restarting"),
            ContainerStatus::Removing => f.write_str("removing"),
            ContainerStatus::Stopped => f.write_str("exited"),
            ContainerStatus::Dead => f.write_str("dead"),
            ContainerStatus::Unknown(s) => write!(f, "unknown ({})", s),
        }
    }
}

/// A single command to execute inside a container
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub command: Vec<String>,
    pub working_dir: Option<String>,
    pub env_vars: HashMap<String, String>,
}

/// Execution result from running a command in a container
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderCapabilities {
    /// Bytes can be written straight to a path inside a running container
    pub direct_write: bool,
    pub image_build: bool,
}

/// Container engine backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Check if the engine is reachable
    async fn is_available(&self) -> Result<bool>;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Build an image from a tarred build context. Returns the build log lines.
    async fn build_image(&self, context_tar: Vec<u8>, dockerfile: &str, tag: &str)
        -> Result<Vec<String>>;

    /// Create (but don't start) a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, container: &str) -> Result<()>;

    /// Stop a running container. Stopping an already-stopped container is not an error.
    async fn stop_container(&self, container: &str, timeout_secs: u64) -> Result<()>;

    async fn remove_container(&self, container: &str, force: bool) -> Result<()>;

    /// Look up a container by id or name
    async fn inspect_container(&self, container: &str) -> Result<ContainerInfo>;

    async fn exec_command(&self, container: &str, request: &ExecRequest) -> Result<ExecResult>;

    /// Copy a host file or directory into `dest_dir` inside the container
    async fn copy_to_container(&self, container: &str, source: &Path, dest_dir: &str)
        -> Result<()>;

    /// Write bytes directly to `dest_path` inside the container
    async fn write_file(&self, container: &str, dest_path: &str, _content: &[u8]) -> Result<()> {
        Err(ProviderError::NotSupported(format!(
            "direct write to {}:{}",
            container, dest_path
        )))
    }
}
