// ABOUTME: Container runtime and command bridge for Shellbox sandboxes
// ABOUTME: Builds and launches the execution container and runs commands inside it

pub mod archive;
pub mod bridge;
pub mod error;
pub mod providers;
pub mod runtime;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bridge::{join_container_path, shell_quote, CommandBridge, CommandOutput};
pub use error::{Result, SandboxError};
pub use providers::{
    ContainerInfo, ContainerStatus, DockerProvider, MappingError, PortMapping, Provider,
    ProviderError, VolumeMount,
};
pub use runtime::{BuildOutput, BuildSpec, LaunchRequest, SandboxHandle, SandboxRuntime};
