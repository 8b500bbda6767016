// ABOUTME: Docker provider implementation for the execution container
// ABOUTME: Uses bollard to build images, manage the container lifecycle and run exec sessions

use super::{
    ContainerInfo, ContainerSpec, ContainerStatus, ExecRequest, ExecResult, Provider,
    ProviderCapabilities, ProviderError, Result,
};
use crate::archive;
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
        StopContainerOptions, UploadToContainerOptions,
    },
    exec::{CreateExecOptions, StartExecResults},
    image::BuildImageOptions,
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const LABEL_PREFIX: &str = "shellbox";

pub struct DockerProvider {
    client: Docker,
}

impl DockerProvider {
    /// Connect using the platform defaults (DOCKER_HOST or the local socket)
    pub fn new() -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }

    /// Convert our spec to bollard config
    fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
        let mut labels = spec.labels.clone();
        labels.insert(format!("{}.managed", LABEL_PREFIX), "true".to_string());
        labels.insert(format!("{}.name", LABEL_PREFIX), spec.name.clone());

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();

        for port in &spec.ports {
            let container_port = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = vec![bollard::models::PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(port.host_port.to_string()),
            }];
            port_bindings.insert(container_port, Some(binding));
        }

        let binds: Vec<String> = spec.volumes.iter().map(|v| v.to_bind()).collect();

        let mut env: Vec<String> = spec
            .env_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();

        let host_config = bollard::models::HostConfig {
            binds: Some(binds),
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            privileged: Some(spec.privileged),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            env: Some(env),
            working_dir: spec.working_dir.clone(),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            // Keep an interactive shell alive so exec sessions have something to attach to
            tty: Some(true),
            open_stdin: Some(true),
            ..Default::default()
        }
    }

    /// Convert bollard container status to our status
    fn convert_status(state: &str) -> ContainerStatus {
        match state.to_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Stopped,
            "dead" => ContainerStatus::Dead,
            other => ContainerStatus::Unknown(other.to_string()),
        }
    }
}

/// Map engine responses onto provider errors, keeping "no such container" and
/// "not running" distinguishable for callers.
fn map_docker_error(container: &str, err: bollard::errors::Error) -> ProviderError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } if message.contains("No such container") || message.contains("no such container") => {
            ProviderError::NotFound(container.to_string())
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message,
        } if message.contains("is not running") => ProviderError::NotRunning(container.to_string()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => ProviderError::ContainerError(format!("{} (status {})", message, status_code)),
        other => ProviderError::ConnectionError(other.to_string()),
    }
}

#[async_trait]
impl Provider for DockerProvider {
    async fn is_available(&self) -> Result<bool> {
        match self.client.ping().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Docker not available: {}", e);
                Ok(false)
            }
        }
    }

    fn capabilities(&self) -> ProviderCapabilities {
        // Docker only accepts tar uploads, so file writes go through host staging
        ProviderCapabilities {
            direct_write: false,
            image_build: true,
        }
    }

    async fn build_image(
        &self,
        context_tar: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> Result<Vec<String>> {
        info!("Building image {} (dockerfile: {})", tag, dockerfile);

        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(context_tar.into()));

        let mut logs = Vec::new();
        while let Some(result) = stream.next().await {
            match result {
                Ok(build_info) => {
                    if let Some(line) = build_info.stream {
                        let line = line.trim_end().to_string();
                        if !line.is_empty() {
                            debug!("build: {}", line);
                            logs.push(line);
                        }
                    }
                    if let Some(error) = build_info.error {
                        logs.push(error.clone());
                        return Err(ProviderError::BuildFailed {
                            message: error,
                            logs,
                        });
                    }
                }
                Err(bollard::errors::Error::DockerStreamError { error }) => {
                    logs.push(error.clone());
                    return Err(ProviderError::BuildFailed {
                        message: error,
                        logs,
                    });
                }
                Err(e) => {
                    return Err(ProviderError::BuildFailed {
                        message: e.to_string(),
                        logs,
                    });
                }
            }
        }

        info!("Built image {}", tag);
        Ok(logs)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        info!("Creating container: {}", spec.name);

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), Self::to_bollard_config(spec))
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    message,
                } => ProviderError::ImageError(message),
                other => map_docker_error(&spec.name, other),
            })?;

        for warning in &container.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }
        debug!("Created container: {}", container.id);
        Ok(container.id)
    }

    async fn start_container(&self, container: &str) -> Result<()> {
        info!("Starting container: {}", container);

        self.client
            .start_container(container, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_docker_error(container, e))
    }

    async fn stop_container(&self, container: &str, timeout_secs: u64) -> Result<()> {
        info!("Stopping container: {} (timeout: {}s)", container, timeout_secs);

        let options = StopContainerOptions {
            t: timeout_secs as i64,
        };

        match self.client.stop_container(container, Some(options)).await {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!("Container {} was already stopped", container);
                Ok(())
            }
            Err(e) => Err(map_docker_error(container, e)),
        }
    }

    async fn remove_container(&self, container: &str, force: bool) -> Result<()> {
        info!("Removing container: {} (force: {})", container, force);

        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.client
            .remove_container(container, Some(options))
            .await
            .map_err(|e| map_docker_error(container, e))
    }

    async fn inspect_container(&self, container: &str) -> Result<ContainerInfo> {
        let inspect = self
            .client
            .inspect_container(container, None)
            .await
            .map_err(|e| map_docker_error(container, e))?;

        let state = inspect.state.as_ref();

        let status = Self::convert_status(
            state
                .and_then(|s| s.status.as_ref())
                .map(|s| s.as_ref())
                .unwrap_or("unknown"),
        );

        let started_at = state
            .and_then(|s| s.started_at.as_ref())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        Ok(ContainerInfo {
            id: inspect.id.clone().unwrap_or_else(|| container.to_string()),
            name: inspect
                .name
                .clone()
                .unwrap_or_else(|| container.to_string())
                .trim_start_matches('/')
                .to_string(),
            image: inspect.config.as_ref().and_then(|c| c.image.clone()),
            status,
            started_at,
        })
    }

    async fn exec_command(&self, container: &str, request: &ExecRequest) -> Result<ExecResult> {
        debug!(
            "Executing command in container {}: {:?}",
            container, request.command
        );

        let env: Option<Vec<String>> = if request.env_vars.is_empty() {
            None
        } else {
            Some(
                request
                    .env_vars
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            )
        };

        let exec_config = CreateExecOptions {
            cmd: Some(request.command.clone()),
            env,
            working_dir: request.working_dir.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(container, exec_config)
            .await
            .map_err(|e| map_docker_error(container, e))?;

        let start_result = self
            .client
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| map_docker_error(container, e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        match start_result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                        Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                        Ok(LogOutput::Console { message }) => stdout.extend_from_slice(&message),
                        Ok(_) => {}
                        Err(e) => return Err(map_docker_error(container, e)),
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ProviderError::ContainerError(
                    "Exec was detached unexpectedly".to_string(),
                ))
            }
        }

        let exec_inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| map_docker_error(container, e))?;

        Ok(ExecResult {
            exit_code: exec_exit_code(container, exec_inspect.exit_code)?,
            stdout,
            stderr,
        })
    }

    async fn copy_to_container(&self, container: &str, source: &Path, dest_dir: &str) -> Result<()> {
        info!(
            "Copying {} to container {}:{}",
            source.display(),
            container,
            dest_dir
        );

        if !source.exists() {
            return Err(ProviderError::InternalError(format!(
                "Source path does not exist: {}",
                source.display()
            )));
        }

        let tar_data = archive::tar_path(source)
            .map_err(|e| ProviderError::InternalError(e.to_string()))?;

        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            ..Default::default()
        };

        self.client
            .upload_to_container(container, Some(options), tar_data.into())
            .await
            .map_err(|e| map_docker_error(container, e))
    }
}

/// An exec the engine reports without an exit code never finished
fn exec_exit_code(container: &str, exit_code: Option<i64>) -> Result<i64> {
    exit_code.ok_or_else(|| {
        ProviderError::ContainerError(format!(
            "Exec in {} finished without an exit code",
            container
        ))
    })
}
