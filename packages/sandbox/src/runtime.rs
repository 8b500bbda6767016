// ABOUTME: Lifecycle management for the execution container
// ABOUTME: Builds images, relaunches containers idempotently and waits for readiness

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::archive;
use crate::error::{Result, SandboxError};
use crate::providers::{
    ContainerInfo, ContainerSpec, ContainerStatus, PortMapping, Provider, ProviderError,
    VolumeMount,
};

pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ENGINE_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_WORKING_DIR: &str = "/workspace";

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const STOP_TIMEOUT_SECS: u64 = 10;
const DOCKERFILE_NAME: &str = "Dockerfile";

/// Cloud credentials: host path relative to home, container path
const CLOUD_CREDENTIALS: (&str, &str) = (".aws", "/root/.aws");

/// Source-control credentials
const SCM_CREDENTIALS: &[(&str, &str)] = &[
    (".config/gh", "/root/.config/gh"),
    (".gitconfig", "/root/.gitconfig"),
    (".git-credentials", "/root/.git-credentials"),
];

/// Inputs for an image build
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub dockerfile: PathBuf,
    /// Dependency manifest copied next to the Dockerfile (e.g. requirements.txt)
    pub manifest: Option<PathBuf>,
    /// Extra build context copied in before the Dockerfile and manifest
    pub context_dir: Option<PathBuf>,
    pub tag: String,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub tag: String,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMount>,
    pub privileged: bool,
    pub mount_cloud_credentials: bool,
    pub mount_scm_credentials: bool,
    pub working_dir: String,
}

impl LaunchRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: HashMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            privileged: false,
            mount_cloud_credentials: true,
            mount_scm_credentials: false,
            working_dir: DEFAULT_WORKING_DIR.to_string(),
        }
    }
}

/// A launched, running container
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub id: String,
    pub name: String,
    pub image: String,
    pub mounts: Vec<VolumeMount>,
}

pub struct SandboxRuntime {
    provider: Arc<dyn Provider>,
    launch_timeout: Duration,
    home_dir: Option<PathBuf>,
    engine_socket: PathBuf,
}

impl SandboxRuntime {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            home_dir: None,
            engine_socket: PathBuf::from(DEFAULT_ENGINE_SOCKET),
        }
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    /// Home directory that credential mounts are resolved against
    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    pub fn with_engine_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.engine_socket = socket.into();
        self
    }

    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await.unwrap_or(false)
    }

    /// Build an image from a Dockerfile plus dependency manifest.
    pub async fn build_image(&self, spec: &BuildSpec) -> Result<BuildOutput> {
        if !self.provider.capabilities().image_build {
            return Err(SandboxError::Engine(ProviderError::NotSupported(
                "image builds".to_string(),
            )));
        }
        if !spec.dockerfile.is_file() {
            return Err(SandboxError::InvalidRequest(format!(
                "Dockerfile not found: {}",
                spec.dockerfile.display()
            )));
        }

        let staging = tempfile::tempdir()?;

        if let Some(context_dir) = &spec.context_dir {
            copy_dir_all(context_dir, staging.path())?;
        }
        fs::copy(&spec.dockerfile, staging.path().join(DOCKERFILE_NAME))?;
        if let Some(manifest) = &spec.manifest {
            let file_name = manifest.file_name().ok_or_else(|| {
                SandboxError::InvalidRequest(format!(
                    "Invalid manifest path: {}",
                    manifest.display()
                ))
            })?;
            fs::copy(manifest, staging.path().join(file_name))?;
        }

        let context_tar = archive::tar_path(staging.path())?;
        info!(
            "Building image {} from {} ({} byte context)",
            spec.tag,
            spec.dockerfile.display(),
            context_tar.len()
        );

        match self
            .provider
            .build_image(context_tar, DOCKERFILE_NAME, &spec.tag)
            .await
        {
            Ok(logs) => Ok(BuildOutput {
                tag: spec.tag.clone(),
                logs,
            }),
            Err(ProviderError::BuildFailed { message, logs }) => {
                error!("Build of {} failed: {}", spec.tag, message);
                Err(SandboxError::BuildFailed {
                    tag: spec.tag.clone(),
                    message,
                    logs,
                })
            }
            Err(e) => Err(SandboxError::Engine(e)),
        }
    }

    /// Start a fresh container under `request.name`, replacing any existing one.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<SandboxHandle> {
        if request.name.trim().is_empty() {
            return Err(SandboxError::InvalidRequest(
                "Container name must not be empty".to_string(),
            ));
        }

        self.replace_existing(&request.name).await?;

        let mounts = self.resolve_mounts(request);
        let spec = ContainerSpec {
            image: request.image.clone(),
            name: request.name.clone(),
            env_vars: request.env.clone(),
            volumes: mounts.clone(),
            ports: request.ports.clone(),
            command: None,
            working_dir: Some(request.working_dir.clone()),
            privileged: request.privileged,
            labels: HashMap::new(),
        };

        let id = self.provider.create_container(&spec).await?;
        self.provider
            .start_container(&id)
            .await
            .map_err(|e| SandboxError::from_provider(&request.name, e))?;

        self.wait_until_running(&request.name).await?;

        info!(
            "Container {} launched from {} with {} mount(s)",
            request.name,
            request.image,
            mounts.len()
        );
        Ok(SandboxHandle {
            id,
            name: request.name.clone(),
            image: request.image.clone(),
            mounts,
        })
    }

    /// Stop and remove a previous container with this name, if any.
    async fn replace_existing(&self, name: &str) -> Result<()> {
        match self.provider.inspect_container(name).await {
            Ok(existing) => {
                info!(
                    "Replacing existing container {} (status: {})",
                    name, existing.status
                );
                self.stop(name).await?;
                self.remove(name).await
            }
            Err(ProviderError::NotFound(_)) => Ok(()),
            Err(e) => Err(SandboxError::Engine(e)),
        }
    }

    /// Volumes for a launch: engine socket, requested credentials, then caller volumes.
    pub fn resolve_mounts(&self, request: &LaunchRequest) -> Vec<VolumeMount> {
        let mut mounts = Vec::new();

        if self.engine_socket.exists() {
            mounts.push(VolumeMount::read_write(
                &self.engine_socket,
                DEFAULT_ENGINE_SOCKET,
            ));
        }

        match &self.home_dir {
            Some(home) => {
                if request.mount_cloud_credentials {
                    let (relative, target) = CLOUD_CREDENTIALS;
                    let host = home.join(relative);
                    if host.exists() {
                        mounts.push(VolumeMount::read_only(&host, target));
                    } else {
                        warn!("Cloud credentials not found at {}", host.display());
                    }
                }
                if request.mount_scm_credentials {
                    for (relative, target) in SCM_CREDENTIALS {
                        let host = home.join(relative);
                        if host.exists() {
                            mounts.push(VolumeMount::read_only(&host, *target));
                        } else {
                            debug!("Skipping missing SCM credential {}", host.display());
                        }
                    }
                }
            }
            None if request.mount_cloud_credentials || request.mount_scm_credentials => {
                warn!("No home directory configured, credential mounts skipped");
            }
            None => {}
        }

        mounts.extend(request.volumes.iter().cloned());
        mounts
    }

    async fn wait_until_running(&self, name: &str) -> Result<()> {
        let poll = async {
            loop {
                match self.provider.inspect_container(name).await {
                    Ok(info) if info.status.is_running() => return Ok(()),
                    Ok(ContainerInfo {
                        status: status @ (ContainerStatus::Stopped | ContainerStatus::Dead),
                        ..
                    }) => {
                        return Err(SandboxError::ContainerNotRunning {
                            name: name.to_string(),
                            status: status.to_string(),
                        })
                    }
                    Ok(info) => debug!("Waiting for {} (status: {})", name, info.status),
                    Err(e) => return Err(SandboxError::from_provider(name, e)),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(self.launch_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(SandboxError::LaunchTimeout {
                name: name.to_string(),
                timeout: self.launch_timeout,
            }),
        }
    }

    /// Stop a container. A container that doesn't exist counts as stopped.
    pub async fn stop(&self, name: &str) -> Result<()> {
        match self.provider.stop_container(name, STOP_TIMEOUT_SECS).await {
            Ok(()) => Ok(()),
            Err(ProviderError::NotFound(_)) => {
                debug!("Container {} already gone", name);
                Ok(())
            }
            Err(e) => Err(SandboxError::Engine(e)),
        }
    }

    /// Remove a container. A container that doesn't exist counts as removed.
    pub async fn remove(&self, name: &str) -> Result<()> {
        match self.provider.remove_container(name, true).await {
            Ok(()) => Ok(()),
            Err(ProviderError::NotFound(_)) => {
                debug!("Container {} already removed", name);
                Ok(())
            }
            Err(e) => Err(SandboxError::Engine(e)),
        }
    }

    /// Current state of a container, or `None` if it doesn't exist.
    pub async fn status(&self, name: &str) -> Result<Option<ContainerInfo>> {
        match self.provider.inspect_container(name).await {
            Ok(info) => Ok(Some(info)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(SandboxError::Engine(e)),
        }
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn runtime(provider: &Arc<FakeProvider>) -> SandboxRuntime {
        SandboxRuntime::new(provider.clone())
            .with_engine_socket("/nonexistent/docker.sock")
            .with_launch_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_launch_starts_running_container() {
        let provider = Arc::new(FakeProvider::new());
        let handle = runtime(&provider)
            .launch(&LaunchRequest::new("box", "custom-python-env:latest"))
            .await
            .unwrap();

        assert_eq!(handle.name, "box");
        let container = provider.container("box").unwrap();
        assert_eq!(container.status, ContainerStatus::Running);
        assert_eq!(container.spec.working_dir.as_deref(), Some("/workspace"));
    }

    #[tokio::test]
    async fn test_relaunch_leaves_exactly_one_container() {
        let provider = Arc::new(FakeProvider::new());
        let runtime = runtime(&provider);
        let request = LaunchRequest::new("box", "img");

        let first = runtime.launch(&request).await.unwrap();
        let second = runtime.launch(&request).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(provider.count_named("box"), 1);
        assert_eq!(provider.container("box").unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_launch_times_out_when_never_ready() {
        let provider = Arc::new(FakeProvider::new().start_into(ContainerStatus::Created));
        let err = runtime(&provider)
            .launch(&LaunchRequest::new("box", "img"))
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::LaunchTimeout { name, .. } if name == "box"));
    }

    #[tokio::test]
    async fn test_launch_fails_fast_when_container_exits() {
        let provider = Arc::new(FakeProvider::new().start_into(ContainerStatus::Stopped));
        let err = runtime(&provider)
            .launch(&LaunchRequest::new("box", "img"))
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::ContainerNotRunning { .. }));
    }

    #[tokio::test]
    async fn test_credential_mounts_are_read_only() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join(".aws")).unwrap();
        fs::create_dir_all(home.path().join(".config/gh")).unwrap();
        fs::write(home.path().join(".gitconfig"), "[user]\n").unwrap();

        let provider = Arc::new(FakeProvider::new());
        let runtime = runtime(&provider).with_home_dir(home.path());

        let mut request = LaunchRequest::new("box", "img");
        request.mount_scm_credentials = true;
        request.volumes.push("/data:/container/data".parse().unwrap());

        let mounts = runtime.resolve_mounts(&request);
        let targets: Vec<_> = mounts.iter().map(|m| m.container_path.as_str()).collect();
        assert_eq!(
            targets,
            vec!["/root/.aws", "/root/.config/gh", "/root/.gitconfig", "/container/data"]
        );
        assert!(mounts[..3].iter().all(|m| m.readonly));
        assert!(!mounts[3].readonly);
    }

    #[tokio::test]
    async fn test_credentials_skipped_when_not_requested() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join(".aws")).unwrap();

        let provider = Arc::new(FakeProvider::new());
        let runtime = runtime(&provider).with_home_dir(home.path());

        let mut request = LaunchRequest::new("box", "img");
        request.mount_cloud_credentials = false;
        assert!(runtime.resolve_mounts(&request).is_empty());
    }

    #[tokio::test]
    async fn test_engine_socket_mounted_when_present() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("docker.sock");
        fs::write(&socket, "").unwrap();

        let provider = Arc::new(FakeProvider::new());
        let runtime = SandboxRuntime::new(provider).with_engine_socket(&socket);

        let mut request = LaunchRequest::new("box", "img");
        request.mount_cloud_credentials = false;
        let mounts = runtime.resolve_mounts(&request);
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].container_path, DEFAULT_ENGINE_SOCKET);
    }

    #[tokio::test]
    async fn test_stop_and_remove_missing_container_succeed() {
        let provider = Arc::new(FakeProvider::new());
        let runtime = runtime(&provider);

        runtime.stop("ghost").await.unwrap();
        runtime.remove("ghost").await.unwrap();
        assert!(runtime.status("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_build_image_stages_context() {
        let dir = TempDir::new().unwrap();
        let dockerfile = dir.path().join("python.Dockerfile");
        let manifest = dir.path().join("requirements.txt");
        fs::write(&dockerfile, "FROM python:3.12\nCOPY requirements.txt .\n").unwrap();
        fs::write(&manifest, "boto3\n").unwrap();

        let provider = Arc::new(FakeProvider::new());
        let output = runtime(&provider)
            .build_image(&BuildSpec {
                dockerfile,
                manifest: Some(manifest),
                context_dir: None,
                tag: "custom-python-env:latest".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(output.tag, "custom-python-env:latest");
        let builds = provider.builds();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].tag, "custom-python-env:latest");
        assert_eq!(builds[0].files, vec!["Dockerfile", "requirements.txt"]);
    }

    #[tokio::test]
    async fn test_build_failure_carries_logs() {
        let dir = TempDir::new().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM nowhere\n").unwrap();

        let provider = Arc::new(FakeProvider::new().fail_builds("pull access denied"));
        let err = runtime(&provider)
            .build_image(&BuildSpec {
                dockerfile,
                manifest: None,
                context_dir: None,
                tag: "broken:latest".to_string(),
            })
            .await
            .unwrap_err();

        match err {
            SandboxError::BuildFailed { tag, logs, .. } => {
                assert_eq!(tag, "broken:latest");
                assert!(logs.iter().any(|l| l.contains("pull access denied")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_build_requires_dockerfile() {
        let provider = Arc::new(FakeProvider::new());
        let err = runtime(&provider)
            .build_image(&BuildSpec {
                dockerfile: PathBuf::from("/nonexistent/Dockerfile"),
                manifest: None,
                context_dir: None,
                tag: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_build_rejected_when_engine_cannot_build() {
        let dir = TempDir::new().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM python:3.12\n").unwrap();

        let provider = Arc::new(FakeProvider::new().without_image_build());
        let err = runtime(&provider)
            .build_image(&BuildSpec {
                dockerfile,
                manifest: None,
                context_dir: None,
                tag: "x".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Engine(ProviderError::NotSupported(_))));
        assert!(provider.builds().is_empty());
    }
}
