// ABOUTME: Build and launch plans for the execution container
// ABOUTME: Parses env, port and volume arguments and mounts shared folders under /container

use shellbox_config::constants::{AWS_PROFILE, AWS_REGION};
use shellbox_sandbox::{
    BuildOutput, BuildSpec, LaunchRequest, PortMapping, SandboxHandle, SandboxRuntime,
    VolumeMount,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};

/// Shared folders are mounted at `/container/<basename>`
pub const SHARED_FOLDER_ROOT: &str = "/container";

/// Host variables forwarded into the container by `start`
pub const PASSTHROUGH_ENV: &[&str] = &[AWS_PROFILE, AWS_REGION];

/// Parse `KEY=VALUE` pairs. The value may itself contain `=`.
pub fn parse_env(raw: &[String]) -> Result<HashMap<String, String>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(ProvisionError::InvalidEnv(pair.clone())),
        })
        .collect()
}

pub fn parse_ports(raw: &[String]) -> Result<Vec<PortMapping>> {
    raw.iter()
        .map(|mapping| {
            mapping
                .parse::<PortMapping>()
                .map_err(|_| ProvisionError::InvalidPort(mapping.clone()))
        })
        .collect()
}

pub fn parse_volumes(raw: &[String]) -> Result<Vec<VolumeMount>> {
    raw.iter()
        .map(|mapping| mapping.parse::<VolumeMount>().map_err(ProvisionError::from))
        .collect()
}

/// Read-write mounts for every folder that exists, each at `/container/<basename>`.
///
/// Missing folders are skipped with a warning; having none left is an error.
pub fn folder_mounts(folders: &[PathBuf]) -> Result<Vec<VolumeMount>> {
    let mut mounts = Vec::new();
    for folder in folders {
        if !folder.is_dir() {
            warn!("Path {} does not exist and will not be mounted", folder.display());
            continue;
        }
        let host = folder.canonicalize().unwrap_or_else(|_| folder.clone());
        let Some(name) = host.file_name().and_then(|n| n.to_str()) else {
            warn!("Path {} has no usable folder name, skipping", folder.display());
            continue;
        };
        let target = format!("{}/{}", SHARED_FOLDER_ROOT, name);
        info!("{} -> {}", host.display(), target);
        mounts.push(VolumeMount::read_write(&host, target));
    }

    if mounts.is_empty() {
        return Err(ProvisionError::NoValidFolders);
    }
    Ok(mounts)
}

/// Values of the pass-through variables that are set
pub fn passthrough_env<F>(lookup: F) -> HashMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    PASSTHROUGH_ENV
        .iter()
        .filter_map(|name| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .map(|value| (name.to_string(), value))
        })
        .collect()
}

/// Build-then-launch in one step
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub dockerfile: PathBuf,
    pub manifest: Option<PathBuf>,
    pub folders: Vec<PathBuf>,
    pub ports: Vec<String>,
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
}

/// Validate mounts and ports, build the image, then (re)launch the container.
pub async fn start(
    runtime: &SandboxRuntime,
    options: &StartOptions,
) -> Result<(BuildOutput, SandboxHandle)> {
    let volumes = folder_mounts(&options.folders)?;
    let ports = parse_ports(&options.ports)?;

    let build = runtime
        .build_image(&BuildSpec {
            dockerfile: options.dockerfile.clone(),
            manifest: options.manifest.clone(),
            context_dir: None,
            tag: options.image.clone(),
        })
        .await?;

    let mut request = LaunchRequest::new(&options.name, &options.image);
    request.env = options.env.clone();
    request.ports = ports;
    request.volumes = volumes;
    request.mount_cloud_credentials = true;
    request.mount_scm_credentials = true;

    let handle = runtime.launch(&request).await?;
    Ok((build, handle))
}

/// Dependency manifest next to the Dockerfile, if one exists
pub fn default_manifest(dockerfile: &Path) -> Option<PathBuf> {
    let candidate = dockerfile
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("requirements.txt");
    candidate.is_file().then_some(candidate)
}
