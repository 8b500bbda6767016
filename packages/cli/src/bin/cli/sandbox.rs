// ABOUTME: CLI commands for the execution container (build, launch, start, stop, remove, status)
// ABOUTME: Drives the sandbox runtime against the local Docker engine and prints progress

use colored::*;
use shellbox_cli::provision::{self, StartOptions};
use shellbox_cli::{ProvisionError, Result};
use shellbox_config::{home_dir, ShellboxConfig};
use shellbox_sandbox::{
    BuildOutput, BuildSpec, DockerProvider, LaunchRequest, SandboxError, SandboxHandle,
    SandboxRuntime,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub fn runtime(config: &ShellboxConfig) -> Result<SandboxRuntime> {
    let provider = DockerProvider::new().map_err(SandboxError::from)?;
    let runtime = SandboxRuntime::new(Arc::new(provider)).with_launch_timeout(config.launch_timeout);

    Ok(match home_dir() {
        Ok(home) => runtime.with_home_dir(home),
        Err(e) => {
            warn!("{}; credential mounts disabled", e);
            runtime
        }
    })
}

fn print_build(output: &BuildOutput) {
    for line in &output.logs {
        println!("{}", line);
    }
    println!("✅ Successfully built image: {}", output.tag);
}

fn print_launch(handle: &SandboxHandle) {
    println!("✅ Container {} launched from {}", handle.name, handle.image);
    for mount in &handle.mounts {
        println!("   {} -> {}", mount.host_path, mount.container_path);
    }
    println!(
        "To attach to the container, run: docker exec -it {} /bin/bash",
        handle.name
    );
}

pub async fn build_command(
    config: &ShellboxConfig,
    dockerfile: PathBuf,
    manifest: Option<PathBuf>,
    context_dir: Option<PathBuf>,
    tag: Option<String>,
) -> Result<()> {
    let runtime = runtime(config)?;
    let manifest = manifest.or_else(|| provision::default_manifest(&dockerfile));
    let tag = tag.unwrap_or_else(|| config.image.clone());

    println!("🐋 Building image: {}", tag);
    println!("📄 Using Dockerfile: {}", dockerfile.display());

    let output = runtime
        .build_image(&BuildSpec {
            dockerfile,
            manifest,
            context_dir,
            tag,
        })
        .await?;
    print_build(&output);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn launch_command(
    config: &ShellboxConfig,
    name: Option<String>,
    image: Option<String>,
    env: Vec<String>,
    ports: Vec<String>,
    volumes: Vec<String>,
    no_aws_credentials: bool,
    no_github_credentials: bool,
    privileged: bool,
) -> Result<()> {
    let runtime = runtime(config)?;

    let mut request = LaunchRequest::new(
        name.unwrap_or_else(|| config.container_name.clone()),
        image.unwrap_or_else(|| config.image.clone()),
    );
    request.env = provision::parse_env(&env)?;
    request.ports = provision::parse_ports(&ports)?;
    request.volumes = provision::parse_volumes(&volumes)?;
    request.mount_cloud_credentials = !no_aws_credentials;
    request.mount_scm_credentials = !no_github_credentials;
    request.privileged = privileged;
    request.working_dir = config.default_working_dir.clone();

    println!("🐋 Launching {} from {}", request.name, request.image);
    let handle = runtime.launch(&request).await?;
    print_launch(&handle);
    Ok(())
}

pub async fn start_command(
    config: &ShellboxConfig,
    dockerfile: PathBuf,
    manifest: Option<PathBuf>,
    data_folder: PathBuf,
    shared_folders: Vec<PathBuf>,
    ports: Vec<String>,
) -> Result<()> {
    let manifest = manifest.or_else(|| provision::default_manifest(&dockerfile));
    let mut folders = vec![data_folder];
    folders.extend(shared_folders);

    let options = StartOptions {
        dockerfile,
        manifest,
        folders,
        ports,
        name: config.container_name.clone(),
        image: config.image.clone(),
        env: provision::passthrough_env(|name| std::env::var(name).ok()),
    };

    // Validate before touching the engine so bad input exits with its own code
    provision::folder_mounts(&options.folders)?;
    provision::parse_ports(&options.ports)?;

    let runtime = runtime(config)?;
    println!("🐋 Building {} and launching {}", options.image, options.name);
    let (build, handle) = provision::start(&runtime, &options).await?;
    print_build(&build);
    print_launch(&handle);
    Ok(())
}

pub async fn stop_command(config: &ShellboxConfig, name: Option<String>) -> Result<()> {
    let name = name.unwrap_or_else(|| config.container_name.clone());
    runtime(config)?.stop(&name).await?;
    println!("⏹  Container {} stopped", name);
    Ok(())
}

pub async fn remove_command(config: &ShellboxConfig, name: Option<String>) -> Result<()> {
    let name = name.unwrap_or_else(|| config.container_name.clone());
    let runtime = runtime(config)?;
    runtime.stop(&name).await?;
    runtime.remove(&name).await?;
    println!("🗑  Container {} removed", name);
    Ok(())
}

pub async fn status_command(config: &ShellboxConfig, name: Option<String>) -> Result<()> {
    let name = name.unwrap_or_else(|| config.container_name.clone());
    let runtime = runtime(config)?;

    if !runtime.is_available().await {
        return Err(ProvisionError::Sandbox(SandboxError::InvalidRequest(
            "Docker engine is not reachable".to_string(),
        )));
    }

    match runtime.status(&name).await? {
        Some(info) => {
            let status = info.status.to_string();
            let status = if info.status.is_running() {
                status.green()
            } else {
                status.yellow()
            };
            println!("{}: {}", name.bold(), status);
            if let Some(image) = info.image {
                println!("  image: {}", image);
            }
            if let Some(started) = info.started_at {
                println!("  started: {}", started.to_rfc3339());
            }
            println!("  id: {}", info.id);
        }
        None => println!("{}: {}", name.bold(), "not found".red()),
    }
    Ok(())
}
