use clap::{Parser, Subcommand};
use colored::*;
use shellbox_cli::ProvisionError;
use shellbox_config::ShellboxConfig;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::sandbox;

#[derive(Parser)]
#[command(name = "shellbox")]
#[command(about = "Shellbox CLI - build and run the agent execution container")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the execution image from a Dockerfile and dependency manifest
    Build {
        /// Path to Dockerfile
        #[arg(long, default_value = "Dockerfile")]
        dockerfile: PathBuf,
        /// Dependency manifest copied next to the Dockerfile (default: requirements.txt beside it)
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Directory copied into the build context first
        #[arg(long)]
        context: Option<PathBuf>,
        /// Image tag (default: SHELLBOX_IMAGE or custom-python-env:latest)
        #[arg(long)]
        tag: Option<String>,
    },
    /// Launch the execution container, replacing any container with the same name
    Launch {
        /// Container name (default: EXECUTION_CONTAINER_NAME)
        #[arg(long)]
        name: Option<String>,
        /// Image to run (default: SHELLBOX_IMAGE)
        #[arg(long)]
        image: Option<String>,
        /// Environment variable, KEY=VALUE
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// Port mapping, HOST:CONTAINER
        #[arg(long = "port", value_name = "HOST:CONTAINER")]
        ports: Vec<String>,
        /// Volume mapping, HOST:CONTAINER[:ro|rw]
        #[arg(long = "volume", value_name = "HOST:CONTAINER")]
        volumes: Vec<String>,
        #[arg(long, help = "Don't mount ~/.aws")]
        no_aws_credentials: bool,
        #[arg(long, help = "Don't mount GitHub CLI and git credentials")]
        no_github_credentials: bool,
        #[arg(long, help = "Run the container privileged")]
        privileged: bool,
    },
    /// Build the image and launch the container with shared folders mounted under /container
    Start {
        #[arg(long, default_value = "Dockerfile")]
        dockerfile: PathBuf,
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Data folder, always mounted first
        #[arg(long, default_value = "data-map")]
        data_folder: PathBuf,
        /// Additional folder to mount (repeatable)
        #[arg(long = "shared-folder", value_name = "DIR")]
        shared_folders: Vec<PathBuf>,
        /// Port mapping, HOST:CONTAINER (repeatable)
        #[arg(long = "port", alias = "ports", value_name = "HOST:CONTAINER")]
        ports: Vec<String>,
    },
    /// Stop the execution container
    Stop {
        #[arg(long)]
        name: Option<String>,
    },
    /// Stop and remove the execution container
    Remove {
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the execution container's state
    Status {
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        if let Some(logs) = e.engine_output() {
            for line in logs {
                eprintln!("{}", line);
            }
        }
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(e.exit_code());
    }
}

async fn handle_command(command: Commands) -> Result<(), ProvisionError> {
    let config = ShellboxConfig::from_env()?;

    match command {
        Commands::Build {
            dockerfile,
            manifest,
            context,
            tag,
        } => sandbox::build_command(&config, dockerfile, manifest, context, tag).await,
        Commands::Launch {
            name,
            image,
            env,
            ports,
            volumes,
            no_aws_credentials,
            no_github_credentials,
            privileged,
        } => {
            sandbox::launch_command(
                &config,
                name,
                image,
                env,
                ports,
                volumes,
                no_aws_credentials,
                no_github_credentials,
                privileged,
            )
            .await
        }
        Commands::Start {
            dockerfile,
            manifest,
            data_folder,
            shared_folders,
            ports,
        } => {
            sandbox::start_command(&config, dockerfile, manifest, data_folder, shared_folders, ports)
                .await
        }
        Commands::Stop { name } => sandbox::stop_command(&config, name).await,
        Commands::Remove { name } => sandbox::remove_command(&config, name).await,
        Commands::Status { name } => sandbox::status_command(&config, name).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_collects_repeated_flags() {
        let cli = Cli::try_parse_from([
            "shellbox",
            "start",
            "--shared-folder",
            "/data/a",
            "--shared-folder",
            "/data/b",
            "--port",
            "8080:80",
        ])
        .unwrap();

        match cli.command {
            Commands::Start {
                shared_folders,
                ports,
                data_folder,
                ..
            } => {
                assert_eq!(shared_folders, vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")]);
                assert_eq!(ports, vec!["8080:80".to_string()]);
                assert_eq!(data_folder, PathBuf::from("data-map"));
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn test_launch_flags() {
        let cli = Cli::try_parse_from([
            "shellbox",
            "launch",
            "--env",
            "A=1",
            "--no-aws-credentials",
            "--volume",
            "/src:/workspace/src:ro",
        ])
        .unwrap();

        match cli.command {
            Commands::Launch {
                env,
                volumes,
                no_aws_credentials,
                no_github_credentials,
                ..
            } => {
                assert_eq!(env, vec!["A=1".to_string()]);
                assert_eq!(volumes, vec!["/src:/workspace/src:ro".to_string()]);
                assert!(no_aws_credentials);
                assert!(!no_github_credentials);
            }
            _ => panic!("expected launch"),
        }
    }
}
