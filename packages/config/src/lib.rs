// ABOUTME: Shared configuration for the Shellbox binaries
// ABOUTME: Resolves environment variables into a validated ShellboxConfig

pub mod constants;

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("Default working directory must be absolute: {0}")]
    RelativeWorkdir(String),
    #[error("Unable to determine home directory")]
    NoHomeDirectory,
}

/// Get the path to the Shellbox directory (~/.shellbox)
pub fn shellbox_dir() -> Result<PathBuf, ConfigError> {
    home_dir().map(|home| home.join(".shellbox"))
}

/// Resolve the user's home directory
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    // HOME first so tests can redirect it
    if let Ok(home) = env::var(HOME) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellboxConfig {
    pub container_name: String,
    pub image: String,
    pub database_path: PathBuf,
    pub default_working_dir: String,
    pub cli_program: String,
    pub launch_timeout: Duration,
    /// Actors idle longer than this are dropped from the registry. `None` keeps them forever.
    pub actor_idle_timeout: Option<Duration>,
}

impl ShellboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let container_name =
            var(EXECUTION_CONTAINER_NAME).unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string());
        let image = var(SHELLBOX_IMAGE).unwrap_or_else(|| DEFAULT_IMAGE.to_string());
        let cli_program = var(SHELLBOX_CLI_PROGRAM).unwrap_or_else(|| DEFAULT_CLI_PROGRAM.to_string());

        let default_working_dir =
            var(SHELLBOX_DEFAULT_WORKDIR).unwrap_or_else(|| DEFAULT_WORKDIR.to_string());
        if !default_working_dir.starts_with('/') {
            return Err(ConfigError::RelativeWorkdir(default_working_dir));
        }

        let database_path = match var(SHELLBOX_DATABASE_PATH) {
            Some(path) => PathBuf::from(path),
            None => match var(HOME) {
                Some(home) => PathBuf::from(home).join(".shellbox").join("shellbox.db"),
                None => shellbox_dir()?.join("shellbox.db"),
            },
        };

        let launch_timeout = match var(SHELLBOX_LAUNCH_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(parse_secs(SHELLBOX_LAUNCH_TIMEOUT_SECS, &raw)?),
            None => Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
        };

        let actor_idle_timeout = match var(SHELLBOX_ACTOR_IDLE_SECS) {
            Some(raw) => match parse_secs(SHELLBOX_ACTOR_IDLE_SECS, &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        let config = ShellboxConfig {
            container_name,
            image,
            database_path,
            default_working_dir,
            cli_program,
            launch_timeout,
            actor_idle_timeout,
        };
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_secs(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ShellboxConfig::from_lookup(lookup(&[(HOME, "/home/agent")])).unwrap();

        assert_eq!(config.container_name, "agent-execution-container");
        assert_eq!(config.image, "custom-python-env:latest");
        assert_eq!(config.default_working_dir, "/workspace");
        assert_eq!(config.cli_program, "aws");
        assert_eq!(config.launch_timeout, Duration::from_secs(30));
        assert_eq!(config.actor_idle_timeout, None);
        assert_eq!(
            config.database_path,
            PathBuf::from("/home/agent/.shellbox/shellbox.db")
        );
    }

    #[test]
    fn test_overrides() {
        let config = ShellboxConfig::from_lookup(lookup(&[
            (EXECUTION_CONTAINER_NAME, "my_container"),
            (SHELLBOX_DATABASE_PATH, "/tmp/state.db"),
            (SHELLBOX_DEFAULT_WORKDIR, "/work"),
            (SHELLBOX_CLI_PROGRAM, "gcloud"),
            (SHELLBOX_LAUNCH_TIMEOUT_SECS, "5"),
            (SHELLBOX_ACTOR_IDLE_SECS, "600"),
        ]))
        .unwrap();

        assert_eq!(config.container_name, "my_container");
        assert_eq!(config.database_path, PathBuf::from("/tmp/state.db"));
        assert_eq!(config.default_working_dir, "/work");
        assert_eq!(config.cli_program, "gcloud");
        assert_eq!(config.launch_timeout, Duration::from_secs(5));
        assert_eq!(config.actor_idle_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = ShellboxConfig::from_lookup(lookup(&[
            (HOME, "/root"),
            (EXECUTION_CONTAINER_NAME, "   "),
        ]))
        .unwrap();
        assert_eq!(config.container_name, DEFAULT_CONTAINER_NAME);
    }

    #[test]
    fn test_zero_idle_timeout_disables_eviction() {
        let config = ShellboxConfig::from_lookup(lookup(&[
            (HOME, "/root"),
            (SHELLBOX_ACTOR_IDLE_SECS, "0"),
        ]))
        .unwrap();
        assert_eq!(config.actor_idle_timeout, None);
    }

    #[rstest]
    #[case(SHELLBOX_LAUNCH_TIMEOUT_SECS, "soon")]
    #[case(SHELLBOX_LAUNCH_TIMEOUT_SECS, "-1")]
    #[case(SHELLBOX_ACTOR_IDLE_SECS, "1.5")]
    fn test_invalid_numbers(#[case] name: &'static str, #[case] value: &str) {
        let result = ShellboxConfig::from_lookup(lookup(&[(HOME, "/root"), (name, value)]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber { name: n, .. }) if n == name
        ));
    }

    #[test]
    fn test_relative_workdir_rejected() {
        let result = ShellboxConfig::from_lookup(lookup(&[
            (HOME, "/root"),
            (SHELLBOX_DEFAULT_WORKDIR, "workspace"),
        ]));
        assert!(matches!(result, Err(ConfigError::RelativeWorkdir(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        env::set_var(EXECUTION_CONTAINER_NAME, "env-container");
        env::set_var(HOME, "/tmp/shellbox-home");

        let config = ShellboxConfig::from_env().unwrap();

        assert_eq!(config.container_name, "env-container");
        assert_eq!(
            shellbox_dir().unwrap(),
            PathBuf::from("/tmp/shellbox-home/.shellbox")
        );

        env::remove_var(EXECUTION_CONTAINER_NAME);
    }
}
