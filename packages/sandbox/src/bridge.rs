// ABOUTME: Runs shell commands and writes files inside a named, running container
// ABOUTME: Translates engine results into exit code plus decoded stdout and stderr

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SandboxError};
use crate::providers::{ContainerInfo, ExecRequest, ExecResult, Provider};

/// Result of one command inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<ExecResult> for CommandOutput {
    fn from(result: ExecResult) -> Self {
        Self {
            exit_code: result.exit_code,
            stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        }
    }
}

#[derive(Clone)]
pub struct CommandBridge {
    provider: Arc<dyn Provider>,
    shell: String,
}

impl CommandBridge {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            shell: "/bin/sh".to_string(),
        }
    }

    /// Run `command` through `/bin/sh -c` inside `container`.
    pub async fn run(
        &self,
        container: &str,
        command: &str,
        working_dir: Option<&str>,
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput> {
        let info = self.ensure_running(container).await?;

        let request = ExecRequest {
            command: vec![self.shell.clone(), "-c".to_string(), command.to_string()],
            working_dir: working_dir.map(str::to_string),
            env_vars: env.clone(),
        };

        debug!("Running in {} ({:?}): {}", container, working_dir, command);
        let result = self
            .provider
            .exec_command(&info.id, &request)
            .await
            .map_err(|e| SandboxError::from_provider(container, e))?;

        let output = CommandOutput::from(result);
        debug!("Command in {} exited with {}", container, output.exit_code);
        Ok(output)
    }

    /// Write `content` to `working_dir/relative_path` inside `container`.
    ///
    /// Engines without a direct write primitive get the content staged in a host
    /// temp file which is then copied in. The destination's parent directory must
    /// already exist.
    pub async fn write_file(
        &self,
        container: &str,
        working_dir: &str,
        relative_path: &str,
        content: &str,
    ) -> Result<CommandOutput> {
        let target = join_container_path(working_dir, relative_path);
        let (dest_dir, file_name) =
            split_container_path(&target).ok_or_else(|| SandboxError::WriteFailed {
                path: target.clone(),
                reason: "path does not name a file".to_string(),
            })?;

        let info = self.ensure_running(container).await?;
        let write_failed = |reason: String| SandboxError::WriteFailed {
            path: target.clone(),
            reason,
        };

        if self.provider.capabilities().direct_write {
            self.provider
                .write_file(&info.id, &target, content.as_bytes())
                .await
                .map_err(|e| write_failed(e.to_string()))?;
        } else {
            let staging = tempfile::tempdir()?;
            let staged = staging.path().join(file_name);
            tokio::fs::write(&staged, content).await?;

            self.provider
                .copy_to_container(&info.id, &staged, dest_dir)
                .await
                .map_err(|e| write_failed(e.to_string()))?;
        }

        info!("Wrote {} bytes to {}:{}", content.len(), container, target);
        Ok(CommandOutput {
            exit_code: 0,
            stdout: format!("Wrote {} bytes to {}", content.len(), target),
            stderr: String::new(),
        })
    }

    async fn ensure_running(&self, container: &str) -> Result<ContainerInfo> {
        let info = self
            .provider
            .inspect_container(container)
            .await
            .map_err(|e| SandboxError::from_provider(container, e))?;

        if !info.status.is_running() {
            return Err(SandboxError::ContainerNotRunning {
                name: container.to_string(),
                status: info.status.to_string(),
            });
        }
        Ok(info)
    }
}

/// Resolve `path` against `base` using container (POSIX) path rules.
pub fn join_container_path(base: &str, path: &str) -> String {
    let path = path.trim_start_matches("./");
    if path.starts_with('/') {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        format!("/{}", path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Split an absolute container path into parent directory and file name.
pub fn split_container_path(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once('/')?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some((if parent.is_empty() { "/" } else { parent }, name))
}

/// Quote a single shell word for `/bin/sh`.
pub fn shell_quote(word: &str) -> String {
    shlex::try_quote(word)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| format!("'{}'", word.replace('\0', "").replace('\'', r"'\''")))
}
