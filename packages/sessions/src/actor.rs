// ABOUTME: A session actor: durable state plus command access to the execution container
// ABOUTME: Commands and file writes resolve relative paths against the session's working directory

use chrono::{DateTime, Utc};
use shellbox_sandbox::{shell_quote, CommandBridge, CommandOutput};
use shellbox_storage::SessionView;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

pub struct Actor {
    state: SessionView,
    bridge: CommandBridge,
    container: String,
    default_working_dir: String,
    last_used: RwLock<DateTime<Utc>>,
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("session_id", &self.state.session_id())
            .field("container", &self.container)
            .field("default_working_dir", &self.default_working_dir)
            .finish_non_exhaustive()
    }
}

impl Actor {
    pub(crate) fn new(
        state: SessionView,
        bridge: CommandBridge,
        container: String,
        default_working_dir: String,
    ) -> Self {
        Self {
            state,
            bridge,
            container,
            default_working_dir,
            last_used: RwLock::new(Utc::now()),
        }
    }

    pub fn session_id(&self) -> &str {
        self.state.session_id()
    }

    /// Durable state for this session
    pub fn state(&self) -> &SessionView {
        &self.state
    }

    /// Name of the container this actor runs commands in
    pub fn container(&self) -> &str {
        &self.container
    }

    pub async fn last_used(&self) -> DateTime<Utc> {
        *self.last_used.read().await
    }

    pub(crate) async fn touch(&self) {
        *self.last_used.write().await = Utc::now();
    }

    #[cfg(test)]
    pub(crate) async fn set_last_used(&self, at: DateTime<Utc>) {
        *self.last_used.write().await = at;
    }

    /// Working directory from state, or the default root if none was ever set
    pub async fn working_directory(&self) -> Result<String> {
        Ok(self
            .state
            .working_directory()
            .await?
            .unwrap_or_else(|| self.default_working_dir.clone()))
    }

    /// Run a shell command in the session's working directory.
    pub async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.touch().await;
        let cwd = self.working_directory().await?;
        debug!("Session {} running in {}: {}", self.session_id(), cwd, command);

        let output = self
            .bridge
            .run(&self.container, command, Some(&cwd), &HashMap::new())
            .await?;
        Ok(output)
    }

    /// Write `content` to `path`, relative paths resolving against the working directory.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<CommandOutput> {
        self.touch().await;
        let cwd = self.working_directory().await?;

        let output = self
            .bridge
            .write_file(&self.container, &cwd, path, content)
            .await?;
        Ok(output)
    }

    /// Read a file from the container. A missing file comes back as a non-zero exit.
    pub async fn read_file(&self, path: &str) -> Result<CommandOutput> {
        self.run(&format!("cat {}", shell_quote(path))).await
    }
}
