//! Context management for MCP server tools
//!
//! Holds the actor registry and tool settings so handlers get their
//! dependencies passed in rather than reaching for globals. Tests build
//! one over an in-memory store and a fake container engine.

use anyhow::{Context as _, Result};
use shellbox_config::ShellboxConfig;
use shellbox_sandbox::{CommandBridge, DockerProvider};
use shellbox_sessions::ActorRegistry;
use shellbox_storage::SessionStore;
use std::sync::Arc;

/// Context for tool execution that holds dependencies
#[derive(Clone)]
pub struct ToolContext {
    registry: Arc<ActorRegistry>,
    cli_program: String,
}

impl ToolContext {
    pub fn new(registry: Arc<ActorRegistry>, cli_program: impl Into<String>) -> Self {
        Self {
            registry,
            cli_program: cli_program.into(),
        }
    }

    /// Production context: SQLite store on disk and the local Docker engine
    pub async fn from_config(config: &ShellboxConfig) -> Result<Self> {
        let store = SessionStore::open(&config.database_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open state store at {}",
                    config.database_path.display()
                )
            })?;
        let provider = DockerProvider::new().context("Failed to connect to Docker")?;
        let bridge = CommandBridge::new(Arc::new(provider));

        let registry = ActorRegistry::new(store, bridge, config.container_name.clone())
            .with_default_working_dir(config.default_working_dir.clone());

        Ok(Self::new(Arc::new(registry), config.cli_program.clone()))
    }

    pub fn registry(&self) -> &Arc<ActorRegistry> {
        &self.registry
    }

    /// Program prefixed to `run_cli` arguments
    pub fn cli_program(&self) -> &str {
        &self.cli_program
    }

    /// Create a context with isolated in-memory storage over the given engine
    #[cfg(test)]
    pub async fn test_context(
        provider: Arc<shellbox_sandbox::testing::FakeProvider>,
        container: &str,
    ) -> Self {
        let store = SessionStore::open_in_memory()
            .await
            .expect("in-memory store");
        let registry = ActorRegistry::new(store, CommandBridge::new(provider), container);
        Self::new(Arc::new(registry), "aws")
    }
}
