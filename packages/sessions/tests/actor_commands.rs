// ABOUTME: Actor command and file tests against the in-memory engine
// ABOUTME: Covers working directory resolution for run, write_file and read_file

use pretty_assertions::assert_eq;
use shellbox_sandbox::testing::FakeProvider;
use shellbox_sandbox::{CommandBridge, ContainerStatus, SandboxError};
use shellbox_sessions::{ActorRegistry, RegistryError};
use shellbox_storage::SessionStore;
use std::sync::Arc;

const CONTAINER: &str = "agent-execution-container";

async fn registry_with(provider: &Arc<FakeProvider>) -> ActorRegistry {
    let store = SessionStore::open_in_memory().await.unwrap();
    ActorRegistry::new(store, CommandBridge::new(provider.clone()), CONTAINER)
}

#[tokio::test]
async fn test_run_uses_session_working_dir() {
    let provider = Arc::new(FakeProvider::new());
    provider.add_running_container(CONTAINER);
    let registry = registry_with(&provider).await;

    let actor = registry.resolve("s1").await.unwrap();
    assert_eq!(actor.run("pwd").await.unwrap().stdout, "/workspace\n");

    actor.state().set_working_directory("/tmp").await.unwrap();
    assert_eq!(actor.run("pwd").await.unwrap().stdout, "/tmp\n");

    let executed = provider.executed();
    assert_eq!(executed[1].working_dir.as_deref(), Some("/tmp"));
}

#[tokio::test]
async fn test_write_then_read_relative_path() {
    let provider = Arc::new(FakeProvider::new());
    provider.add_running_container(CONTAINER);
    let registry = registry_with(&provider).await;
    let actor = registry.resolve("s1").await.unwrap();

    actor.write_file("report.md", "# Findings").await.unwrap();

    assert_eq!(
        provider.file(CONTAINER, "/workspace/report.md").as_deref(),
        Some("# Findings")
    );
    let output = actor.read_file("report.md").await.unwrap();
    assert_eq!((output.exit_code, output.stdout.as_str()), (0, "# Findings"));
}

#[tokio::test]
async fn test_read_missing_file_is_nonzero_exit() {
    let provider = Arc::new(FakeProvider::new());
    provider.add_running_container(CONTAINER);
    let registry = registry_with(&provider).await;
    let actor = registry.resolve("s1").await.unwrap();

    let output = actor.read_file("my notes.txt").await.unwrap();

    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("my notes.txt"));
}

#[tokio::test]
async fn test_missing_container_surfaces_as_sandbox_error() {
    let provider = Arc::new(FakeProvider::new());
    let registry = registry_with(&provider).await;
    let actor = registry.resolve("s1").await.unwrap();

    let err = actor.run("echo hi").await.unwrap_err();

    assert!(matches!(
        err,
        RegistryError::Sandbox(SandboxError::ContainerNotFound(_))
    ));
}

#[tokio::test]
async fn test_stopped_container_is_reported() {
    let provider = Arc::new(FakeProvider::new());
    provider.add_container(CONTAINER, ContainerStatus::Stopped);
    let registry = registry_with(&provider).await;
    let actor = registry.resolve("s1").await.unwrap();

    let err = actor.write_file("out.txt", "x").await.unwrap_err();

    assert!(matches!(
        err,
        RegistryError::Sandbox(SandboxError::ContainerNotRunning { .. })
    ));
    assert!(!err.is_retryable());
}
