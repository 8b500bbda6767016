// ABOUTME: End-to-end runtime and bridge flow against the in-memory engine
// ABOUTME: Launch, relaunch, run and write without a Docker daemon

use pretty_assertions::assert_eq;
use shellbox_sandbox::testing::FakeProvider;
use shellbox_sandbox::{
    CommandBridge, ContainerStatus, LaunchRequest, SandboxError, SandboxRuntime,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<FakeProvider>, SandboxRuntime, CommandBridge) {
    let provider = Arc::new(FakeProvider::new());
    let runtime = SandboxRuntime::new(provider.clone())
        .with_engine_socket("/nonexistent/docker.sock")
        .with_launch_timeout(Duration::from_secs(1));
    let bridge = CommandBridge::new(provider.clone());
    (provider, runtime, bridge)
}

#[tokio::test]
async fn test_commands_follow_relaunch() {
    let (provider, runtime, bridge) = setup();
    let mut request = LaunchRequest::new("agent-execution-container", "custom-python-env:latest");
    request.mount_cloud_credentials = false;

    runtime.launch(&request).await.unwrap();
    bridge
        .write_file("agent-execution-container", "/workspace", "state.txt", "v1")
        .await
        .unwrap();

    // Relaunch wipes the old container and its filesystem
    runtime.launch(&request).await.unwrap();
    assert_eq!(provider.count_named("agent-execution-container"), 1);

    let output = bridge
        .run("agent-execution-container", "cat state.txt", Some("/workspace"), &HashMap::new())
        .await
        .unwrap();
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("No such file"));
}

#[tokio::test]
async fn test_stopped_container_needs_relaunch() {
    let (provider, runtime, bridge) = setup();
    let mut request = LaunchRequest::new("box", "img");
    request.mount_cloud_credentials = false;
    runtime.launch(&request).await.unwrap();

    runtime.stop("box").await.unwrap();
    let err = bridge
        .run("box", "echo hi", None, &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::ContainerNotRunning { .. }));
    assert_eq!(
        runtime.status("box").await.unwrap().map(|c| c.status),
        Some(ContainerStatus::Stopped)
    );

    runtime.launch(&request).await.unwrap();
    let output = bridge.run("box", "echo hi", None, &HashMap::new()).await.unwrap();
    assert_eq!(output.stdout, "hi\n");
}

#[tokio::test]
async fn test_unavailable_engine() {
    let runtime = SandboxRuntime::new(Arc::new(FakeProvider::new().unavailable()));
    assert!(!runtime.is_available().await);
}
