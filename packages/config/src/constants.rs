// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Shellbox

// Execution container
pub const EXECUTION_CONTAINER_NAME: &str = "EXECUTION_CONTAINER_NAME";
pub const SHELLBOX_IMAGE: &str = "SHELLBOX_IMAGE";
pub const SHELLBOX_LAUNCH_TIMEOUT_SECS: &str = "SHELLBOX_LAUNCH_TIMEOUT_SECS";

// Session state
pub const SHELLBOX_DATABASE_PATH: &str = "SHELLBOX_DATABASE_PATH";
pub const SHELLBOX_DEFAULT_WORKDIR: &str = "SHELLBOX_DEFAULT_WORKDIR";
pub const SHELLBOX_ACTOR_IDLE_SECS: &str = "SHELLBOX_ACTOR_IDLE_SECS";

// Tool surface
pub const SHELLBOX_CLI_PROGRAM: &str = "SHELLBOX_CLI_PROGRAM";

// Cloud credentials passed through to the container
pub const AWS_PROFILE: &str = "AWS_PROFILE";
pub const AWS_REGION: &str = "AWS_REGION";

// System
pub const HOME: &str = "HOME";

// Defaults
pub const DEFAULT_CONTAINER_NAME: &str = "agent-execution-container";
pub const DEFAULT_IMAGE: &str = "custom-python-env:latest";
pub const DEFAULT_WORKDIR: &str = "/workspace";
pub const DEFAULT_CLI_PROGRAM: &str = "aws";
pub const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 30;
