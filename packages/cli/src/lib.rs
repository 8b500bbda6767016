// ABOUTME: Provisioning logic behind the shellbox CLI
// ABOUTME: Turns command-line input into image builds and container launches

pub mod error;
pub mod provision;

pub use error::{ProvisionError, Result};
