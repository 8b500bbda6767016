// ABOUTME: Durable per-session state for Shellbox agents
// ABOUTME: SQLite-backed store for goal, notes, tasks, working directory, open files and messages

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StorageError};
pub use store::{generate_session_id, SessionStore, SessionView};
pub use types::{Message, Note, OpenFile, StateRecord, Task, TaskStatus};
