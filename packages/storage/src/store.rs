// ABOUTME: Session-keyed persistence for working directory, goal, notes, tasks, files and messages
// ABOUTME: Every operation is a single statement or transaction scoped to one session

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db;
use crate::error::{Result, StorageError};
use crate::types::{Message, Note, OpenFile, StateRecord, Task, TaskStatus};

/// Length of generated note and task ids.
const ID_LENGTH: usize = 8;

fn generate_id() -> String {
    nanoid::nanoid!(ID_LENGTH)
}

/// Generate a fresh session id for callers that don't bring their own.
pub fn generate_session_id() -> String {
    generate_id()
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the store backed by the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(db::open_pool(path).await?))
    }

    /// Open a store that lives only as long as this process.
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(db::open_memory_pool().await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A handle bound to one session.
    pub fn session(&self, session_id: impl Into<String>) -> SessionView {
        SessionView {
            store: self.clone(),
            session_id: Arc::from(session_id.into()),
        }
    }

    // ========================================================================
    // ENVIRONMENT
    // ========================================================================

    pub async fn set_working_directory(&self, session_id: &str, path: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_environment (session_id, working_dir, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
                working_dir = excluded.working_dir,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(path)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!("Session {} working directory set to {}", session_id, path);
        Ok(())
    }

    /// Set the working directory only when the session has none. Returns true if it was set.
    pub async fn init_working_directory(&self, session_id: &str, path: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO session_environment (session_id, working_dir, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
                working_dir = excluded.working_dir,
                updated_at = excluded.updated_at
            WHERE session_environment.working_dir IS NULL
            "#,
        )
        .bind(session_id)
        .bind(path)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_working_directory(&self, session_id: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT working_dir FROM session_environment WHERE session_id = ?1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.flatten())
    }

    pub async fn set_goal(&self, session_id: &str, goal: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_environment (session_id, goal, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
                goal = excluded.goal,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(goal)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_goal(&self, session_id: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT goal FROM session_environment WHERE session_id = ?1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.flatten())
    }

    // ========================================================================
    // NOTES
    // ========================================================================

    pub async fn add_note(&self, session_id: &str, text: &str) -> Result<String> {
        let id = generate_id();

        sqlx::query(
            "INSERT INTO session_notes (id, session_id, text, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!("Session {} added note {}", session_id, id);
        Ok(id)
    }

    /// Remove a note. Unknown ids are ignored; the return value says whether anything was removed.
    pub async fn remove_note(&self, session_id: &str, note_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM session_notes WHERE session_id = ?1 AND id = ?2")
            .bind(session_id)
            .bind(note_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_notes(&self, session_id: &str) -> Result<Vec<Note>> {
        let rows = sqlx::query(
            "SELECT id, text, created_at FROM session_notes WHERE session_id = ?1 ORDER BY position ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_note).collect()
    }

    // ========================================================================
    // TASKS
    // ========================================================================

    /// Append a task. Without an explicit `sort_order` the task goes after every
    /// existing one (max + 1, or 0 for the first task), computed in the same statement.
    pub async fn add_task(
        &self,
        session_id: &str,
        text: &str,
        sort_order: Option<f64>,
    ) -> Result<String> {
        let id = generate_id();

        sqlx::query(
            r#"
            INSERT INTO session_tasks (id, session_id, text, status, sort_order, created_at, updated_at)
            SELECT ?1, ?2, ?3, 'new',
                   COALESCE(?4, (SELECT MAX(sort_order) + 1 FROM session_tasks WHERE session_id = ?2), 0),
                   ?5, ?5
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(text)
        .bind(sort_order)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!("Session {} added task {}", session_id, id);
        Ok(id)
    }

    pub async fn set_task_status(
        &self,
        session_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE session_tasks SET status = ?1, updated_at = ?2 WHERE session_id = ?3 AND id = ?4",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(session_id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }
        Ok(())
    }

    /// Close a task with a terminal status and record its result.
    pub async fn close_task(
        &self,
        session_id: &str,
        task_id: &str,
        status: TaskStatus,
        result: &str,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(StorageError::InvalidStatus(status.as_str().to_string()));
        }

        let outcome = sqlx::query(
            r#"
            UPDATE session_tasks SET status = ?1, result = ?2, updated_at = ?3
            WHERE session_id = ?4 AND id = ?5
            "#,
        )
        .bind(status.as_str())
        .bind(result)
        .bind(Utc::now())
        .bind(session_id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(StorageError::TaskNotFound(task_id.to_string()));
        }
        info!("Session {} closed task {} as {}", session_id, task_id, status);
        Ok(())
    }

    /// Delete every task in the session. Returns how many were removed.
    pub async fn clear_tasks(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM session_tasks WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_tasks(&self, session_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT id, text, status, sort_order, result, created_at, updated_at
            FROM session_tasks
            WHERE session_id = ?1
            ORDER BY sort_order ASC, position ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    // ========================================================================
    // OPEN FILES
    // ========================================================================

    /// Record a file as open with its current content, replacing any earlier snapshot.
    pub async fn open_file(&self, session_id: &str, path: &str, content: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_files (session_id, path, content, opened_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(session_id, path) DO UPDATE SET
                content = excluded.content,
                opened_at = excluded.opened_at
            "#,
        )
        .bind(session_id)
        .bind(path)
        .bind(content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Forget an open file. Closing a path that was never opened is not an error.
    pub async fn close_file(&self, session_id: &str, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_files WHERE session_id = ?1 AND path = ?2")
            .bind(session_id)
            .bind(path)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_open_files(&self, session_id: &str) -> Result<Vec<OpenFile>> {
        let rows = sqlx::query(
            "SELECT path, content, opened_at FROM session_files WHERE session_id = ?1 ORDER BY opened_at ASC, path ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_open_file).collect()
    }

    // ========================================================================
    // MESSAGES
    // ========================================================================

    pub async fn add_message(&self, session_id: &str, role: &str, content: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM session_messages WHERE session_id = ?1 ORDER BY position ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Message> {
                Ok(Message {
                    role: row.try_get("role")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    // ========================================================================
    // AGGREGATE
    // ========================================================================

    /// Read the whole state record in one transaction.
    pub async fn load_state(&self, session_id: &str) -> Result<StateRecord> {
        let mut tx = self.pool.begin().await?;

        let environment = sqlx::query(
            "SELECT working_dir, goal FROM session_environment WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (working_directory, goal): (Option<String>, Option<String>) = match environment {
            Some(row) => (row.try_get("working_dir")?, row.try_get("goal")?),
            None => (None, None),
        };

        let notes = sqlx::query(
            "SELECT id, text, created_at FROM session_notes WHERE session_id = ?1 ORDER BY position ASC",
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(row_to_note)
        .collect::<Result<Vec<_>>>()?;

        let tasks = sqlx::query(
            r#"
            SELECT id, text, status, sort_order, result, created_at, updated_at
            FROM session_tasks
            WHERE session_id = ?1
            ORDER BY sort_order ASC, position ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(row_to_task)
        .collect::<Result<Vec<_>>>()?;

        let open_files = sqlx::query(
            "SELECT path, content, opened_at FROM session_files WHERE session_id = ?1 ORDER BY opened_at ASC, path ASC",
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(row_to_open_file)
        .collect::<Result<Vec<_>>>()?;

        tx.commit().await?;

        Ok(StateRecord {
            session_id: session_id.to_string(),
            working_directory,
            goal,
            notes,
            tasks,
            open_files,
        })
    }
}

fn row_to_note(row: &SqliteRow) -> Result<Note> {
    Ok(Note {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        status: TaskStatus::from_str(&status)?,
        sort_order: row.try_get("sort_order")?,
        result: row.try_get("result")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_open_file(row: &SqliteRow) -> Result<OpenFile> {
    Ok(OpenFile {
        path: row.try_get("path")?,
        content: row.try_get("content")?,
        opened_at: row.try_get("opened_at")?,
    })
}

/// A [`SessionStore`] bound to a single session id.
#[derive(Clone)]
pub struct SessionView {
    store: SessionStore,
    session_id: Arc<str>,
}

impl SessionView {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn set_working_directory(&self, path: &str) -> Result<()> {
        self.store.set_working_directory(&self.session_id, path).await
    }

    pub async fn init_working_directory(&self, path: &str) -> Result<bool> {
        self.store.init_working_directory(&self.session_id, path).await
    }

    pub async fn working_directory(&self) -> Result<Option<String>> {
        self.store.get_working_directory(&self.session_id).await
    }

    pub async fn set_goal(&self, goal: &str) -> Result<()> {
        self.store.set_goal(&self.session_id, goal).await
    }

    pub async fn goal(&self) -> Result<Option<String>> {
        self.store.get_goal(&self.session_id).await
    }

    pub async fn add_note(&self, text: &str) -> Result<String> {
        self.store.add_note(&self.session_id, text).await
    }

    pub async fn remove_note(&self, note_id: &str) -> Result<bool> {
        self.store.remove_note(&self.session_id, note_id).await
    }

    pub async fn notes(&self) -> Result<Vec<Note>> {
        self.store.list_notes(&self.session_id).await
    }

    pub async fn add_task(&self, text: &str, sort_order: Option<f64>) -> Result<String> {
        self.store.add_task(&self.session_id, text, sort_order).await
    }

    pub async fn set_task_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        self.store
            .set_task_status(&self.session_id, task_id, status)
            .await
    }

    pub async fn close_task(&self, task_id: &str, status: TaskStatus, result: &str) -> Result<()> {
        self.store
            .close_task(&self.session_id, task_id, status, result)
            .await
    }

    pub async fn clear_tasks(&self) -> Result<u64> {
        self.store.clear_tasks(&self.session_id).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>> {
        self.store.list_tasks(&self.session_id).await
    }

    pub async fn open_file(&self, path: &str, content: &str) -> Result<()> {
        self.store.open_file(&self.session_id, path, content).await
    }

    pub async fn close_file(&self, path: &str) -> Result<()> {
        self.store.close_file(&self.session_id, path).await
    }

    pub async fn open_files(&self) -> Result<Vec<OpenFile>> {
        self.store.list_open_files(&self.session_id).await
    }

    pub async fn add_message(&self, role: &str, content: &str) -> Result<()> {
        self.store.add_message(&self.session_id, role, content).await
    }

    pub async fn messages(&self) -> Result<Vec<Message>> {
        self.store.list_messages(&self.session_id).await
    }

    pub async fn load(&self) -> Result<StateRecord> {
        self.store.load_state(&self.session_id).await
    }
}
