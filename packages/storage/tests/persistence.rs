// ABOUTME: Integration tests for the file-backed state store
// ABOUTME: Covers reopening a database and concurrent writers on separate sessions

use pretty_assertions::assert_eq;
use shellbox_storage::{SessionStore, TaskStatus};
use tempfile::TempDir;

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("shellbox.db");

    {
        let store = SessionStore::open(&db_path).await.unwrap();
        let view = store.session("abc12345");
        view.set_goal("Rotate access keys").await.unwrap();
        let task = view.add_task("list keys", None).await.unwrap();
        view.set_task_status(&task, TaskStatus::InProgress).await.unwrap();
        view.add_note("two users affected").await.unwrap();
        store.pool().close().await;
    }

    let store = SessionStore::open(&db_path).await.unwrap();
    let state = store.load_state("abc12345").await.unwrap();

    assert_eq!(state.goal.as_deref(), Some("Rotate access keys"));
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(state.tasks[0].status, TaskStatus::InProgress);
    assert_eq!(state.notes[0].text, "two users affected");
}

#[tokio::test]
async fn test_concurrent_sessions_do_not_interfere() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::open(&temp_dir.path().join("shellbox.db"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let session = format!("session-{}", n);
            for i in 0..5 {
                store
                    .add_task(&session, &format!("task {}", i), None)
                    .await
                    .unwrap();
            }
            store
                .set_working_directory(&session, &format!("/work/{}", n))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for n in 0..8 {
        let session = format!("session-{}", n);
        let tasks = store.list_tasks(&session).await.unwrap();
        let orders: Vec<f64> = tasks.iter().map(|t| t.sort_order).collect();
        assert_eq!(orders, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            store.get_working_directory(&session).await.unwrap(),
            Some(format!("/work/{}", n))
        );
    }
}
