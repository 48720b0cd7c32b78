// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod auth;
pub mod config;
pub mod daily;
pub mod database;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod queries;
pub mod routes;
pub mod state;
pub mod storage;
pub mod submissions;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::daily::TriggerPolicy;
    use crate::database;
    use crate::state::AppState;
    use crate::storage::BlobStore;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use common::{CreateTaskPayload, CreateTemplatePayload, Task, TaskTemplate, TaskType, User};
    use sqlx::SqlitePool;

    /// Fresh in-memory state with storage in a temporary directory.
    pub async fn test_state() -> (AppState, tempfile::TempDir) {
        let pool = database::in_memory_pool().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(pool, BlobStore::new(dir.path()))
            .with_daily_trigger(TriggerPolicy::immediate());
        (state, dir)
    }

    pub async fn seed_user(pool: &SqlitePool, name: &str) -> User {
        database::insert_user(pool, name, "staff").await.unwrap()
    }

    pub async fn seed_template(pool: &SqlitePool, user_id: i64, task_type: TaskType) -> TaskTemplate {
        database::insert_template(
            pool,
            CreateTemplatePayload {
                title: "Open the store".to_string(),
                description: Some("Lights, tills, shutters".to_string()),
                assigned_to: user_id,
                task_type: Some(task_type),
                reviewer_id: None,
                priority: None,
                due_time: NaiveTime::from_hms_opt(10, 0, 0),
                auto_approve_enabled: None,
                auto_approve_cutoff_hours: None,
            },
        )
        .await
        .unwrap()
    }

    /// A daily instance without a template, due on `date` at `due` (h, m).
    pub async fn seed_daily_task(
        pool: &SqlitePool,
        user_id: i64,
        date: NaiveDate,
        due: Option<(u32, u32)>,
    ) -> Task {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO tasks (title, assigned_to, task_type, status, priority, due_date, due_time,
                instance_date, is_recurring_instance, tags, created_at, updated_at)
            VALUES ('Count the tills', ?, 'daily', 'not_started', 'medium', ?, ?, ?, 1, '[]', ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(due.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)))
        .bind(date)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

        database::find_task(pool, id).await.unwrap().unwrap()
    }

    pub async fn seed_one_off_task(pool: &SqlitePool, user_id: i64) -> Task {
        let task = database::insert_task(
            pool,
            CreateTaskPayload {
                title: "Replace shelf labels".to_string(),
                description: None,
                assigned_to: user_id,
                reviewer_id: None,
                priority: None,
                due_date: None,
                due_time: None,
                tags: vec![],
            },
            user_id,
        )
        .await
        .unwrap();
        database::find_task(pool, task.id).await.unwrap().unwrap()
    }
}
