// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::Utc;
use common::TaskSettings;
use sqlx::SqlitePool;

pub const GLOBAL_SCOPE: &str = "global";

pub fn user_scope(user_id: i64) -> String {
    format!("user:{}", user_id)
}

pub async fn find_settings(pool: &SqlitePool, scope: &str) -> Result<Option<TaskSettings>> {
    sqlx::query_as::<_, TaskSettings>("SELECT * FROM task_settings WHERE scope = ?")
        .bind(scope)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to read task settings for scope {}", scope))
}

pub async fn upsert_settings(
    pool: &SqlitePool,
    scope: &str,
    auto_approve_daily: bool,
    auto_approve_cutoff_hours: f64,
) -> Result<TaskSettings> {
    let updated_at = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO task_settings (scope, auto_approve_daily, auto_approve_cutoff_hours, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (scope) DO UPDATE SET
            auto_approve_daily = excluded.auto_approve_daily,
            auto_approve_cutoff_hours = excluded.auto_approve_cutoff_hours,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(scope)
    .bind(auto_approve_daily)
    .bind(auto_approve_cutoff_hours)
    .bind(updated_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to write task settings for scope {}", scope))?;

    Ok(TaskSettings {
        scope: scope.to_string(),
        auto_approve_daily,
        auto_approve_cutoff_hours,
        updated_at,
    })
}
