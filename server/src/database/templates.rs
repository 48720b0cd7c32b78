// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::Utc;
use common::{CreateTemplatePayload, TaskTemplate, TaskType};
use sqlx::SqlitePool;
use tracing::{debug, info};

pub async fn insert_template(
    pool: &SqlitePool,
    payload: CreateTemplatePayload,
) -> Result<TaskTemplate> {
    let now = Utc::now();
    let task_type = payload.task_type.unwrap_or(TaskType::Daily);
    let priority = payload.priority.unwrap_or_default();
    let auto_approve_enabled = payload.auto_approve_enabled.unwrap_or(true);

    debug!(
        "Insert template: title={}, assigned_to={}, task_type={:?}",
        payload.title, payload.assigned_to, task_type
    );

    let id = sqlx::query(
        r#"
        INSERT INTO task_templates (title, description, assigned_to, task_type, is_active, reviewer_id,
            priority, due_time, auto_approve_enabled, auto_approve_cutoff_hours, created_at, updated_at)
        VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.assigned_to)
    .bind(task_type)
    .bind(payload.reviewer_id)
    .bind(priority)
    .bind(payload.due_time)
    .bind(auto_approve_enabled)
    .bind(payload.auto_approve_cutoff_hours)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert task template into DB")?
    .last_insert_rowid();

    Ok(TaskTemplate {
        id,
        title: payload.title,
        description: payload.description,
        assigned_to: payload.assigned_to,
        task_type,
        is_active: true,
        reviewer_id: payload.reviewer_id,
        priority,
        due_time: payload.due_time,
        auto_approve_enabled,
        auto_approve_cutoff_hours: payload.auto_approve_cutoff_hours,
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_template(pool: &SqlitePool, template_id: i64) -> Result<Option<TaskTemplate>> {
    sqlx::query_as::<_, TaskTemplate>("SELECT * FROM task_templates WHERE id = ?")
        .bind(template_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to load template {}", template_id))
}

pub async fn list_templates(
    pool: &SqlitePool,
    assigned_to: Option<i64>,
) -> Result<Vec<TaskTemplate>> {
    let templates = match assigned_to {
        Some(user_id) => {
            sqlx::query_as::<_, TaskTemplate>(
                "SELECT * FROM task_templates WHERE assigned_to = ? ORDER BY id ASC",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, TaskTemplate>("SELECT * FROM task_templates ORDER BY id ASC")
                .fetch_all(pool)
                .await
        }
    }
    .context("Failed to list task templates")?;

    Ok(templates)
}

/// Switches a template off. Returns false if no active template had that id.
pub async fn deactivate_template(pool: &SqlitePool, template_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE task_templates SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
    )
    .bind(Utc::now())
    .bind(template_id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to deactivate template {}", template_id))?;

    info!(
        "Deactivated {} rows for template ID: {}",
        result.rows_affected(),
        template_id
    );

    Ok(result.rows_affected() > 0)
}

pub async fn count_active_daily_templates(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM task_templates WHERE assigned_to = ? AND task_type = 'daily' AND is_active = 1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("Failed to count active daily templates")
}
