// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use common::{CreateTaskPayload, Priority, ReviewDecision, Task, TaskStatus, TaskType};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

/// A task row joined with the names shown next to it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    #[sqlx(flatten)]
    pub task: Task,
    pub template_title: Option<String>,
    pub assignee_name: Option<String>,
    pub reviewer_name: Option<String>,
}

/// Review rows written together with a bulk status change.
pub struct ReviewRecord<'a> {
    pub reviewer_id: i64,
    pub decision: ReviewDecision,
    pub notes: Option<&'a str>,
}

/// Inserts a one-off task.
pub async fn insert_task(
    pool: &SqlitePool,
    payload: CreateTaskPayload,
    assigned_by: i64,
) -> Result<Task> {
    let now = Utc::now();
    let priority = payload.priority.unwrap_or_default();

    let id = sqlx::query(
        r#"
        INSERT INTO tasks (template_id, title, description, assigned_to, assigned_by, reviewer_id, task_type,
            status, priority, due_date, due_time, instance_date, is_recurring_instance, started_at, is_late,
            tags, created_at, updated_at)
        VALUES (NULL, ?, ?, ?, ?, ?, 'one_off', 'not_started', ?, ?, ?, NULL, 0, NULL, 0, ?, ?, ?)
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.assigned_to)
    .bind(assigned_by)
    .bind(payload.reviewer_id)
    .bind(priority)
    .bind(payload.due_date)
    .bind(payload.due_time)
    .bind(Json(&payload.tags))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to insert task into DB")?
    .last_insert_rowid();

    Ok(Task {
        id,
        template_id: None,
        title: payload.title,
        description: payload.description,
        assigned_to: payload.assigned_to,
        assigned_by: Some(assigned_by),
        reviewer_id: payload.reviewer_id,
        task_type: TaskType::OneOff,
        status: TaskStatus::NotStarted,
        priority,
        due_date: payload.due_date,
        due_time: payload.due_time,
        instance_date: None,
        is_recurring_instance: false,
        started_at: None,
        is_late: false,
        tags: Json(payload.tags),
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_task(pool: &SqlitePool, task_id: i64) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to load task {}", task_id))
}

pub async fn count_daily_instances(
    pool: &SqlitePool,
    user_id: i64,
    instance_date: NaiveDate,
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tasks WHERE assigned_to = ? AND task_type = 'daily' AND is_recurring_instance = 1 AND instance_date = ?",
    )
    .bind(user_id)
    .bind(instance_date)
    .fetch_one(pool)
    .await
    .context("Failed to count daily task instances")
}

/// Creates one instance per active daily template of the user for the given
/// date, atomically. Repeated calls are no-ops thanks to the unique index on
/// `(assigned_to, template_id, instance_date)`. Returns the ids created.
pub async fn create_daily_task_instances_for_user(
    pool: &SqlitePool,
    user_id: i64,
    target_date: NaiveDate,
) -> Result<Vec<i64>> {
    let now = Utc::now();
    let mut tx = pool
        .begin()
        .await
        .context("Failed to open instance creation transaction")?;

    // The WHERE clause is required for SQLite to parse the upsert after a SELECT.
    let created = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO tasks (template_id, title, description, assigned_to, assigned_by, reviewer_id, task_type,
            status, priority, due_date, due_time, instance_date, is_recurring_instance, started_at, is_late,
            tags, created_at, updated_at)
        SELECT t.id, t.title, t.description, t.assigned_to, NULL, t.reviewer_id, 'daily',
            'not_started', t.priority, ?1, t.due_time, ?1, 1, NULL, 0, '[]', ?2, ?2
        FROM task_templates t
        WHERE t.assigned_to = ?3 AND t.task_type = 'daily' AND t.is_active = 1
        ON CONFLICT DO NOTHING
        RETURNING id
        "#,
    )
    .bind(target_date)
    .bind(now)
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await
    .context("Failed to create daily task instances")?;

    tx.commit()
        .await
        .context("Failed to commit daily task instances")?;

    info!(
        "Created {} daily task instances for user {} on {}",
        created.len(),
        user_id,
        target_date
    );

    Ok(created)
}

/// Sets the status of a task. Returns false if the task does not exist.
pub async fn update_task_status(
    pool: &SqlitePool,
    task_id: i64,
    status: TaskStatus,
    is_late: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET status = ?, is_late = (is_late OR ?), updated_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(is_late)
    .bind(now)
    .bind(task_id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to update status of task {}", task_id))?;

    debug!(
        "Status of task {} set to {} ({} rows)",
        task_id,
        status.as_str(),
        result.rows_affected()
    );

    Ok(result.rows_affected() > 0)
}

/// Marks a task as started, but only if it belongs to `user_id`.
pub async fn start_task_for_assignee(
    pool: &SqlitePool,
    task_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'in_progress', started_at = ?, updated_at = ? WHERE id = ? AND assigned_to = ?",
    )
    .bind(now)
    .bind(now)
    .bind(task_id)
    .bind(user_id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to start task {}", task_id))?;

    Ok(result.rows_affected() > 0)
}

/// Loads tasks with template, assignee and reviewer names.
pub async fn list_task_rows(pool: &SqlitePool, assigned_to: Option<i64>) -> Result<Vec<TaskRow>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT t.*, tt.title AS template_title, a.full_name AS assignee_name, r.full_name AS reviewer_name
        FROM tasks t
        LEFT JOIN task_templates tt ON tt.id = t.template_id
        LEFT JOIN users a ON a.id = t.assigned_to
        LEFT JOIN users r ON r.id = t.reviewer_id
        "#,
    );
    if let Some(user_id) = assigned_to {
        qb.push(" WHERE t.assigned_to = ").push_bind(user_id);
    }
    qb.push(" ORDER BY t.id ASC");

    qb.build_query_as::<TaskRow>()
        .fetch_all(pool)
        .await
        .context("Failed to list tasks")
}

/// Whether `err` was caused by a violated UNIQUE constraint or index.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push(" WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

pub async fn bulk_assign(
    pool: &SqlitePool,
    task_ids: &[i64],
    assignee_id: i64,
    assigned_by: i64,
    now: DateTime<Utc>,
) -> Result<Vec<i64>> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE tasks SET assigned_to = ");
    qb.push_bind(assignee_id)
        .push(", assigned_by = ")
        .push_bind(assigned_by)
        .push(", updated_at = ")
        .push_bind(now);
    push_id_list(&mut qb, task_ids);
    qb.push(" RETURNING id");

    qb.build_query_scalar::<i64>()
        .fetch_all(pool)
        .await
        .context("Failed to bulk assign tasks")
}

/// Sets the status of many tasks with a single UPDATE. With `daily_only`
/// one-off tasks in `task_ids` are left untouched. When `review` is given a
/// review row is written for every updated task in the same transaction.
pub async fn bulk_set_status(
    pool: &SqlitePool,
    task_ids: &[i64],
    status: TaskStatus,
    daily_only: bool,
    review: Option<ReviewRecord<'_>>,
    now: DateTime<Utc>,
) -> Result<Vec<i64>> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to open bulk status transaction")?;

    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE tasks SET status = ");
    qb.push_bind(status).push(", updated_at = ").push_bind(now);
    push_id_list(&mut qb, task_ids);
    if daily_only {
        qb.push(" AND task_type = 'daily'");
    }
    qb.push(" RETURNING id");

    let updated = qb
        .build_query_scalar::<i64>()
        .fetch_all(&mut *tx)
        .await
        .context("Failed to bulk update task status")?;

    if let Some(review) = review {
        for task_id in &updated {
            sqlx::query(
                "INSERT INTO task_reviews (task_id, reviewer_id, decision, notes, reviewed_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(task_id)
            .bind(review.reviewer_id)
            .bind(review.decision)
            .bind(review.notes)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to record task review")?;
        }
    }

    tx.commit()
        .await
        .context("Failed to commit bulk status change")?;

    Ok(updated)
}

pub async fn bulk_set_priority(
    pool: &SqlitePool,
    task_ids: &[i64],
    priority: Priority,
    now: DateTime<Utc>,
) -> Result<Vec<i64>> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE tasks SET priority = ");
    qb.push_bind(priority).push(", updated_at = ").push_bind(now);
    push_id_list(&mut qb, task_ids);
    qb.push(" RETURNING id");

    qb.build_query_scalar::<i64>()
        .fetch_all(pool)
        .await
        .context("Failed to bulk update task priority")
}

/// Deletes tasks; their submissions and reviews go with them.
pub async fn bulk_delete(pool: &SqlitePool, task_ids: &[i64]) -> Result<Vec<i64>> {
    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM tasks");
    push_id_list(&mut qb, task_ids);
    qb.push(" RETURNING id");

    qb.build_query_scalar::<i64>()
        .fetch_all(pool)
        .await
        .context("Failed to bulk delete tasks")
}
