// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::{ChecklistItem, EvidenceType, SubmissionType, TaskReview, TaskSubmission};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

/// Column values of a submission about to be inserted.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub task_id: i64,
    pub submission_type: SubmissionType,
    pub evidence_type: Option<EvidenceType>,
    pub file_url: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub link_url: Option<String>,
    pub notes: Option<String>,
    pub checklist_data: Option<Vec<ChecklistItem>>,
    pub submitted_by: i64,
    pub submitted_at: DateTime<Utc>,
}

pub async fn insert_submission(pool: &SqlitePool, new: NewSubmission) -> Result<TaskSubmission> {
    let checklist = new.checklist_data.map(Json);

    let id = sqlx::query(
        r#"
        INSERT INTO task_submissions (task_id, submission_type, evidence_type, file_url, file_path, file_name,
            file_size, link_url, notes, checklist_data, submitted_by, submitted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.task_id)
    .bind(new.submission_type)
    .bind(new.evidence_type)
    .bind(&new.file_url)
    .bind(&new.file_path)
    .bind(&new.file_name)
    .bind(new.file_size)
    .bind(&new.link_url)
    .bind(&new.notes)
    .bind(&checklist)
    .bind(new.submitted_by)
    .bind(new.submitted_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to insert submission for task {}", new.task_id))?
    .last_insert_rowid();

    Ok(TaskSubmission {
        id,
        task_id: new.task_id,
        submission_type: new.submission_type,
        evidence_type: new.evidence_type,
        file_url: new.file_url,
        file_path: new.file_path,
        file_name: new.file_name,
        file_size: new.file_size,
        link_url: new.link_url,
        notes: new.notes,
        checklist_data: checklist,
        submitted_by: new.submitted_by,
        submitted_at: new.submitted_at,
    })
}

pub async fn find_submission(
    pool: &SqlitePool,
    submission_id: i64,
) -> Result<Option<TaskSubmission>> {
    sqlx::query_as::<_, TaskSubmission>("SELECT * FROM task_submissions WHERE id = ?")
        .bind(submission_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to load submission {}", submission_id))
}

pub async fn list_submissions(pool: &SqlitePool, task_id: i64) -> Result<Vec<TaskSubmission>> {
    sqlx::query_as::<_, TaskSubmission>(
        "SELECT * FROM task_submissions WHERE task_id = ? ORDER BY submitted_at DESC, id DESC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to list submissions of task {}", task_id))
}

/// Deletes a submission row. Returns false if nothing was deleted.
pub async fn delete_submission(pool: &SqlitePool, submission_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM task_submissions WHERE id = ?")
        .bind(submission_id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete submission {}", submission_id))?;

    info!(
        "Deleted {} rows for submission ID: {}",
        result.rows_affected(),
        submission_id
    );

    Ok(result.rows_affected() > 0)
}

pub async fn submissions_for_tasks(
    pool: &SqlitePool,
    task_ids: &[i64],
) -> Result<Vec<TaskSubmission>> {
    if task_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM task_submissions WHERE task_id IN (");
    let mut separated = qb.separated(", ");
    for id in task_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    qb.build_query_as::<TaskSubmission>()
        .fetch_all(pool)
        .await
        .context("Failed to load submissions for tasks")
}

pub async fn reviews_for_tasks(pool: &SqlitePool, task_ids: &[i64]) -> Result<Vec<TaskReview>> {
    if task_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM task_reviews WHERE task_id IN (");
    let mut separated = qb.separated(", ");
    for id in task_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    qb.build_query_as::<TaskReview>()
        .fetch_all(pool)
        .await
        .context("Failed to load reviews for tasks")
}

pub async fn list_reviews(pool: &SqlitePool, task_id: i64) -> Result<Vec<TaskReview>> {
    sqlx::query_as::<_, TaskReview>(
        "SELECT * FROM task_reviews WHERE task_id = ? ORDER BY reviewed_at DESC, id DESC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to list reviews of task {}", task_id))
}
