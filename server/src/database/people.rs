// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use common::{AttendanceRecord, User};
use sqlx::SqlitePool;
use tracing::debug;

pub async fn insert_user(pool: &SqlitePool, full_name: &str, role: &str) -> Result<User> {
    let created_at = Utc::now();
    let id = sqlx::query("INSERT INTO users (full_name, role, created_at) VALUES (?, ?, ?)")
        .bind(full_name)
        .bind(role)
        .bind(created_at)
        .execute(pool)
        .await
        .context("Failed to insert user into DB")?
        .last_insert_rowid();

    Ok(User {
        id,
        full_name: full_name.to_string(),
        role: role.to_string(),
        created_at,
    })
}

pub async fn find_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to load user {}", user_id))
}

/// Records today's check-in for a user. A second check-in on the same day
/// keeps the first record.
pub async fn record_check_in(
    pool: &SqlitePool,
    user_id: i64,
    work_date: NaiveDate,
    at: DateTime<Utc>,
) -> Result<AttendanceRecord> {
    sqlx::query(
        "INSERT INTO attendance (user_id, work_date, check_in_at) VALUES (?, ?, ?) ON CONFLICT (user_id, work_date) DO NOTHING",
    )
    .bind(user_id)
    .bind(work_date)
    .bind(at)
    .execute(pool)
    .await
    .context("Failed to record check-in")?;

    debug!("Check-in recorded for user {} on {}", user_id, work_date);

    sqlx::query_as::<_, AttendanceRecord>(
        "SELECT * FROM attendance WHERE user_id = ? AND work_date = ?",
    )
    .bind(user_id)
    .bind(work_date)
    .fetch_one(pool)
    .await
    .context("Failed to read back check-in")
}

pub async fn users_checked_in_on(pool: &SqlitePool, work_date: NaiveDate) -> Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM attendance WHERE work_date = ? ORDER BY user_id",
    )
    .bind(work_date)
    .fetch_all(pool)
    .await
    .context("Failed to list checked-in users")
}
