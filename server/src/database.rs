// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
mod people;
mod settings;
mod submissions;
mod tasks;
mod templates;

pub use people::*;
pub use settings::*;
pub use submissions::*;
pub use tasks::*;
pub use templates::*;

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'staff',
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS task_templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NULL,
    assigned_to INTEGER NOT NULL REFERENCES users(id),
    task_type TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT 1,
    reviewer_id INTEGER NULL REFERENCES users(id),
    priority TEXT NOT NULL DEFAULT 'medium',
    due_time TIME NULL,
    auto_approve_enabled BOOLEAN NOT NULL DEFAULT 1,
    auto_approve_cutoff_hours REAL NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    template_id INTEGER NULL REFERENCES task_templates(id),
    title TEXT NOT NULL,
    description TEXT NULL,
    assigned_to INTEGER NOT NULL REFERENCES users(id),
    assigned_by INTEGER NULL REFERENCES users(id),
    reviewer_id INTEGER NULL REFERENCES users(id),
    task_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'not_started',
    priority TEXT NOT NULL DEFAULT 'medium',
    due_date DATE NULL,
    due_time TIME NULL,
    instance_date DATE NULL,
    is_recurring_instance BOOLEAN NOT NULL DEFAULT 0,
    started_at TIMESTAMP NULL,
    is_late BOOLEAN NOT NULL DEFAULT 0,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_daily_instance
    ON tasks (assigned_to, template_id, instance_date)
    WHERE is_recurring_instance = 1;

CREATE TABLE IF NOT EXISTS task_submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    submission_type TEXT NOT NULL,
    evidence_type TEXT NULL,
    file_url TEXT NULL,
    file_path TEXT NULL,
    file_name TEXT NULL,
    file_size INTEGER NULL,
    link_url TEXT NULL,
    notes TEXT NULL,
    checklist_data TEXT NULL,
    submitted_by INTEGER NOT NULL REFERENCES users(id),
    submitted_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS task_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    reviewer_id INTEGER NOT NULL REFERENCES users(id),
    decision TEXT NOT NULL,
    notes TEXT NULL,
    reviewed_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS task_settings (
    scope TEXT PRIMARY KEY,
    auto_approve_daily BOOLEAN NOT NULL,
    auto_approve_cutoff_hours REAL NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    work_date DATE NOT NULL,
    check_in_at TIMESTAMP NOT NULL,
    UNIQUE (user_id, work_date)
);
"#;

/// Establishes the database connection pool.
/// If the database does not exist, it creates it.
/// It also ensures every table has the correct schema.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool).await?;

    Ok(pool)
}

/// A private in-memory database with the application schema.
///
/// The pool is limited to one connection that never expires, otherwise every
/// new connection would see its own empty database.
pub async fn in_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;

    apply_schema(&pool).await?;

    Ok(pool)
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("Failed to create application tables")?;

    info!("Application tables are ready.");
    Ok(())
}
