// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Creation of the dated task instances behind daily templates.
//!
//! `ensure_daily_tasks` is the single entry point. It holds no state of its
//! own and may be called from any number of places for the same user and day;
//! uniqueness comes from the atomic creation in the database.
use crate::database;
use crate::errors::TaskError;
use crate::state::AppState;
use chrono::{NaiveDate, Utc};
use common::{ChangeKind, DailyTaskStatus};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info, warn};

/// Result of one `ensure_daily_tasks` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "count", rename_all = "snake_case")]
pub enum EnsureOutcome {
    NoUser,
    NoTemplates,
    AlreadyPresent(i64),
    Created(usize),
}

/// Delays used by the background trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub initial_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            retry_delay: Duration::from_secs(30),
        }
    }
}

impl TriggerPolicy {
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }
}

pub async fn check_daily_tasks_status(
    pool: &SqlitePool,
    user_id: i64,
    date: NaiveDate,
) -> Result<DailyTaskStatus, TaskError> {
    let template_count = database::count_active_daily_templates(pool, user_id).await?;
    let instance_count = database::count_daily_instances(pool, user_id, date).await?;

    Ok(DailyTaskStatus {
        user_id,
        date,
        template_count,
        instance_count,
        checked_at: Utc::now(),
    })
}

/// Makes sure every active daily template of the user has an instance for
/// `date`. `on_created` receives the ids of newly created instances.
pub async fn ensure_daily_tasks<F>(
    pool: &SqlitePool,
    user_id: Option<i64>,
    date: NaiveDate,
    on_created: F,
) -> Result<EnsureOutcome, TaskError>
where
    F: FnOnce(&[i64]),
{
    let Some(user_id) = user_id else {
        debug!("No user resolved, skipping daily task check.");
        return Ok(EnsureOutcome::NoUser);
    };

    let status = check_daily_tasks_status(pool, user_id, date).await?;
    if status.template_count == 0 {
        info!("No daily task templates configured for user {}.", user_id);
        return Ok(EnsureOutcome::NoTemplates);
    }
    if status.instance_count > 0 {
        debug!(
            "User {} already has {} daily tasks for {}.",
            user_id, status.instance_count, date
        );
        return Ok(EnsureOutcome::AlreadyPresent(status.instance_count));
    }

    let created = database::create_daily_task_instances_for_user(pool, user_id, date).await?;

    let recheck = database::count_daily_instances(pool, user_id, date).await?;
    if recheck == 0 {
        return Err(TaskError::Integrity(format!(
            "no daily task instances for user {} on {} after creation",
            user_id, date
        )));
    }

    if !created.is_empty() {
        on_created(&created);
    }
    Ok(EnsureOutcome::Created(created.len()))
}

/// Runs the daily check for `user_id` in the background: after the initial
/// delay, and once more after the retry delay if the first attempt failed.
/// Errors are logged, never returned.
pub fn spawn_daily_task_check(state: AppState, user_id: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let policy = state.daily_trigger;
        sleep(policy.initial_delay).await;

        if let Err(e) = run_for_today(&state, user_id).await {
            warn!(
                "Daily task check for user {} failed, retrying in {:?}: {}",
                user_id, policy.retry_delay, e
            );
            sleep(policy.retry_delay).await;
            if let Err(e) = run_for_today(&state, user_id).await {
                error!("Daily task check for user {} failed again: {}", user_id, e);
            }
        }
    })
}

/// periodic sweep so that open sessions get their new tasks.
/// day-boundary watcher so that open sessions get their new tasks.
pub async fn sweep_checked_in_users(state: &AppState, date: NaiveDate) -> usize {
    let users = match database::users_checked_in_on(&state.pool, date).await {
        Ok(users) => users,
        Err(e) => {
            error!("Could not list checked-in users for {}: {:?}", date, e);
            return 0;
        }
    };

    let mut created_total = 0;
    for user_id in users {
        match ensure_with_notifications(state, user_id, date).await {
            Ok(EnsureOutcome::Created(count)) => created_total += count,
            Ok(_) => {}
            Err(e) => warn!("Daily task sweep for user {} failed: {}", user_id, e),
        }
    }
    created_total
}

async fn run_for_today(state: &AppState, user_id: i64) -> Result<EnsureOutcome, TaskError> {
    ensure_with_notifications(state, user_id, Utc::now().date_naive()).await
}

/// `ensure_daily_tasks` announcing created instances on the change feed.
pub async fn ensure_with_notifications(
    state: &AppState,
    user_id: i64,
    date: NaiveDate,
) -> Result<EnsureOutcome, TaskError> {
    let changes = state.changes.clone();
    ensure_daily_tasks(&state.pool, Some(user_id), date, move |ids| {
        info!("Daily tasks were created for user {}: {:?}", user_id, ids);
        changes.publish_many(ChangeKind::Insert, ids);
    })
    .await
}
