// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Filtered task views and bulk task changes.
use crate::database::{self, ReviewRecord, TaskRow};
use crate::errors::TaskError;
use crate::state::AppState;
use chrono::Utc;
use common::{
    BulkAction, BulkOutcome, ChangeKind, Priority, ReviewDecision, SortDirection, SortField,
    TaskFilters, TaskPage, TaskReview, TaskStatus, TaskSubmission, TaskView, User,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const DEFAULT_PER_PAGE: usize = 50;
const MAX_PER_PAGE: usize = 200;

/// Whether a joined task row satisfies every supplied criterion.
pub fn matches(row: &TaskRow, filters: &TaskFilters) -> bool {
    let task = &row.task;

    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        let in_title = task.title.to_lowercase().contains(&needle);
        let in_description = task
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&needle));
        if !in_title && !in_description {
            return false;
        }
    }
    if filters.task_type.is_some_and(|t| t != task.task_type)
        || filters.status.is_some_and(|s| s != task.status)
        || filters.priority.is_some_and(|p| p != task.priority)
        || filters.assigned_to.is_some_and(|a| a != task.assigned_to)
        || filters.is_late.is_some_and(|late| late != task.is_late)
    {
        return false;
    }
    if let Some(reviewer) = filters.reviewer_id {
        if task.reviewer_id != Some(reviewer) {
            return false;
        }
    }
    if filters.needs_review == Some(true) && task.status != TaskStatus::SubmittedForReview {
        return false;
    }
    if filters.due_from.is_some() || filters.due_to.is_some() {
        let Some(due) = task.due_date else {
            return false;
        };
        if filters.due_from.is_some_and(|from| due < from)
            || filters.due_to.is_some_and(|to| due > to)
        {
            return false;
        }
    }
    let wanted_tags = filters.tag_set();
    if !wanted_tags.is_empty() && !task.tags.iter().any(|t| wanted_tags.contains(t)) {
        return false;
    }
    true
}

/// Orders two optional values, keeping missing values last in either direction.
fn cmp_optional<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(&b), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

pub fn sort_rows(rows: &mut [TaskRow], field: SortField, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let (a, b) = (&a.task, &b.task);
        let primary = match field {
            SortField::DueDate => cmp_optional(
                a.due_date.map(|d| (d, a.due_time)),
                b.due_date.map(|d| (d, b.due_time)),
                direction,
            ),
            SortField::Priority => directed(a.priority.cmp(&b.priority), direction),
            SortField::Status => directed(a.status.cmp(&b.status), direction),
            SortField::Title => directed(
                a.title.to_lowercase().cmp(&b.title.to_lowercase()),
                direction,
            ),
            SortField::CreatedAt => directed(a.created_at.cmp(&b.created_at), direction),
            SortField::UpdatedAt => directed(a.updated_at.cmp(&b.updated_at), direction),
        };
        primary.then(a.id.cmp(&b.id))
    });
}

/// Picks the submission with the latest `submitted_at` per task.
fn latest_submissions(submissions: Vec<TaskSubmission>) -> HashMap<i64, TaskSubmission> {
    let mut latest: HashMap<i64, TaskSubmission> = HashMap::new();
    for submission in submissions {
        match latest.get(&submission.task_id) {
            Some(held)
                if (held.submitted_at, held.id) >= (submission.submitted_at, submission.id) => {}
            _ => {
                latest.insert(submission.task_id, submission);
            }
        }
    }
    latest
}

fn latest_reviews(reviews: Vec<TaskReview>) -> HashMap<i64, TaskReview> {
    let mut latest: HashMap<i64, TaskReview> = HashMap::new();
    for review in reviews {
        match latest.get(&review.task_id) {
            Some(held) if (held.reviewed_at, held.id) >= (review.reviewed_at, review.id) => {}
            _ => {
                latest.insert(review.task_id, review);
            }
        }
    }
    latest
}

/// Filters, sorts and pages the tasks, then attaches the latest submission
/// and review of each task on the page.
pub async fn fetch_task_views(
    state: &AppState,
    filters: &TaskFilters,
) -> Result<TaskPage, TaskError> {
    let mut rows: Vec<TaskRow> = database::list_task_rows(&state.pool, filters.assigned_to)
        .await?
        .into_iter()
        .filter(|row| matches(row, filters))
        .collect();
    sort_rows(&mut rows, filters.sort_by, filters.sort_dir);

    let total = rows.len();
    let per_page = filters
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let page = filters.page.unwrap_or(1).max(1);
    let page_rows: Vec<TaskRow> = rows
        .into_iter()
        .skip(page.saturating_sub(1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    let ids: Vec<i64> = page_rows.iter().map(|row| row.task.id).collect();
    let mut submissions =
        latest_submissions(database::submissions_for_tasks(&state.pool, &ids).await?);
    let mut reviews = latest_reviews(database::reviews_for_tasks(&state.pool, &ids).await?);

    let tasks = page_rows
        .into_iter()
        .map(|row| {
            let id = row.task.id;
            TaskView {
                task: row.task,
                template_title: row.template_title,
                assignee_name: row.assignee_name,
                reviewer_name: row.reviewer_name,
                latest_submission: submissions.remove(&id),
                latest_review: reviews.remove(&id),
            }
        })
        .collect();

    debug!("Task view: {} matching, page {} of size {}", total, page, per_page);

    Ok(TaskPage {
        tasks,
        total,
        page,
        per_page,
    })
}

/// A bulk action whose required data has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedBulkAction {
    Assign(i64),
    Approve,
    Reject(String),
    ChangeStatus(TaskStatus),
    ChangePriority(Priority),
    Delete,
}

impl ValidatedBulkAction {
    fn name(&self) -> &'static str {
        match self {
            ValidatedBulkAction::Assign(_) => "assign",
            ValidatedBulkAction::Approve => "approve",
            ValidatedBulkAction::Reject(_) => "reject",
            ValidatedBulkAction::ChangeStatus(_) => "change_status",
            ValidatedBulkAction::ChangePriority(_) => "change_priority",
            ValidatedBulkAction::Delete => "delete",
        }
    }
}

fn missing(field: &str, action: &str) -> TaskError {
    TaskError::validation(format!("'{}' is required for the {} action.", field, action))
}

/// Checks the action name and its required data. Nothing touches the database
/// until this has passed.
pub fn validate_bulk_action(request: &BulkAction) -> Result<ValidatedBulkAction, TaskError> {
    let data = &request.data;
    let action = match request.action.as_str() {
        "assign" => ValidatedBulkAction::Assign(
            data.assignee_id
                .ok_or_else(|| missing("assignee_id", "assign"))?,
        ),
        "approve" => ValidatedBulkAction::Approve,
        "reject" => {
            let notes = data
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| missing("notes", "reject"))?;
            ValidatedBulkAction::Reject(notes.to_string())
        }
        "change_status" => ValidatedBulkAction::ChangeStatus(
            data.status
                .ok_or_else(|| missing("status", "change_status"))?,
        ),
        "change_priority" => ValidatedBulkAction::ChangePriority(
            data.priority
                .ok_or_else(|| missing("priority", "change_priority"))?,
        ),
        "delete" => ValidatedBulkAction::Delete,
        other => return Err(TaskError::InvalidAction(other.to_string())),
    };

    if request.task_ids.is_empty() {
        return Err(TaskError::validation("No tasks were selected."));
    }
    Ok(action)
}

/// Applies one action to many tasks with a single statement. Clients are
/// expected to refetch afterwards.
pub async fn bulk_action(
    state: &AppState,
    user: &User,
    request: BulkAction,
) -> Result<BulkOutcome, TaskError> {
    let action = validate_bulk_action(&request)?;
    let ids = &request.task_ids;
    let now = Utc::now();

    let (affected, kind) = match &action {
        ValidatedBulkAction::Assign(assignee_id) => {
            if database::find_user(&state.pool, *assignee_id).await?.is_none() {
                return Err(TaskError::validation(format!(
                    "User {} does not exist.",
                    assignee_id
                )));
            }
            let affected = database::bulk_assign(&state.pool, ids, *assignee_id, user.id, now)
                .await
                .map_err(|e| {
                    if database::is_unique_violation(&e) {
                        TaskError::validation(format!(
                            "User {} already has one of these daily tasks for that day.",
                            assignee_id
                        ))
                    } else {
                        TaskError::from(e)
                    }
                })?;
            (affected, ChangeKind::Update)
        }
        ValidatedBulkAction::Approve => {
            let review = ReviewRecord {
                reviewer_id: user.id,
                decision: ReviewDecision::Approved,
                notes: None,
            };
            let affected = database::bulk_set_status(
                &state.pool,
                ids,
                TaskStatus::Approved,
                true,
                Some(review),
                now,
            )
            .await?;
            (affected, ChangeKind::Update)
        }
        ValidatedBulkAction::Reject(notes) => {
            let review = ReviewRecord {
                reviewer_id: user.id,
                decision: ReviewDecision::Rejected,
                notes: Some(notes.as_str()),
            };
            let affected = database::bulk_set_status(
                &state.pool,
                ids,
                TaskStatus::Rejected,
                false,
                Some(review),
                now,
            )
            .await?;
            (affected, ChangeKind::Update)
        }
        ValidatedBulkAction::ChangeStatus(status) => {
            let affected =
                database::bulk_set_status(&state.pool, ids, *status, false, None, now).await?;
            (affected, ChangeKind::Update)
        }
        ValidatedBulkAction::ChangePriority(priority) => {
            let affected = database::bulk_set_priority(&state.pool, ids, *priority, now).await?;
            (affected, ChangeKind::Update)
        }
        ValidatedBulkAction::Delete => {
            let files: Vec<String> = database::submissions_for_tasks(&state.pool, ids)
                .await?
                .into_iter()
                .filter_map(|s| s.file_path)
                .collect();
            let affected = database::bulk_delete(&state.pool, ids).await?;
            for path in files {
                if let Err(e) = state.storage.remove(&path).await {
                    warn!("Could not remove stored file {}: {}", path, e);
                }
            }
            (affected, ChangeKind::Delete)
        }
    };

    info!(
        "Bulk {} by user {} affected {} of {} tasks",
        action.name(),
        user.id,
        affected.len(),
        ids.len()
    );
    state.changes.publish_many(kind, &affected);

    Ok(BulkOutcome {
        action: action.name().to_string(),
        affected,
        refetch: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        seed_daily_task, seed_one_off_task, seed_template, seed_user, test_state,
    };
    use common::TaskType;
    use chrono::NaiveDate;
    use common::BulkActionData;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn request(action: &str, task_ids: Vec<i64>, data: BulkActionData) -> BulkAction {
        BulkAction {
            action: action.to_string(),
            task_ids,
            data,
        }
    }

    #[test]
    fn test_required_fields_are_checked() {
        let reject = request("reject", vec![1, 2], BulkActionData::default());
        assert!(matches!(
            validate_bulk_action(&reject),
            Err(TaskError::Validation(_))
        ));

        let blank = request(
            "reject",
            vec![1],
            BulkActionData {
                notes: Some("  ".to_string()),
                ..Default::default()
            },
        );
        assert!(validate_bulk_action(&blank).is_err());

        let unknown = request("archive", vec![1], BulkActionData::default());
        assert!(matches!(
            validate_bulk_action(&unknown),
            Err(TaskError::InvalidAction(a)) if a == "archive"
        ));

        let empty = request("approve", vec![], BulkActionData::default());
        assert!(validate_bulk_action(&empty).is_err());
    }

    #[tokio::test]
    async fn test_reject_without_notes_writes_nothing() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_one_off_task(&state.pool, user.id).await;

        let err = bulk_action(
            &state,
            &user,
            request("reject", vec![task.id], BulkActionData::default()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TaskError::Validation(_)));
        let stored = database::find_task(&state.pool, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::NotStarted);
        assert_eq!(stored.updated_at, task.updated_at);
    }

    #[tokio::test]
    async fn test_approve_only_touches_daily_tasks() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let daily = seed_daily_task(&state.pool, user.id, day(), None).await;
        let one_off = seed_one_off_task(&state.pool, user.id).await;

        let outcome = bulk_action(
            &state,
            &user,
            request("approve", vec![daily.id, one_off.id], BulkActionData::default()),
        )
        .await
        .unwrap();

        assert_eq!(outcome.affected, vec![daily.id]);
        assert!(outcome.refetch);
        let daily_now = database::find_task(&state.pool, daily.id).await.unwrap().unwrap();
        let one_off_now = database::find_task(&state.pool, one_off.id).await.unwrap().unwrap();
        assert_eq!(daily_now.status, TaskStatus::Approved);
        assert_eq!(one_off_now.status, TaskStatus::NotStarted);

        let reviews = database::list_reviews(&state.pool, daily.id).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].decision, ReviewDecision::Approved);
    }

    #[tokio::test]
    async fn test_reject_records_review_notes() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_one_off_task(&state.pool, user.id).await;

        bulk_action(
            &state,
            &user,
            request(
                "reject",
                vec![task.id],
                BulkActionData {
                    notes: Some("Photo is blurry".to_string()),
                    ..Default::default()
                },
            ),
        )
        .await
        .unwrap();

        let page = fetch_task_views(&state, &TaskFilters::default()).await.unwrap();
        let view = &page.tasks[0];
        assert_eq!(view.task.status, TaskStatus::Rejected);
        assert_eq!(
            view.latest_review.as_ref().unwrap().notes.as_deref(),
            Some("Photo is blurry")
        );
    }

    #[tokio::test]
    async fn test_assign_priority_and_delete() {
        let (state, _dir) = test_state().await;
        let mut feed = state.changes.subscribe();
        let ana = seed_user(&state.pool, "Ana").await;
        let ben = seed_user(&state.pool, "Ben").await;
        let a = seed_one_off_task(&state.pool, ana.id).await;
        let b = seed_one_off_task(&state.pool, ana.id).await;

        bulk_action(
            &state,
            &ana,
            request(
                "assign",
                vec![a.id, b.id],
                BulkActionData {
                    assignee_id: Some(ben.id),
                    ..Default::default()
                },
            ),
        )
        .await
        .unwrap();
        let announced = feed.recv().await.unwrap().task_id;
        assert!(announced == a.id || announced == b.id);

        bulk_action(
            &state,
            &ana,
            request(
                "change_priority",
                vec![a.id],
                BulkActionData {
                    priority: Some(Priority::Urgent),
                    ..Default::default()
                },
            ),
        )
        .await
        .unwrap();

        let moved = database::find_task(&state.pool, a.id).await.unwrap().unwrap();
        assert_eq!(moved.assigned_to, ben.id);
        assert_eq!(moved.assigned_by, Some(ana.id));
        assert_eq!(moved.priority, Priority::Urgent);

        let outcome = bulk_action(
            &state,
            &ana,
            request("delete", vec![a.id, b.id], BulkActionData::default()),
        )
        .await
        .unwrap();
        assert_eq!(outcome.affected.len(), 2);
        assert!(database::find_task(&state.pool, a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_needs_review_filter() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let statuses = [
            TaskStatus::NotStarted,
            TaskStatus::InProgress,
            TaskStatus::SubmittedForReview,
        ];
        let mut review_id = 0;
        for status in statuses {
            let task = seed_one_off_task(&state.pool, user.id).await;
            database::bulk_set_status(&state.pool, &[task.id], status, false, None, Utc::now())
                .await
                .unwrap();
            if status == TaskStatus::SubmittedForReview {
                review_id = task.id;
            }
        }

        let filters = TaskFilters {
            needs_review: Some(true),
            ..Default::default()
        };
        let page = fetch_task_views(&state, &filters).await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.tasks[0].task.id, review_id);
        assert_eq!(page.tasks[0].assignee_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_search_tags_and_date_range() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let early = seed_daily_task(&state.pool, user.id, day(), None).await;
        let late = seed_daily_task(&state.pool, user.id, day().succ_opt().unwrap(), None).await;
        sqlx::query("UPDATE tasks SET tags = '[\"cold-chain\",\"store-4\"]', title = 'Check freezer' WHERE id = ?")
            .bind(late.id)
            .execute(&state.pool)
            .await
            .unwrap();

        let by_tag = TaskFilters {
            tags: Some("store-9, store-4".to_string()),
            ..Default::default()
        };
        let page = fetch_task_views(&state, &by_tag).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tasks[0].task.id, late.id);

        let by_search = TaskFilters {
            search: Some("FREEZER".to_string()),
            ..Default::default()
        };
        assert_eq!(fetch_task_views(&state, &by_search).await.unwrap().total, 1);

        let by_range = TaskFilters {
            due_from: Some(day()),
            due_to: Some(day()),
            ..Default::default()
        };
        let page = fetch_task_views(&state, &by_range).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tasks[0].task.id, early.id);
    }

    #[tokio::test]
    async fn test_sort_and_paging() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let undated = seed_one_off_task(&state.pool, user.id).await;
        let second = seed_daily_task(&state.pool, user.id, day().succ_opt().unwrap(), None).await;
        let first = seed_daily_task(&state.pool, user.id, day(), None).await;

        let page = fetch_task_views(&state, &TaskFilters::default()).await.unwrap();
        let ids: Vec<i64> = page.tasks.iter().map(|v| v.task.id).collect();
        assert_eq!(ids, vec![first.id, second.id, undated.id]);

        let desc = TaskFilters {
            sort_dir: SortDirection::Desc,
            per_page: Some(2),
            page: Some(1),
            ..Default::default()
        };
        let page = fetch_task_views(&state, &desc).await.unwrap();
        let ids: Vec<i64> = page.tasks.iter().map(|v| v.task.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_empty() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        seed_one_off_task(&state.pool, user.id).await;

        let filters = TaskFilters {
            page: Some(usize::MAX),
            per_page: Some(MAX_PER_PAGE),
            ..Default::default()
        };
        let page = fetch_task_views(&state, &filters).await.unwrap();

        assert!(page.tasks.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(page.page, usize::MAX);
    }

    #[tokio::test]
    async fn test_assign_onto_existing_daily_instance_is_rejected() {
        let (state, _dir) = test_state().await;
        let ana = seed_user(&state.pool, "Ana").await;
        let ben = seed_user(&state.pool, "Ben").await;
        seed_template(&state.pool, ana.id, TaskType::Daily).await;

        let first = database::create_daily_task_instances_for_user(&state.pool, ana.id, day())
            .await
            .unwrap();
        bulk_action(
            &state,
            &ana,
            request(
                "assign",
                first.clone(),
                BulkActionData {
                    assignee_id: Some(ben.id),
                    ..Default::default()
                },
            ),
        )
        .await
        .unwrap();

        // Ana gets a fresh instance of the same template for the same day.
        let second = database::create_daily_task_instances_for_user(&state.pool, ana.id, day())
            .await
            .unwrap();
        assert_eq!(second.len(), 1);

        let err = bulk_action(
            &state,
            &ana,
            request(
                "assign",
                second.clone(),
                BulkActionData {
                    assignee_id: Some(ben.id),
                    ..Default::default()
                },
            ),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TaskError::Validation(_)));
        let kept = database::find_task(&state.pool, second[0]).await.unwrap().unwrap();
        assert_eq!(kept.assigned_to, ana.id);
    }
}
