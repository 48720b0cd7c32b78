// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
//! Evidence submission and the status decisions that follow it.
use crate::database::{self, NewSubmission};
use crate::errors::TaskError;
use crate::state::AppState;
use crate::storage::{AbortSignal, FileUpload, validate_upload};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::{
    ChangeKind, ChecklistItem, EffectiveSettings, EvidenceType, SettingsSource, SubmissionType,
    Task, TaskStatus, TaskSubmission, TaskTemplate, TaskType, User,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

pub const DEFAULT_AUTO_APPROVE_DAILY: bool = true;
pub const DEFAULT_CUTOFF_HOURS: f64 = 2.0;

/// Everything a caller may hand in with a submission.
#[derive(Debug, Clone)]
pub struct SubmissionData {
    pub submission_type: SubmissionType,
    pub evidence_type: Option<EvidenceType>,
    pub file: Option<FileUpload>,
    pub link_url: Option<String>,
    pub notes: Option<String>,
    pub checklist_data: Option<Vec<ChecklistItem>>,
}

impl SubmissionData {
    pub fn completion() -> Self {
        Self {
            submission_type: SubmissionType::Completion,
            evidence_type: None,
            file: None,
            link_url: None,
            notes: None,
            checklist_data: None,
        }
    }

    pub fn note(notes: &str) -> Self {
        Self {
            submission_type: SubmissionType::Note,
            notes: Some(notes.to_string()),
            ..Self::completion()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub submission: TaskSubmission,
    /// Status of the task after the submission.
    pub status: TaskStatus,
    /// Set when the submission was stored but the status could not be updated.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentResult {
    pub file_name: String,
    pub submission: Option<TaskSubmission>,
    pub error: Option<String>,
}

/// Auto-approval rule applied to one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoApprovalPolicy {
    pub enabled: bool,
    pub cutoff_hours: f64,
}

impl From<EffectiveSettings> for AutoApprovalPolicy {
    fn from(settings: EffectiveSettings) -> Self {
        Self {
            enabled: settings.auto_approve_daily,
            cutoff_hours: settings.auto_approve_cutoff_hours,
        }
    }
}

impl AutoApprovalPolicy {
    /// A template can switch auto-approval off or shorten the cutoff.
    pub fn narrowed_by(self, template: Option<&TaskTemplate>) -> Self {
        let Some(template) = template else {
            return self;
        };
        Self {
            enabled: self.enabled && template.auto_approve_enabled,
            cutoff_hours: match template.auto_approve_cutoff_hours {
                Some(hours) => self.cutoff_hours.min(hours),
                None => self.cutoff_hours,
            },
        }
    }
}

/// Reads the user override, then the global row, then falls back to defaults.
pub async fn resolve_settings(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<EffectiveSettings, TaskError> {
    if let Some(row) = database::find_settings(pool, &database::user_scope(user_id)).await? {
        return Ok(EffectiveSettings {
            auto_approve_daily: row.auto_approve_daily,
            auto_approve_cutoff_hours: row.auto_approve_cutoff_hours,
            source: SettingsSource::User,
        });
    }
    if let Some(row) = database::find_settings(pool, database::GLOBAL_SCOPE).await? {
        return Ok(EffectiveSettings {
            auto_approve_daily: row.auto_approve_daily,
            auto_approve_cutoff_hours: row.auto_approve_cutoff_hours,
            source: SettingsSource::Global,
        });
    }
    Ok(EffectiveSettings {
        auto_approve_daily: DEFAULT_AUTO_APPROVE_DAILY,
        auto_approve_cutoff_hours: DEFAULT_CUTOFF_HOURS,
        source: SettingsSource::Default,
    })
}

/// Hours between the due moment and `now`; negative when early. A missing due
/// time means 23:59, a missing due date means on time.
pub fn hours_late(
    due_date: Option<NaiveDate>,
    due_time: Option<NaiveTime>,
    now: DateTime<Utc>,
) -> f64 {
    let Some(due_date) = due_date else {
        return 0.0;
    };
    let due_time = due_time.unwrap_or_else(end_of_day);
    let due = due_date.and_time(due_time);
    (now.naive_utc() - due).num_seconds() as f64 / 3600.0
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

/// Status a completion submission moves the task to.
pub fn decide_status(task: &Task, policy: &AutoApprovalPolicy, now: DateTime<Utc>) -> TaskStatus {
    if task.task_type != TaskType::Daily {
        return TaskStatus::SubmittedForReview;
    }
    let late = hours_late(task.due_date, task.due_time, now);
    if policy.enabled && late <= policy.cutoff_hours {
        TaskStatus::DoneAutoApproved
    } else {
        TaskStatus::SubmittedForReview
    }
}

fn validate_submission(data: &SubmissionData) -> Result<Option<EvidenceType>, TaskError> {
    let evidence_type = match (&data.file, data.evidence_type) {
        (Some(_), None) => Some(EvidenceType::File),
        (_, declared) => declared,
    };

    match evidence_type {
        Some(kind @ (EvidenceType::Photo | EvidenceType::File)) => {
            let file = data.file.as_ref().ok_or_else(|| {
                TaskError::validation(format!("{:?} evidence requires a file.", kind))
            })?;
            validate_upload(kind, file)?;
        }
        Some(EvidenceType::Link) => {
            let link = data.link_url.as_deref().map(str::trim).unwrap_or_default();
            if !(link.starts_with("http://") || link.starts_with("https://")) {
                return Err(TaskError::validation(
                    "Link evidence requires an http(s) URL.",
                ));
            }
        }
        Some(EvidenceType::Checklist) => {
            if data.checklist_data.as_ref().is_none_or(|items| items.is_empty()) {
                return Err(TaskError::validation(
                    "Checklist evidence requires at least one item.",
                ));
            }
        }
        None => {}
    }
    if data.file.is_some() && !matches!(evidence_type, Some(EvidenceType::Photo | EvidenceType::File))
    {
        return Err(TaskError::validation(
            "Files can only be attached as photo or file evidence.",
        ));
    }

    let has_notes = data.notes.as_deref().is_some_and(|n| !n.trim().is_empty());
    if data.submission_type == SubmissionType::Note && evidence_type.is_none() && !has_notes {
        return Err(TaskError::validation("A note submission cannot be empty."));
    }
    Ok(evidence_type)
}

/// Records evidence against a task and, for completions, moves the task to
/// its next status.
///
/// Nothing is written when validation or the upload fails. A failed status
/// update does not undo the stored submission; it comes back as a warning.
pub async fn submit_task_evidence(
    state: &AppState,
    user: &User,
    task_id: i64,
    data: SubmissionData,
    signal: &AbortSignal,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome, TaskError> {
    let evidence_type = validate_submission(&data)?;

    let task = database::find_task(&state.pool, task_id)
        .await?
        .ok_or_else(|| TaskError::NotFound(format!("Task {} not found.", task_id)))?;

    let stored = match &data.file {
        Some(file) => Some(state.storage.put(task_id, file, signal).await?),
        None => None,
    };

    let new = NewSubmission {
        task_id,
        submission_type: data.submission_type,
        evidence_type,
        file_url: stored.as_ref().map(|s| s.url.clone()),
        file_path: stored.as_ref().map(|s| s.path.clone()),
        file_name: stored.as_ref().map(|s| s.name.clone()),
        file_size: stored.as_ref().map(|s| s.size),
        link_url: data.link_url.map(|l| l.trim().to_string()),
        notes: data.notes.filter(|n| !n.trim().is_empty()),
        checklist_data: data.checklist_data,
        submitted_by: user.id,
        submitted_at: now,
    };

    let submission = match database::insert_submission(&state.pool, new).await {
        Ok(submission) => submission,
        Err(e) => {
            if let Some(stored) = &stored {
                if let Err(remove_err) = state.storage.remove(&stored.path).await {
                    warn!(
                        "Could not remove {} after failed insert: {}",
                        stored.path, remove_err
                    );
                }
            }
            return Err(e.into());
        }
    };

    info!(
        "Submission {} ({:?}) recorded for task {} by user {}",
        submission.id, submission.submission_type, task_id, user.id
    );

    if submission.submission_type == SubmissionType::Note {
        return Ok(SubmissionOutcome {
            submission,
            status: task.status,
            warning: None,
        });
    }

    let next = next_status(&state.pool, &task, now).await?;
    if next == task.status {
        return Ok(SubmissionOutcome {
            submission,
            status: task.status,
            warning: None,
        });
    }

    let late = task.due_date.is_some() && hours_late(task.due_date, task.due_time, now) > 0.0;
    match database::update_task_status(&state.pool, task_id, next, late, now).await {
        Ok(true) => {
            state.changes.publish(ChangeKind::Update, task_id);
            Ok(SubmissionOutcome {
                submission,
                status: next,
                warning: None,
            })
        }
        Ok(false) => {
            warn!("Task {} disappeared before its status could be set.", task_id);
            Ok(SubmissionOutcome {
                submission,
                status: task.status,
                warning: Some("Submission saved, but the task no longer exists.".to_string()),
            })
        }
        Err(e) => {
            warn!("Status update for task {} failed: {:?}", task_id, e);
            Ok(SubmissionOutcome {
                submission,
                status: task.status,
                warning: Some(
                    "Submission saved, but the task status could not be updated.".to_string(),
                ),
            })
        }
    }
}

async fn next_status(
    pool: &SqlitePool,
    task: &Task,
    now: DateTime<Utc>,
) -> Result<TaskStatus, TaskError> {
    if task.task_type != TaskType::Daily {
        return Ok(TaskStatus::SubmittedForReview);
    }
    let settings = resolve_settings(pool, task.assigned_to).await?;
    let template = match task.template_id {
        Some(id) => database::find_template(pool, id).await?,
        None => None,
    };
    let policy = AutoApprovalPolicy::from(settings).narrowed_by(template.as_ref());
    debug!("Auto-approval policy for task {}: {:?}", task.id, policy);
    Ok(decide_status(task, &policy, now))
}

/// Moves a task to `in_progress`. Only the assignee may start it.
pub async fn start_task(state: &AppState, task_id: i64, user_id: i64) -> Result<Task, TaskError> {
    let now = Utc::now();
    if !database::start_task_for_assignee(&state.pool, task_id, user_id, now).await? {
        return Err(match database::find_task(&state.pool, task_id).await? {
            Some(_) => TaskError::Forbidden(format!(
                "Task {} is not assigned to user {}.",
                task_id, user_id
            )),
            None => TaskError::NotFound(format!("Task {} not found.", task_id)),
        });
    }

    state.changes.publish(ChangeKind::Update, task_id);
    database::find_task(&state.pool, task_id)
        .await?
        .ok_or_else(|| TaskError::NotFound(format!("Task {} not found.", task_id)))
}

/// Adds a note to a task. Blank notes are ignored.
pub async fn add_task_note(
    state: &AppState,
    user: &User,
    task_id: i64,
    notes: &str,
) -> Result<Option<TaskSubmission>, TaskError> {
    if notes.trim().is_empty() {
        return Ok(None);
    }
    let outcome = submit_task_evidence(
        state,
        user,
        task_id,
        SubmissionData::note(notes),
        &AbortSignal::never(),
        Utc::now(),
    )
    .await?;
    Ok(Some(outcome.submission))
}

/// Removes a submission and, best-effort, its stored file.
pub async fn delete_task_submission(
    state: &AppState,
    submission_id: i64,
    file_path: Option<&str>,
) -> Result<(), TaskError> {
    if let Some(path) = file_path {
        if let Err(e) = state.storage.remove(path).await {
            warn!(
                "Could not remove stored file {} of submission {}: {}",
                path, submission_id, e
            );
        }
    }

    if !database::delete_submission(&state.pool, submission_id).await? {
        return Err(TaskError::NotFound(format!(
            "Submission {} not found or already deleted.",
            submission_id
        )));
    }
    Ok(())
}

/// Stores several files on a task as note submissions, three uploads at a
/// time. Invalid files reject the whole request before anything is uploaded;
/// a failed upload only affects its own entry.
pub async fn attach_files(
    state: &AppState,
    user: &User,
    task_id: i64,
    files: Vec<FileUpload>,
    signal: &AbortSignal,
) -> Result<Vec<AttachmentResult>, TaskError> {
    if files.is_empty() {
        return Err(TaskError::validation("No files were attached."));
    }
    for file in &files {
        validate_upload(EvidenceType::File, file)?;
    }
    if database::find_task(&state.pool, task_id).await?.is_none() {
        return Err(TaskError::NotFound(format!("Task {} not found.", task_id)));
    }

    let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
    let uploads = state.storage.put_many(task_id, files, signal).await;

    let mut results = Vec::with_capacity(names.len());
    for (file_name, upload) in names.into_iter().zip(uploads) {
        let result = match upload {
            Ok(stored) => {
                let new = NewSubmission {
                    task_id,
                    submission_type: SubmissionType::Note,
                    evidence_type: Some(EvidenceType::File),
                    file_url: Some(stored.url),
                    file_path: Some(stored.path.clone()),
                    file_name: Some(stored.name),
                    file_size: Some(stored.size),
                    link_url: None,
                    notes: None,
                    checklist_data: None,
                    submitted_by: user.id,
                    submitted_at: Utc::now(),
                };
                match database::insert_submission(&state.pool, new).await {
                    Ok(submission) => AttachmentResult {
                        file_name,
                        submission: Some(submission),
                        error: None,
                    },
                    Err(e) => {
                        warn!("Attachment row for {} failed: {:?}", stored.path, e);
                        if let Err(remove_err) = state.storage.remove(&stored.path).await {
                            warn!("Could not remove {}: {}", stored.path, remove_err);
                        }
                        AttachmentResult {
                            file_name,
                            submission: None,
                            error: Some("The attachment could not be recorded.".to_string()),
                        }
                    }
                }
            }
            Err(e) => AttachmentResult {
                file_name,
                submission: None,
                error: Some(e.to_string()),
            },
        };
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UploadError;
    use crate::test_support::{seed_daily_task, seed_one_off_task, seed_user, test_state};
    use crate::storage::BlobStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn due_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    fn enabled() -> AutoApprovalPolicy {
        AutoApprovalPolicy {
            enabled: true,
            cutoff_hours: 2.0,
        }
    }

    fn photo() -> FileUpload {
        FileUpload {
            name: "shelf.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![1, 2, 3, 4],
        }
    }

    async fn submission_count(pool: &SqlitePool, task_id: i64) -> usize {
        database::list_submissions(pool, task_id).await.unwrap().len()
    }

    #[test]
    fn test_hours_late_defaults_to_end_of_day() {
        assert_eq!(hours_late(Some(due_day()), None, at(23, 59)), 0.0);
        assert!(hours_late(Some(due_day()), None, at(12, 0)) < 0.0);
        assert_eq!(hours_late(None, None, at(12, 0)), 0.0);
    }

    #[tokio::test]
    async fn test_auto_approval_boundary() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_daily_task(&state.pool, user.id, due_day(), Some((18, 0))).await;

        assert_eq!(decide_status(&task, &enabled(), at(19, 59)), TaskStatus::DoneAutoApproved);
        assert_eq!(decide_status(&task, &enabled(), at(20, 1)), TaskStatus::SubmittedForReview);
        assert_eq!(decide_status(&task, &enabled(), at(17, 0)), TaskStatus::DoneAutoApproved);
    }

    #[tokio::test]
    async fn test_user_override_disables_auto_approval() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        database::upsert_settings(&state.pool, database::GLOBAL_SCOPE, true, 2.0)
            .await
            .unwrap();
        database::upsert_settings(&state.pool, &database::user_scope(user.id), false, 2.0)
            .await
            .unwrap();

        let settings = resolve_settings(&state.pool, user.id).await.unwrap();
        assert_eq!(settings.source, SettingsSource::User);

        for (h, m) in [(17, 0), (19, 59), (20, 1)] {
            let task = seed_daily_task(&state.pool, user.id, due_day(), Some((18, 0))).await;
            let outcome = submit_task_evidence(
                &state,
                &user,
                task.id,
                SubmissionData::completion(),
                &AbortSignal::never(),
                at(h, m),
            )
            .await
            .unwrap();
            assert_eq!(outcome.status, TaskStatus::SubmittedForReview);
        }
    }

    #[tokio::test]
    async fn test_settings_fall_back_to_global_then_defaults() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;

        let defaults = resolve_settings(&state.pool, user.id).await.unwrap();
        assert_eq!(defaults.source, SettingsSource::Default);
        assert!(defaults.auto_approve_daily);
        assert_eq!(defaults.auto_approve_cutoff_hours, 2.0);

        database::upsert_settings(&state.pool, database::GLOBAL_SCOPE, true, 5.0)
            .await
            .unwrap();
        let global = resolve_settings(&state.pool, user.id).await.unwrap();
        assert_eq!(global.source, SettingsSource::Global);
        assert_eq!(global.auto_approve_cutoff_hours, 5.0);
    }

    #[tokio::test]
    async fn test_completion_on_daily_task_auto_approves_and_publishes() {
        let (state, _dir) = test_state().await;
        let mut feed = state.changes.subscribe();
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_daily_task(&state.pool, user.id, due_day(), Some((18, 0))).await;

        let mut data = SubmissionData::completion();
        data.evidence_type = Some(EvidenceType::Photo);
        data.file = Some(photo());
        let outcome = submit_task_evidence(
            &state,
            &user,
            task.id,
            data,
            &AbortSignal::never(),
            at(19, 0),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, TaskStatus::DoneAutoApproved);
        assert!(outcome.submission.file_path.is_some());
        let stored = database::find_task(&state.pool, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::DoneAutoApproved);
        assert!(stored.is_late);
        assert_eq!(feed.recv().await.unwrap().task_id, task.id);
    }

    #[tokio::test]
    async fn test_one_off_tasks_always_need_review() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_one_off_task(&state.pool, user.id).await;

        let outcome = submit_task_evidence(
            &state,
            &user,
            task.id,
            SubmissionData::completion(),
            &AbortSignal::never(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, TaskStatus::SubmittedForReview);
        assert_eq!(decide_status(&task, &enabled(), Utc::now()), TaskStatus::SubmittedForReview);
    }

    #[tokio::test]
    async fn test_failed_status_update_keeps_submission_with_warning() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_one_off_task(&state.pool, user.id).await;
        sqlx::query(
            r#"
            CREATE TRIGGER freeze_task_status BEFORE UPDATE OF status ON tasks
            BEGIN
                SELECT RAISE(ABORT, 'task status is frozen');
            END
            "#,
        )
        .execute(&state.pool)
        .await
        .unwrap();

        let outcome = submit_task_evidence(
            &state,
            &user,
            task.id,
            SubmissionData::completion(),
            &AbortSignal::never(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, TaskStatus::NotStarted);
        assert!(outcome.warning.is_some());
        assert_eq!(submission_count(&state.pool, task.id).await, 1);
        let stored = database::find_task(&state.pool, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_note_submission_keeps_status() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_daily_task(&state.pool, user.id, due_day(), None).await;
        start_task(&state, task.id, user.id).await.unwrap();

        let note = add_task_note(&state, &user, task.id, "Shelf 4 restocked")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(note.submission_type, SubmissionType::Note);

        let stored = database::find_task(&state.pool, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::InProgress);

        assert!(add_task_note(&state, &user, task.id, "   ").await.unwrap().is_none());
        assert_eq!(submission_count(&state.pool, task.id).await, 1);
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_submission() {
        let (mut state, _dir) = test_state().await;
        let not_a_dir = tempfile::NamedTempFile::new().unwrap();
        state.storage = Arc::new(BlobStore::new(not_a_dir.path()));
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_daily_task(&state.pool, user.id, due_day(), None).await;

        let mut data = SubmissionData::completion();
        data.evidence_type = Some(EvidenceType::Photo);
        data.file = Some(photo());
        let err = submit_task_evidence(
            &state,
            &user,
            task.id,
            data,
            &AbortSignal::never(),
            at(9, 0),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TaskError::Upload(UploadError::Bucket(_))));
        assert!(err.to_string().contains("upload"));
        assert_eq!(submission_count(&state.pool, task.id).await, 0);
        let stored = database::find_task(&state.pool, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected_before_storage() {
        let (state, dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_daily_task(&state.pool, user.id, due_day(), None).await;

        let mut data = SubmissionData::completion();
        data.evidence_type = Some(EvidenceType::Photo);
        data.file = Some(FileUpload {
            name: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: vec![1],
        });
        let err = submit_task_evidence(&state, &user, task.id, data, &AbortSignal::never(), at(9, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Validation(_)));
        assert!(!dir.path().join(task.id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_cancelled_upload_leaves_no_submission() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_daily_task(&state.pool, user.id, due_day(), None).await;
        let controller = crate::storage::AbortController::new();
        controller.abort();

        let mut data = SubmissionData::completion();
        data.file = Some(photo());
        let err = submit_task_evidence(&state, &user, task.id, data, &controller.signal(), at(9, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Upload(UploadError::Cancelled)));
        assert_eq!(submission_count(&state.pool, task.id).await, 0);
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_file() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_daily_task(&state.pool, user.id, due_day(), None).await;
        let note = add_task_note(&state, &user, task.id, "see photo").await.unwrap().unwrap();

        delete_task_submission(&state, note.id, Some("999/never_stored.jpg"))
            .await
            .unwrap();
        assert_eq!(submission_count(&state.pool, task.id).await, 0);

        let again = delete_task_submission(&state, note.id, None).await.unwrap_err();
        assert!(matches!(again, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_only_assignee_can_start() {
        let (state, _dir) = test_state().await;
        let owner = seed_user(&state.pool, "Ana").await;
        let other = seed_user(&state.pool, "Ben").await;
        let task = seed_one_off_task(&state.pool, owner.id).await;

        let err = start_task(&state, task.id, other.id).await.unwrap_err();
        assert!(matches!(err, TaskError::Forbidden(_)));

        let started = start_task(&state, task.id, owner.id).await.unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert!(started.started_at.is_some());

        assert!(matches!(
            start_task(&state, 9_999, owner.id).await.unwrap_err(),
            TaskError::NotFound(_)
        ));
    }

    #[test]
    fn test_link_and_checklist_rules() {
        let mut link = SubmissionData::completion();
        link.evidence_type = Some(EvidenceType::Link);
        link.link_url = Some("ftp://files".to_string());
        assert!(validate_submission(&link).is_err());
        link.link_url = Some("https://drive.example.com/x".to_string());
        assert!(validate_submission(&link).is_ok());

        let mut checklist = SubmissionData::completion();
        checklist.evidence_type = Some(EvidenceType::Checklist);
        checklist.checklist_data = Some(vec![]);
        assert!(validate_submission(&checklist).is_err());

        let empty_note = SubmissionData {
            notes: None,
            ..SubmissionData::note("")
        };
        assert!(validate_submission(&empty_note).is_err());
    }

    #[tokio::test]
    async fn test_attach_files_records_each_upload() {
        let (state, _dir) = test_state().await;
        let user = seed_user(&state.pool, "Ana").await;
        let task = seed_one_off_task(&state.pool, user.id).await;
        let files: Vec<FileUpload> = (0..4)
            .map(|i| FileUpload {
                name: format!("invoice-{}.pdf", i),
                content_type: "application/pdf".to_string(),
                bytes: vec![i as u8; 16],
            })
            .collect();

        let results = attach_files(&state, &user, task.id, files, &AbortSignal::never())
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.submission.is_some()));
        assert_eq!(submission_count(&state.pool, task.id).await, 4);
        let stored = database::find_task(&state.pool, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::NotStarted);
    }

    #[test]
    fn test_template_narrows_policy() {
        let base = enabled();
        assert_eq!(base.narrowed_by(None), base);

        let mut template = TaskTemplate {
            id: 1,
            title: "Open store".to_string(),
            description: None,
            assigned_to: 1,
            task_type: TaskType::Daily,
            is_active: true,
            reviewer_id: None,
            priority: common::Priority::Medium,
            due_time: None,
            auto_approve_enabled: true,
            auto_approve_cutoff_hours: Some(0.5),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(base.narrowed_by(Some(&template)).cutoff_hours, 0.5);

        template.auto_approve_cutoff_hours = Some(8.0);
        assert_eq!(base.narrowed_by(Some(&template)).cutoff_hours, 2.0);

        template.auto_approve_enabled = false;
        assert!(!base.narrowed_by(Some(&template)).enabled);
    }
}
