// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::auth::CurrentUser;
use crate::daily::{self, EnsureOutcome};
use crate::database;
use crate::errors::{AppError, TaskError};
use crate::queries;
use crate::state::AppState;
use crate::storage::{AbortSignal, FileUpload};
use crate::submissions::{self, AttachmentResult, SubmissionData, SubmissionOutcome};
use axum::{
    extract::{Json, Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::Utc;
use common::{
    AttendanceRecord, BulkAction, BulkOutcome, ChangeKind, ChecklistItem, CreateTaskPayload,
    CreateTemplatePayload, CreateUserPayload, DailyTaskStatus, EffectiveSettings, NotePayload,
    SettingsPayload, Task, TaskFilters, TaskPage, TaskReview, TaskSettings, TaskSubmission,
    TaskTemplate, User,
};
use futures_util::{Stream, stream};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Handler for the profile load. Also schedules the daily task check.
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> Json<User> {
    daily::spawn_daily_task_check(state, user.id());
    Json(user.0)
}

/// Handler for registering a console user.
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<(StatusCode, Json<User>), AppError> {
    if payload.full_name.trim().is_empty() {
        error!("Validation failed: user name is empty.");
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Full name cannot be empty.",
        ));
    }
    let role = payload.role.as_deref().unwrap_or("staff");
    let user = database::insert_user(&state.pool, payload.full_name.trim(), role).await?;
    info!("User created successfully with ID: {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Handler for the attendance check-in. Also schedules the daily task check.
pub async fn check_in(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<(StatusCode, Json<AttendanceRecord>), AppError> {
    let now = Utc::now();
    let record = database::record_check_in(&state.pool, user.id(), now.date_naive(), now).await?;
    daily::spawn_daily_task_check(state, user.id());
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn daily_status(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<DailyTaskStatus>, AppError> {
    let status =
        daily::check_daily_tasks_status(&state.pool, user.id(), Utc::now().date_naive()).await?;
    Ok(Json(status))
}

/// Runs the daily check in the foreground and reports its outcome.
pub async fn ensure_daily(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<EnsureOutcome>, AppError> {
    let outcome =
        daily::ensure_with_notifications(&state, user.id(), Utc::now().date_naive()).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize, Debug)]
pub struct TemplateQuery {
    pub assigned_to: Option<i64>,
}

pub async fn list_templates(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<Vec<TaskTemplate>>, AppError> {
    let templates = database::list_templates(&state.pool, query.assigned_to).await?;
    Ok(Json(templates))
}

pub async fn create_template(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(payload): Json<CreateTemplatePayload>,
) -> Result<(StatusCode, Json<TaskTemplate>), AppError> {
    if payload.title.trim().is_empty() {
        return Err(TaskError::validation("Template title cannot be empty.").into());
    }
    if payload
        .auto_approve_cutoff_hours
        .is_some_and(|h| !h.is_finite() || h < 0.0)
    {
        return Err(TaskError::validation("Cutoff hours must be zero or more.").into());
    }
    if database::find_user(&state.pool, payload.assigned_to)
        .await?
        .is_none()
    {
        return Err(TaskError::validation(format!(
            "User {} does not exist.",
            payload.assigned_to
        ))
        .into());
    }

    let template = database::insert_template(&state.pool, payload).await?;
    info!("Template created successfully with ID: {}", template.id);
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn deactivate_template(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(template_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if database::deactivate_template(&state.pool, template_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TaskError::NotFound(format!("Active template {} not found.", template_id)).into())
    }
}

/// Handler for listing tasks with filters, sorting and paging.
pub async fn list_tasks(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(filters): Query<TaskFilters>,
) -> Result<Json<TaskPage>, AppError> {
    let page = queries::fetch_task_views(&state, &filters).await?;
    info!("Successfully retrieved {} of {} tasks.", page.tasks.len(), page.total);
    Ok(Json(page))
}

/// Handler for creating a one-off task.
pub async fn create_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    debug!("Received request to create task: {}", payload.title);
    if payload.title.trim().is_empty() {
        error!("Validation failed: task title is empty.");
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Task title cannot be empty.",
        ));
    }
    if database::find_user(&state.pool, payload.assigned_to)
        .await?
        .is_none()
    {
        return Err(TaskError::validation(format!(
            "User {} does not exist.",
            payload.assigned_to
        ))
        .into());
    }

    let task = database::insert_task(&state.pool, payload, user.id()).await?;
    state.changes.publish(ChangeKind::Insert, task.id);

    info!("Task created successfully with ID: {}", task.id);
    Ok((StatusCode::CREATED, Json(task)))
}

/// Server-sent events for every change to the tasks table.
pub async fn task_changes(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.changes.subscribe();
    let events = stream::unfold(rx, |mut rx| async move {
        let event = match rx.recv().await {
            Ok(change) => Event::default()
                .event(change.kind.as_str())
                .json_data(&change)
                .unwrap_or_else(|_| Event::default().event("resync")),
            Err(RecvError::Lagged(missed)) => {
                warn!("Change feed subscriber lagged by {} events.", missed);
                Event::default().event("resync").data(missed.to_string())
            }
            Err(RecvError::Closed) => return None,
        };
        Some((Ok(event), rx))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn bulk_action(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<BulkAction>,
) -> Result<Json<BulkOutcome>, AppError> {
    let outcome = queries::bulk_action(&state, &user.0, request).await?;
    Ok(Json(outcome))
}

pub async fn start_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let task = submissions::start_task(&state, task_id, user.id()).await?;
    info!("Task {} started by user {}.", task_id, user.id());
    Ok(Json(task))
}

pub async fn add_note(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<i64>,
    Json(payload): Json<NotePayload>,
) -> Result<Response, AppError> {
    match submissions::add_task_note(&state, &user.0, task_id, &payload.notes).await? {
        Some(note) => Ok((StatusCode::CREATED, Json(note)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn list_submissions(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<TaskSubmission>>, AppError> {
    let submissions = database::list_submissions(&state.pool, task_id).await?;
    Ok(Json(submissions))
}

fn bad_form(message: impl std::fmt::Display) -> AppError {
    AppError::new(
        StatusCode::BAD_REQUEST,
        &format!("Invalid form data: {}", message),
    )
}

async fn read_file_field(field: axum::extract::multipart::Field<'_>) -> Result<FileUpload, AppError> {
    let name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field.bytes().await.map_err(bad_form)?;
    Ok(FileUpload {
        name,
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// Reads the multipart submission form: `submission_type`, `evidence_type`,
/// `link_url`, `notes`, `checklist_data` (JSON) and an optional `file`.
async fn read_submission_form(multipart: &mut Multipart) -> Result<SubmissionData, AppError> {
    let mut data = SubmissionData::completion();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => data.file = Some(read_file_field(field).await?),
            "submission_type" => {
                data.submission_type = field.text().await.map_err(bad_form)?.parse().map_err(bad_form)?;
            }
            "evidence_type" => {
                let raw = field.text().await.map_err(bad_form)?;
                if !raw.trim().is_empty() {
                    data.evidence_type = Some(raw.parse().map_err(bad_form)?);
                }
            }
            "link_url" => data.link_url = Some(field.text().await.map_err(bad_form)?),
            "notes" => data.notes = Some(field.text().await.map_err(bad_form)?),
            "checklist_data" => {
                let raw = field.text().await.map_err(bad_form)?;
                let items: Vec<ChecklistItem> = serde_json::from_str(&raw).map_err(bad_form)?;
                data.checklist_data = Some(items);
            }
            other => debug!("Ignoring unknown form field '{}'.", other),
        }
    }
    Ok(data)
}

/// Handler for recording evidence against a task.
pub async fn submit_evidence(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionOutcome>), AppError> {
    let data = read_submission_form(&mut multipart).await?;
    let outcome = submissions::submit_task_evidence(
        &state,
        &user.0,
        task_id,
        data,
        &AbortSignal::never(),
        Utc::now(),
    )
    .await?;

    if let Some(warning) = &outcome.warning {
        warn!("Submission {} stored with warning: {}", outcome.submission.id, warning);
    }
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Handler for uploading several attachments to a task.
pub async fn attach_files(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Vec<AttachmentResult>>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        if field.name() == Some("file") {
            files.push(read_file_field(field).await?);
        }
    }

    let results =
        submissions::attach_files(&state, &user.0, task_id, files, &AbortSignal::never()).await?;
    Ok(Json(results))
}

/// Handler for deleting a submission and its stored file.
pub async fn delete_submission(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(submission_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    debug!("Attempting to delete submission with ID: {}", submission_id);
    let file_path = database::find_submission(&state.pool, submission_id)
        .await?
        .and_then(|s| s.file_path);

    submissions::delete_task_submission(&state, submission_id, file_path.as_deref()).await?;

    info!("Submission with ID {} deleted successfully.", submission_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_reviews(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<TaskReview>>, AppError> {
    Ok(Json(database::list_reviews(&state.pool, task_id).await?))
}

pub async fn effective_settings(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<EffectiveSettings>, AppError> {
    Ok(Json(
        submissions::resolve_settings(&state.pool, user.id()).await?,
    ))
}

pub async fn put_settings(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(payload): Json<SettingsPayload>,
) -> Result<Json<TaskSettings>, AppError> {
    if !payload.auto_approve_cutoff_hours.is_finite() || payload.auto_approve_cutoff_hours < 0.0 {
        return Err(TaskError::validation("Cutoff hours must be zero or more.").into());
    }
    let scope = match payload.user_id {
        Some(user_id) => database::user_scope(user_id),
        None => database::GLOBAL_SCOPE.to_string(),
    };
    let settings = database::upsert_settings(
        &state.pool,
        &scope,
        payload.auto_approve_daily,
        payload.auto_approve_cutoff_hours,
    )
    .await?;
    info!("Task settings for scope {} updated.", scope);
    Ok(Json(settings))
}
