// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Largest accepted multipart body: one maximal file plus form fields.
const MAX_UPLOAD_BODY: usize = 4 * 26 * 1024 * 1024;

/// Creates and configures the application router.
pub fn create_router(state: AppState) -> Router {
    let evidence = ServeDir::new(state.storage.root());

    Router::new()
        .route("/api/me", get(handlers::me))
        .route("/api/users", post(handlers::create_user))
        .route("/api/attendance/check-in", post(handlers::check_in))
        .route("/api/daily-tasks/status", get(handlers::daily_status))
        .route("/api/daily-tasks/ensure", post(handlers::ensure_daily))
        .route(
            "/api/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/api/templates/{id}/deactivate",
            patch(handlers::deactivate_template),
        )
        .route(
            "/api/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route("/api/tasks/changes", get(handlers::task_changes))
        .route("/api/tasks/bulk", post(handlers::bulk_action))
        .route("/api/tasks/{id}/start", patch(handlers::start_task))
        .route("/api/tasks/{id}/notes", post(handlers::add_note))
        .route(
            "/api/tasks/{id}/submissions",
            get(handlers::list_submissions)
                .post(handlers::submit_evidence)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY)),
        )
        .route(
            "/api/tasks/{id}/attachments",
            post(handlers::attach_files).layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY)),
        )
        .route("/api/tasks/{id}/reviews", get(handlers::list_reviews))
        .route("/api/submissions/{id}", delete(handlers::delete_submission))
        .route("/api/settings", put(handlers::put_settings))
        .route("/api/settings/effective", get(handlers::effective_settings))
        .nest_service("/evidence", evidence)
        .layer(TraceLayer::new_for_http())
        // Adds the shared state to the application
        .with_state(state)
}
