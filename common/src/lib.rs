// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::str::FromStr;

mod reducer;

pub use reducer::{RemoteChange, TaskEvent, TaskListState};

/// Lifecycle state of a task instance.
///
/// `Approved`, `Rejected` and `DoneAutoApproved` are terminal. The declaration
/// order is also the sort order used by the task list.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    SubmittedForReview,
    Approved,
    Rejected,
    DoneAutoApproved,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::SubmittedForReview => "submitted_for_review",
            TaskStatus::Approved => "approved",
            TaskStatus::Rejected => "rejected",
            TaskStatus::DoneAutoApproved => "done_auto_approved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Approved | TaskStatus::Rejected | TaskStatus::DoneAutoApproved
        )
    }
}

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum TaskType {
    Daily,
    OneOff,
}

/// Task priority, ordered from least to most pressing.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum SubmissionType {
    Completion,
    Note,
}

impl FromStr for SubmissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "completion" => Ok(SubmissionType::Completion),
            "note" => Ok(SubmissionType::Note),
            other => Err(format!("Unknown submission type '{}'.", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum EvidenceType {
    Photo,
    File,
    Link,
    Checklist,
}

impl FromStr for EvidenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "photo" => Ok(EvidenceType::Photo),
            "file" => Ok(EvidenceType::File),
            "link" => Ok(EvidenceType::Link),
            "checklist" => Ok(EvidenceType::Checklist),
            other => Err(format!("Unknown evidence type '{}'.", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

/// A console user. The id is what callers present to authenticate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Recurring definition of work for a single assignee.
///
/// Templates are never hard-deleted while instances reference them; they are
/// switched off through `is_active`. The auto-approval fields can only narrow
/// the settings resolved for the assignee, never widen them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskTemplate {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: i64,
    pub task_type: TaskType,
    pub is_active: bool,
    pub reviewer_id: Option<i64>,
    pub priority: Priority,
    pub due_time: Option<NaiveTime>,
    pub auto_approve_enabled: bool,
    pub auto_approve_cutoff_hours: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A concrete unit of work, either instantiated from a daily template or
/// created directly as a one-off task.
///
/// For recurring instances the `(assigned_to, template_id, instance_date)`
/// triple is unique.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub template_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: i64,
    pub assigned_by: Option<i64>,
    pub reviewer_id: Option<i64>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub instance_date: Option<NaiveDate>,
    pub is_recurring_instance: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub is_late: bool,
    pub tags: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChecklistItem {
    pub id: String,
    pub label: String,
    pub checked: bool,
}

/// Evidence recorded against a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskSubmission {
    pub id: i64,
    pub task_id: i64,
    pub submission_type: SubmissionType,
    pub evidence_type: Option<EvidenceType>,
    pub file_url: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub link_url: Option<String>,
    pub notes: Option<String>,
    pub checklist_data: Option<Json<Vec<ChecklistItem>>>,
    pub submitted_by: i64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskReview {
    pub id: i64,
    pub task_id: i64,
    pub reviewer_id: i64,
    pub decision: ReviewDecision,
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

/// A stored settings row. `scope` is either `global` or `user:<id>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskSettings {
    pub scope: String,
    pub auto_approve_daily: bool,
    pub auto_approve_cutoff_hours: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    User,
    Global,
    Default,
}

/// Auto-approval settings after applying user/global/default precedence.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EffectiveSettings {
    pub auto_approve_daily: bool,
    pub auto_approve_cutoff_hours: f64,
    pub source: SettingsSource,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub user_id: i64,
    pub work_date: NaiveDate,
    pub check_in_at: DateTime<Utc>,
}

/// Diagnostic snapshot of a user's daily task state for one date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DailyTaskStatus {
    pub user_id: i64,
    pub date: NaiveDate,
    pub template_count: i64,
    pub instance_count: i64,
    pub checked_at: DateTime<Utc>,
}

/// A task together with the data a list view shows next to it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub template_title: Option<String>,
    pub assignee_name: Option<String>,
    pub reviewer_name: Option<String>,
    pub latest_submission: Option<TaskSubmission>,
    pub latest_review: Option<TaskReview>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskPage {
    pub tasks: Vec<TaskView>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    DueDate,
    Priority,
    Status,
    Title,
    CreatedAt,
    UpdatedAt,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Query-string filters for the task list. Every supplied criterion must hold.
///
/// `tags` is a comma separated list; a task matches when it carries at least
/// one of them.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct TaskFilters {
    pub search: Option<String>,
    pub task_type: Option<TaskType>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<i64>,
    pub reviewer_id: Option<i64>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub is_late: Option<bool>,
    pub needs_review: Option<bool>,
    pub tags: Option<String>,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_dir: SortDirection,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl TaskFilters {
    pub fn tag_set(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Request body for `POST /api/tasks/bulk`.
///
/// `action` stays a plain string so that unknown actions are reported as such
/// instead of failing deserialization.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BulkAction {
    pub action: String,
    pub task_ids: Vec<i64>,
    #[serde(default)]
    pub data: BulkActionData,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct BulkActionData {
    pub assignee_id: Option<i64>,
    pub notes: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    pub action: String,
    pub affected: Vec<i64>,
    /// Bulk changes are never patched locally; clients reload the list.
    pub refetch: bool,
}

#[derive(Deserialize, Debug)]
pub struct CreateUserPayload {
    pub full_name: String,
    pub role: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateTemplatePayload {
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: i64,
    pub task_type: Option<TaskType>,
    pub reviewer_id: Option<i64>,
    pub priority: Option<Priority>,
    pub due_time: Option<NaiveTime>,
    pub auto_approve_enabled: Option<bool>,
    pub auto_approve_cutoff_hours: Option<f64>,
}

/// Structure used to receive one-off task creation data from the API.
#[derive(Deserialize, Debug)]
pub struct CreateTaskPayload {
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: i64,
    pub reviewer_id: Option<i64>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Settings upsert. Without `user_id` the global row is written.
#[derive(Deserialize, Debug)]
pub struct SettingsPayload {
    pub user_id: Option<i64>,
    pub auto_approve_daily: bool,
    pub auto_approve_cutoff_hours: f64,
}

#[derive(Deserialize, Debug)]
pub struct NotePayload {
    pub notes: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// Row-level change notification for the tasks table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskChange {
    pub kind: ChangeKind,
    pub task_id: i64,
    pub at: DateTime<Utc>,
}
