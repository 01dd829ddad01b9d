use crate::auth::{CurrentUser, User};
use crate::entities::sea_orm_active_enums::{
    RecurrenceState, RecurrenceType, TaskPriority, TaskStatus,
};
use crate::tasks::folder::{Folder, FolderService, FolderServiceError};
use crate::tasks::recurrence::{RecurrenceAction, RecurrenceError};
use crate::tasks::{
    ApplyScope, CalendarDay, DeleteChildrenMode, NewTask, TaskBadges, TaskChanges, TaskService,
    TaskServiceError, TaskState, TaskView, due_at,
};
use crate::web::api::{ApiError, ErrorResponse};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Person attached to a task.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskUserDto {
    pub id: i32,
    pub username: String,
}

impl From<User> for TaskUserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Denormalized task as returned by every task endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskDto {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    /// Due date and time as an instant, midnight when no time is set
    pub due_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_by_user_id: i32,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub assignee_user_ids: Vec<i32>,
    pub assignees: Vec<TaskUserDto>,
    pub verifier_user_ids: Vec<i32>,
    pub verifiers: Vec<TaskUserDto>,
    pub requires_verification: bool,
    pub is_overdue: bool,
    pub needs_attention_for_verifier: bool,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_interval: Option<i32>,
    pub recurrence_days_of_week: Option<Vec<i32>>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub recurrence_master_task_id: Option<String>,
    pub recurrence_state: Option<RecurrenceState>,
    pub is_hidden: bool,
}

impl From<TaskView> for TaskDto {
    fn from(view: TaskView) -> Self {
        let assignee_user_ids = view.assignee_user_ids();
        let verifier_user_ids = view.verifier_user_ids();
        let due_at = due_at(&view.task);
        let task = view.task;
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            due_date: task.due_date,
            due_time: task.due_time,
            due_at,
            status: task.status,
            priority: task.priority,
            created_by_user_id: task.created_by_user_id,
            created_by_name: view.created_by_name,
            created_at: task.created_at,
            completed_at: task.completed_at,
            verified_at: task.verified_at,
            source_type: task.source_type,
            source_id: task.source_id,
            requires_verification: !verifier_user_ids.is_empty(),
            assignee_user_ids,
            assignees: view.assignees.into_iter().map(TaskUserDto::from).collect(),
            verifier_user_ids,
            verifiers: view.verifiers.into_iter().map(TaskUserDto::from).collect(),
            is_overdue: view.is_overdue,
            needs_attention_for_verifier: view.needs_attention_for_verifier,
            is_recurring: task.is_recurring,
            recurrence_type: task.recurrence_type,
            recurrence_interval: task.recurrence_interval,
            recurrence_days_of_week: task
                .recurrence_days_of_week
                .and_then(|days| serde_json::from_value(days).ok()),
            recurrence_end_date: task.recurrence_end_date,
            recurrence_master_task_id: task.recurrence_master_task_id,
            recurrence_state: task.recurrence_state,
            is_hidden: task.is_hidden,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskCreatePayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Defaults to the creator when empty
    #[serde(default)]
    pub assignee_user_ids: Vec<i32>,
    #[serde(default)]
    pub verifier_user_ids: Vec<i32>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurrence_type: Option<RecurrenceType>,
    #[serde(default)]
    pub recurrence_interval: Option<i32>,
    /// ISO weekdays, 1 = Monday
    #[serde(default)]
    pub recurrence_days_of_week: Option<Vec<i32>>,
    #[serde(default)]
    pub recurrence_end_date: Option<NaiveDate>,
}

impl From<TaskCreatePayload> for NewTask {
    fn from(payload: TaskCreatePayload) -> Self {
        Self {
            title: payload.title,
            description: payload.description,
            due_date: payload.due_date,
            due_time: payload.due_time,
            priority: payload.priority,
            assignee_user_ids: payload.assignee_user_ids,
            verifier_user_ids: payload.verifier_user_ids,
            source_type: payload.source_type,
            source_id: payload.source_id,
            is_recurring: payload.is_recurring,
            recurrence_type: payload.recurrence_type,
            recurrence_interval: payload.recurrence_interval,
            recurrence_days_of_week: payload.recurrence_days_of_week,
            recurrence_end_date: payload.recurrence_end_date,
        }
    }
}

/// Tells an absent field apart from an explicit `null`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Partial update. Omitted fields are left alone, `null` clears them.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TaskUpdatePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<NaiveDate>)]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<NaiveTime>)]
    pub due_time: Option<Option<NaiveTime>>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assignee_user_ids: Option<Vec<i32>>,
    #[serde(default)]
    pub verifier_user_ids: Option<Vec<i32>>,
    #[serde(default)]
    pub apply_scope: ApplyScope,
}

impl From<TaskUpdatePayload> for TaskChanges {
    fn from(payload: TaskUpdatePayload) -> Self {
        Self {
            title: payload.title,
            description: payload.description,
            due_date: payload.due_date,
            due_time: payload.due_time,
            priority: payload.priority,
            status: payload.status,
            assignee_user_ids: payload.assignee_user_ids,
            verifier_user_ids: payload.verifier_user_ids,
            apply_scope: payload.apply_scope,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TaskListQuery {
    /// Day to list, `YYYY-MM-DD`
    pub date: NaiveDate,
    /// Saved folder whose filter narrows the list
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CalendarQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CalendarDayDto {
    pub date: NaiveDate,
    pub count: u64,
}

impl From<CalendarDay> for CalendarDayDto {
    fn from(day: CalendarDay) -> Self {
        Self {
            date: day.date,
            count: day.count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskBadgesDto {
    pub pending_verify_count: u64,
    pub fresh_completed_flag: bool,
}

impl From<TaskBadges> for TaskBadgesDto {
    fn from(badges: TaskBadges) -> Self {
        Self {
            pending_verify_count: badges.pending_verify_count,
            fresh_completed_flag: badges.fresh_completed_flag,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecurrenceActionPayload {
    pub action: RecurrenceAction,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteChildrenQuery {
    /// `all`, `before` or `after`
    #[serde(default = "default_delete_mode")]
    pub mode: String,
    /// Cutoff date, required for `before` and `after`
    pub date: Option<NaiveDate>,
}

fn default_delete_mode() -> String {
    "all".to_string()
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteChildrenResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FolderDto {
    pub id: String,
    pub name: String,
    pub created_by_user_id: i32,
    #[schema(value_type = Object)]
    pub filter_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<Folder> for FolderDto {
    fn from(folder: Folder) -> Self {
        Self {
            id: folder.id,
            name: folder.name,
            created_by_user_id: folder.created_by_user_id,
            filter_json: folder.filter_json,
            created_at: folder.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FolderCreatePayload {
    pub name: String,
    #[serde(default = "empty_filter")]
    #[schema(value_type = Object)]
    pub filter_json: serde_json::Value,
}

fn empty_filter() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FolderUpdatePayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub filter_json: Option<serde_json::Value>,
}

impl From<TaskServiceError> for ApiError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            TaskServiceError::Forbidden(_) => ApiError::forbidden(err.to_string()),
            TaskServiceError::Validation(_)
            | TaskServiceError::UnknownUser(_)
            | TaskServiceError::NotRecurrenceMaster
            | TaskServiceError::VerificationNotRequired => ApiError::bad_request(err.to_string()),
            TaskServiceError::CompleteOnlyActive
            | TaskServiceError::DoneDeleteForbidden
            | TaskServiceError::DeleteOnlyActive
            | TaskServiceError::Recurrence(RecurrenceError::InvalidTransition { .. }) => {
                ApiError::conflict(err.to_string())
            }
            TaskServiceError::Recurrence(_) => ApiError::bad_request(err.to_string()),
            TaskServiceError::Folder(err) => ApiError::from(err),
            TaskServiceError::Database(_) => ApiError::internal(err),
        }
    }
}

impl From<FolderServiceError> for ApiError {
    fn from(err: FolderServiceError) -> Self {
        match err {
            FolderServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            FolderServiceError::InvalidName | FolderServiceError::InvalidFilter(_) => {
                ApiError::bad_request(err.to_string())
            }
            FolderServiceError::Database(_) => ApiError::internal(err),
        }
    }
}

/// Creates the tasks router. Every route requires an authenticated user.
pub fn create_api_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks_handler).post(create_task_handler))
        .route("/tasks/calendar", get(calendar_handler))
        .route("/tasks/attention", get(attention_handler))
        .route("/tasks/badges", get(badges_handler))
        .route(
            "/tasks/folders",
            get(list_folders_handler).post(create_folder_handler),
        )
        .route(
            "/tasks/folders/{folder_id}",
            axum::routing::patch(update_folder_handler).delete(delete_folder_handler),
        )
        .route(
            "/tasks/{task_id}",
            get(get_task_handler)
                .patch(update_task_handler)
                .delete(delete_task_handler),
        )
        .route("/tasks/{task_id}/complete", post(complete_task_handler))
        .route("/tasks/{task_id}/verify", post(verify_task_handler))
        .route(
            "/tasks/{task_id}/recurrence-action",
            post(recurrence_action_handler),
        )
        .route(
            "/tasks/{task_id}/recurrence-children",
            axum::routing::delete(delete_recurrence_children_handler),
        )
        .with_state(state)
}

fn task_service(state: &TaskState) -> TaskService<'_> {
    TaskService::new(&state.db, &state.events, state.recurrence_horizon_days)
}

/// Handler for GET /tasks.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Actual, overdue and done tasks for the day", body = [TaskDto]),
        (status = 404, description = "Folder not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskDto>>, ApiError> {
    let tasks = task_service(&state)
        .list_for_date(current_user.id, query.date, query.folder_id.as_deref())
        .await?;
    Ok(Json(tasks.into_iter().map(TaskDto::from).collect()))
}

/// Handler for POST /tasks.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/tasks",
    request_body = TaskCreatePayload,
    responses(
        (status = 201, description = "Task created, series generated when recurring", body = TaskDto),
        (status = 400, description = "Invalid task or recurrence", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<TaskCreatePayload>,
) -> Result<(StatusCode, Json<TaskDto>), ApiError> {
    let task = task_service(&state)
        .create(current_user.id, NewTask::from(payload))
        .await?;
    Ok((StatusCode::CREATED, Json(TaskDto::from(task))))
}

/// Handler for GET /tasks/calendar.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/calendar",
    params(CalendarQuery),
    responses(
        (status = 200, description = "Open task count per day", body = [CalendarDayDto]),
        (status = 400, description = "from is after to", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn calendar_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Vec<CalendarDayDto>>, ApiError> {
    let days = task_service(&state)
        .calendar(current_user.id, query.from, query.to)
        .await?;
    Ok(Json(days.into_iter().map(CalendarDayDto::from).collect()))
}

/// Handler for GET /tasks/attention.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/attention",
    responses((status = 200, description = "Tasks waiting for the user's verification", body = [TaskDto])),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn attention_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<TaskDto>>, ApiError> {
    let tasks = task_service(&state).attention(current_user.id).await?;
    Ok(Json(tasks.into_iter().map(TaskDto::from).collect()))
}

/// Handler for GET /tasks/badges.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/badges",
    responses((status = 200, description = "Sidebar badge counters", body = TaskBadgesDto)),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn badges_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<TaskBadgesDto>, ApiError> {
    let badges = task_service(&state).badges(current_user.id).await?;
    Ok(Json(TaskBadgesDto::from(badges)))
}

/// Handler for GET /tasks/{task_id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/{task_id}",
    params(("task_id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "The task", body = TaskDto),
        (status = 403, description = "Task not visible to the user", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDto>, ApiError> {
    let task = task_service(&state).get(current_user.id, &task_id).await?;
    Ok(Json(TaskDto::from(task)))
}

/// Handler for PATCH /tasks/{task_id}.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    patch,
    path = "/tasks/{task_id}",
    params(("task_id" = String, Path, description = "Task id")),
    request_body = TaskUpdatePayload,
    responses(
        (status = 200, description = "The updated task", body = TaskDto),
        (status = 400, description = "Invalid change for the scope", body = ErrorResponse),
        (status = 403, description = "User may not edit the task", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
    Json(payload): Json<TaskUpdatePayload>,
) -> Result<Json<TaskDto>, ApiError> {
    let task = task_service(&state)
        .update(current_user.id, &task_id, TaskChanges::from(payload))
        .await?;
    Ok(Json(TaskDto::from(task)))
}

/// Handler for DELETE /tasks/{task_id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/tasks/{task_id}",
    params(("task_id" = String, Path, description = "Task id")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "User may not edit the task", body = ErrorResponse),
        (status = 409, description = "Task is not active", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    task_service(&state).delete(current_user.id, &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /tasks/{task_id}/complete.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/tasks/{task_id}/complete",
    params(("task_id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task done or waiting for verification", body = TaskDto),
        (status = 403, description = "User may not complete the task", body = ErrorResponse),
        (status = 409, description = "Task is not active", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn complete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDto>, ApiError> {
    let task = task_service(&state)
        .complete(current_user.id, &task_id)
        .await?;
    Ok(Json(TaskDto::from(task)))
}

/// Handler for POST /tasks/{task_id}/verify.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/tasks/{task_id}/verify",
    params(("task_id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task verified", body = TaskDto),
        (status = 400, description = "Task is not waiting for verification", body = ErrorResponse),
        (status = 403, description = "User may not verify the task", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn verify_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDto>, ApiError> {
    let task = task_service(&state).verify(current_user.id, &task_id).await?;
    Ok(Json(TaskDto::from(task)))
}

/// Handler for POST /tasks/{task_id}/recurrence-action.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/tasks/{task_id}/recurrence-action",
    params(("task_id" = String, Path, description = "Master task id")),
    request_body = RecurrenceActionPayload,
    responses(
        (status = 200, description = "Updated master", body = TaskDto),
        (status = 400, description = "Task is not a series master", body = ErrorResponse),
        (status = 403, description = "User may not manage the series", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed from the current state", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn recurrence_action_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
    Json(payload): Json<RecurrenceActionPayload>,
) -> Result<Json<TaskDto>, ApiError> {
    let task = task_service(&state)
        .recurrence_action(current_user.id, &task_id, payload.action)
        .await?;
    Ok(Json(TaskDto::from(task)))
}

/// Handler for DELETE /tasks/{task_id}/recurrence-children.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/tasks/{task_id}/recurrence-children",
    params(("task_id" = String, Path, description = "Master task id"), DeleteChildrenQuery),
    responses(
        (status = 200, description = "Number of deleted children", body = DeleteChildrenResponse),
        (status = 400, description = "Invalid mode or not a series master", body = ErrorResponse),
        (status = 403, description = "User may not manage the series", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn delete_recurrence_children_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(task_id): Path<String>,
    Query(query): Query<DeleteChildrenQuery>,
) -> Result<Json<DeleteChildrenResponse>, ApiError> {
    let mode = DeleteChildrenMode::parse(&query.mode, query.date)?;
    let deleted = task_service(&state)
        .delete_recurrence_children(current_user.id, &task_id, mode)
        .await?;
    Ok(Json(DeleteChildrenResponse { deleted }))
}

/// Handler for GET /tasks/folders.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/tasks/folders",
    responses((status = 200, description = "The user's folders, newest first", body = [FolderDto])),
    security(("bearer" = [])),
    tag = "Task folders"
)]
pub async fn list_folders_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<FolderDto>>, ApiError> {
    let folders = FolderService::new(&state.db).list(current_user.id).await?;
    Ok(Json(folders.into_iter().map(FolderDto::from).collect()))
}

/// Handler for POST /tasks/folders.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/tasks/folders",
    request_body = FolderCreatePayload,
    responses(
        (status = 201, description = "Folder created", body = FolderDto),
        (status = 400, description = "Invalid name or filter", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Task folders"
)]
pub async fn create_folder_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<FolderCreatePayload>,
) -> Result<(StatusCode, Json<FolderDto>), ApiError> {
    let folder = FolderService::new(&state.db)
        .create(current_user.id, &payload.name, payload.filter_json)
        .await?;
    Ok((StatusCode::CREATED, Json(FolderDto::from(folder))))
}

/// Handler for PATCH /tasks/folders/{folder_id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    patch,
    path = "/tasks/folders/{folder_id}",
    params(("folder_id" = String, Path, description = "Folder id")),
    request_body = FolderUpdatePayload,
    responses(
        (status = 200, description = "Updated folder", body = FolderDto),
        (status = 404, description = "Folder not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Task folders"
)]
pub async fn update_folder_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(folder_id): Path<String>,
    Json(payload): Json<FolderUpdatePayload>,
) -> Result<Json<FolderDto>, ApiError> {
    let folder = FolderService::new(&state.db)
        .update(
            current_user.id,
            &folder_id,
            payload.name.as_deref(),
            payload.filter_json,
        )
        .await?;
    Ok(Json(FolderDto::from(folder)))
}

/// Handler for DELETE /tasks/folders/{folder_id}.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/tasks/folders/{folder_id}",
    params(("folder_id" = String, Path, description = "Folder id")),
    responses(
        (status = 204, description = "Folder deleted"),
        (status = 404, description = "Folder not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Task folders"
)]
pub async fn delete_folder_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(folder_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    FolderService::new(&state.db)
        .delete(current_user.id, &folder_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
