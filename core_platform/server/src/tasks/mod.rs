use crate::access::user_can_manage_access;
use crate::auth::User;
use crate::entities::sea_orm_active_enums::{RecurrenceState, RecurrenceType, TaskPriority, TaskStatus};
use crate::entities::*;
use crate::events::{self, DomainEvent, EventPublisher};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use utoipa::ToSchema;

pub mod api;
pub mod folder;
pub mod recurrence;

use folder::{FolderFilter, FolderService, FolderServiceError};
use recurrence::{RecurrenceAction, RecurrenceError, RecurrenceRule};

#[derive(Clone)]
pub struct TaskState {
    pub db: Arc<DatabaseConnection>,
    pub events: Arc<EventPublisher>,
    pub recurrence_horizon_days: i64,
}

/// Which members of a recurring series an update touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApplyScope {
    /// The addressed task only.
    #[default]
    Single,
    /// The addressed task and later members of its series.
    Future,
    /// The master and all of its unfinished children.
    Master,
}

/// Selection of children removed by a bulk delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteChildrenMode {
    All,
    Before(NaiveDate),
    After(NaiveDate),
}

impl DeleteChildrenMode {
    pub fn parse(mode: &str, date: Option<NaiveDate>) -> Result<Self, TaskServiceError> {
        match (mode, date) {
            ("all", _) => Ok(Self::All),
            ("before", Some(date)) => Ok(Self::Before(date)),
            ("after", Some(date)) => Ok(Self::After(date)),
            ("before" | "after", None) => Err(TaskServiceError::Validation(format!(
                "date is required for mode {mode}"
            ))),
            _ => Err(TaskServiceError::Validation(format!(
                "Unknown delete mode {mode}, expected all, before or after"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub priority: TaskPriority,
    pub assignee_user_ids: Vec<i32>,
    pub verifier_user_ids: Vec<i32>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_interval: Option<i32>,
    pub recurrence_days_of_week: Option<Vec<i32>>,
    pub recurrence_end_date: Option<NaiveDate>,
}

/// Partial update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub due_time: Option<Option<NaiveTime>>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub assignee_user_ids: Option<Vec<i32>>,
    pub verifier_user_ids: Option<Vec<i32>>,
    pub apply_scope: ApplyScope,
}

/// A task as seen by one user, with its people resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
    pub task: task::Model,
    pub assignees: Vec<User>,
    pub verifiers: Vec<User>,
    pub created_by_name: Option<String>,
    pub is_overdue: bool,
    pub needs_attention_for_verifier: bool,
}

impl TaskView {
    pub fn assignee_user_ids(&self) -> Vec<i32> {
        self.assignees.iter().map(|user| user.id).collect()
    }

    pub fn verifier_user_ids(&self) -> Vec<i32> {
        self.verifiers.iter().map(|user| user.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBadges {
    pub pending_verify_count: u64,
    pub fresh_completed_flag: bool,
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    #[error("Task {0} not found")]
    NotFound(String),
    #[error("Not allowed to {0} this task")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("User {0} does not exist")]
    UnknownUser(i32),
    #[error("Task is not the master of a recurring series")]
    NotRecurrenceMaster,
    #[error("Only active tasks can be completed")]
    CompleteOnlyActive,
    #[error("verification_not_required")]
    VerificationNotRequired,
    #[error("Done tasks cannot be deleted")]
    DoneDeleteForbidden,
    #[error("Only active tasks can be deleted")]
    DeleteOnlyActive,
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
    #[error(transparent)]
    Folder(#[from] FolderServiceError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Derived overdue flag, evaluated against server local time.
pub fn is_overdue(task: &task::Model, now: NaiveDateTime) -> bool {
    if task.status == TaskStatus::Done || task.is_hidden {
        return false;
    }
    let Some(due_date) = task.due_date else {
        return false;
    };
    let today = now.date();
    due_date < today
        || (due_date == today && task.due_time.is_some_and(|due_time| due_time < now.time()))
}

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// The requesting user and whether one of their roles manages access.
#[derive(Debug, Clone, Copy)]
struct Actor {
    user_id: i32,
    is_manager: bool,
}

impl Actor {
    fn is_creator(&self, task: &task::Model) -> bool {
        task.created_by_user_id == self.user_id
    }

    fn can_see(&self, task: &task::Model, assignees: &[i32], verifiers: &[i32]) -> bool {
        self.can_edit(task, assignees) || verifiers.contains(&self.user_id)
    }

    fn can_edit(&self, task: &task::Model, assignees: &[i32]) -> bool {
        self.is_manager || self.is_creator(task) || assignees.contains(&self.user_id)
    }

    fn can_complete(&self, task: &task::Model, assignees: &[i32], verifiers: &[i32]) -> bool {
        self.can_see(task, assignees, verifiers)
    }

    fn can_verify(&self, task: &task::Model, verifiers: &[i32]) -> bool {
        self.is_manager || self.is_creator(task) || verifiers.contains(&self.user_id)
    }

    fn can_manage_recurrence(&self, task: &task::Model) -> bool {
        self.is_manager || self.is_creator(task)
    }
}

/// A task with the ids of its assignees and verifiers.
struct LoadedTask {
    task: task::Model,
    assignees: Vec<i32>,
    verifiers: Vec<i32>,
}

#[derive(Default)]
struct TaskLinks {
    assignees: HashMap<String, Vec<i32>>,
    verifiers: HashMap<String, Vec<i32>>,
}

impl TaskLinks {
    fn assignees_of(&self, task_id: &str) -> &[i32] {
        self.assignees.get(task_id).map(Vec::as_slice).unwrap_or_default()
    }

    fn verifiers_of(&self, task_id: &str) -> &[i32] {
        self.verifiers.get(task_id).map(Vec::as_slice).unwrap_or_default()
    }

    fn user_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.assignees
            .values()
            .chain(self.verifiers.values())
            .flatten()
            .copied()
    }
}

/// Task CRUD, completion workflow and recurring series management.
pub struct TaskService<'a> {
    db: &'a DatabaseConnection,
    events: &'a EventPublisher,
    horizon_days: i64,
}

impl<'a> TaskService<'a> {
    pub fn new(db: &'a DatabaseConnection, events: &'a EventPublisher, horizon_days: i64) -> Self {
        Self {
            db,
            events,
            horizon_days,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: i32, task_id: &str) -> Result<TaskView, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let loaded = load_task(self.db, task_id).await?;
        if !actor.can_see(&loaded.task, &loaded.assignees, &loaded.verifiers) {
            return Err(TaskServiceError::Forbidden("view"));
        }
        self.view_one(&actor, loaded.task).await
    }

    /// Creates a task. A recurring task becomes the master of a series and
    /// its children are generated in the same transaction.
    #[tracing::instrument(skip(self, new_task), fields(title = %new_task.title))]
    pub async fn create(&self, user_id: i32, new_task: NewTask) -> Result<TaskView, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let title = validate_title(&new_task.title)?;
        let mut assignee_ids = unique_ids(&new_task.assignee_user_ids);
        if assignee_ids.is_empty() {
            assignee_ids.push(user_id);
        }
        let verifier_ids = unique_ids(&new_task.verifier_user_ids);

        let series = if new_task.is_recurring {
            let rule = RecurrenceRule::new(
                new_task.recurrence_type,
                new_task.recurrence_interval,
                new_task.recurrence_days_of_week.as_deref(),
                new_task.recurrence_end_date,
                new_task.due_date,
            )?;
            let anchor = new_task.due_date.ok_or(RecurrenceError::MissingDueDate)?;
            let dates = rule.occurrences(anchor, self.horizon_days)?;
            Some((rule, dates))
        } else {
            None
        };

        let txn = self.db.begin().await?;
        ensure_users_exist(&txn, assignee_ids.iter().chain(&verifier_ids)).await?;

        let rule = series.as_ref().map(|(rule, _)| rule);
        let master = task::ActiveModel {
            id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
            title: ActiveValue::Set(title),
            description: ActiveValue::Set(new_task.description),
            due_date: ActiveValue::Set(new_task.due_date),
            due_time: ActiveValue::Set(new_task.due_time),
            status: ActiveValue::Set(TaskStatus::Active),
            priority: ActiveValue::Set(new_task.priority),
            created_by_user_id: ActiveValue::Set(user_id),
            created_at: ActiveValue::Set(Utc::now()),
            completed_at: ActiveValue::Set(None),
            verified_at: ActiveValue::Set(None),
            source_type: ActiveValue::Set(new_task.source_type),
            source_id: ActiveValue::Set(new_task.source_id),
            is_recurring: ActiveValue::Set(rule.is_some()),
            recurrence_type: ActiveValue::Set(rule.map(|rule| rule.kind)),
            recurrence_interval: ActiveValue::Set(rule.map(|rule| rule.interval as i32)),
            recurrence_days_of_week: ActiveValue::Set(
                rule.filter(|rule| !rule.days_of_week.is_empty())
                    .map(|rule| json!(rule.days_of_week)),
            ),
            recurrence_end_date: ActiveValue::Set(rule.and_then(|rule| rule.end_date)),
            recurrence_master_task_id: ActiveValue::Set(None),
            recurrence_state: ActiveValue::Set(rule.map(|_| RecurrenceState::Active)),
            is_hidden: ActiveValue::Set(false),
        }
        .insert(&txn)
        .await?;

        let mut task_ids = vec![master.id.clone()];
        if let Some((_, dates)) = &series {
            let children: Vec<task::ActiveModel> = dates
                .iter()
                .map(|due_date| child_of(&master, *due_date))
                .collect();
            task_ids.extend(children.iter().filter_map(|child| match &child.id {
                ActiveValue::Set(id) => Some(id.clone()),
                _ => None,
            }));
            if !children.is_empty() {
                task::Entity::insert_many(children).exec(&txn).await?;
            }
        }
        link_users(&txn, &task_ids, &assignee_ids, &verifier_ids).await?;

        self.events
            .publish(
                &txn,
                DomainEvent::new(
                    events::TASK_CREATED,
                    "task",
                    &master.id,
                    json!({
                        "date": master.due_date.map(|date| date.to_string()),
                        "title": master.title,
                        "children_count": task_ids.len() - 1,
                    }),
                ),
            )
            .await?;
        txn.commit().await?;

        tracing::info!("Created task {} with {} children", master.id, task_ids.len() - 1);
        self.view_one(&actor, master).await
    }

    /// Tasks for one day in display order: actual, then overdue, then done.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_date(
        &self,
        user_id: i32,
        date: NaiveDate,
        folder_id: Option<&str>,
    ) -> Result<Vec<TaskView>, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let filter = match folder_id {
            Some(folder_id) => {
                let folder = FolderService::new(self.db).get(user_id, folder_id).await?;
                Some(FolderFilter::parse(&folder.filter_json).unwrap_or_else(|err| {
                    tracing::warn!("Folder {} has an unusable filter: {}", folder.id, err);
                    FolderFilter::default()
                }))
            }
            None => None,
        };

        let now = now_local();
        let candidates = task::Entity::find()
            .filter(self.visibility(&actor).await?)
            .filter(task::Column::IsHidden.eq(false))
            .filter(
                Condition::any().add(task::Column::DueDate.eq(date)).add(
                    Condition::all()
                        .add(task::Column::Status.ne(TaskStatus::Done))
                        .add(task::Column::DueDate.lte(now.date())),
                ),
            )
            .all(self.db)
            .await?;

        let mut actual = Vec::new();
        let mut overdue = Vec::new();
        let mut done = Vec::new();
        for view in self.views(&actor, candidates, now).await? {
            if let Some(filter) = &filter {
                if !filter.matches(&view.task, &view.assignee_user_ids(), user_id) {
                    continue;
                }
            }
            let due_on_date = view.task.due_date == Some(date);
            if view.is_overdue {
                overdue.push(view);
            } else if view.task.status == TaskStatus::Active && due_on_date {
                actual.push(view);
            } else if view.task.status != TaskStatus::Active && due_on_date {
                done.push(view);
            }
        }
        if let Some(filter) = &filter {
            if !filter.show_active {
                actual.clear();
            }
            if !filter.show_overdue {
                overdue.clear();
            }
            if !filter.show_done {
                done.clear();
            }
        }

        actual.sort_by_key(|view| {
            (
                Reverse(view.task.priority.weight()),
                view.task.due_time.is_none(),
                view.task.due_time,
                view.task.created_at,
            )
        });
        overdue.sort_by_key(|view| {
            (
                view.task.due_date,
                Reverse(view.task.priority.weight()),
                view.task.created_at,
            )
        });
        done.sort_by_key(|view| (view.task.verified_at.is_none(), Reverse(view.task.verified_at)));

        let mut tasks = actual;
        tasks.append(&mut overdue);
        tasks.append(&mut done);
        Ok(tasks)
    }

    /// Open task counts per due date within `[from, to]`.
    #[tracing::instrument(skip(self))]
    pub async fn calendar(
        &self,
        user_id: i32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarDay>, TaskServiceError> {
        if from > to {
            return Err(TaskServiceError::Validation(
                "from must not be after to".to_string(),
            ));
        }
        let actor = self.actor(user_id).await?;
        let tasks = task::Entity::find()
            .filter(self.visibility(&actor).await?)
            .filter(task::Column::IsHidden.eq(false))
            .filter(task::Column::Status.ne(TaskStatus::Done))
            .filter(task::Column::DueDate.between(from, to))
            .all(self.db)
            .await?;

        let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for due_date in tasks.into_iter().filter_map(|task| task.due_date) {
            *days.entry(due_date).or_default() += 1;
        }
        Ok(days
            .into_iter()
            .map(|(date, count)| CalendarDay { date, count })
            .collect())
    }

    /// Applies `changes` to the task, or to part of its series depending on
    /// the scope. Only `single` may move the due date or change the status.
    #[tracing::instrument(skip(self, changes), fields(scope = ?changes.apply_scope))]
    pub async fn update(
        &self,
        user_id: i32,
        task_id: &str,
        changes: TaskChanges,
    ) -> Result<TaskView, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let scope = changes.apply_scope;
        if scope != ApplyScope::Single && (changes.due_date.is_some() || changes.status.is_some()) {
            return Err(TaskServiceError::Validation(
                "due_date and status can only be changed with apply_scope single".to_string(),
            ));
        }
        let title = changes.title.as_deref().map(validate_title).transpose()?;
        let assignee_ids = changes.assignee_user_ids.as_deref().map(unique_ids);
        let verifier_ids = changes.verifier_user_ids.as_deref().map(unique_ids);

        let txn = self.db.begin().await?;
        let loaded = load_task(&txn, task_id).await?;
        if !actor.can_edit(&loaded.task, &loaded.assignees) {
            return Err(TaskServiceError::Forbidden("edit"));
        }
        let status = checked_status_change(
            changes.status,
            loaded.task.status,
            actor.can_verify(&loaded.task, &loaded.verifiers),
        )?;
        ensure_users_exist(
            &txn,
            assignee_ids.iter().flatten().chain(verifier_ids.iter().flatten()),
        )
        .await?;

        let targets = scope_targets(&txn, &loaded.task, scope).await?;
        let now = Utc::now();
        let mut target_ids = Vec::with_capacity(targets.len());
        for target in targets {
            target_ids.push(target.id.clone());
            let previous_status = target.status;
            let mut active_model: task::ActiveModel = target.into();
            if let Some(title) = &title {
                active_model.title = ActiveValue::Set(title.clone());
            }
            if let Some(description) = &changes.description {
                active_model.description = ActiveValue::Set(description.clone());
            }
            if let Some(due_time) = changes.due_time {
                active_model.due_time = ActiveValue::Set(due_time);
            }
            if let Some(priority) = changes.priority {
                active_model.priority = ActiveValue::Set(priority);
            }
            if let Some(due_date) = changes.due_date {
                active_model.due_date = ActiveValue::Set(due_date);
            }
            if let Some(status) = status.filter(|status| *status != previous_status) {
                active_model.status = ActiveValue::Set(status);
                match status {
                    TaskStatus::Done => {
                        active_model.completed_at = ActiveValue::Set(Some(now));
                        active_model.verified_at = ActiveValue::Set(Some(now));
                    }
                    TaskStatus::DonePendingVerify => {
                        active_model.completed_at = ActiveValue::Set(Some(now));
                        active_model.verified_at = ActiveValue::Set(None);
                    }
                    TaskStatus::Active => {
                        active_model.completed_at = ActiveValue::Set(None);
                        active_model.verified_at = ActiveValue::Set(None);
                    }
                }
            }
            if active_model.is_changed() {
                active_model.update(&txn).await?;
            }
        }

        if let Some(assignee_ids) = &assignee_ids {
            task_assignee::Entity::delete_many()
                .filter(task_assignee::Column::TaskId.is_in(target_ids.iter().cloned()))
                .exec(&txn)
                .await?;
            link_users(&txn, &target_ids, assignee_ids, &[]).await?;
        }
        if let Some(verifier_ids) = &verifier_ids {
            task_verifier::Entity::delete_many()
                .filter(task_verifier::Column::TaskId.is_in(target_ids.iter().cloned()))
                .exec(&txn)
                .await?;
            link_users(&txn, &target_ids, &[], verifier_ids).await?;
        }

        self.events
            .publish(
                &txn,
                DomainEvent::new(
                    events::TASK_UPDATED,
                    "task",
                    task_id,
                    json!({"apply_scope": scope, "task_ids": target_ids}),
                ),
            )
            .await?;
        txn.commit().await?;

        let updated = load_task(self.db, task_id).await?;
        self.view_one(&actor, updated.task).await
    }

    /// Marks an active task done, or waiting for verification when the
    /// completer is not allowed to verify it.
    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, user_id: i32, task_id: &str) -> Result<TaskView, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let txn = self.db.begin().await?;
        let loaded = load_task(&txn, task_id).await?;
        if !actor.can_complete(&loaded.task, &loaded.assignees, &loaded.verifiers) {
            return Err(TaskServiceError::Forbidden("complete"));
        }
        if loaded.task.status != TaskStatus::Active {
            return Err(TaskServiceError::CompleteOnlyActive);
        }

        let now = Utc::now();
        let verified = actor.can_verify(&loaded.task, &loaded.verifiers);
        let mut active_model: task::ActiveModel = loaded.task.into();
        active_model.completed_at = ActiveValue::Set(Some(now));
        if verified {
            active_model.status = ActiveValue::Set(TaskStatus::Done);
            active_model.verified_at = ActiveValue::Set(Some(now));
        } else {
            active_model.status = ActiveValue::Set(TaskStatus::DonePendingVerify);
        }
        let completed = active_model.update(&txn).await?;

        self.events
            .publish(
                &txn,
                DomainEvent::new(
                    events::TASK_COMPLETED,
                    "task",
                    &completed.id,
                    json!({"status": completed.status, "completed_by": user_id}),
                ),
            )
            .await?;
        txn.commit().await?;

        self.view_one(&actor, completed).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn verify(&self, user_id: i32, task_id: &str) -> Result<TaskView, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let txn = self.db.begin().await?;
        let loaded = load_task(&txn, task_id).await?;
        if !actor.can_verify(&loaded.task, &loaded.verifiers) {
            return Err(TaskServiceError::Forbidden("verify"));
        }
        if loaded.task.status != TaskStatus::DonePendingVerify {
            return Err(TaskServiceError::VerificationNotRequired);
        }

        let mut active_model: task::ActiveModel = loaded.task.into();
        active_model.status = ActiveValue::Set(TaskStatus::Done);
        active_model.verified_at = ActiveValue::Set(Some(Utc::now()));
        let verified = active_model.update(&txn).await?;

        self.events
            .publish(
                &txn,
                DomainEvent::new(
                    events::TASK_VERIFIED,
                    "task",
                    &verified.id,
                    json!({"verified_by": user_id}),
                ),
            )
            .await?;
        txn.commit().await?;

        self.view_one(&actor, verified).await
    }

    /// Deletes an active task. Children of a deleted master stay as plain
    /// tasks.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, user_id: i32, task_id: &str) -> Result<(), TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let txn = self.db.begin().await?;
        let loaded = load_task(&txn, task_id).await?;
        if !actor.can_edit(&loaded.task, &loaded.assignees) {
            return Err(TaskServiceError::Forbidden("delete"));
        }
        match loaded.task.status {
            TaskStatus::Active => {}
            TaskStatus::Done => return Err(TaskServiceError::DoneDeleteForbidden),
            TaskStatus::DonePendingVerify => return Err(TaskServiceError::DeleteOnlyActive),
        }

        let detached = task::Entity::update_many()
            .col_expr(
                task::Column::RecurrenceMasterTaskId,
                Expr::value(Option::<String>::None),
            )
            .filter(task::Column::RecurrenceMasterTaskId.eq(task_id))
            .exec(&txn)
            .await?;
        task::Entity::delete_by_id(task_id.to_string())
            .exec(&txn)
            .await?;

        self.events
            .publish(
                &txn,
                DomainEvent::new(
                    events::TASK_DELETED,
                    "task",
                    task_id,
                    json!({"detached_children": detached.rows_affected}),
                ),
            )
            .await?;
        txn.commit().await?;

        tracing::info!("Deleted task {}", task_id);
        Ok(())
    }

    /// Pauses, resumes or stops a series. Pause hides children dated today or
    /// later, resume shows every hidden child again and stop deletes the
    /// upcoming ones.
    #[tracing::instrument(skip(self))]
    pub async fn recurrence_action(
        &self,
        user_id: i32,
        task_id: &str,
        action: RecurrenceAction,
    ) -> Result<TaskView, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let txn = self.db.begin().await?;
        let master = load_master(&txn, &actor, task_id).await?;
        let from = master.recurrence_state.unwrap_or(RecurrenceState::Active);
        let to = action.apply(from)?;

        let upcoming = Condition::all()
            .add(task::Column::RecurrenceMasterTaskId.eq(task_id))
            .add(task::Column::DueDate.gte(Local::now().date_naive()));
        let affected = match action {
            RecurrenceAction::Pause => {
                task::Entity::update_many()
                    .col_expr(task::Column::IsHidden, Expr::value(true))
                    .filter(upcoming)
                    .exec(&txn)
                    .await?
                    .rows_affected
            }
            RecurrenceAction::Resume => show_hidden_children(&txn, task_id).await?,
            RecurrenceAction::Stop => {
                let deleted = task::Entity::delete_many()
                    .filter(upcoming)
                    .exec(&txn)
                    .await?
                    .rows_affected;
                // Children whose day passed while paused stay as plain tasks.
                show_hidden_children(&txn, task_id).await?;
                deleted
            }
        };

        let mut active_model: task::ActiveModel = master.into();
        active_model.recurrence_state = ActiveValue::Set(Some(to));
        let master = active_model.update(&txn).await?;

        self.events
            .publish(
                &txn,
                DomainEvent::new(
                    events::RECURRENCE_CHANGED,
                    "task",
                    task_id,
                    json!({"action": action, "from": from, "to": to, "children_affected": affected}),
                ),
            )
            .await?;
        txn.commit().await?;

        tracing::info!("Recurrence of {} moved from {:?} to {:?}", task_id, from, to);
        self.view_one(&actor, master).await
    }

    /// Deletes generated children of a master. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_recurrence_children(
        &self,
        user_id: i32,
        task_id: &str,
        mode: DeleteChildrenMode,
    ) -> Result<u64, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let txn = self.db.begin().await?;
        load_master(&txn, &actor, task_id).await?;

        let mut children = Condition::all().add(task::Column::RecurrenceMasterTaskId.eq(task_id));
        children = match mode {
            DeleteChildrenMode::All => children,
            DeleteChildrenMode::Before(date) => children.add(task::Column::DueDate.lt(date)),
            DeleteChildrenMode::After(date) => children.add(task::Column::DueDate.gt(date)),
        };
        let deleted = task::Entity::delete_many()
            .filter(children)
            .exec(&txn)
            .await?
            .rows_affected;

        self.events
            .publish(
                &txn,
                DomainEvent::new(
                    events::RECURRENCE_CHANGED,
                    "task",
                    task_id,
                    json!({"action": "delete_children", "children_affected": deleted}),
                ),
            )
            .await?;
        txn.commit().await?;

        tracing::info!("Deleted {} children of {}", deleted, task_id);
        Ok(deleted)
    }

    /// Tasks waiting for a verification the user is allowed to give, most
    /// recently completed first.
    #[tracing::instrument(skip(self))]
    pub async fn attention(&self, user_id: i32) -> Result<Vec<TaskView>, TaskServiceError> {
        let actor = self.actor(user_id).await?;
        let pending = task::Entity::find()
            .filter(self.visibility(&actor).await?)
            .filter(task::Column::IsHidden.eq(false))
            .filter(task::Column::Status.eq(TaskStatus::DonePendingVerify))
            .all(self.db)
            .await?;

        let mut views: Vec<TaskView> = self
            .views(&actor, pending, now_local())
            .await?
            .into_iter()
            .filter(|view| view.needs_attention_for_verifier)
            .collect();
        views.sort_by_key(|view| Reverse(view.task.completed_at));
        Ok(views)
    }

    #[tracing::instrument(skip(self))]
    pub async fn badges(&self, user_id: i32) -> Result<TaskBadges, TaskServiceError> {
        let pending_verify_count = self.attention(user_id).await?.len() as u64;
        Ok(TaskBadges {
            pending_verify_count,
            fresh_completed_flag: pending_verify_count > 0,
        })
    }

    async fn actor(&self, user_id: i32) -> Result<Actor, DbErr> {
        Ok(Actor {
            user_id,
            is_manager: user_can_manage_access(self.db, user_id).await?,
        })
    }

    /// Rows the actor may see: everything for access managers, otherwise
    /// tasks they created, are assigned to, or verify.
    async fn visibility(&self, actor: &Actor) -> Result<Condition, DbErr> {
        if actor.is_manager {
            return Ok(Condition::all());
        }
        let assigned = task_assignee::Entity::find()
            .filter(task_assignee::Column::UserId.eq(actor.user_id))
            .all(self.db)
            .await?
            .into_iter()
            .map(|link| link.task_id);
        let verifying = task_verifier::Entity::find()
            .filter(task_verifier::Column::UserId.eq(actor.user_id))
            .all(self.db)
            .await?
            .into_iter()
            .map(|link| link.task_id);
        let mut linked: Vec<String> = assigned.chain(verifying).collect();
        linked.sort();
        linked.dedup();

        Ok(Condition::any()
            .add(task::Column::CreatedByUserId.eq(actor.user_id))
            .add(task::Column::Id.is_in(linked)))
    }

    async fn view_one(&self, actor: &Actor, task: task::Model) -> Result<TaskView, TaskServiceError> {
        let task_id = task.id.clone();
        self.views(actor, vec![task], now_local())
            .await?
            .pop()
            .ok_or(TaskServiceError::NotFound(task_id))
    }

    async fn views(
        &self,
        actor: &Actor,
        tasks: Vec<task::Model>,
        now: NaiveDateTime,
    ) -> Result<Vec<TaskView>, DbErr> {
        let task_ids: Vec<String> = tasks.iter().map(|task| task.id.clone()).collect();
        let links = load_links(self.db, &task_ids).await?;
        let mut user_ids: Vec<i32> = tasks
            .iter()
            .map(|task| task.created_by_user_id)
            .chain(links.user_ids())
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let users: HashMap<i32, User> = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(self.db)
            .await?
            .into_iter()
            .map(|model| (model.id, User::from(model)))
            .collect();
        let resolve = |ids: &[i32]| -> Vec<User> {
            ids.iter().filter_map(|id| users.get(id).cloned()).collect()
        };

        Ok(tasks
            .into_iter()
            .map(|task| {
                let verifier_ids = links.verifiers_of(&task.id);
                TaskView {
                    assignees: resolve(links.assignees_of(&task.id)),
                    verifiers: resolve(verifier_ids),
                    created_by_name: users
                        .get(&task.created_by_user_id)
                        .map(|user| user.username.clone()),
                    is_overdue: is_overdue(&task, now),
                    needs_attention_for_verifier: task.status == TaskStatus::DonePendingVerify
                        && actor.can_verify(&task, verifier_ids),
                    task,
                }
            })
            .collect())
    }
}

fn validate_title(title: &str) -> Result<String, TaskServiceError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 255 {
        return Err(TaskServiceError::Validation(
            "Title must be between 1 and 255 characters".to_string(),
        ));
    }
    Ok(title.to_string())
}

/// Status requested through an edit, limited to what the editor may do.
/// Someone who cannot verify hands a finished task over for verification
/// and cannot settle one that is already waiting.
fn checked_status_change(
    requested: Option<TaskStatus>,
    current: TaskStatus,
    may_verify: bool,
) -> Result<Option<TaskStatus>, TaskServiceError> {
    match requested {
        Some(status) if status != current && !may_verify => {
            if current == TaskStatus::DonePendingVerify {
                return Err(TaskServiceError::Forbidden("verify"));
            }
            Ok(Some(match status {
                TaskStatus::Done => TaskStatus::DonePendingVerify,
                other => other,
            }))
        }
        other => Ok(other),
    }
}

fn unique_ids(ids: &[i32]) -> Vec<i32> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// A child of `master` due on `due_date`. Children are plain tasks pointing
/// at their master and inherit its content and series settings.
fn child_of(master: &task::Model, due_date: NaiveDate) -> task::ActiveModel {
    task::ActiveModel {
        id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
        title: ActiveValue::Set(master.title.clone()),
        description: ActiveValue::Set(master.description.clone()),
        due_date: ActiveValue::Set(Some(due_date)),
        due_time: ActiveValue::Set(master.due_time),
        status: ActiveValue::Set(TaskStatus::Active),
        priority: ActiveValue::Set(master.priority),
        created_by_user_id: ActiveValue::Set(master.created_by_user_id),
        created_at: ActiveValue::Set(master.created_at),
        completed_at: ActiveValue::Set(None),
        verified_at: ActiveValue::Set(None),
        source_type: ActiveValue::Set(master.source_type.clone()),
        source_id: ActiveValue::Set(master.source_id.clone()),
        is_recurring: ActiveValue::Set(false),
        recurrence_type: ActiveValue::Set(master.recurrence_type),
        recurrence_interval: ActiveValue::Set(master.recurrence_interval),
        recurrence_days_of_week: ActiveValue::Set(master.recurrence_days_of_week.clone()),
        recurrence_end_date: ActiveValue::Set(master.recurrence_end_date),
        recurrence_master_task_id: ActiveValue::Set(Some(master.id.clone())),
        recurrence_state: ActiveValue::Set(master.recurrence_state),
        is_hidden: ActiveValue::Set(master.recurrence_state == Some(RecurrenceState::Paused)),
    }
}

async fn load_task<C: ConnectionTrait>(db: &C, task_id: &str) -> Result<LoadedTask, TaskServiceError> {
    let task = task::Entity::find_by_id(task_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| TaskServiceError::NotFound(task_id.to_string()))?;
    let mut links = load_links(db, std::slice::from_ref(&task.id)).await?;
    Ok(LoadedTask {
        assignees: links.assignees.remove(&task.id).unwrap_or_default(),
        verifiers: links.verifiers.remove(&task.id).unwrap_or_default(),
        task,
    })
}

/// Loads a series master the actor may manage.
/// Un-hides every child of `master_id`, including those whose day passed
/// while the series was paused.
async fn show_hidden_children<C: ConnectionTrait>(db: &C, master_id: &str) -> Result<u64, DbErr> {
    Ok(task::Entity::update_many()
        .col_expr(task::Column::IsHidden, Expr::value(false))
        .filter(task::Column::RecurrenceMasterTaskId.eq(master_id))
        .filter(task::Column::IsHidden.eq(true))
        .exec(db)
        .await?
        .rows_affected)
}

async fn load_master<C: ConnectionTrait>(
    db: &C,
    actor: &Actor,
    task_id: &str,
) -> Result<task::Model, TaskServiceError> {
    let task = task::Entity::find_by_id(task_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| TaskServiceError::NotFound(task_id.to_string()))?;
    if !task.is_recurring || task.recurrence_master_task_id.is_some() {
        return Err(TaskServiceError::NotRecurrenceMaster);
    }
    if !actor.can_manage_recurrence(&task) {
        return Err(TaskServiceError::Forbidden("manage the recurrence of"));
    }
    Ok(task)
}

async fn load_links<C: ConnectionTrait>(db: &C, task_ids: &[String]) -> Result<TaskLinks, DbErr> {
    let mut links = TaskLinks::default();
    if task_ids.is_empty() {
        return Ok(links);
    }
    for link in task_assignee::Entity::find()
        .filter(task_assignee::Column::TaskId.is_in(task_ids.iter().cloned()))
        .order_by_asc(task_assignee::Column::UserId)
        .all(db)
        .await?
    {
        links.assignees.entry(link.task_id).or_default().push(link.user_id);
    }
    for link in task_verifier::Entity::find()
        .filter(task_verifier::Column::TaskId.is_in(task_ids.iter().cloned()))
        .order_by_asc(task_verifier::Column::UserId)
        .all(db)
        .await?
    {
        links.verifiers.entry(link.task_id).or_default().push(link.user_id);
    }
    Ok(links)
}

async fn ensure_users_exist<'i, C: ConnectionTrait>(
    db: &C,
    user_ids: impl Iterator<Item = &'i i32>,
) -> Result<(), TaskServiceError> {
    let wanted = unique_ids(&user_ids.copied().collect::<Vec<_>>());
    if wanted.is_empty() {
        return Ok(());
    }
    let existing: Vec<i32> = user::Entity::find()
        .filter(user::Column::Id.is_in(wanted.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|model| model.id)
        .collect();
    match wanted.into_iter().find(|id| !existing.contains(id)) {
        Some(missing) => Err(TaskServiceError::UnknownUser(missing)),
        None => Ok(()),
    }
}

async fn link_users<C: ConnectionTrait>(
    db: &C,
    task_ids: &[String],
    assignee_ids: &[i32],
    verifier_ids: &[i32],
) -> Result<(), DbErr> {
    let assignees: Vec<task_assignee::ActiveModel> = task_ids
        .iter()
        .flat_map(|task_id| {
            assignee_ids.iter().map(move |user_id| task_assignee::ActiveModel {
                task_id: ActiveValue::Set(task_id.clone()),
                user_id: ActiveValue::Set(*user_id),
            })
        })
        .collect();
    if !assignees.is_empty() {
        task_assignee::Entity::insert_many(assignees).exec(db).await?;
    }
    let verifiers: Vec<task_verifier::ActiveModel> = task_ids
        .iter()
        .flat_map(|task_id| {
            verifier_ids.iter().map(move |user_id| task_verifier::ActiveModel {
                task_id: ActiveValue::Set(task_id.clone()),
                user_id: ActiveValue::Set(*user_id),
            })
        })
        .collect();
    if !verifiers.is_empty() {
        task_verifier::Entity::insert_many(verifiers).exec(db).await?;
    }
    Ok(())
}

/// Tasks an update with `scope` applies to, starting from `task`.
async fn scope_targets<C: ConnectionTrait>(
    db: &C,
    task: &task::Model,
    scope: ApplyScope,
) -> Result<Vec<task::Model>, DbErr> {
    let master_id = match &task.recurrence_master_task_id {
        Some(master_id) => Some(master_id.clone()),
        None if task.is_recurring => Some(task.id.clone()),
        None => None,
    };
    let Some(master_id) = master_id.filter(|_| scope != ApplyScope::Single) else {
        return Ok(vec![task.clone()]);
    };

    let series = Condition::any()
        .add(task::Column::Id.eq(master_id.clone()))
        .add(task::Column::RecurrenceMasterTaskId.eq(master_id.clone()));
    let mut targets = match scope {
        ApplyScope::Future => {
            let mut query = task::Entity::find()
                .filter(series)
                .filter(task::Column::Status.ne(TaskStatus::Done))
                .filter(task::Column::Id.ne(task.id.clone()));
            if let Some(due_date) = task.due_date {
                query = query.filter(task::Column::DueDate.gte(due_date));
            }
            let mut targets = vec![task.clone()];
            targets.extend(query.all(db).await?);
            targets
        }
        _ => {
            let mut targets: Vec<task::Model> = task::Entity::find_by_id(master_id.clone())
                .one(db)
                .await?
                .into_iter()
                .collect();
            targets.extend(
                task::Entity::find()
                    .filter(task::Column::RecurrenceMasterTaskId.eq(master_id))
                    .filter(task::Column::Status.ne(TaskStatus::Done))
                    .all(db)
                    .await?,
            );
            targets
        }
    };
    targets.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
    Ok(targets)
}

/// Deadline used by clients for display, `None` without a due date.
pub fn due_at(task: &task::Model) -> Option<DateTime<Utc>> {
    let due_date = task.due_date?;
    let due_time = task.due_time.unwrap_or(NaiveTime::MIN);
    due_date
        .and_time(due_time)
        .and_local_timezone(Local)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
