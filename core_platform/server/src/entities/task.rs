use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::{RecurrenceState, RecurrenceType, TaskPriority, TaskStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub due_date: Option<Date>,
    pub due_time: Option<Time>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_by_user_id: i32,
    pub created_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
    pub verified_at: Option<DateTimeUtc>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub is_recurring: bool,
    pub recurrence_type: Option<RecurrenceType>,
    pub recurrence_interval: Option<i32>,
    pub recurrence_days_of_week: Option<Json>,
    pub recurrence_end_date: Option<Date>,
    pub recurrence_master_task_id: Option<String>,
    pub recurrence_state: Option<RecurrenceState>,
    pub is_hidden: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
