use crate::entities::sea_orm_active_enums::TaskPriority;
use crate::entities::*;
use chrono::{DateTime, Utc};
use sea_orm::*;
use serde::{Deserialize, Serialize};

/// Recognised keys of a folder's `filter_json`. Unknown keys are kept in the
/// stored JSON and ignored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderFilter {
    pub show_active: bool,
    pub show_overdue: bool,
    pub show_done: bool,
    pub priorities: Option<Vec<TaskPriority>>,
    pub assignee_user_ids: Option<Vec<i32>>,
    pub created_by_me: bool,
    pub only_recurring: bool,
}

impl Default for FolderFilter {
    fn default() -> Self {
        Self {
            show_active: true,
            show_overdue: true,
            show_done: true,
            priorities: None,
            assignee_user_ids: None,
            created_by_me: false,
            only_recurring: false,
        }
    }
}

impl FolderFilter {
    pub fn parse(filter_json: &serde_json::Value) -> Result<Self, FolderServiceError> {
        if !filter_json.is_object() {
            return Err(FolderServiceError::InvalidFilter(
                "filter_json must be an object".to_string(),
            ));
        }
        serde_json::from_value(filter_json.clone())
            .map_err(|err| FolderServiceError::InvalidFilter(err.to_string()))
    }

    /// Whether a task passes the per-task criteria. Section toggles are
    /// applied by the caller.
    pub fn matches(&self, task: &task::Model, assignee_ids: &[i32], user_id: i32) -> bool {
        if self.created_by_me && task.created_by_user_id != user_id {
            return false;
        }
        if self.only_recurring && !(task.is_recurring || task.recurrence_master_task_id.is_some()) {
            return false;
        }
        if let Some(priorities) = &self.priorities {
            if !priorities.is_empty() && !priorities.contains(&task.priority) {
                return false;
            }
        }
        if let Some(wanted) = &self.assignee_user_ids {
            if !wanted.is_empty() && !assignee_ids.iter().any(|id| wanted.contains(id)) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub created_by_user_id: i32,
    pub filter_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<task_folder::Model> for Folder {
    fn from(model: task_folder::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            created_by_user_id: model.created_by_user_id,
            filter_json: model.filter_json,
            created_at: model.created_at,
        }
    }
}

/// Error type for FolderService operations.
#[derive(Debug, thiserror::Error)]
pub enum FolderServiceError {
    #[error("Folder {0} not found")]
    NotFound(String),
    #[error("Folder name must be between 1 and 255 characters")]
    InvalidName,
    #[error("Invalid folder filter: {0}")]
    InvalidFilter(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Saved task views. A folder is only visible to its creator.
pub struct FolderService<'a> {
    db: &'a DatabaseConnection,
}

impl FolderService<'_> {
    pub fn new(db: &DatabaseConnection) -> FolderService<'_> {
        FolderService { db }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user_id: i32) -> Result<Vec<Folder>, FolderServiceError> {
        Ok(task_folder::Entity::find()
            .filter(task_folder::Column::CreatedByUserId.eq(user_id))
            .order_by_desc(task_folder::Column::CreatedAt)
            .all(self.db)
            .await?
            .into_iter()
            .map(Folder::from)
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: i32, folder_id: &str) -> Result<Folder, FolderServiceError> {
        self.find_owned(user_id, folder_id).await.map(Folder::from)
    }

    #[tracing::instrument(skip(self, filter_json))]
    pub async fn create(
        &self,
        user_id: i32,
        name: &str,
        filter_json: serde_json::Value,
    ) -> Result<Folder, FolderServiceError> {
        let name = validate_name(name)?;
        FolderFilter::parse(&filter_json)?;

        let created = task_folder::ActiveModel {
            id: ActiveValue::Set(uuid::Uuid::new_v4().to_string()),
            name: ActiveValue::Set(name),
            created_by_user_id: ActiveValue::Set(user_id),
            filter_json: ActiveValue::Set(filter_json),
            created_at: ActiveValue::Set(Utc::now()),
        }
        .insert(self.db)
        .await?;
        Ok(Folder::from(created))
    }

    #[tracing::instrument(skip(self, filter_json))]
    pub async fn update(
        &self,
        user_id: i32,
        folder_id: &str,
        name: Option<&str>,
        filter_json: Option<serde_json::Value>,
    ) -> Result<Folder, FolderServiceError> {
        let folder = self.find_owned(user_id, folder_id).await?;
        let mut active_model: task_folder::ActiveModel = folder.into();
        if let Some(name) = name {
            active_model.name = ActiveValue::Set(validate_name(name)?);
        }
        if let Some(filter_json) = filter_json {
            FolderFilter::parse(&filter_json)?;
            active_model.filter_json = ActiveValue::Set(filter_json);
        }
        Ok(Folder::from(active_model.update(self.db).await?))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, user_id: i32, folder_id: &str) -> Result<(), FolderServiceError> {
        let folder = self.find_owned(user_id, folder_id).await?;
        folder.delete(self.db).await?;
        Ok(())
    }

    async fn find_owned(
        &self,
        user_id: i32,
        folder_id: &str,
    ) -> Result<task_folder::Model, FolderServiceError> {
        task_folder::Entity::find_by_id(folder_id.to_string())
            .filter(task_folder::Column::CreatedByUserId.eq(user_id))
            .one(self.db)
            .await?
            .ok_or_else(|| FolderServiceError::NotFound(folder_id.to_string()))
    }
}

fn validate_name(name: &str) -> Result<String, FolderServiceError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 255 {
        return Err(FolderServiceError::InvalidName);
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::TaskStatus;
    use serde_json::json;

    fn sample_task() -> task::Model {
        task::Model {
            id: "t-1".to_string(),
            title: "Inventory".to_string(),
            description: None,
            due_date: None,
            due_time: None,
            status: TaskStatus::Active,
            priority: TaskPriority::Urgent,
            created_by_user_id: 1,
            created_at: Utc::now(),
            completed_at: None,
            verified_at: None,
            source_type: None,
            source_id: None,
            is_recurring: false,
            recurrence_type: None,
            recurrence_interval: None,
            recurrence_days_of_week: None,
            recurrence_end_date: None,
            recurrence_master_task_id: None,
            recurrence_state: None,
            is_hidden: false,
        }
    }

    #[test]
    fn can_default_missing_keys_and_ignore_unknown_ones() {
        let filter = FolderFilter::parse(&json!({"show_done": false, "color": "red"})).unwrap();

        assert!(filter.show_active);
        assert!(filter.show_overdue);
        assert!(!filter.show_done);
        assert_eq!(filter.priorities, None);
    }

    #[test]
    fn can_reject_non_object_filter() {
        assert!(matches!(
            FolderFilter::parse(&json!([1, 2])),
            Err(FolderServiceError::InvalidFilter(_))
        ));
        assert!(matches!(
            FolderFilter::parse(&json!({"priorities": ["whenever"]})),
            Err(FolderServiceError::InvalidFilter(_))
        ));
    }

    #[test]
    fn can_match_tasks_against_criteria() {
        let task = sample_task();
        let urgent_only = FolderFilter::parse(&json!({"priorities": ["urgent"]})).unwrap();
        let normal_only = FolderFilter::parse(&json!({"priorities": ["normal"]})).unwrap();
        let mine = FolderFilter::parse(&json!({"created_by_me": true})).unwrap();
        let for_bob = FolderFilter::parse(&json!({"assignee_user_ids": [2]})).unwrap();
        let recurring = FolderFilter::parse(&json!({"only_recurring": true})).unwrap();

        assert!(urgent_only.matches(&task, &[1], 1));
        assert!(!normal_only.matches(&task, &[1], 1));
        assert!(mine.matches(&task, &[1], 1));
        assert!(!mine.matches(&task, &[1], 2));
        assert!(for_bob.matches(&task, &[1, 2], 1));
        assert!(!for_bob.matches(&task, &[1], 1));
        assert!(!recurring.matches(&task, &[1], 1));
    }
}
