use crate::entities::*;
use sea_orm::*;
use std::collections::HashSet;
use std::sync::Arc;

pub mod api;

#[derive(Clone, Debug)]
pub struct SidebarState {
    pub db: Arc<DatabaseConnection>,
}

/// Error type for SidebarService operations.
#[derive(Debug, thiserror::Error)]
pub enum SidebarServiceError {
    #[error("modules_order contains duplicate ids")]
    DuplicateIds,
    #[error("Stored modules_order is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub struct SidebarService<'a> {
    db: &'a DatabaseConnection,
}

impl SidebarService<'_> {
    pub fn new(db: &DatabaseConnection) -> SidebarService<'_> {
        SidebarService { db }
    }

    /// Returns the user's saved module order, `None` when never saved.
    #[tracing::instrument(skip(self))]
    pub async fn modules_order(&self, user_id: i32) -> Result<Option<Vec<String>>, SidebarServiceError> {
        let settings = user_sidebar_settings::Entity::find()
            .filter(user_sidebar_settings::Column::UserId.eq(user_id))
            .one(self.db)
            .await?;
        match settings.and_then(|settings| settings.modules_order) {
            Some(order) => Ok(Some(serde_json::from_value(order)?)),
            None => Ok(None),
        }
    }

    /// Creates or replaces the user's module order.
    #[tracing::instrument(skip(self))]
    pub async fn save_modules_order(
        &self,
        user_id: i32,
        modules_order: Vec<String>,
    ) -> Result<Vec<String>, SidebarServiceError> {
        let unique: HashSet<&String> = modules_order.iter().collect();
        if unique.len() != modules_order.len() {
            return Err(SidebarServiceError::DuplicateIds);
        }

        let now = chrono::Utc::now();
        let stored = serde_json::to_value(&modules_order)?;
        let existing = user_sidebar_settings::Entity::find()
            .filter(user_sidebar_settings::Column::UserId.eq(user_id))
            .one(self.db)
            .await?;
        match existing {
            Some(settings) => {
                let mut active_model: user_sidebar_settings::ActiveModel = settings.into();
                active_model.modules_order = ActiveValue::Set(Some(stored));
                active_model.updated_at = ActiveValue::Set(now);
                active_model.update(self.db).await?;
            }
            None => {
                user_sidebar_settings::ActiveModel {
                    user_id: ActiveValue::Set(user_id),
                    modules_order: ActiveValue::Set(Some(stored)),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                    ..Default::default()
                }
                .insert(self.db)
                .await?;
            }
        }
        Ok(modules_order)
    }
}
