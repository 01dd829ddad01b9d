use crate::entities::*;
use sea_orm::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub mod api;

#[derive(Clone, Debug)]
pub struct RegistryState {
    pub db: Arc<DatabaseConnection>,
}

/// A platform module as seen by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleView {
    pub id: String,
    pub name: String,
    pub title: String,
    pub path: String,
    pub order: i32,
    pub is_primary: bool,
    pub has_access: bool,
    pub permissions: BTreeMap<String, bool>,
}

/// Error type for RegistryService operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryServiceError {
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),
    #[error("Ordered ids must include all modules without duplicates")]
    InvalidOrder,
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub struct RegistryService<'a> {
    db: &'a DatabaseConnection,
}

impl RegistryService<'_> {
    pub fn new(db: &DatabaseConnection) -> RegistryService<'_> {
        RegistryService { db }
    }

    /// Lists every module in `order` with the user's access flag and the
    /// OR-aggregate of permissions across the user's roles.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<ModuleView>, RegistryServiceError> {
        let modules = self.list_modules().await?;
        let role_ids: Vec<i32> = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(user_id))
            .all(self.db)
            .await?
            .into_iter()
            .map(|link| link.role_id)
            .collect();

        let mut accessible: HashSet<String> = HashSet::new();
        let mut permissions_by_module: BTreeMap<String, BTreeMap<String, bool>> = BTreeMap::new();
        if !role_ids.is_empty() {
            for link in role_module::Entity::find()
                .filter(role_module::Column::RoleId.is_in(role_ids.clone()))
                .all(self.db)
                .await?
            {
                accessible.insert(link.module_id);
            }
            for row in role_module_permission::Entity::find()
                .filter(role_module_permission::Column::RoleId.is_in(role_ids))
                .all(self.db)
                .await?
            {
                let allowed = permissions_by_module
                    .entry(row.module_id)
                    .or_default()
                    .entry(row.permission)
                    .or_insert(false);
                *allowed = *allowed || row.is_allowed;
            }
        }

        Ok(modules
            .into_iter()
            .map(|module| ModuleView {
                has_access: accessible.contains(&module.id),
                permissions: permissions_by_module.remove(&module.id).unwrap_or_default(),
                id: module.id,
                name: module.name,
                title: module.title,
                path: module.path,
                order: module.order,
                is_primary: module.is_primary,
            })
            .collect())
    }

    /// Marks one module as primary, or clears the flag everywhere for `None`.
    #[tracing::instrument(skip(self))]
    pub async fn set_primary(&self, module_id: Option<&str>) -> Result<(), RegistryServiceError> {
        let modules = self.list_modules().await?;
        if let Some(module_id) = module_id {
            if !modules.iter().any(|module| module.id == module_id) {
                return Err(RegistryServiceError::ModuleNotFound(module_id.to_string()));
            }
        }

        let txn = self.db.begin().await?;
        for module in modules {
            let is_primary = module_id == Some(module.id.as_str());
            if module.is_primary != is_primary {
                let mut active_model: platform_module::ActiveModel = module.into();
                active_model.is_primary = ActiveValue::Set(is_primary);
                active_model.update(&txn).await?;
            }
        }
        txn.commit().await?;
        Ok(())
    }

    /// Rewrites `order` from the position of each id. The ids must be a
    /// permutation of every module id.
    #[tracing::instrument(skip(self))]
    pub async fn reorder(&self, ordered_ids: &[String]) -> Result<(), RegistryServiceError> {
        let modules = self.list_modules().await?;
        let wanted: HashSet<&str> = ordered_ids.iter().map(String::as_str).collect();
        let known: HashSet<&str> = modules.iter().map(|module| module.id.as_str()).collect();
        if wanted.len() != ordered_ids.len() || wanted != known {
            return Err(RegistryServiceError::InvalidOrder);
        }

        let mut by_id: BTreeMap<String, platform_module::Model> = modules
            .into_iter()
            .map(|module| (module.id.clone(), module))
            .collect();
        let txn = self.db.begin().await?;
        for (index, module_id) in ordered_ids.iter().enumerate() {
            if let Some(module) = by_id.remove(module_id) {
                let mut active_model: platform_module::ActiveModel = module.into();
                active_model.order = ActiveValue::Set(index as i32);
                active_model.update(&txn).await?;
            }
        }
        txn.commit().await?;
        Ok(())
    }

    async fn list_modules(&self) -> Result<Vec<platform_module::Model>, RegistryServiceError> {
        Ok(platform_module::Entity::find()
            .order_by_asc(platform_module::Column::Order)
            .all(self.db)
            .await?)
    }
}
