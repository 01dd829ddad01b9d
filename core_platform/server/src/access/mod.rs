use crate::auth::User;
use crate::entities::*;
use sea_orm::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub mod api;

/// Permissions every role is offered for a module before any are stored.
pub fn default_permissions(module_id: &str) -> &'static [&'static str] {
    match module_id {
        "admin" | "tasks" => &["view", "create", "edit", "delete"],
        _ => &[],
    }
}

/// Whether any role held by the user carries `can_manage_access`.
pub async fn user_can_manage_access<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<bool, DbErr> {
    let role_ids: Vec<i32> = user_role::Entity::find()
        .filter(user_role::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|link| link.role_id)
        .collect();
    if role_ids.is_empty() {
        return Ok(false);
    }
    let managing = role::Entity::find()
        .filter(role::Column::Id.is_in(role_ids))
        .filter(role::Column::CanManageAccess.eq(true))
        .count(db)
        .await?;
    Ok(managing > 0)
}

#[derive(Clone, Debug)]
pub struct AccessState {
    pub db: Arc<DatabaseConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub can_manage_access: bool,
    pub module_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub name: String,
    pub is_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleModulePermissions {
    pub role_id: i32,
    pub module_id: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWithRoles {
    pub id: i32,
    pub username: String,
    pub role_ids: Vec<i32>,
}

/// Users touched by an access change, so an operator can ask them to re-login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeImpact {
    pub message: String,
    pub affected_users: Vec<User>,
}

impl ChangeImpact {
    fn new(affected_users: Vec<User>) -> Self {
        Self {
            message: "Changes affect active users".to_string(),
            affected_users,
        }
    }
}

/// How quickly affected users are asked to sign in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionActionMode {
    Now,
    FiveMinutes,
}

impl SessionActionMode {
    pub fn parse(mode: &str) -> Result<Self, AccessServiceError> {
        match mode {
            "now" => Ok(SessionActionMode::Now),
            "5m" => Ok(SessionActionMode::FiveMinutes),
            other => Err(AccessServiceError::UnknownSessionMode(other.to_string())),
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            SessionActionMode::Now => "Affected users must sign in again now",
            SessionActionMode::FiveMinutes => {
                "To keep working, please sign in again within 5 minutes"
            }
        }
    }
}

/// Error type for AccessService operations.
#[derive(Debug, thiserror::Error)]
pub enum AccessServiceError {
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("Role '{0}' already exists")]
    DuplicateRole(String),
    #[error("Role with ID {0} not found")]
    RoleNotFound(i32),
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    #[error("Unknown session action mode '{0}'")]
    UnknownSessionMode(String),
    #[error("{0}")]
    Validation(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub struct AccessService<'a> {
    db: &'a DatabaseConnection,
}

impl AccessService<'_> {
    pub fn new(db: &DatabaseConnection) -> AccessService<'_> {
        AccessService { db }
    }

    /// Fails with `Forbidden` unless the user may administer access.
    #[tracing::instrument(skip(self))]
    pub async fn require_manager(&self, user_id: i32) -> Result<(), AccessServiceError> {
        if user_can_manage_access(self.db, user_id).await? {
            Ok(())
        } else {
            Err(AccessServiceError::Forbidden)
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_roles(&self) -> Result<Vec<Role>, AccessServiceError> {
        let roles = role::Entity::find()
            .order_by_asc(role::Column::Name)
            .all(self.db)
            .await?;
        let mut module_ids_by_role: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for link in role_module::Entity::find().all(self.db).await? {
            module_ids_by_role
                .entry(link.role_id)
                .or_default()
                .push(link.module_id);
        }

        Ok(roles
            .into_iter()
            .map(|model| {
                let mut module_ids = module_ids_by_role.remove(&model.id).unwrap_or_default();
                module_ids.sort();
                Role {
                    id: model.id,
                    name: model.name,
                    can_manage_access: model.can_manage_access,
                    module_ids,
                }
            })
            .collect())
    }

    /// Creates a role with access to every module and every catalogue
    /// permission allowed.
    #[tracing::instrument(skip(self))]
    pub async fn create_role(&self, name: &str) -> Result<Role, AccessServiceError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > 255 {
            return Err(AccessServiceError::Validation(
                "Role name must be between 1 and 255 characters".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let existing = role::Entity::find()
            .filter(role::Column::Name.eq(name))
            .one(&txn)
            .await?;
        if existing.is_some() {
            return Err(AccessServiceError::DuplicateRole(name.to_string()));
        }

        let created = role::ActiveModel {
            name: ActiveValue::Set(name.to_string()),
            can_manage_access: ActiveValue::Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut module_ids: Vec<String> = platform_module::Entity::find()
            .all(&txn)
            .await?
            .into_iter()
            .map(|module| module.id)
            .collect();
        module_ids.sort();
        for module_id in &module_ids {
            let catalogue = module_permission_catalogue(&txn, module_id).await?;
            role_module::ActiveModel {
                role_id: ActiveValue::Set(created.id),
                module_id: ActiveValue::Set(module_id.clone()),
            }
            .insert(&txn)
            .await?;
            for permission in catalogue {
                role_module_permission::ActiveModel {
                    role_id: ActiveValue::Set(created.id),
                    module_id: ActiveValue::Set(module_id.clone()),
                    permission: ActiveValue::Set(permission),
                    is_allowed: ActiveValue::Set(true),
                }
                .insert(&txn)
                .await?;
            }
        }
        txn.commit().await?;

        tracing::info!("Created role {}", created.name);
        Ok(Role {
            id: created.id,
            name: created.name,
            can_manage_access: created.can_manage_access,
            module_ids,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_role(&self, role_id: i32) -> Result<(), AccessServiceError> {
        let result = role::Entity::delete_by_id(role_id).exec(self.db).await?;
        if result.rows_affected == 0 {
            return Err(AccessServiceError::RoleNotFound(role_id));
        }
        Ok(())
    }

    /// Modules ordered as in the sidebar.
    #[tracing::instrument(skip(self))]
    pub async fn list_modules(&self) -> Result<Vec<platform_module::Model>, AccessServiceError> {
        Ok(platform_module::Entity::find()
            .order_by_asc(platform_module::Column::Order)
            .all(self.db)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_module_access(
        &self,
        role_id: i32,
        module_id: &str,
        has_access: bool,
    ) -> Result<ChangeImpact, AccessServiceError> {
        self.ensure_role_and_module(role_id, module_id).await?;

        let existing = role_module::Entity::find_by_id((role_id, module_id.to_string()))
            .one(self.db)
            .await?;
        match (has_access, existing) {
            (true, None) => {
                role_module::ActiveModel {
                    role_id: ActiveValue::Set(role_id),
                    module_id: ActiveValue::Set(module_id.to_string()),
                }
                .insert(self.db)
                .await?;
            }
            (false, Some(link)) => {
                link.delete(self.db).await?;
            }
            _ => {}
        }

        Ok(ChangeImpact::new(self.affected_users(&[role_id]).await?))
    }

    /// Catalogue permissions of a module for a role; rows never stored read
    /// as allowed.
    #[tracing::instrument(skip(self))]
    pub async fn get_permissions(
        &self,
        role_id: i32,
        module_id: &str,
    ) -> Result<RoleModulePermissions, AccessServiceError> {
        self.ensure_role_and_module(role_id, module_id).await?;

        let catalogue = module_permission_catalogue(self.db, module_id).await?;
        let stored: BTreeMap<String, bool> = role_module_permission::Entity::find()
            .filter(role_module_permission::Column::RoleId.eq(role_id))
            .filter(role_module_permission::Column::ModuleId.eq(module_id))
            .all(self.db)
            .await?
            .into_iter()
            .map(|row| (row.permission, row.is_allowed))
            .collect();

        Ok(RoleModulePermissions {
            role_id,
            module_id: module_id.to_string(),
            permissions: catalogue
                .into_iter()
                .map(|name| {
                    let is_allowed = stored.get(&name).copied().unwrap_or(true);
                    Permission { name, is_allowed }
                })
                .collect(),
        })
    }

    /// Replaces the stored permissions of a role for a module.
    #[tracing::instrument(skip(self, permissions))]
    pub async fn update_permissions(
        &self,
        role_id: i32,
        module_id: &str,
        permissions: Vec<Permission>,
    ) -> Result<ChangeImpact, AccessServiceError> {
        self.ensure_role_and_module(role_id, module_id).await?;

        let txn = self.db.begin().await?;
        role_module_permission::Entity::delete_many()
            .filter(role_module_permission::Column::RoleId.eq(role_id))
            .filter(role_module_permission::Column::ModuleId.eq(module_id))
            .exec(&txn)
            .await?;
        let mut by_name: BTreeMap<String, bool> = BTreeMap::new();
        for permission in permissions {
            by_name.insert(permission.name, permission.is_allowed);
        }
        for (permission, is_allowed) in by_name {
            role_module_permission::ActiveModel {
                role_id: ActiveValue::Set(role_id),
                module_id: ActiveValue::Set(module_id.to_string()),
                permission: ActiveValue::Set(permission),
                is_allowed: ActiveValue::Set(is_allowed),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        Ok(ChangeImpact::new(self.affected_users(&[role_id]).await?))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_users_with_roles(&self) -> Result<Vec<UserWithRoles>, AccessServiceError> {
        let users = user::Entity::find()
            .order_by_asc(user::Column::Username)
            .all(self.db)
            .await?;
        let mut roles_by_user: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for link in user_role::Entity::find().all(self.db).await? {
            roles_by_user.entry(link.user_id).or_default().push(link.role_id);
        }

        Ok(users
            .into_iter()
            .map(|model| {
                let mut role_ids = roles_by_user.remove(&model.id).unwrap_or_default();
                role_ids.sort();
                UserWithRoles {
                    id: model.id,
                    username: model.username,
                    role_ids,
                }
            })
            .collect())
    }

    /// Replaces the role set of a user.
    #[tracing::instrument(skip(self))]
    pub async fn update_user_roles(
        &self,
        user_id: i32,
        role_ids: &[i32],
    ) -> Result<ChangeImpact, AccessServiceError> {
        user::Entity::find_by_id(user_id)
            .one(self.db)
            .await?
            .ok_or(AccessServiceError::UserNotFound(user_id))?;
        let wanted: BTreeSet<i32> = role_ids.iter().copied().collect();
        let known: BTreeSet<i32> = role::Entity::find()
            .all(self.db)
            .await?
            .into_iter()
            .map(|model| model.id)
            .collect();
        if let Some(missing) = wanted.difference(&known).next() {
            return Err(AccessServiceError::RoleNotFound(*missing));
        }

        let txn = self.db.begin().await?;
        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        for role_id in &wanted {
            user_role::ActiveModel {
                user_id: ActiveValue::Set(user_id),
                role_id: ActiveValue::Set(*role_id),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        let wanted: Vec<i32> = wanted.into_iter().collect();
        Ok(ChangeImpact::new(self.affected_users(&wanted).await?))
    }

    /// Distinct holders of any of the roles, ordered by username.
    #[tracing::instrument(skip(self))]
    pub async fn affected_users(&self, role_ids: &[i32]) -> Result<Vec<User>, AccessServiceError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let user_ids: BTreeSet<i32> = user_role::Entity::find()
            .filter(user_role::Column::RoleId.is_in(role_ids.iter().copied()))
            .all(self.db)
            .await?
            .into_iter()
            .map(|link| link.user_id)
            .collect();
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .order_by_asc(user::Column::Username)
            .all(self.db)
            .await?
            .into_iter()
            .map(User::from)
            .collect())
    }

    async fn ensure_role_and_module(
        &self,
        role_id: i32,
        module_id: &str,
    ) -> Result<(), AccessServiceError> {
        role::Entity::find_by_id(role_id)
            .one(self.db)
            .await?
            .ok_or(AccessServiceError::RoleNotFound(role_id))?;
        platform_module::Entity::find_by_id(module_id.to_string())
            .one(self.db)
            .await?
            .ok_or_else(|| AccessServiceError::ModuleNotFound(module_id.to_string()))?;
        Ok(())
    }
}

/// Defaults of the module plus every permission name already stored for it,
/// sorted.
async fn module_permission_catalogue<C: ConnectionTrait>(
    db: &C,
    module_id: &str,
) -> Result<Vec<String>, DbErr> {
    let mut known: BTreeSet<String> = default_permissions(module_id)
        .iter()
        .map(|permission| (*permission).to_owned())
        .collect();
    for row in role_module_permission::Entity::find()
        .filter(role_module_permission::Column::ModuleId.eq(module_id))
        .all(db)
        .await?
    {
        known.insert(row.permission);
    }
    Ok(known.into_iter().collect())
}
