//! Idempotent seed data applied on every start: the module catalogue, the
//! `admin` and `employee` roles, and the configured administrator account.

use crate::access::default_permissions;
use crate::auth::{AuthService, AuthServiceError, DEFAULT_ROLE_NAME};
use crate::config::Config;
use crate::entities::*;
use sea_orm::*;

pub const ADMIN_ROLE_NAME: &str = "admin";

struct ModuleSeed {
    id: &'static str,
    title: &'static str,
    path: &'static str,
    order: i32,
    is_primary: bool,
}

const MODULES: [ModuleSeed; 3] = [
    ModuleSeed {
        id: "help",
        title: "Help",
        path: "/help",
        order: 0,
        is_primary: true,
    },
    ModuleSeed {
        id: "tasks",
        title: "Tasks",
        path: "/tasks",
        order: 1,
        is_primary: false,
    },
    ModuleSeed {
        id: "admin",
        title: "Administration",
        path: "/admin",
        order: 2,
        is_primary: false,
    },
];

const EMPLOYEE_MODULES: [&str; 2] = ["help", "tasks"];

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Could not create the administrator: {0}")]
    Admin(#[from] AuthServiceError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Seeds missing rows. Existing modules, roles and grants are left as the
/// administrators last saved them.
#[tracing::instrument(skip(db, config))]
pub async fn run(db: &DatabaseConnection, config: &Config) -> Result<(), BootstrapError> {
    seed_modules(db).await?;

    let admin_role = ensure_role(db, ADMIN_ROLE_NAME, true).await?;
    let employee_role = ensure_role(db, DEFAULT_ROLE_NAME, false).await?;
    for module in &MODULES {
        grant_module(db, admin_role.id, module.id).await?;
    }
    for module_id in EMPLOYEE_MODULES {
        grant_module(db, employee_role.id, module_id).await?;
    }

    let admin = AuthService::new(db)
        .ensure_user(&config.admin_username, &config.admin_password)
        .await?;
    let assigned = user_role::Entity::find_by_id((admin.id, admin_role.id))
        .one(db)
        .await?;
    if assigned.is_none() {
        user_role::ActiveModel {
            user_id: ActiveValue::Set(admin.id),
            role_id: ActiveValue::Set(admin_role.id),
        }
        .insert(db)
        .await?;
        tracing::info!("Granted {} to {}", ADMIN_ROLE_NAME, admin.username);
    }
    Ok(())
}

async fn seed_modules(db: &DatabaseConnection) -> Result<(), DbErr> {
    for seed in &MODULES {
        if platform_module::Entity::find_by_id(seed.id.to_string())
            .one(db)
            .await?
            .is_some()
        {
            continue;
        }
        platform_module::ActiveModel {
            id: ActiveValue::Set(seed.id.to_string()),
            name: ActiveValue::Set(seed.id.to_string()),
            title: ActiveValue::Set(seed.title.to_string()),
            path: ActiveValue::Set(seed.path.to_string()),
            order: ActiveValue::Set(seed.order),
            is_primary: ActiveValue::Set(seed.is_primary),
        }
        .insert(db)
        .await?;
        tracing::info!("Registered module {}", seed.id);
    }
    Ok(())
}

async fn ensure_role(
    db: &DatabaseConnection,
    name: &str,
    can_manage_access: bool,
) -> Result<role::Model, DbErr> {
    if let Some(existing) = role::Entity::find()
        .filter(role::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(existing);
    }
    let created = role::ActiveModel {
        name: ActiveValue::Set(name.to_string()),
        can_manage_access: ActiveValue::Set(can_manage_access),
        ..Default::default()
    }
    .insert(db)
    .await?;
    tracing::info!("Created role {}", created.name);
    Ok(created)
}

/// Opens the module to the role and allows its default permissions.
async fn grant_module(db: &DatabaseConnection, role_id: i32, module_id: &str) -> Result<(), DbErr> {
    let opened = role_module::Entity::find_by_id((role_id, module_id.to_string()))
        .one(db)
        .await?;
    if opened.is_none() {
        role_module::ActiveModel {
            role_id: ActiveValue::Set(role_id),
            module_id: ActiveValue::Set(module_id.to_string()),
        }
        .insert(db)
        .await?;
    }
    for permission in default_permissions(module_id) {
        let stored = role_module_permission::Entity::find_by_id((
            role_id,
            module_id.to_string(),
            (*permission).to_owned(),
        ))
        .one(db)
        .await?;
        if stored.is_none() {
            role_module_permission::ActiveModel {
                role_id: ActiveValue::Set(role_id),
                module_id: ActiveValue::Set(module_id.to_string()),
                permission: ActiveValue::Set((*permission).to_owned()),
                is_allowed: ActiveValue::Set(true),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(())
}
