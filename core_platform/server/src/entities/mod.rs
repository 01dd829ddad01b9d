//! SeaORM entities for the platform schema.

pub mod prelude;

pub mod calendar_day_summary;
pub mod domain_event;
pub mod platform_module;
pub mod role;
pub mod role_module;
pub mod role_module_permission;
pub mod sea_orm_active_enums;
pub mod task;
pub mod task_assignee;
pub mod task_folder;
pub mod task_verifier;
pub mod user;
pub mod user_role;
pub mod user_sidebar_settings;
