pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_auth_users;
mod m20250901_000002_create_platform_modules;
mod m20250903_000001_create_access_control;
mod m20250910_000001_create_event_core;
mod m20250915_000001_create_tasks;
mod m20250922_000001_create_user_sidebar_settings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_auth_users::Migration),
            Box::new(m20250901_000002_create_platform_modules::Migration),
            Box::new(m20250903_000001_create_access_control::Migration),
            Box::new(m20250910_000001_create_event_core::Migration),
            Box::new(m20250915_000001_create_tasks::Migration),
            Box::new(m20250922_000001_create_user_sidebar_settings::Migration),
        ]
    }
}
