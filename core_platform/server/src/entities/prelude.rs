pub use super::calendar_day_summary::Entity as CalendarDaySummary;
pub use super::domain_event::Entity as DomainEvent;
pub use super::platform_module::Entity as PlatformModule;
pub use super::role::Entity as Role;
pub use super::role_module::Entity as RoleModule;
pub use super::role_module_permission::Entity as RoleModulePermission;
pub use super::task::Entity as Task;
pub use super::task_assignee::Entity as TaskAssignee;
pub use super::task_folder::Entity as TaskFolder;
pub use super::task_verifier::Entity as TaskVerifier;
pub use super::user::Entity as User;
pub use super::user_role::Entity as UserRole;
pub use super::user_sidebar_settings::Entity as UserSidebarSettings;
