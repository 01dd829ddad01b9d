use sea_orm_migration::prelude::*;

use crate::m20250901_000001_create_auth_users::AuthUsers;
use crate::m20250901_000002_create_platform_modules::PlatformModules;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuthRoles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthRoles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AuthRoles::Name)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(AuthRoles::CanManageAccess)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthUserRoles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuthUserRoles::UserId).integer().not_null())
                    .col(ColumnDef::new(AuthUserRoles::RoleId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(AuthUserRoles::UserId)
                            .col(AuthUserRoles::RoleId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_user_roles_user_id")
                            .from(AuthUserRoles::Table, AuthUserRoles::UserId)
                            .to(AuthUsers::Table, AuthUsers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_user_roles_role_id")
                            .from(AuthUserRoles::Table, AuthUserRoles::RoleId)
                            .to(AuthRoles::Table, AuthRoles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthRoleModules::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuthRoleModules::RoleId).integer().not_null())
                    .col(
                        ColumnDef::new(AuthRoleModules::ModuleId)
                            .string_len(64)
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(AuthRoleModules::RoleId)
                            .col(AuthRoleModules::ModuleId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_role_modules_role_id")
                            .from(AuthRoleModules::Table, AuthRoleModules::RoleId)
                            .to(AuthRoles::Table, AuthRoles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_role_modules_module_id")
                            .from(AuthRoleModules::Table, AuthRoleModules::ModuleId)
                            .to(PlatformModules::Table, PlatformModules::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthRoleModulePermissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthRoleModulePermissions::RoleId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthRoleModulePermissions::ModuleId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthRoleModulePermissions::Permission)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthRoleModulePermissions::IsAllowed)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .primary_key(
                        Index::create()
                            .col(AuthRoleModulePermissions::RoleId)
                            .col(AuthRoleModulePermissions::ModuleId)
                            .col(AuthRoleModulePermissions::Permission),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_role_module_permissions_role_id")
                            .from(
                                AuthRoleModulePermissions::Table,
                                AuthRoleModulePermissions::RoleId,
                            )
                            .to(AuthRoles::Table, AuthRoles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_role_module_permissions_module_id")
                            .from(
                                AuthRoleModulePermissions::Table,
                                AuthRoleModulePermissions::ModuleId,
                            )
                            .to(PlatformModules::Table, PlatformModules::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(AuthRoleModulePermissions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(AuthRoleModules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthUserRoles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthRoles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AuthRoles {
    Table,
    Id,
    Name,
    CanManageAccess,
}

#[derive(DeriveIden)]
enum AuthUserRoles {
    Table,
    UserId,
    RoleId,
}

#[derive(DeriveIden)]
enum AuthRoleModules {
    Table,
    RoleId,
    ModuleId,
}

#[derive(DeriveIden)]
enum AuthRoleModulePermissions {
    Table,
    RoleId,
    ModuleId,
    Permission,
    IsAllowed,
}
