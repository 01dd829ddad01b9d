use sea_orm_migration::prelude::*;

use crate::m20250901_000001_create_auth_users::AuthUsers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserSidebarSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserSidebarSettings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserSidebarSettings::UserId)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(UserSidebarSettings::ModulesOrder).json().null())
                    .col(
                        ColumnDef::new(UserSidebarSettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UserSidebarSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_sidebar_settings_user_id")
                            .from(UserSidebarSettings::Table, UserSidebarSettings::UserId)
                            .to(AuthUsers::Table, AuthUsers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserSidebarSettings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserSidebarSettings {
    Table,
    Id,
    UserId,
    ModulesOrder,
    CreatedAt,
    UpdatedAt,
}
