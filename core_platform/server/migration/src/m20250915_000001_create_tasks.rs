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
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tasks::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tasks::Title).string_len(255).not_null())
                    .col(ColumnDef::new(Tasks::Description).text().null())
                    .col(ColumnDef::new(Tasks::DueDate).date().null())
                    .col(ColumnDef::new(Tasks::DueTime).time().null())
                    .col(
                        ColumnDef::new(Tasks::Status)
                            .string_len(32)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Tasks::Priority)
                            .string_len(32)
                            .not_null()
                            .default("normal"),
                    )
                    .col(ColumnDef::new(Tasks::CreatedByUserId).integer().not_null())
                    .col(
                        ColumnDef::new(Tasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tasks::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Tasks::VerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Tasks::SourceType).string_len(128).null())
                    .col(ColumnDef::new(Tasks::SourceId).string_len(128).null())
                    .col(
                        ColumnDef::new(Tasks::IsRecurring)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Tasks::RecurrenceType).string_len(16).null())
                    .col(ColumnDef::new(Tasks::RecurrenceInterval).integer().null())
                    .col(ColumnDef::new(Tasks::RecurrenceDaysOfWeek).json().null())
                    .col(ColumnDef::new(Tasks::RecurrenceEndDate).date().null())
                    .col(
                        ColumnDef::new(Tasks::RecurrenceMasterTaskId)
                            .string_len(36)
                            .null(),
                    )
                    .col(ColumnDef::new(Tasks::RecurrenceState).string_len(16).null())
                    .col(
                        ColumnDef::new(Tasks::IsHidden)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_created_by_user_id")
                            .from(Tasks::Table, Tasks::CreatedByUserId)
                            .to(AuthUsers::Table, AuthUsers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tasks_recurrence_master_task_id")
                            .from(Tasks::Table, Tasks::RecurrenceMasterTaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("ix_tasks_due_date", Tasks::DueDate),
            ("ix_tasks_status", Tasks::Status),
            ("ix_tasks_recurrence_master_task_id", Tasks::RecurrenceMasterTaskId),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(Tasks::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        for (table, task_fk, user_fk) in [
            (
                TaskLinks::TaskAssignees,
                "fk_task_assignees_task_id",
                "fk_task_assignees_user_id",
            ),
            (
                TaskLinks::TaskVerifiers,
                "fk_task_verifiers_task_id",
                "fk_task_verifiers_user_id",
            ),
        ] {
            manager
                .create_table(
                    Table::create()
                        .table(table)
                        .if_not_exists()
                        .col(ColumnDef::new(TaskLinks::TaskId).string_len(36).not_null())
                        .col(ColumnDef::new(TaskLinks::UserId).integer().not_null())
                        .primary_key(Index::create().col(TaskLinks::TaskId).col(TaskLinks::UserId))
                        .foreign_key(
                            ForeignKey::create()
                                .name(task_fk)
                                .from(table, TaskLinks::TaskId)
                                .to(Tasks::Table, Tasks::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name(user_fk)
                                .from(table, TaskLinks::UserId)
                                .to(AuthUsers::Table, AuthUsers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(TaskFolders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskFolders::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskFolders::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(TaskFolders::CreatedByUserId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TaskFolders::FilterJson).json().not_null())
                    .col(
                        ColumnDef::new(TaskFolders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_folders_created_by_user_id")
                            .from(TaskFolders::Table, TaskFolders::CreatedByUserId)
                            .to(AuthUsers::Table, AuthUsers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_task_folders_created_by_user_id")
                    .table(TaskFolders::Table)
                    .col(TaskFolders::CreatedByUserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskFolders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskLinks::TaskVerifiers).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskLinks::TaskAssignees).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    Title,
    Description,
    DueDate,
    DueTime,
    Status,
    Priority,
    CreatedByUserId,
    CreatedAt,
    CompletedAt,
    VerifiedAt,
    SourceType,
    SourceId,
    IsRecurring,
    RecurrenceType,
    RecurrenceInterval,
    RecurrenceDaysOfWeek,
    RecurrenceEndDate,
    RecurrenceMasterTaskId,
    RecurrenceState,
    IsHidden,
}

/// Assignee and verifier link tables share one shape.
#[derive(DeriveIden, Clone, Copy)]
enum TaskLinks {
    TaskAssignees,
    TaskVerifiers,
    TaskId,
    UserId,
}

#[derive(DeriveIden)]
enum TaskFolders {
    Table,
    Id,
    Name,
    CreatedByUserId,
    FilterJson,
    CreatedAt,
}
