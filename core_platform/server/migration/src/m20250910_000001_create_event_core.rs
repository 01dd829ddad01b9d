use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DomainEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DomainEvents::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DomainEvents::Type).string_len(128).not_null())
                    .col(ColumnDef::new(DomainEvents::Entity).string_len(64).not_null())
                    .col(ColumnDef::new(DomainEvents::EntityId).string_len(64).not_null())
                    .col(ColumnDef::new(DomainEvents::Payload).json().not_null())
                    .col(
                        ColumnDef::new(DomainEvents::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_domain_events_type")
                    .table(DomainEvents::Table)
                    .col(DomainEvents::Type)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_domain_events_entity_id")
                    .table(DomainEvents::Table)
                    .col(DomainEvents::Entity)
                    .col(DomainEvents::EntityId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CalendarDaySummary::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CalendarDaySummary::Day)
                            .date()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CalendarDaySummary::EventsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CalendarDaySummary::LastEventAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CalendarDaySummary::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DomainEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DomainEvents {
    Table,
    Id,
    Type,
    Entity,
    EntityId,
    Payload,
    OccurredAt,
}

#[derive(DeriveIden)]
enum CalendarDaySummary {
    Table,
    Day,
    EventsCount,
    LastEventAt,
}
