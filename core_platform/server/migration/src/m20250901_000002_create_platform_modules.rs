use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlatformModules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlatformModules::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlatformModules::Name).string_len(255).not_null())
                    .col(ColumnDef::new(PlatformModules::Title).string_len(255).not_null())
                    .col(ColumnDef::new(PlatformModules::Path).string_len(255).not_null())
                    .col(ColumnDef::new(PlatformModules::Order).integer().not_null())
                    .col(
                        ColumnDef::new(PlatformModules::IsPrimary)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlatformModules::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum PlatformModules {
    Table,
    Id,
    Name,
    Title,
    Path,
    Order,
    IsPrimary,
}
