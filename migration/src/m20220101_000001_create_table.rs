use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Strategy files registered from user_data/strategies
        manager
            .create_table(
                Table::create()
                    .table(Strategies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Strategies::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Strategies::Filename).string().not_null().unique_key())
                    .col(ColumnDef::new(Strategies::ClassName).string().not_null())
                    .col(ColumnDef::new(Strategies::Description).text().null())
                    .col(ColumnDef::new(Strategies::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Strategies::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Freqtrade JSON configs, parsed content kept in `data`
        manager
            .create_table(
                Table::create()
                    .table(Configs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Configs::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Configs::Name).string().null().unique_key())
                    .col(ColumnDef::new(Configs::Filename).string().not_null().unique_key())
                    .col(ColumnDef::new(Configs::Description).text().null())
                    .col(ColumnDef::new(Configs::Data).json().not_null())
                    .col(ColumnDef::new(Configs::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Configs::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Configs::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Strategies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Strategies {
    Table,
    Id,
    Filename,
    ClassName,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Configs {
    Table,
    Id,
    Name,
    Filename,
    Description,
    Data,
    CreatedAt,
    UpdatedAt,
}
