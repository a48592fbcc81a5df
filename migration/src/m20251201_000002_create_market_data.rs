use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MarketData::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MarketData::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(MarketData::Exchange).string_len(64).not_null())
                    .col(ColumnDef::new(MarketData::Pair).string_len(64).not_null())
                    .col(ColumnDef::new(MarketData::Timeframe).string_len(16).not_null())
                    .col(ColumnDef::new(MarketData::MarketType).string_len(16).not_null())
                    .col(ColumnDef::new(MarketData::Status).string_len(16).not_null())
                    .col(ColumnDef::new(MarketData::FilePath).text().null())
                    .col(ColumnDef::new(MarketData::StartTime).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(MarketData::EndTime).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(MarketData::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(MarketData::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // One row per downloaded series
        manager
            .create_index(
                Index::create()
                    .name("idx_market_data_series")
                    .table(MarketData::Table)
                    .col(MarketData::Exchange)
                    .col(MarketData::Pair)
                    .col(MarketData::Timeframe)
                    .col(MarketData::MarketType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DataDownloadJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DataDownloadJobs::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(DataDownloadJobs::Exchange).string_len(64).not_null())
                    .col(ColumnDef::new(DataDownloadJobs::Pairs).json().not_null())
                    .col(ColumnDef::new(DataDownloadJobs::Timeframes).json().not_null())
                    .col(ColumnDef::new(DataDownloadJobs::MarketType).string_len(16).not_null())
                    .col(ColumnDef::new(DataDownloadJobs::TimerangeStart).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(DataDownloadJobs::TimerangeEnd).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(DataDownloadJobs::Status).string_len(16).not_null())
                    .col(ColumnDef::new(DataDownloadJobs::Logs).text().not_null())
                    .col(ColumnDef::new(DataDownloadJobs::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(DataDownloadJobs::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DataDownloadJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MarketData::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MarketData {
    Table,
    Id,
    Exchange,
    Pair,
    Timeframe,
    MarketType,
    Status,
    FilePath,
    StartTime,
    EndTime,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DataDownloadJobs {
    Table,
    Id,
    Exchange,
    Pairs,
    Timeframes,
    MarketType,
    TimerangeStart,
    TimerangeEnd,
    Status,
    Logs,
    CreatedAt,
    UpdatedAt,
}
