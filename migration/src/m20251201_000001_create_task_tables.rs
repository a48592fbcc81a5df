use sea_orm_migration::prelude::*;

use crate::m20220101_000001_create_table::{Configs, Strategies};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Hyperopt runs come first: backtests may point back at the run that produced them
        manager
            .create_table(
                Table::create()
                    .table(HyperoptTasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(HyperoptTasks::Id).string_len(36).not_null().primary_key())
                    .col(ColumnDef::new(HyperoptTasks::StrategyId).integer().not_null())
                    .col(ColumnDef::new(HyperoptTasks::ConfigId).integer().not_null())
                    .col(ColumnDef::new(HyperoptTasks::Epochs).integer().not_null())
                    .col(ColumnDef::new(HyperoptTasks::Spaces).string().not_null())
                    .col(ColumnDef::new(HyperoptTasks::LossFunction).string().not_null())
                    .col(ColumnDef::new(HyperoptTasks::Timerange).string().null())
                    .col(ColumnDef::new(HyperoptTasks::JobWorkers).integer().null())
                    .col(ColumnDef::new(HyperoptTasks::Status).string_len(16).not_null())
                    .col(ColumnDef::new(HyperoptTasks::BestResult).json().null())
                    .col(ColumnDef::new(HyperoptTasks::ResultsPath).text().null())
                    .col(ColumnDef::new(HyperoptTasks::LogPath).text().null())
                    .col(ColumnDef::new(HyperoptTasks::Logs).text().not_null())
                    .col(ColumnDef::new(HyperoptTasks::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(HyperoptTasks::UpdatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(HyperoptTasks::CompletedAt).timestamp_with_time_zone().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hyperopt_tasks_strategy")
                            .from(HyperoptTasks::Table, HyperoptTasks::StrategyId)
                            .to(Strategies::Table, Strategies::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hyperopt_tasks_config")
                            .from(HyperoptTasks::Table, HyperoptTasks::ConfigId)
                            .to(Configs::Table, Configs::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BacktestTasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BacktestTasks::Id).string_len(36).not_null().primary_key())
                    .col(ColumnDef::new(BacktestTasks::Name).string().not_null())
                    .col(ColumnDef::new(BacktestTasks::Status).string_len(16).not_null())
                    .col(ColumnDef::new(BacktestTasks::StrategyId).integer().not_null())
                    .col(ColumnDef::new(BacktestTasks::ConfigId).integer().not_null())
                    .col(ColumnDef::new(BacktestTasks::Timeframe).string_len(16).not_null())
                    .col(ColumnDef::new(BacktestTasks::TimerangeStart).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(BacktestTasks::TimerangeEnd).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(BacktestTasks::ResultsSummary).json().null())
                    .col(ColumnDef::new(BacktestTasks::RawOutputPath).text().null())
                    .col(ColumnDef::new(BacktestTasks::CandleDataFile).text().null())
                    .col(ColumnDef::new(BacktestTasks::PlotProfitUrl).text().null())
                    .col(ColumnDef::new(BacktestTasks::Logs).text().not_null())
                    .col(ColumnDef::new(BacktestTasks::SourceHyperoptTaskId).string_len(36).null())
                    .col(ColumnDef::new(BacktestTasks::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(BacktestTasks::UpdatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(BacktestTasks::CompletedAt).timestamp_with_time_zone().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backtest_tasks_strategy")
                            .from(BacktestTasks::Table, BacktestTasks::StrategyId)
                            .to(Strategies::Table, Strategies::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backtest_tasks_config")
                            .from(BacktestTasks::Table, BacktestTasks::ConfigId)
                            .to(Configs::Table, Configs::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backtest_tasks_hyperopt")
                            .from(BacktestTasks::Table, BacktestTasks::SourceHyperoptTaskId)
                            .to(HyperoptTasks::Table, HyperoptTasks::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BacktestTrades::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BacktestTrades::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(BacktestTrades::BacktestTaskId).string_len(36).not_null())
                    .col(ColumnDef::new(BacktestTrades::Pair).string().not_null())
                    .col(ColumnDef::new(BacktestTrades::OpenDate).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(BacktestTrades::CloseDate).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(BacktestTrades::OpenRate).double().not_null())
                    .col(ColumnDef::new(BacktestTrades::CloseRate).double().not_null())
                    .col(ColumnDef::new(BacktestTrades::Amount).double().not_null())
                    .col(ColumnDef::new(BacktestTrades::StakeAmount).double().not_null())
                    .col(ColumnDef::new(BacktestTrades::ProfitAbs).double().not_null())
                    .col(ColumnDef::new(BacktestTrades::ProfitPct).double().not_null())
                    .col(ColumnDef::new(BacktestTrades::TradeDuration).big_integer().null()) // minutes
                    .col(ColumnDef::new(BacktestTrades::ExitReason).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_backtest_trades_task")
                            .from(BacktestTrades::Table, BacktestTrades::BacktestTaskId)
                            .to(BacktestTasks::Table, BacktestTasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_backtest_trades_task_pair")
                    .table(BacktestTrades::Table)
                    .col(BacktestTrades::BacktestTaskId)
                    .col(BacktestTrades::Pair)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BacktestTrades::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BacktestTasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(HyperoptTasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum HyperoptTasks {
    Table,
    Id,
    StrategyId,
    ConfigId,
    Epochs,
    Spaces,
    LossFunction,
    Timerange,
    JobWorkers,
    Status,
    BestResult,
    ResultsPath,
    LogPath,
    Logs,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum BacktestTasks {
    Table,
    Id,
    Name,
    Status,
    StrategyId,
    ConfigId,
    Timeframe,
    TimerangeStart,
    TimerangeEnd,
    ResultsSummary,
    RawOutputPath,
    CandleDataFile,
    PlotProfitUrl,
    Logs,
    SourceHyperoptTaskId,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum BacktestTrades {
    Table,
    Id,
    BacktestTaskId,
    Pair,
    OpenDate,
    CloseDate,
    OpenRate,
    CloseRate,
    Amount,
    StakeAmount,
    ProfitAbs,
    ProfitPct,
    TradeDuration,
    ExitReason,
}
