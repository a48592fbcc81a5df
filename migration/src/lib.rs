pub use sea_orm_migration::prelude::*;

mod m20220101_000001_create_table;
mod m20251201_000001_create_task_tables;
mod m20251201_000002_create_market_data;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20220101_000001_create_table::Migration),
            Box::new(m20251201_000001_create_task_tables::Migration),
            Box::new(m20251201_000002_create_market_data::Migration),
        ]
    }
}
