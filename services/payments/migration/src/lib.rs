pub use sea_orm_migration::prelude::*;

mod m20250602_000001_create_bills;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        let mut migrations = shopflow_messaging::migration::migrations();
        migrations.push(Box::new(m20250602_000001_create_bills::Migration));
        migrations
    }
}
