use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    cli::run_cli(shopflow_payments_migration::Migrator).await;
}
