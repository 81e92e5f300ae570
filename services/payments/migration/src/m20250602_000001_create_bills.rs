use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bills::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bills::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Bills::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Bills::Balance)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Bills::Balance).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Bills::Currency)
                            .string_len(3)
                            .not_null()
                            .default("RUB"),
                    )
                    .col(
                        ColumnDef::new(Bills::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Bills::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bills::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Charges pick the user's oldest active bill.
        manager
            .create_index(
                Index::create()
                    .table(Bills::Table)
                    .col(Bills::UserId)
                    .col(Bills::Status)
                    .col(Bills::CreatedAt)
                    .name("idx_bills_user_id_status_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bills::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Bills {
    Table,
    Id,
    UserId,
    Balance,
    Currency,
    Status,
    CreatedAt,
    UpdatedAt,
}
