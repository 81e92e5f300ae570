use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxMessages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::MessageId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OutboxMessages::Exchange).string().not_null())
                    .col(ColumnDef::new(OutboxMessages::RoutingKey).string().not_null())
                    .col(ColumnDef::new(OutboxMessages::Payload).binary().not_null())
                    .col(ColumnDef::new(OutboxMessages::Headers).json_binary())
                    .col(
                        ColumnDef::new(OutboxMessages::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxMessages::SentAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(OutboxMessages::Error).text())
                    .col(
                        ColumnDef::new(OutboxMessages::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(OutboxMessages::NextAttemptAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Relay claim query: status + created_at ordering.
        manager
            .create_index(
                Index::create()
                    .table(OutboxMessages::Table)
                    .col(OutboxMessages::Status)
                    .col(OutboxMessages::CreatedAt)
                    .name("idx_outbox_messages_status_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OutboxMessages::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OutboxMessages {
    Table,
    Id,
    MessageId,
    Exchange,
    RoutingKey,
    Payload,
    Headers,
    Status,
    CreatedAt,
    SentAt,
    Error,
    RetryCount,
    NextAttemptAt,
}
