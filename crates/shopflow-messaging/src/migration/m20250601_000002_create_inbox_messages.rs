use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InboxMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InboxMessages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InboxMessages::MessageId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(InboxMessages::Queue).string().not_null())
                    .col(ColumnDef::new(InboxMessages::Payload).binary().not_null())
                    .col(
                        ColumnDef::new(InboxMessages::Processed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(InboxMessages::ProcessedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(InboxMessages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InboxMessages::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(InboxMessages::LastError).text())
                    .col(ColumnDef::new(InboxMessages::QuarantinedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(InboxMessages::Table)
                    .col(InboxMessages::Queue)
                    .col(InboxMessages::Processed)
                    .col(InboxMessages::CreatedAt)
                    .name("idx_inbox_messages_queue_processed_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InboxMessages::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum InboxMessages {
    Table,
    Id,
    MessageId,
    Queue,
    Payload,
    Processed,
    ProcessedAt,
    CreatedAt,
    Attempts,
    LastError,
    QuarantinedAt,
}
