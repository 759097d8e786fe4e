//! Create feed_connection table mapping passive feeds to owners.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FeedConnection::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FeedConnection::Source)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FeedConnection::ExternalId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FeedConnection::UserId).string().not_null())
                    .col(ColumnDef::new(FeedConnection::TenantId).string().not_null())
                    .col(
                        ColumnDef::new(FeedConnection::SigningSecret)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FeedConnection::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(FeedConnection::Source)
                            .col(FeedConnection::ExternalId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_feed_connection_owner")
                    .table(FeedConnection::Table)
                    .col(FeedConnection::UserId)
                    .col(FeedConnection::TenantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FeedConnection::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum FeedConnection {
    Table,
    Source,
    ExternalId,
    UserId,
    TenantId,
    SigningSecret,
    CreatedAt,
}
