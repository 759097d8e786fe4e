//! Create webhook_subscription table for provider watch channels.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookSubscription::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookSubscription::ChannelId)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::TenantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::Provider)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::ResourceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::ExternalCalendarId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::ChannelToken)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscription::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One live channel per watched calendar
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_subscription_owner_calendar")
                    .table(WebhookSubscription::Table)
                    .col(WebhookSubscription::UserId)
                    .col(WebhookSubscription::TenantId)
                    .col(WebhookSubscription::ExternalCalendarId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Renewal scans by expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_subscription_expires_at")
                    .table(WebhookSubscription::Table)
                    .col(WebhookSubscription::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WebhookSubscription::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum WebhookSubscription {
    Table,
    ChannelId,
    UserId,
    TenantId,
    Provider,
    ResourceId,
    ExternalCalendarId,
    ChannelToken,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}
