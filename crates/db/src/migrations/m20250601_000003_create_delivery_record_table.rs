//! Create delivery_record table for notification history.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryRecord::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryRecord::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryRecord::UserId).string().not_null())
                    .col(ColumnDef::new(DeliveryRecord::TenantId).string().not_null())
                    .col(
                        ColumnDef::new(DeliveryRecord::NotificationType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryRecord::Title).string().not_null())
                    .col(ColumnDef::new(DeliveryRecord::Body).text().not_null())
                    .col(
                        ColumnDef::new(DeliveryRecord::Data)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecord::Priority)
                            .string_len(16)
                            .not_null()
                            .default("normal"),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecord::Channels)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecord::SentAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecord::OverallSuccess)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecord::DevicesSent)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecord::Read)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DeliveryRecord::ReadAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // History listing is newest first per owner
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_record_owner_sent_at")
                    .table(DeliveryRecord::Table)
                    .col(DeliveryRecord::UserId)
                    .col(DeliveryRecord::TenantId)
                    .col(DeliveryRecord::SentAt)
                    .to_owned(),
            )
            .await?;

        // Unread badge counts
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_record_owner_read")
                    .table(DeliveryRecord::Table)
                    .col(DeliveryRecord::UserId)
                    .col(DeliveryRecord::TenantId)
                    .col(DeliveryRecord::Read)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryRecord::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum DeliveryRecord {
    Table,
    Id,
    UserId,
    TenantId,
    NotificationType,
    Title,
    Body,
    Data,
    Priority,
    Channels,
    SentAt,
    OverallSuccess,
    DevicesSent,
    Read,
    ReadAt,
}
