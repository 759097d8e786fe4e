//! Create device_endpoint table for push destinations.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeviceEndpoint::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceEndpoint::TokenHash)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeviceEndpoint::UserId).string().not_null())
                    .col(ColumnDef::new(DeviceEndpoint::TenantId).string().not_null())
                    .col(
                        ColumnDef::new(DeviceEndpoint::SubscriptionPayload)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceEndpoint::DeviceType)
                            .string_len(16)
                            .not_null()
                            .default("web"),
                    )
                    .col(ColumnDef::new(DeviceEndpoint::UserAgent).string().null())
                    .col(
                        ColumnDef::new(DeviceEndpoint::LastActiveAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceEndpoint::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceEndpoint::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Fan-out always looks devices up by owner
        manager
            .create_index(
                Index::create()
                    .name("idx_device_endpoint_owner")
                    .table(DeviceEndpoint::Table)
                    .col(DeviceEndpoint::UserId)
                    .col(DeviceEndpoint::TenantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeviceEndpoint::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum DeviceEndpoint {
    Table,
    TokenHash,
    UserId,
    TenantId,
    SubscriptionPayload,
    DeviceType,
    UserAgent,
    LastActiveAt,
    CreatedAt,
    UpdatedAt,
}
