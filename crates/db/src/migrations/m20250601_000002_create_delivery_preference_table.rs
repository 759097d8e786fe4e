//! Create delivery_preference table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryPreference::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryPreference::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryPreference::TenantId)
                            .string()
                            .not_null(),
                    )
                    .col(flag(DeliveryPreference::Enabled, true))
                    .col(flag(DeliveryPreference::CalendarEnabled, true))
                    .col(flag(DeliveryPreference::BankingEnabled, true))
                    .col(flag(DeliveryPreference::SystemEnabled, true))
                    .col(flag(DeliveryPreference::DataChangeEnabled, true))
                    .col(flag(DeliveryPreference::ShowPreview, true))
                    .col(flag(DeliveryPreference::QuietHoursEnabled, false))
                    .col(
                        ColumnDef::new(DeliveryPreference::QuietHoursStart)
                            .string_len(5)
                            .not_null()
                            .default("22:00"),
                    )
                    .col(
                        ColumnDef::new(DeliveryPreference::QuietHoursEnd)
                            .string_len(5)
                            .not_null()
                            .default("08:00"),
                    )
                    .col(
                        ColumnDef::new(DeliveryPreference::Timezone)
                            .string()
                            .not_null()
                            .default("UTC"),
                    )
                    .col(flag(DeliveryPreference::PushEnabled, true))
                    .col(flag(DeliveryPreference::EmailEnabled, false))
                    .col(flag(DeliveryPreference::ChatEnabled, false))
                    .col(ColumnDef::new(DeliveryPreference::Email).string().null())
                    .col(ColumnDef::new(DeliveryPreference::Phone).string().null())
                    .col(
                        ColumnDef::new(DeliveryPreference::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryPreference::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(DeliveryPreference::UserId)
                            .col(DeliveryPreference::TenantId),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryPreference::Table).to_owned())
            .await?;

        Ok(())
    }
}

fn flag(column: DeliveryPreference, default: bool) -> ColumnDef {
    ColumnDef::new(column)
        .boolean()
        .not_null()
        .default(default)
        .to_owned()
}

#[derive(Iden)]
enum DeliveryPreference {
    Table,
    UserId,
    TenantId,
    Enabled,
    CalendarEnabled,
    BankingEnabled,
    SystemEnabled,
    DataChangeEnabled,
    ShowPreview,
    QuietHoursEnabled,
    QuietHoursStart,
    QuietHoursEnd,
    Timezone,
    PushEnabled,
    EmailEnabled,
    ChatEnabled,
    Email,
    Phone,
    CreatedAt,
    UpdatedAt,
}
