//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250601_000001_create_device_endpoint_table;
mod m20250601_000002_create_delivery_preference_table;
mod m20250601_000003_create_delivery_record_table;
mod m20250601_000004_create_webhook_subscription_table;
mod m20250601_000005_create_feed_connection_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_device_endpoint_table::Migration),
            Box::new(m20250601_000002_create_delivery_preference_table::Migration),
            Box::new(m20250601_000003_create_delivery_record_table::Migration),
            Box::new(m20250601_000004_create_webhook_subscription_table::Migration),
            Box::new(m20250601_000005_create_feed_connection_table::Migration),
        ]
    }
}
