//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored --test-threads=1`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `herald_test`)
//!   `TEST_DB_PASSWORD` (default: `herald_test`)
//!   `TEST_DB_NAME` (default: `herald_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::Utc;
use herald_db::entities::{delivery_record, device_endpoint};
use herald_db::repositories::{DeliveryRecordRepository, DeviceEndpointRepository};
use herald_db::test_utils::{TestDatabase, TestDbConfig};
use sea_orm::Set;
use serde_json::json;

fn endpoint(token_hash: &str, user_id: &str, tenant_id: &str) -> device_endpoint::ActiveModel {
    device_endpoint::ActiveModel {
        token_hash: Set(token_hash.to_string()),
        user_id: Set(user_id.to_string()),
        tenant_id: Set(tenant_id.to_string()),
        subscription_payload: Set("{}".to_string()),
        device_type: Set(device_endpoint::DeviceType::Web),
        user_agent: Set(None),
        last_active_at: Set(Utc::now().into()),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
    }
}

fn record(id: &str, user_id: &str, tenant_id: &str) -> delivery_record::ActiveModel {
    delivery_record::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set(user_id.to_string()),
        tenant_id: Set(tenant_id.to_string()),
        notification_type: Set("system".to_string()),
        title: Set("Hello".to_string()),
        body: Set("World".to_string()),
        data: Set(json!({})),
        priority: Set("normal".to_string()),
        channels: Set(json!([])),
        sent_at: Set(Utc::now().into()),
        overall_success: Set(true),
        devices_sent: Set(1),
        read: Set(false),
        read_at: Set(None),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_register_twice_keeps_one_row() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let repo = DeviceEndpointRepository::new(Arc::new(db.conn));

    repo.upsert(endpoint("h1", "u1", "t1")).await.unwrap();
    repo.upsert(endpoint("h1", "u1", "t1")).await.unwrap();

    assert_eq!(repo.find_by_owner("u1", "t1").await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_reregistration_moves_endpoint_to_new_owner() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let repo = DeviceEndpointRepository::new(Arc::new(db.conn));

    repo.upsert(endpoint("h1", "u1", "t1")).await.unwrap();
    repo.upsert(endpoint("h1", "u2", "t1")).await.unwrap();

    assert!(repo.find_by_owner("u1", "t1").await.unwrap().is_empty());
    assert_eq!(repo.find_by_owner("u2", "t1").await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_devices_are_tenant_scoped() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let repo = DeviceEndpointRepository::new(Arc::new(db.conn));

    repo.upsert(endpoint("h1", "u1", "t1")).await.unwrap();

    assert!(repo.find_by_owner("u1", "t2").await.unwrap().is_empty());
    assert_eq!(repo.delete_owned("h1", "u1", "t2").await.unwrap(), 0);
    assert_eq!(repo.delete_owned("h1", "u1", "t1").await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_history_is_tenant_scoped() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let repo = DeliveryRecordRepository::new(Arc::new(db.conn));

    repo.append(record("r1", "u1", "t1")).await.unwrap();

    assert!(repo.list("u1", "t2", 20).await.unwrap().is_empty());
    assert!(!repo.mark_read("r1", "u1", "t2", Utc::now()).await.unwrap());
    assert!(repo.mark_read("r1", "u1", "t1", Utc::now()).await.unwrap());
    assert_eq!(repo.count_unread("u1", "t1").await.unwrap(), 0);
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.username.is_empty());
    assert!(!config.database.is_empty());
}
