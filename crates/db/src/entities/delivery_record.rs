//! Delivery record entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One entry per dispatch call, written after every channel resolved.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_record")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier (ULID)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Recipient user
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Recipient tenant
    pub tenant_id: String,

    /// Notification category ("calendar", "banking", ...)
    #[serde(rename = "type")]
    pub notification_type: String,

    /// Notification title
    pub title: String,

    /// Original body, never the redacted placeholder
    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Event data handed to the client
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,

    /// Priority the event was dispatched with
    pub priority: String,

    /// Per-channel outcomes of the dispatch
    #[sea_orm(column_type = "JsonBinary")]
    pub channels: Json,

    /// Timestamp of the dispatch
    pub sent_at: DateTimeWithTimeZone,

    /// True iff at least one channel or device succeeded
    pub overall_success: bool,

    /// Devices that accepted the push
    pub devices_sent: i32,

    /// Whether the recipient has read it
    pub read: bool,

    /// Timestamp when it was marked read
    #[sea_orm(nullable)]
    pub read_at: Option<DateTimeWithTimeZone>,
}

/// Relationships (none).
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
