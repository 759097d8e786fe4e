//! Device endpoint entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of device a push endpoint belongs to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Browser
    #[sea_orm(string_value = "web")]
    #[default]
    Web,
    /// iOS app
    #[sea_orm(string_value = "ios")]
    Ios,
    /// Android app
    #[sea_orm(string_value = "android")]
    Android,
}

/// One push-capable destination, keyed by the hash of its endpoint URL.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device_endpoint")]
pub struct Model {
    /// SHA-256 of the endpoint URL (hex)
    #[sea_orm(primary_key, auto_increment = false)]
    pub token_hash: String,

    /// Owning user
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Owning tenant
    pub tenant_id: String,

    /// Subscription JSON exactly as the client sent it
    #[sea_orm(column_type = "Text")]
    pub subscription_payload: String,

    /// Device kind
    pub device_type: DeviceType,

    /// User agent of the registering client
    #[sea_orm(nullable)]
    pub user_agent: Option<String>,

    /// Last registration or successful delivery
    pub last_active_at: DateTimeWithTimeZone,

    /// Timestamp when the endpoint was first registered
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the endpoint was last re-registered
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

/// Relationships (none).
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
