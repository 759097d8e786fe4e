//! Webhook subscription entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A provider-side watch channel this system created.
///
/// Inbound notifications carry only the channel id; ownership is always
/// taken from this row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_subscription")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Watch channel id we chose when subscribing
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_id: String,

    /// Owning user
    #[sea_orm(indexed)]
    pub user_id: String,

    /// Owning tenant
    pub tenant_id: String,

    /// Provider name, e.g. "google_calendar"
    pub provider: String,

    /// Provider resource id, needed to stop the channel
    pub resource_id: String,

    /// Calendar being watched, e.g. "primary"
    pub external_calendar_id: String,

    /// Secret the provider echoes back on every notification
    #[serde(skip_serializing)]
    pub channel_token: String,

    /// When the provider stops sending notifications
    pub expires_at: DateTimeWithTimeZone,

    /// Timestamp of the first subscription
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last renewal
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

/// Relationships (none).
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
