//! Delivery preference entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Delivery policy for one user within one tenant.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_preference")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Owning user
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,

    /// Owning tenant
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: String,

    /// Master switch
    pub enabled: bool,

    /// Calendar reminders
    pub calendar_enabled: bool,
    /// Banking events
    pub banking_enabled: bool,
    /// System notices and test notifications
    pub system_enabled: bool,
    /// Database change feed events
    pub data_change_enabled: bool,

    /// Include body text in push payloads
    pub show_preview: bool,

    /// Hold back notifications between start and end
    pub quiet_hours_enabled: bool,
    /// Local clock time, "HH:MM"
    pub quiet_hours_start: String,
    /// Local clock time, "HH:MM"
    pub quiet_hours_end: String,
    /// IANA zone the quiet hours are expressed in
    pub timezone: String,

    /// Web Push channel
    pub push_enabled: bool,
    /// Email channel
    pub email_enabled: bool,
    /// Chat (WhatsApp gateway) channel
    pub chat_enabled: bool,

    /// Email address used by the email channel
    #[sea_orm(nullable)]
    pub email: Option<String>,
    /// Phone number (E.164) used by the chat channel
    #[sea_orm(nullable)]
    pub phone: Option<String>,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,
    /// Timestamp of the last settings change
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

/// Relationships (none).
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
