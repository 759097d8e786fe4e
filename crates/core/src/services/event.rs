//! Notification events and the vocabulary shared by every trigger.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Notification category; each has its own preference toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// Upcoming calendar events
    Calendar,
    /// Bank transactions and payments
    Banking,
    /// Operator and system messages
    System,
    /// Row changes from a connected database
    DataChange,
}

impl NotificationCategory {
    /// Wire name of the category
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Banking => "banking",
            Self::System => "system",
            Self::DataChange => "data_change",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event priority. Ordered, so escalation rules can compare.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Push only
    Low,
    /// Push and email (default)
    #[default]
    Normal,
    /// Push, email and chat
    High,
    /// Same channels as high
    Urgent,
}

impl Priority {
    /// Wire name of the priority
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outward delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Web push
    Push,
    /// SMTP email
    Email,
    /// Chat gateway message
    Chat,
}

impl Channel {
    /// Wire name of the channel
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Email => "email",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "email" => Ok(Self::Email),
            "chat" | "whatsapp" => Ok(Self::Chat),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Input to the dispatcher.
///
/// Built by the manual endpoints and by the webhook mapper; never
/// persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Category; serialized as `type`
    #[serde(rename = "type")]
    pub notification_type: NotificationCategory,
    /// Short title
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Body text
    #[validate(length(max = 4000))]
    pub body: String,
    /// Priority, `normal` when omitted
    #[serde(default)]
    pub priority: Priority,
    /// Free-form data passed through to clients
    #[serde(default)]
    pub data: Value,
    /// Recipient user
    #[validate(length(min = 1, max = 128))]
    pub target_user_id: String,
    /// Recipient tenant
    #[validate(length(min = 1, max = 128))]
    pub target_tenant_id: String,
    /// Explicit channel list; bypasses priority-based selection.
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
}

impl NotificationEvent {
    /// Event for `(user, tenant)` with default priority and no data.
    #[must_use]
    pub fn new(
        notification_type: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            body: body.into(),
            priority: Priority::Normal,
            data: Value::Object(serde_json::Map::new()),
            target_user_id: user_id.into(),
            target_tenant_id: tenant_id.into(),
            channels: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach structured data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Pin the channel list.
    #[must_use]
    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = Some(channels);
        self
    }
}
