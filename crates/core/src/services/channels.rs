//! Channel adapters for non-push delivery.
//!
//! Each adapter wraps one outward channel behind [`ChannelAdapter`]. A
//! failure is returned as an error for that channel only; the dispatcher
//! turns it into an outcome and never lets it reach sibling channels.

use async_trait::async_trait;
use herald_common::AppResult;
use serde_json::Value;

use super::event::{Channel, NotificationCategory, Priority};

/// Who a channel message goes to.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Target user
    pub user_id: String,
    /// Target tenant
    pub tenant_id: String,
    /// Address from the user's preferences
    pub email: Option<String>,
    /// Phone number from the user's preferences
    pub phone: Option<String>,
}

/// What a channel delivers. Bodies are never redacted here; preview
/// redaction only applies to push payloads.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Event category
    pub category: NotificationCategory,
    /// Event priority
    pub priority: Priority,
    /// Short title
    pub title: String,
    /// Full body
    pub body: String,
    /// Structured event data
    pub data: Value,
}

/// One outward channel.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Deliver one message. Returns a provider reference when one exists.
    async fn send(&self, recipient: &Recipient, message: &ChannelMessage)
    -> AppResult<Option<String>>;
}
