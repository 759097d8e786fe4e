//! Unified dispatcher.
//!
//! Single entry point for every trigger (manual, webhook, scheduled). One
//! call evaluates policy, fans out to the selected channels concurrently
//! and writes exactly one history record once every attempt resolved.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{join, join_all};
use herald_common::config::DispatchConfig;
use herald_common::{AppError, AppResult, IdGenerator};
use herald_db::entities::delivery_preference::Model as DeliveryPreference;
use herald_db::entities::delivery_record;
use sea_orm::Set;
use serde::Serialize;
use validator::Validate;

use super::channels::{ChannelAdapter, ChannelMessage, Recipient};
use super::device_registry::DeviceRegistry;
use super::event::{Channel, NotificationCategory, NotificationEvent, Priority};
use super::history::HistoryLog;
use super::preferences::{PreferenceStore, quiet_hours_active};
use super::push::{PushDeliveryEngine, PushFailure, PushPayload};

/// Why a dispatch sent nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// The user turned notifications off
    NotificationsDisabled,
    /// The event's category is turned off
    CategoryDisabled,
    /// Held by quiet hours
    QuietHours,
    /// No requested channel is enabled
    NoChannels,
}

/// Result of one channel within a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOutcome {
    /// Channel attempted
    pub channel: Channel,
    /// Whether the channel delivered
    pub success: bool,
    /// Provider reference or failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ChannelOutcome {
    fn ok(channel: Channel, detail: Option<String>) -> Self {
        Self {
            channel,
            success: true,
            detail,
        }
    }

    fn failed(channel: Channel, detail: impl Into<String>) -> Self {
        Self {
            channel,
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Aggregated result returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// True when at least one channel delivered
    pub overall_success: bool,
    /// Why nothing was sent, when suppressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SuppressionReason>,
    /// History record, written unless suppressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Push devices tried
    pub devices_attempted: usize,
    /// Push devices that accepted the message
    pub devices_sent: usize,
    /// Per-channel results
    pub channels: Vec<ChannelOutcome>,
}

impl DispatchResult {
    const fn suppressed(reason: SuppressionReason) -> Self {
        Self {
            overall_success: false,
            reason: Some(reason),
            record_id: None,
            devices_attempted: 0,
            devices_sent: 0,
            channels: Vec::new(),
        }
    }
}

struct PushTally {
    outcome: ChannelOutcome,
    attempted: usize,
    sent: usize,
}

/// Whether the user wants this category at all.
#[must_use]
pub const fn category_enabled(prefs: &DeliveryPreference, category: NotificationCategory) -> bool {
    match category {
        NotificationCategory::Calendar => prefs.calendar_enabled,
        NotificationCategory::Banking => prefs.banking_enabled,
        NotificationCategory::System => prefs.system_enabled,
        NotificationCategory::DataChange => prefs.data_change_enabled,
    }
}

/// Channels a dispatch targets.
///
/// An explicit list is honored verbatim (duplicates dropped). Otherwise
/// push follows the user's toggle, email needs `normal` or above and chat
/// needs `high` or above.
#[must_use]
pub fn select_channels(
    prefs: &DeliveryPreference,
    priority: Priority,
    forced: Option<&[Channel]>,
) -> Vec<Channel> {
    if let Some(forced) = forced {
        let mut channels = Vec::with_capacity(forced.len());
        for channel in forced {
            if !channels.contains(channel) {
                channels.push(*channel);
            }
        }
        return channels;
    }

    let mut channels = Vec::with_capacity(3);
    if prefs.push_enabled {
        channels.push(Channel::Push);
    }
    if prefs.email_enabled && priority >= Priority::Normal {
        channels.push(Channel::Email);
    }
    if prefs.chat_enabled && priority >= Priority::High {
        channels.push(Channel::Chat);
    }
    channels
}

/// The dispatcher.
pub struct Dispatcher {
    preferences: PreferenceStore,
    registry: DeviceRegistry,
    push: PushDeliveryEngine,
    adapters: Vec<Arc<dyn ChannelAdapter>>,
    history: HistoryLog,
    id_gen: IdGenerator,
    channel_timeout: Duration,
    preview_placeholder: String,
}

impl Dispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub fn new(
        preferences: PreferenceStore,
        registry: DeviceRegistry,
        push: PushDeliveryEngine,
        adapters: Vec<Arc<dyn ChannelAdapter>>,
        history: HistoryLog,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            preferences,
            registry,
            push,
            adapters,
            history,
            id_gen: IdGenerator::new(),
            channel_timeout: Duration::from_secs(config.channel_timeout_secs),
            preview_placeholder: config.preview_placeholder.clone(),
        }
    }

    /// Dispatch an event now.
    pub async fn dispatch(&self, event: NotificationEvent) -> AppResult<DispatchResult> {
        self.dispatch_at(event, Utc::now()).await
    }

    /// Dispatch an event as if the current time were `now`.
    ///
    /// Only caller errors and a failed history write are returned as
    /// errors; channel failures become outcomes.
    pub async fn dispatch_at(
        &self,
        event: NotificationEvent,
        now: DateTime<Utc>,
    ) -> AppResult<DispatchResult> {
        event.validate()?;
        let user_id = event.target_user_id.as_str();
        let tenant_id = event.target_tenant_id.as_str();

        let prefs = self.preferences.get(user_id, tenant_id).await?;

        if !prefs.enabled {
            return Ok(self.suppress(&event, SuppressionReason::NotificationsDisabled));
        }
        if !category_enabled(&prefs, event.notification_type) {
            return Ok(self.suppress(&event, SuppressionReason::CategoryDisabled));
        }

        let mut channels = select_channels(&prefs, event.priority, event.channels.as_deref());

        if quiet_hours_active(&prefs, now) {
            // Only a caller that forces channels gets through, minus push.
            if event.channels.is_none() {
                return Ok(self.suppress(&event, SuppressionReason::QuietHours));
            }
            channels.retain(|c| *c != Channel::Push);
            if channels.is_empty() {
                return Ok(self.suppress(&event, SuppressionReason::QuietHours));
            }
        }
        if channels.is_empty() {
            return Ok(self.suppress(&event, SuppressionReason::NoChannels));
        }

        let record_id = self.id_gen.generate();
        let recipient = Recipient {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            email: prefs.email.clone(),
            phone: prefs.phone.clone(),
        };
        let message = ChannelMessage {
            category: event.notification_type,
            priority: event.priority,
            title: event.title.clone(),
            body: event.body.clone(),
            data: event.data.clone(),
        };

        let push_wanted = channels.contains(&Channel::Push);
        let push_future = async {
            if push_wanted {
                Some(self.fan_out_push(&event, &prefs, &record_id, now).await)
            } else {
                None
            }
        };
        let adapter_futures = channels
            .iter()
            .filter(|c| **c != Channel::Push)
            .map(|c| self.send_via(*c, &recipient, &message));

        let (push, others) = join(push_future, join_all(adapter_futures)).await;

        let (devices_attempted, devices_sent) =
            push.as_ref().map_or((0, 0), |t| (t.attempted, t.sent));
        let outcomes: Vec<ChannelOutcome> = push
            .map(|t| t.outcome)
            .into_iter()
            .chain(others)
            .collect();
        let overall_success = outcomes.iter().any(|o| o.success);

        let record = delivery_record::ActiveModel {
            id: Set(record_id.clone()),
            user_id: Set(recipient.user_id.clone()),
            tenant_id: Set(recipient.tenant_id.clone()),
            notification_type: Set(event.notification_type.to_string()),
            title: Set(event.title.clone()),
            body: Set(event.body.clone()),
            data: Set(event.data.clone()),
            priority: Set(event.priority.to_string()),
            channels: Set(serde_json::to_value(&outcomes)
                .map_err(|e| AppError::Internal(format!("Failed to encode outcomes: {e}")))?),
            sent_at: Set(now.into()),
            overall_success: Set(overall_success),
            devices_sent: Set(i32::try_from(devices_sent).unwrap_or(i32::MAX)),
            read: Set(false),
            read_at: Set(None),
        };
        self.history.append(record).await.inspect_err(|e| {
            tracing::error!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                record_id = %record_id,
                error = %e,
                "Failed to write delivery record"
            );
        })?;

        tracing::info!(
            user_id = %user_id,
            tenant_id = %tenant_id,
            record_id = %record_id,
            category = %event.notification_type,
            priority = %event.priority,
            devices_sent,
            overall_success,
            "Dispatched notification"
        );

        Ok(DispatchResult {
            overall_success,
            reason: None,
            record_id: Some(record_id),
            devices_attempted,
            devices_sent,
            channels: outcomes,
        })
    }

    fn suppress(&self, event: &NotificationEvent, reason: SuppressionReason) -> DispatchResult {
        tracing::debug!(
            user_id = %event.target_user_id,
            tenant_id = %event.target_tenant_id,
            category = %event.notification_type,
            reason = ?reason,
            "Dispatch suppressed"
        );
        DispatchResult::suppressed(reason)
    }

    async fn fan_out_push(
        &self,
        event: &NotificationEvent,
        prefs: &DeliveryPreference,
        record_id: &str,
        now: DateTime<Utc>,
    ) -> PushTally {
        let failed = |detail: String| PushTally {
            outcome: ChannelOutcome::failed(Channel::Push, detail),
            attempted: 0,
            sent: 0,
        };

        let devices = match self
            .registry
            .list_for_owner(&event.target_user_id, &event.target_tenant_id)
            .await
        {
            Ok(devices) => devices,
            Err(e) => return failed(format!("device lookup failed: {e}")),
        };
        if devices.is_empty() {
            return failed("no registered devices".to_string());
        }

        // Redacted once, shared by every device.
        let body = if prefs.show_preview {
            event.body.clone()
        } else {
            self.preview_placeholder.clone()
        };
        let payload = PushPayload {
            id: record_id.to_string(),
            notification_type: event.notification_type.to_string(),
            title: event.title.clone(),
            body,
            priority: event.priority.to_string(),
            data: event.data.clone(),
            timestamp: now.timestamp_millis(),
        };
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => return failed(format!("payload encoding failed: {e}")),
        };

        let results = join_all(devices.iter().map(|d| self.push.deliver(d, &bytes))).await;

        let attempted = results.len();
        let sent = results.iter().filter(|r| r.is_ok()).count();
        let gone = results
            .iter()
            .filter(|r| matches!(r, Err(PushFailure::Gone)))
            .count();

        let detail = if gone > 0 {
            format!("{sent}/{attempted} devices, {gone} evicted")
        } else {
            format!("{sent}/{attempted} devices")
        };
        let outcome = if sent > 0 {
            ChannelOutcome::ok(Channel::Push, Some(detail))
        } else {
            ChannelOutcome::failed(Channel::Push, detail)
        };

        PushTally {
            outcome,
            attempted,
            sent,
        }
    }

    async fn send_via(
        &self,
        channel: Channel,
        recipient: &Recipient,
        message: &ChannelMessage,
    ) -> ChannelOutcome {
        let Some(adapter) = self.adapters.iter().find(|a| a.channel() == channel) else {
            return ChannelOutcome::failed(channel, "channel not configured");
        };

        match tokio::time::timeout(self.channel_timeout, adapter.send(recipient, message)).await {
            Ok(Ok(reference)) => ChannelOutcome::ok(channel, reference),
            Ok(Err(e)) => {
                tracing::warn!(
                    user_id = %recipient.user_id,
                    tenant_id = %recipient.tenant_id,
                    channel = %channel,
                    error = %e,
                    "Channel delivery failed"
                );
                ChannelOutcome::failed(channel, e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %recipient.user_id,
                    tenant_id = %recipient.tenant_id,
                    channel = %channel,
                    "Channel delivery timed out"
                );
                ChannelOutcome::failed(channel, "timed out")
            }
        }
    }
}
