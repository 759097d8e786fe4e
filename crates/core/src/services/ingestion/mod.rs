//! Webhook ingestion and mapping.
//!
//! Inbound calls are acknowledged before any work happens: [`WebhookIngestion::ingest`]
//! spawns the mapping and returns. Everything that goes wrong afterwards
//! is logged and dropped so providers never enter a retry storm.

pub mod calendar;
pub mod feeds;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use herald_common::config::{CalendarConfig, DispatchConfig};
use herald_common::{AppError, AppResult, verify_hmac_sha256};
use herald_db::repositories::WebhookSubscriptionRepository;
use serde::Serialize;
use tokio::sync::Mutex;

use self::calendar::{CalendarProvider, event_notification};
use self::feeds::{
    BankingPayload, ChangePayload, FeedConnections, FeedSource, banking_template, change_data,
    change_template,
};
use super::credentials::{CredentialKind, CredentialResolver, Credentials};
use super::dispatcher::Dispatcher;
use super::event::{NotificationCategory, NotificationEvent};

pub use calendar::{
    CalendarEvent, CalendarWatchService, GoogleCalendarProvider, RenewalReport, WatchChannel,
    WatchRequest,
};
pub use feeds::Template;

/// Inbound header names, lowercase.
pub mod header_names {
    /// Calendar watch channel id
    pub const CHANNEL_ID: &str = "x-goog-channel-id";
    /// Calendar watch channel token
    pub const CHANNEL_TOKEN: &str = "x-goog-channel-token";
    /// Calendar resource state (`sync`, `exists`, ...)
    pub const RESOURCE_STATE: &str = "x-goog-resource-state";
    /// Calendar notification sequence number
    pub const MESSAGE_NUMBER: &str = "x-goog-message-number";
    /// Hex HMAC-SHA256 of the raw body
    pub const SIGNATURE: &str = "x-webhook-signature";
    /// Feed connection the body belongs to
    pub const FEED_ID: &str = "x-feed-id";
}

/// Request headers with lowercase names.
pub type Headers = HashMap<String, String>;

/// Where an inbound webhook came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookSource {
    /// Calendar watch channel notification
    Calendar,
    /// Banking aggregator webhook
    Banking,
    /// Database change feed
    Database,
}

impl WebhookSource {
    /// Path segment of the source
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Banking => "banking",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar" => Ok(Self::Calendar),
            "banking" => Ok(Self::Banking),
            "database" => Ok(Self::Database),
            other => Err(AppError::NotFound(format!("webhook source {other}"))),
        }
    }
}

/// Why an inbound call produced no notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// No channel id header
    MissingChannel,
    /// Channel id matches no subscription
    UnknownChannel,
    /// Channel token does not match
    InvalidToken,
    /// Initial handshake after a watch is created
    SyncMessage,
    /// Subscription is inactive or expired
    StaleSubscription,
    /// Already processed
    Duplicate,
    /// Event type we do not notify
    UnknownEvent,
    /// No feed connection for the resource
    UnknownResource,
    /// Missing or wrong HMAC signature
    InvalidSignature,
    /// Body could not be parsed
    MalformedPayload,
}

impl IgnoreReason {
    /// Reasons worth an operator's attention.
    #[must_use]
    pub const fn is_suspicious(self) -> bool {
        matches!(
            self,
            Self::InvalidToken | Self::UnknownResource | Self::MalformedPayload
        )
    }
}

/// What processing one inbound call amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Number of notifications handed to the dispatcher.
    Dispatched(usize),
    /// Nothing dispatched, and why
    Ignored(IgnoreReason),
}

/// Bounded set of recently seen delivery keys.
pub struct RecentKeys {
    capacity: usize,
    inner: Mutex<(HashSet<String>, VecDeque<String>)>,
}

impl RecentKeys {
    /// Create a set remembering at most `capacity` keys.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new((HashSet::new(), VecDeque::new())),
        }
    }

    /// Record a key. Returns `false` if it was already present.
    pub async fn insert(&self, key: String) -> bool {
        let mut guard = self.inner.lock().await;
        let (seen, order) = &mut *guard;
        if seen.contains(&key) {
            return false;
        }
        if order.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                seen.remove(&oldest);
            }
        }
        seen.insert(key.clone());
        order.push_back(key);
        true
    }

    /// Forget a key so a later delivery is processed again.
    pub async fn remove(&self, key: &str) {
        let mut guard = self.inner.lock().await;
        let (seen, order) = &mut *guard;
        if seen.remove(key) {
            order.retain(|k| k != key);
        }
    }
}

fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// Maps inbound webhooks to notifications.
pub struct WebhookIngestion {
    dispatcher: Arc<Dispatcher>,
    subscriptions: WebhookSubscriptionRepository,
    feeds: FeedConnections,
    calendar: Arc<dyn CalendarProvider>,
    credentials: Arc<dyn CredentialResolver>,
    recent: RecentKeys,
    lookahead: TimeDelta,
}

impl WebhookIngestion {
    /// Create a new ingestion service.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscriptions: WebhookSubscriptionRepository,
        feeds: FeedConnections,
        calendar: Arc<dyn CalendarProvider>,
        credentials: Arc<dyn CredentialResolver>,
        calendar_config: &CalendarConfig,
        dispatch_config: &DispatchConfig,
    ) -> AppResult<Self> {
        Ok(Self {
            dispatcher,
            subscriptions,
            feeds,
            calendar,
            credentials,
            recent: RecentKeys::new(dispatch_config.dedup_capacity),
            lookahead: calendar_config.lookahead()?,
        })
    }

    /// Accept an inbound call and process it in the background.
    pub fn ingest(self: &Arc<Self>, source: WebhookSource, body: Vec<u8>, headers: Headers) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.process(source, &body, &headers).await {
                Ok(IngestOutcome::Dispatched(count)) => {
                    tracing::debug!(source = %source, count, "Webhook mapped");
                }
                Ok(IngestOutcome::Ignored(reason)) if reason.is_suspicious() => {
                    tracing::warn!(source = %source, reason = ?reason, "Webhook ignored");
                }
                Ok(IngestOutcome::Ignored(reason)) => {
                    tracing::debug!(source = %source, reason = ?reason, "Webhook ignored");
                }
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "Webhook processing failed");
                }
            }
        });
    }

    /// Process one inbound call to completion.
    pub async fn process(
        &self,
        source: WebhookSource,
        body: &[u8],
        headers: &Headers,
    ) -> AppResult<IngestOutcome> {
        self.process_at(source, body, headers, Utc::now()).await
    }

    /// Process one inbound call as if the current time were `now`.
    pub async fn process_at(
        &self,
        source: WebhookSource,
        body: &[u8],
        headers: &Headers,
        now: DateTime<Utc>,
    ) -> AppResult<IngestOutcome> {
        match source {
            WebhookSource::Calendar => self.process_calendar(headers, now).await,
            WebhookSource::Banking => self.process_banking(body, headers, now).await,
            WebhookSource::Database => self.process_change(body, headers, now).await,
        }
    }

    async fn process_calendar(&self, headers: &Headers, now: DateTime<Utc>) -> AppResult<IngestOutcome> {
        let Some(channel_id) = header(headers, header_names::CHANNEL_ID) else {
            return Ok(IngestOutcome::Ignored(IgnoreReason::MissingChannel));
        };

        let Some(subscription) = self.subscriptions.find_by_channel_id(channel_id).await? else {
            tracing::warn!(channel_id = %channel_id, "Notification for unknown watch channel");
            return Ok(IngestOutcome::Ignored(IgnoreReason::UnknownChannel));
        };

        if header(headers, header_names::CHANNEL_TOKEN) != Some(subscription.channel_token.as_str()) {
            return Ok(IngestOutcome::Ignored(IgnoreReason::InvalidToken));
        }
        if header(headers, header_names::RESOURCE_STATE) == Some("sync") {
            return Ok(IngestOutcome::Ignored(IgnoreReason::SyncMessage));
        }
        if subscription.expires_at < now {
            tracing::warn!(
                channel_id = %channel_id,
                user_id = %subscription.user_id,
                tenant_id = %subscription.tenant_id,
                "Notification on expired watch channel"
            );
            return Ok(IngestOutcome::Ignored(IgnoreReason::StaleSubscription));
        }
        if let Some(number) = header(headers, header_names::MESSAGE_NUMBER) {
            if !self.recent.insert(format!("calendar:{channel_id}:{number}")).await {
                return Ok(IngestOutcome::Ignored(IgnoreReason::Duplicate));
            }
        }

        let events = self
            .calendar
            .upcoming_events(
                &subscription.tenant_id,
                &subscription.external_calendar_id,
                now,
                now + self.lookahead,
            )
            .await?;

        let mut dispatched = 0;
        for event in events.iter().filter(|e| !e.is_cancelled()) {
            // Every change notification lists the whole window again.
            let key = format!(
                "calendar-event:{}:{}:{}:{:?}",
                subscription.tenant_id, subscription.user_id, event.id, event.start
            );
            if !self.recent.insert(key.clone()).await {
                continue;
            }
            if self
                .dispatch(event_notification(&subscription, event, now), now)
                .await
            {
                dispatched += 1;
            } else {
                // Suppressed or failed: a later change notification retries it.
                self.recent.remove(&key).await;
            }
        }

        Ok(IngestOutcome::Dispatched(dispatched))
    }

    async fn process_banking(
        &self,
        body: &[u8],
        headers: &Headers,
        now: DateTime<Utc>,
    ) -> AppResult<IngestOutcome> {
        let Ok(payload) = serde_json::from_slice::<BankingPayload>(body) else {
            return Ok(IngestOutcome::Ignored(IgnoreReason::MalformedPayload));
        };
        let Some(template) = banking_template(&payload.event, &payload.data) else {
            tracing::debug!(event = %payload.event, "Unmapped banking event");
            return Ok(IngestOutcome::Ignored(IgnoreReason::UnknownEvent));
        };
        let Some(owner) = self.feeds.owner(FeedSource::Banking, &payload.item_id).await? else {
            return Ok(IngestOutcome::Ignored(IgnoreReason::UnknownResource));
        };

        if let Some(Credentials::BankWebhook { secret }) = self
            .credentials
            .resolve(CredentialKind::BankWebhook, &owner.tenant_id)
            .await?
        {
            let valid = header(headers, header_names::SIGNATURE)
                .is_some_and(|signature| verify_hmac_sha256(&secret, body, signature));
            if !valid {
                tracing::warn!(
                    tenant_id = %owner.tenant_id,
                    item_id = %payload.item_id,
                    "Banking webhook signature mismatch"
                );
                return Ok(IngestOutcome::Ignored(IgnoreReason::InvalidSignature));
            }
        }

        if let Some(event_id) = &payload.event_id {
            if !self.recent.insert(format!("banking:{event_id}")).await {
                return Ok(IngestOutcome::Ignored(IgnoreReason::Duplicate));
            }
        }

        let event = NotificationEvent::new(
            NotificationCategory::Banking,
            template.title,
            template.body,
            owner.user_id,
            owner.tenant_id,
        )
        .with_priority(template.priority)
        .with_data(serde_json::json!({
            "event": payload.event,
            "itemId": payload.item_id,
        }));

        Ok(IngestOutcome::Dispatched(usize::from(self.dispatch(event, now).await)))
    }

    async fn process_change(
        &self,
        body: &[u8],
        headers: &Headers,
        now: DateTime<Utc>,
    ) -> AppResult<IngestOutcome> {
        let Some(feed_id) = header(headers, header_names::FEED_ID) else {
            return Ok(IngestOutcome::Ignored(IgnoreReason::MissingChannel));
        };
        let Ok(payload) = serde_json::from_slice::<ChangePayload>(body) else {
            return Ok(IngestOutcome::Ignored(IgnoreReason::MalformedPayload));
        };
        let Some(template) = change_template(&payload) else {
            return Ok(IngestOutcome::Ignored(IgnoreReason::UnknownEvent));
        };
        let Some(owner) = self.feeds.owner(FeedSource::Database, feed_id).await? else {
            return Ok(IngestOutcome::Ignored(IgnoreReason::UnknownResource));
        };

        let valid = header(headers, header_names::SIGNATURE)
            .is_some_and(|signature| verify_hmac_sha256(&owner.signing_secret, body, signature));
        if !valid {
            tracing::warn!(
                tenant_id = %owner.tenant_id,
                feed_id = %feed_id,
                "Change feed signature mismatch"
            );
            return Ok(IngestOutcome::Ignored(IgnoreReason::InvalidSignature));
        }

        if let Some(committed) = &payload.commit_timestamp {
            let key = format!(
                "database:{feed_id}:{committed}:{}",
                payload.record_id().unwrap_or_default()
            );
            if !self.recent.insert(key).await {
                return Ok(IngestOutcome::Ignored(IgnoreReason::Duplicate));
            }
        }

        let event = NotificationEvent::new(
            NotificationCategory::DataChange,
            template.title,
            template.body,
            owner.user_id,
            owner.tenant_id,
        )
        .with_priority(template.priority)
        .with_data(change_data(&payload));

        Ok(IngestOutcome::Dispatched(usize::from(self.dispatch(event, now).await)))
    }

    /// Hand one event to the dispatcher. Returns whether a delivery was
    /// attempted and recorded; suppressions and errors return `false`.
    async fn dispatch(&self, event: NotificationEvent, now: DateTime<Utc>) -> bool {
        let user_id = event.target_user_id.clone();
        let tenant_id = event.target_tenant_id.clone();
        match self.dispatcher.dispatch_at(event, now).await {
            Ok(result) => {
                if let Some(reason) = result.reason {
                    tracing::debug!(
                        user_id = %user_id,
                        tenant_id = %tenant_id,
                        reason = ?reason,
                        "Webhook notification suppressed"
                    );
                }
                result.record_id.is_some()
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    tenant_id = %tenant_id,
                    error = %e,
                    "Dispatch from webhook failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::device_registry::DeviceRegistry;
    use crate::services::history::HistoryLog;
    use crate::services::preferences::{PreferenceStore, default_preferences};
    use crate::services::push::PushDeliveryEngine;
    use crate::services::push::tests::FakeTransport;
    use async_trait::async_trait;
    use super::calendar::tests::{FakeProvider, subscription};
    use herald_common::config::PushConfig;
    use herald_common::sign_hmac_sha256;
    use herald_db::entities::{delivery_record, device_endpoint, feed_connection, webhook_subscription};
    use herald_db::repositories::{
        DeliveryPreferenceRepository, DeliveryRecordRepository, DeviceEndpointRepository,
        FeedConnectionRepository,
    };
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use serde_json::json;

    struct BankSecret(Option<&'static str>);

    #[async_trait]
    impl CredentialResolver for BankSecret {
        async fn resolve(
            &self,
            _kind: CredentialKind,
            _tenant_id: &str,
        ) -> AppResult<Option<Credentials>> {
            Ok(self.0.map(|s| Credentials::BankWebhook {
                secret: s.to_string(),
            }))
        }
    }

    fn record() -> delivery_record::Model {
        delivery_record::Model {
            id: "r1".to_string(),
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            notification_type: "banking".to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            data: json!({}),
            priority: "normal".to_string(),
            channels: json!([]),
            sent_at: Utc::now().into(),
            overall_success: false,
            devices_sent: 0,
            read: false,
            read_at: None,
        }
    }

    /// Dispatcher store for `n` dispatches to a user with no devices.
    fn dispatcher_db(n: usize) -> Arc<DatabaseConnection> {
        let mut db = MockDatabase::new(DatabaseBackend::Postgres);
        for _ in 0..n {
            db = db
                .append_query_results([[default_preferences("u1", "t1", Utc::now())]])
                .append_query_results([Vec::<device_endpoint::Model>::new()])
                .append_query_results([[record()]]);
        }
        Arc::new(db.into_connection())
    }

    fn dispatcher(db: &Arc<DatabaseConnection>) -> Arc<Dispatcher> {
        let registry = DeviceRegistry::new(DeviceEndpointRepository::new(db.clone()));
        let push = PushDeliveryEngine::new(
            Arc::new(FakeTransport::default()),
            registry.clone(),
            &PushConfig::default(),
        );
        Arc::new(Dispatcher::new(
            PreferenceStore::new(DeliveryPreferenceRepository::new(db.clone())),
            registry,
            push,
            vec![],
            HistoryLog::new(DeliveryRecordRepository::new(db.clone())),
            &DispatchConfig::default(),
        ))
    }

    fn ingestion(
        store: MockDatabase,
        dispatch_db: &Arc<DatabaseConnection>,
        provider: FakeProvider,
        secret: Option<&'static str>,
    ) -> WebhookIngestion {
        let store = Arc::new(store.into_connection());
        WebhookIngestion::new(
            dispatcher(dispatch_db),
            WebhookSubscriptionRepository::new(store.clone()),
            FeedConnections::new(FeedConnectionRepository::new(store)),
            Arc::new(provider),
            Arc::new(BankSecret(secret)),
            &CalendarConfig::default(),
            &DispatchConfig::default(),
        )
        .unwrap()
    }

    fn calendar_headers(channel: &str, token: &str, state: &str, number: &str) -> Headers {
        Headers::from([
            (header_names::CHANNEL_ID.to_string(), channel.to_string()),
            (header_names::CHANNEL_TOKEN.to_string(), token.to_string()),
            (header_names::RESOURCE_STATE.to_string(), state.to_string()),
            (header_names::MESSAGE_NUMBER.to_string(), number.to_string()),
        ])
    }

    fn calendar_event(id: &str, status: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            status: Some(status.to_string()),
            summary: Some("Standup".to_string()),
            start: Some(Utc::now() + TimeDelta::hours(3)),
            all_day: false,
        }
    }

    fn connection(source: &str, external_id: &str) -> feed_connection::Model {
        feed_connection::Model {
            source: source.to_string(),
            external_id: external_id.to_string(),
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            signing_secret: FEED_SECRET.to_string(),
            created_at: Utc::now().into(),
        }
    }

    const FEED_SECRET: &str = "feed-secret";

    fn feed_headers(feed_id: &str, body: &str) -> Headers {
        Headers::from([
            (header_names::FEED_ID.to_string(), feed_id.to_string()),
            (
                header_names::SIGNATURE.to_string(),
                sign_hmac_sha256(FEED_SECRET, body.as_bytes()),
            ),
        ])
    }

    fn with_subscription(sub: webhook_subscription::Model) -> MockDatabase {
        MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[sub]])
    }

    #[test]
    fn test_webhook_source_parse() {
        assert_eq!("banking".parse::<WebhookSource>().unwrap(), WebhookSource::Banking);
        assert!(matches!(
            "stripe".parse::<WebhookSource>(),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_keys_forget_oldest() {
        let recent = RecentKeys::new(2);

        assert!(recent.insert("a".to_string()).await);
        assert!(!recent.insert("a".to_string()).await);
        assert!(recent.insert("b".to_string()).await);
        assert!(recent.insert("c".to_string()).await);
        assert!(recent.insert("a".to_string()).await);
    }

    #[tokio::test]
    async fn test_calendar_without_channel_header() {
        let db = dispatcher_db(0);
        let ingest = ingestion(
            MockDatabase::new(DatabaseBackend::Postgres),
            &db,
            FakeProvider::default(),
            None,
        );

        let outcome = ingest
            .process(WebhookSource::Calendar, b"", &Headers::new())
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::MissingChannel));
    }

    #[tokio::test]
    async fn test_calendar_unknown_channel_is_ignored() {
        let db = dispatcher_db(0);
        let store = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<webhook_subscription::Model>::new()]);
        let ingest = ingestion(store, &db, FakeProvider::default(), None);

        let outcome = ingest
            .process(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("nope", "secret-token", "exists", "2"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::UnknownChannel));
    }

    #[tokio::test]
    async fn test_calendar_wrong_token_is_rejected() {
        let db = dispatcher_db(0);
        let ingest = ingestion(
            with_subscription(subscription("ch-1", "primary")),
            &db,
            FakeProvider::default(),
            None,
        );

        let outcome = ingest
            .process(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("ch-1", "forged", "exists", "2"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::InvalidToken));
    }

    #[tokio::test]
    async fn test_calendar_sync_handshake_is_ignored() {
        let db = dispatcher_db(0);
        let ingest = ingestion(
            with_subscription(subscription("ch-1", "primary")),
            &db,
            FakeProvider::default(),
            None,
        );

        let outcome = ingest
            .process(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("ch-1", "secret-token", "sync", "1"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::SyncMessage));
    }

    #[tokio::test]
    async fn test_calendar_stale_subscription_is_ignored() {
        let db = dispatcher_db(0);
        let mut stale = subscription("ch-1", "primary");
        stale.expires_at = (Utc::now() - TimeDelta::hours(1)).into();
        let ingest = ingestion(with_subscription(stale), &db, FakeProvider::default(), None);

        let outcome = ingest
            .process(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("ch-1", "secret-token", "exists", "2"),
            )
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::StaleSubscription));
    }

    #[tokio::test]
    async fn test_calendar_dispatches_live_events_once() {
        let db = dispatcher_db(1);
        let store = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[subscription("ch-1", "primary")]])
            .append_query_results([[subscription("ch-1", "primary")]]);
        let provider = FakeProvider {
            events: vec![calendar_event("e1", "confirmed"), calendar_event("e2", "cancelled")],
            ..FakeProvider::default()
        };
        let ingest = ingestion(store, &db, provider, None);

        let first = ingest
            .process(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("ch-1", "secret-token", "exists", "2"),
            )
            .await
            .unwrap();
        assert_eq!(first, IngestOutcome::Dispatched(1));

        // A redelivery of the same message is dropped.
        let again = ingest
            .process(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("ch-1", "secret-token", "exists", "2"),
            )
            .await
            .unwrap();
        assert_eq!(again, IngestOutcome::Ignored(IgnoreReason::Duplicate));
    }

    #[tokio::test]
    async fn test_banking_unknown_event_is_ignored() {
        let db = dispatcher_db(0);
        let ingest = ingestion(
            MockDatabase::new(DatabaseBackend::Postgres),
            &db,
            FakeProvider::default(),
            None,
        );

        let body = json!({"event": "connector/status_updated", "itemId": "item-1"}).to_string();
        let outcome = ingest
            .process(WebhookSource::Banking, body.as_bytes(), &Headers::new())
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::UnknownEvent));
    }

    #[tokio::test]
    async fn test_banking_unknown_item_is_ignored() {
        let db = dispatcher_db(0);
        let store = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<feed_connection::Model>::new()]);
        let ingest = ingestion(store, &db, FakeProvider::default(), None);

        let body = json!({"event": "item/error", "itemId": "item-x"}).to_string();
        let outcome = ingest
            .process(WebhookSource::Banking, body.as_bytes(), &Headers::new())
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::UnknownResource));
    }

    #[tokio::test]
    async fn test_banking_signature_is_enforced_when_configured() {
        let db = dispatcher_db(1);
        let store = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[connection("banking", "item-1")]])
            .append_query_results([[connection("banking", "item-1")]]);
        let ingest = ingestion(store, &db, FakeProvider::default(), Some("bank-secret"));

        let body = json!({"event": "item/error", "eventId": "ev-1", "itemId": "item-1"}).to_string();

        let forged = Headers::from([(header_names::SIGNATURE.to_string(), "sha256=00".to_string())]);
        let outcome = ingest
            .process(WebhookSource::Banking, body.as_bytes(), &forged)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::InvalidSignature));

        let signed = Headers::from([(
            header_names::SIGNATURE.to_string(),
            sign_hmac_sha256("bank-secret", body.as_bytes()),
        )]);
        let outcome = ingest
            .process(WebhookSource::Banking, body.as_bytes(), &signed)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Dispatched(1));
    }

    #[tokio::test]
    async fn test_database_change_requires_feed_id() {
        let db = dispatcher_db(0);
        let ingest = ingestion(
            MockDatabase::new(DatabaseBackend::Postgres),
            &db,
            FakeProvider::default(),
            None,
        );

        let body = json!({"type": "INSERT", "table": "orders", "record": {"id": 1}}).to_string();
        let outcome = ingest
            .process(WebhookSource::Database, body.as_bytes(), &Headers::new())
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::MissingChannel));
    }

    #[tokio::test]
    async fn test_database_change_dispatches_and_dedups() {
        let db = dispatcher_db(1);
        let store = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[connection("database", "feed-1")]])
            .append_query_results([[connection("database", "feed-1")]]);
        let ingest = ingestion(store, &db, FakeProvider::default(), None);

        let body = json!({
            "type": "INSERT",
            "table": "client_orders",
            "schema": "public",
            "record": {"id": 7},
            "commit_timestamp": "2025-06-01T12:00:00Z"
        })
        .to_string();
        let hdrs = feed_headers("feed-1", &body);

        let first = ingest
            .process(WebhookSource::Database, body.as_bytes(), &hdrs)
            .await
            .unwrap();
        assert_eq!(first, IngestOutcome::Dispatched(1));

        let again = ingest
            .process(WebhookSource::Database, body.as_bytes(), &hdrs)
            .await
            .unwrap();
        assert_eq!(again, IngestOutcome::Ignored(IgnoreReason::Duplicate));
    }

    #[tokio::test]
    async fn test_malformed_banking_body() {
        let db = dispatcher_db(0);
        let ingest = ingestion(
            MockDatabase::new(DatabaseBackend::Postgres),
            &db,
            FakeProvider::default(),
            None,
        );

        let outcome = ingest
            .process(WebhookSource::Banking, b"not json", &Headers::new())
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::MalformedPayload));
    }

    #[tokio::test]
    async fn test_database_change_with_forged_signature_is_rejected() {
        let db = dispatcher_db(0);
        let store = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[connection("database", "feed-1")]])
            .append_query_results([[connection("database", "feed-1")]]);
        let ingest = ingestion(store, &db, FakeProvider::default(), None);

        let body = json!({"type": "INSERT", "table": "orders", "record": {"id": 1}}).to_string();

        let unsigned = Headers::from([(header_names::FEED_ID.to_string(), "feed-1".to_string())]);
        let outcome = ingest
            .process(WebhookSource::Database, body.as_bytes(), &unsigned)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::InvalidSignature));

        let forged = Headers::from([
            (header_names::FEED_ID.to_string(), "feed-1".to_string()),
            (
                header_names::SIGNATURE.to_string(),
                sign_hmac_sha256("guessed-secret", body.as_bytes()),
            ),
        ]);
        let outcome = ingest
            .process(WebhookSource::Database, body.as_bytes(), &forged)
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::InvalidSignature));
    }

    #[tokio::test]
    async fn test_calendar_event_held_by_quiet_hours_is_sent_later() {
        let night = Utc::now()
            .date_naive()
            .and_hms_opt(23, 30, 0)
            .unwrap()
            .and_utc();
        let morning = night + TimeDelta::hours(9);

        let mut prefs = default_preferences("u1", "t1", night);
        prefs.quiet_hours_enabled = true;
        prefs.quiet_hours_start = "22:00".to_string();
        prefs.quiet_hours_end = "07:00".to_string();

        // Night: suppressed after the preference read. Morning: full dispatch.
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[prefs.clone()]])
                .append_query_results([[prefs]])
                .append_query_results([Vec::<device_endpoint::Model>::new()])
                .append_query_results([[record()]])
                .into_connection(),
        );
        let store = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[subscription("ch-1", "primary")]])
            .append_query_results([[subscription("ch-1", "primary")]]);
        let provider = FakeProvider {
            events: vec![calendar_event("e1", "confirmed")],
            ..FakeProvider::default()
        };
        let ingest = ingestion(store, &db, provider, None);

        let held = ingest
            .process_at(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("ch-1", "secret-token", "exists", "2"),
                night,
            )
            .await
            .unwrap();
        assert_eq!(held, IngestOutcome::Dispatched(0));

        let sent = ingest
            .process_at(
                WebhookSource::Calendar,
                b"",
                &calendar_headers("ch-1", "secret-token", "exists", "3"),
                morning,
            )
            .await
            .unwrap();
        assert_eq!(sent, IngestOutcome::Dispatched(1));
    }

    #[tokio::test]
    async fn test_recent_keys_remove_allows_reinsert() {
        let recent = RecentKeys::new(4);

        assert!(recent.insert("k".to_string()).await);
        recent.remove("k").await;
        assert!(recent.insert("k".to_string()).await);
    }

    #[test]
    fn test_negative_lookahead_is_a_config_error() {
        let db = dispatcher_db(0);
        let store = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let config = CalendarConfig {
            lookahead_hours: -5,
            ..CalendarConfig::default()
        };

        let result = WebhookIngestion::new(
            dispatcher(&db),
            WebhookSubscriptionRepository::new(store.clone()),
            FeedConnections::new(FeedConnectionRepository::new(store)),
            Arc::new(FakeProvider::default()),
            Arc::new(BankSecret(None)),
            &config,
            &DispatchConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
