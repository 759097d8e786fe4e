//! Calendar watch channels.
//!
//! The engine subscribes to a user's calendar and the provider posts a bare
//! "something changed" notification to the webhook address. The
//! notification carries only the channel id and token; the owner and the
//! calendar come from the stored [`webhook_subscription`] row.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use herald_common::config::CalendarConfig;
use herald_common::{AppError, AppResult, IdGenerator};
use herald_db::entities::webhook_subscription;
use herald_db::repositories::WebhookSubscriptionRepository;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::services::credentials::{ClientCache, CredentialKind, CredentialResolver, Credentials};
use crate::services::event::{NotificationCategory, NotificationEvent, Priority};

/// Provider name stored on subscription rows.
pub const PROVIDER_GOOGLE: &str = "google_calendar";

/// Parameters of a new watch channel.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// Our id for the channel
    pub channel_id: String,
    /// Secret echoed back on every notification
    pub token: String,
    /// HTTPS callback URL
    pub address: String,
    /// Requested lifetime
    pub ttl_secs: u64,
}

/// What the provider returns for a created channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChannel {
    /// Provider's id for the watched resource
    pub resource_id: String,
    /// When the provider stops notifying
    pub expires_at: DateTime<Utc>,
}

/// An event read back from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// Provider event id
    pub id: String,
    /// `confirmed`, `tentative` or `cancelled`
    pub status: Option<String>,
    /// Event title
    pub summary: Option<String>,
    /// Start time; midnight UTC for all-day events
    pub start: Option<DateTime<Utc>>,
    /// Whether the event has a date but no time
    pub all_day: bool,
}

impl CalendarEvent {
    /// Whether the event was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

/// External calendar API.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Open a watch channel on one calendar.
    async fn watch(
        &self,
        tenant_id: &str,
        calendar_id: &str,
        request: WatchRequest,
    ) -> AppResult<WatchChannel>;

    /// Close a watch channel.
    async fn stop(&self, tenant_id: &str, channel_id: &str, resource_id: &str) -> AppResult<()>;

    /// Events starting within `[from, to]`.
    async fn upcoming_events(
        &self,
        tenant_id: &str,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>>;
}

/// HTTP client bound to one tenant's OAuth token.
#[derive(Debug)]
pub struct CalendarClient {
    http: reqwest::Client,
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchBody<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    channel_type: &'static str,
    address: &'a str,
    token: &'a str,
    params: WatchParams,
}

#[derive(Debug, Serialize)]
struct WatchParams {
    ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
    resource_id: String,
    /// Milliseconds since the epoch, as a string.
    expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    start: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<DateTime<Utc>>,
    date: Option<NaiveDate>,
}

impl From<EventItem> for CalendarEvent {
    fn from(item: EventItem) -> Self {
        let (start, all_day) = match item.start {
            Some(EventTime {
                date_time: Some(at),
                ..
            }) => (Some(at), false),
            Some(EventTime {
                date: Some(day), ..
            }) => (day.and_hms_opt(0, 0, 0).map(|t| t.and_utc()), true),
            _ => (None, false),
        };
        Self {
            id: item.id,
            status: item.status,
            summary: item.summary,
            start,
            all_day,
        }
    }
}

/// Parse the provider's millisecond expiration, falling back to `ttl`.
fn parse_expiration(expiration: Option<&str>, now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    expiration
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(|| now + TimeDelta::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000)))
}

/// Google Calendar v3 provider.
pub struct GoogleCalendarProvider {
    base_url: String,
    credentials: Arc<dyn CredentialResolver>,
    clients: ClientCache<CalendarClient>,
    timeout: Duration,
}

impl GoogleCalendarProvider {
    /// Create a new provider.
    #[must_use]
    pub fn new(
        config: &CalendarConfig,
        credentials: Arc<dyn CredentialResolver>,
        clients: ClientCache<CalendarClient>,
    ) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credentials,
            clients,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn client_for(&self, tenant_id: &str) -> AppResult<Arc<CalendarClient>> {
        self.clients
            .get_or_try_init(CredentialKind::CalendarOauth, tenant_id, || async {
                match self
                    .credentials
                    .resolve(CredentialKind::CalendarOauth, tenant_id)
                    .await?
                {
                    Some(Credentials::CalendarOauth { access_token }) => {
                        let http = reqwest::Client::builder()
                            .timeout(self.timeout)
                            .build()
                            .map_err(|e| {
                                AppError::Internal(format!("Failed to build HTTP client: {e}"))
                            })?;
                        Ok(CalendarClient { http, access_token })
                    }
                    _ => Err(AppError::Config(format!(
                        "No calendar credentials for tenant {tenant_id}"
                    ))),
                }
            })
            .await
    }

    /// Turn a non-success response into an error, dropping the cached
    /// client when the token was rejected.
    async fn check(&self, tenant_id: &str, response: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.clients
                .invalidate(CredentialKind::CalendarOauth, tenant_id)
                .await;
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::ExternalService(format!(
            "Calendar API returned {status}: {body}"
        )))
    }
}

fn request_error(e: reqwest::Error) -> AppError {
    AppError::ExternalService(format!("Calendar API unreachable: {e}"))
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn watch(
        &self,
        tenant_id: &str,
        calendar_id: &str,
        request: WatchRequest,
    ) -> AppResult<WatchChannel> {
        let client = self.client_for(tenant_id).await?;
        let url = format!(
            "{}/calendars/{}/events/watch",
            self.base_url,
            urlencode(calendar_id)
        );
        let body = WatchBody {
            id: &request.channel_id,
            channel_type: "web_hook",
            address: &request.address,
            token: &request.token,
            params: WatchParams {
                ttl: request.ttl_secs.to_string(),
            },
        };

        let response = client
            .http
            .post(url)
            .bearer_auth(&client.access_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        let parsed: WatchResponse = self
            .check(tenant_id, response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Invalid watch response: {e}")))?;

        Ok(WatchChannel {
            resource_id: parsed.resource_id,
            expires_at: parse_expiration(parsed.expiration.as_deref(), Utc::now(), request.ttl_secs),
        })
    }

    async fn stop(&self, tenant_id: &str, channel_id: &str, resource_id: &str) -> AppResult<()> {
        let client = self.client_for(tenant_id).await?;
        let response = client
            .http
            .post(format!("{}/channels/stop", self.base_url))
            .bearer_auth(&client.access_token)
            .json(&json!({ "id": channel_id, "resourceId": resource_id }))
            .send()
            .await
            .map_err(request_error)?;
        self.check(tenant_id, response).await?;
        Ok(())
    }

    async fn upcoming_events(
        &self,
        tenant_id: &str,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>> {
        let client = self.client_for(tenant_id).await?;
        let response = client
            .http
            .get(format!(
                "{}/calendars/{}/events",
                self.base_url,
                urlencode(calendar_id)
            ))
            .bearer_auth(&client.access_token)
            .query(&[
                ("timeMin", from.to_rfc3339()),
                ("timeMax", to.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(request_error)?;
        let list: EventList = self
            .check(tenant_id, response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Invalid events response: {e}")))?;

        Ok(list.items.into_iter().map(CalendarEvent::from).collect())
    }
}

/// Percent-encode a calendar id for use as a path segment.
fn urlencode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Map one upcoming event to a notification for the subscription owner.
#[must_use]
pub fn event_notification(
    subscription: &webhook_subscription::Model,
    event: &CalendarEvent,
    now: DateTime<Utc>,
) -> NotificationEvent {
    let summary = event.summary.as_deref().unwrap_or("Untitled event");
    let (body, priority) = match event.start {
        Some(start) if event.all_day => (format!("All day on {}", start.format("%Y-%m-%d")), Priority::Normal),
        Some(start) => {
            let soon = start - now <= TimeDelta::hours(1);
            (
                format!("Starts at {} UTC", start.format("%Y-%m-%d %H:%M")),
                if soon { Priority::High } else { Priority::Normal },
            )
        }
        None => ("Your calendar was updated".to_string(), Priority::Normal),
    };

    NotificationEvent::new(
        NotificationCategory::Calendar,
        format!("Upcoming: {summary}"),
        body,
        subscription.user_id.clone(),
        subscription.tenant_id.clone(),
    )
    .with_priority(priority)
    .with_data(json!({
        "eventId": event.id,
        "calendarId": subscription.external_calendar_id,
        "start": event.start.map(|s| s.to_rfc3339()),
    }))
}

/// Counts from one renewal sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    /// Channels replaced
    pub renewed: usize,
    /// Channels that could not be replaced
    pub failed: usize,
}

/// Owns the lifecycle of calendar watch channels.
#[derive(Clone)]
pub struct CalendarWatchService {
    provider: Arc<dyn CalendarProvider>,
    repo: WebhookSubscriptionRepository,
    id_gen: IdGenerator,
    webhook_address: Option<String>,
    ttl_secs: u64,
    renew_before: TimeDelta,
}

impl CalendarWatchService {
    /// Create a new calendar watch service.
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        repo: WebhookSubscriptionRepository,
        config: &CalendarConfig,
    ) -> AppResult<Self> {
        Ok(Self {
            provider,
            repo,
            id_gen: IdGenerator::new(),
            webhook_address: config.webhook_address.clone(),
            ttl_secs: config.watch_ttl_secs,
            renew_before: config.renew_before()?,
        })
    }

    /// Watch a calendar, replacing any existing channel on it.
    pub async fn subscribe(
        &self,
        user_id: &str,
        tenant_id: &str,
        calendar_id: &str,
    ) -> AppResult<webhook_subscription::Model> {
        let address = self
            .webhook_address
            .clone()
            .ok_or_else(|| AppError::Config("calendar.webhook_address is not set".to_string()))?;
        if calendar_id.is_empty() || calendar_id.len() > 256 {
            return Err(AppError::Validation("calendarId must be 1-256 characters".to_string()));
        }

        let previous = self
            .repo
            .find_for_calendar(user_id, tenant_id, calendar_id)
            .await?;

        let channel_id = self.id_gen.generate_channel_id();
        let token = self.id_gen.generate_secret();
        let channel = self
            .provider
            .watch(
                tenant_id,
                calendar_id,
                WatchRequest {
                    channel_id: channel_id.clone(),
                    token: token.clone(),
                    address,
                    ttl_secs: self.ttl_secs,
                },
            )
            .await?;

        let now = Utc::now();
        let subscription = webhook_subscription::Model {
            channel_id,
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            provider: PROVIDER_GOOGLE.to_string(),
            resource_id: channel.resource_id,
            external_calendar_id: calendar_id.to_string(),
            channel_token: token,
            expires_at: channel.expires_at.into(),
            created_at: previous
                .as_ref()
                .map_or_else(|| now.into(), |p| p.created_at),
            updated_at: previous.as_ref().map(|_| now.into()),
        };
        self.repo
            .upsert(webhook_subscription::ActiveModel::from(subscription.clone()))
            .await?;

        if let Some(previous) = previous {
            self.stop_quietly(&previous).await;
        }

        tracing::info!(
            user_id = %user_id,
            tenant_id = %tenant_id,
            channel_id = %subscription.channel_id,
            expires_at = %channel.expires_at,
            "Calendar watch channel opened"
        );

        Ok(subscription)
    }

    /// Re-subscribe an existing channel before it lapses.
    pub async fn renew(
        &self,
        subscription: &webhook_subscription::Model,
    ) -> AppResult<webhook_subscription::Model> {
        self.subscribe(
            &subscription.user_id,
            &subscription.tenant_id,
            &subscription.external_calendar_id,
        )
        .await
    }

    /// Renew every channel expiring within the renewal window.
    pub async fn renew_expiring(&self, now: DateTime<Utc>) -> AppResult<RenewalReport> {
        let expiring = self.repo.find_expiring_before(now + self.renew_before).await?;
        let mut report = RenewalReport::default();

        for subscription in &expiring {
            match self.renew(subscription).await {
                Ok(_) => report.renewed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        user_id = %subscription.user_id,
                        tenant_id = %subscription.tenant_id,
                        channel_id = %subscription.channel_id,
                        error = %e,
                        "Failed to renew calendar watch channel"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Stop and forget every channel of one owner.
    pub async fn disconnect(&self, user_id: &str, tenant_id: &str) -> AppResult<usize> {
        let subscriptions = self.repo.find_by_owner(user_id, tenant_id).await?;
        for subscription in &subscriptions {
            self.stop_quietly(subscription).await;
            self.repo.delete(&subscription.channel_id).await?;
        }
        tracing::info!(
            user_id = %user_id,
            tenant_id = %tenant_id,
            count = subscriptions.len(),
            "Calendar disconnected"
        );
        Ok(subscriptions.len())
    }

    async fn stop_quietly(&self, subscription: &webhook_subscription::Model) {
        if let Err(e) = self
            .provider
            .stop(
                &subscription.tenant_id,
                &subscription.channel_id,
                &subscription.resource_id,
            )
            .await
        {
            tracing::debug!(
                channel_id = %subscription.channel_id,
                error = %e,
                "Failed to stop superseded watch channel"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    /// Provider answering from memory and recording calls.
    #[derive(Default)]
    pub(crate) struct FakeProvider {
        pub(crate) events: Vec<CalendarEvent>,
        pub(crate) failing_calendars: HashSet<String>,
        pub(crate) watched: Mutex<Vec<(String, String)>>,
        pub(crate) stopped: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CalendarProvider for FakeProvider {
        async fn watch(
            &self,
            tenant_id: &str,
            calendar_id: &str,
            request: WatchRequest,
        ) -> AppResult<WatchChannel> {
            if self.failing_calendars.contains(calendar_id) {
                return Err(AppError::ExternalService("watch refused".to_string()));
            }
            self.watched
                .lock()
                .await
                .push((tenant_id.to_string(), calendar_id.to_string()));
            Ok(WatchChannel {
                resource_id: format!("res-{}", request.channel_id),
                expires_at: Utc::now() + TimeDelta::days(7),
            })
        }

        async fn stop(&self, _tenant_id: &str, channel_id: &str, _resource_id: &str) -> AppResult<()> {
            self.stopped.lock().await.push(channel_id.to_string());
            Ok(())
        }

        async fn upcoming_events(
            &self,
            _tenant_id: &str,
            _calendar_id: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> AppResult<Vec<CalendarEvent>> {
            Ok(self.events.clone())
        }
    }

    pub(crate) fn subscription(channel_id: &str, calendar_id: &str) -> webhook_subscription::Model {
        webhook_subscription::Model {
            channel_id: channel_id.to_string(),
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            provider: PROVIDER_GOOGLE.to_string(),
            resource_id: format!("res-{channel_id}"),
            external_calendar_id: calendar_id.to_string(),
            channel_token: "secret-token".to_string(),
            expires_at: (Utc::now() + TimeDelta::days(7)).into(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn config(address: Option<&str>) -> CalendarConfig {
        CalendarConfig {
            webhook_address: address.map(ToString::to_string),
            ..CalendarConfig::default()
        }
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    #[tokio::test]
    async fn test_subscribe_requires_webhook_address() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let service = CalendarWatchService::new(
            Arc::new(FakeProvider::default()),
            WebhookSubscriptionRepository::new(db),
            &config(None),
        )
        .unwrap();

        let err = service.subscribe("u1", "t1", "primary").await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_subscribe_replaces_previous_channel() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[subscription("old-ch", "primary")]])
                .append_exec_results([exec_ok()])
                .into_connection(),
        );
        let provider = Arc::new(FakeProvider::default());
        let service = CalendarWatchService::new(
            provider.clone(),
            WebhookSubscriptionRepository::new(db),
            &config(Some("https://herald.example.com/webhooks/calendar")),
        )
        .unwrap();

        let created = service.subscribe("u1", "t1", "primary").await.unwrap();

        assert_ne!(created.channel_id, "old-ch");
        assert_eq!(created.channel_token.len(), 64);
        assert_eq!(created.resource_id, format!("res-{}", created.channel_id));
        assert!(created.updated_at.is_some());
        assert_eq!(*provider.stopped.lock().await, vec!["old-ch".to_string()]);
    }

    #[tokio::test]
    async fn test_renew_expiring_counts_failures() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    subscription("ch-1", "work"),
                    subscription("ch-2", "broken"),
                ]])
                .append_query_results([[subscription("ch-1", "work")]])
                .append_query_results([[subscription("ch-2", "broken")]])
                .append_exec_results([exec_ok()])
                .into_connection(),
        );
        let provider = Arc::new(FakeProvider {
            failing_calendars: HashSet::from(["broken".to_string()]),
            ..FakeProvider::default()
        });
        let service = CalendarWatchService::new(
            provider.clone(),
            WebhookSubscriptionRepository::new(db),
            &config(Some("https://herald.example.com/webhooks/calendar")),
        )
        .unwrap();

        let report = service.renew_expiring(Utc::now()).await.unwrap();

        assert_eq!(report, RenewalReport { renewed: 1, failed: 1 });
        assert_eq!(*provider.stopped.lock().await, vec!["ch-1".to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_stops_and_deletes() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[subscription("ch-1", "primary")]])
                .append_exec_results([exec_ok()])
                .into_connection(),
        );
        let provider = Arc::new(FakeProvider::default());
        let service = CalendarWatchService::new(
            provider.clone(),
            WebhookSubscriptionRepository::new(db),
            &config(None),
        )
        .unwrap();

        assert_eq!(service.disconnect("u1", "t1").await.unwrap(), 1);
        assert_eq!(provider.stopped.lock().await.len(), 1);
    }

    #[test]
    fn test_parse_expiration() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let parsed = parse_expiration(Some("1749340800000"), now, 60);
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 8, 0, 0, 0).unwrap());

        let fallback = parse_expiration(None, now, 60);
        assert_eq!(fallback, now + TimeDelta::seconds(60));
    }

    #[test]
    fn test_event_items_parse() {
        let list: EventList = serde_json::from_value(json!({
            "items": [
                {"id": "e1", "status": "confirmed", "summary": "Standup",
                 "start": {"dateTime": "2025-06-01T12:00:00Z"}},
                {"id": "e2", "status": "cancelled", "start": {"date": "2025-06-02"}}
            ]
        }))
        .unwrap();
        let events: Vec<CalendarEvent> = list.items.into_iter().map(CalendarEvent::from).collect();

        assert_eq!(events[0].start, Some(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        assert!(!events[0].all_day);
        assert!(events[1].all_day);
        assert!(events[1].is_cancelled());
    }

    #[test]
    fn test_event_notification_escalates_imminent_events() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 11, 30, 0).unwrap();
        let event = CalendarEvent {
            id: "e1".to_string(),
            status: None,
            summary: Some("Standup".to_string()),
            start: Some(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()),
            all_day: false,
        };

        let n = event_notification(&subscription("ch-1", "primary"), &event, now);

        assert_eq!(n.title, "Upcoming: Standup");
        assert_eq!(n.body, "Starts at 2025-06-01 12:00 UTC");
        assert_eq!(n.priority, Priority::High);
        assert_eq!(n.target_tenant_id, "t1");
        assert_eq!(n.data["calendarId"], "primary");
    }

    #[test]
    fn test_urlencode_calendar_id() {
        assert_eq!(urlencode("team@group.calendar.google.com"), "team%40group.calendar.google.com");
        assert_eq!(urlencode("a b"), "a%20b");
    }
}
