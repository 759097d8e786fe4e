//! Periodic background jobs.

use std::time::Duration;

use chrono::Utc;
use herald_core::{CalendarWatchService, RenewalReport};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Run one renewal sweep, logging instead of failing.
pub async fn renew_calendar_channels(calendar: &CalendarWatchService) -> Option<RenewalReport> {
    match calendar.renew_expiring(Utc::now()).await {
        Ok(report) => {
            if report.renewed > 0 || report.failed > 0 {
                tracing::info!(
                    renewed = report.renewed,
                    failed = report.failed,
                    "Renewed expiring calendar watch channels"
                );
            }
            Some(report)
        }
        Err(e) => {
            tracing::error!(error = %e, "Calendar renewal sweep failed");
            None
        }
    }
}

/// Spawn the calendar renewal ticker.
///
/// Returns `None` when `period_secs` is zero, which leaves renewal to an
/// external scheduler.
pub fn spawn_calendar_renewal(
    calendar: CalendarWatchService,
    period_secs: u64,
) -> Option<JoinHandle<()>> {
    if period_secs == 0 {
        tracing::info!("Calendar renewal ticker disabled");
        return None;
    }

    let period = Duration::from_secs(period_secs);
    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            renew_calendar_channels(&calendar).await;
        }
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration as TimeDelta;
    use herald_common::config::CalendarConfig;
    use herald_core::{ClientCache, ConfigCredentialResolver, GoogleCalendarProvider};
    use herald_db::entities::webhook_subscription;
    use herald_db::repositories::WebhookSubscriptionRepository;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn service(db: MockDatabase) -> CalendarWatchService {
        let config = CalendarConfig::default();
        let provider = GoogleCalendarProvider::new(
            &config,
            Arc::new(ConfigCredentialResolver::default()),
            ClientCache::new(),
        );
        CalendarWatchService::new(
            Arc::new(provider),
            WebhookSubscriptionRepository::new(Arc::new(db.into_connection())),
            &config,
        )
        .unwrap()
    }

    fn expiring(channel_id: &str) -> webhook_subscription::Model {
        let now = Utc::now();
        webhook_subscription::Model {
            channel_id: channel_id.to_string(),
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            provider: "google_calendar".to_string(),
            resource_id: "res-1".to_string(),
            external_calendar_id: "primary".to_string(),
            channel_token: "secret-token".to_string(),
            expires_at: (now + TimeDelta::hours(1)).into(),
            created_at: now.into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_zero_period_disables_ticker() {
        let calendar = service(MockDatabase::new(DatabaseBackend::Postgres));
        assert!(spawn_calendar_renewal(calendar, 0).is_none());
    }

    #[tokio::test]
    async fn test_sweep_counts_failures_without_erroring() {
        // No webhook address is configured, so every renewal fails.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![expiring("ch-1"), expiring("ch-2")]]);
        let calendar = service(db);

        let report = renew_calendar_channels(&calendar).await.unwrap();

        assert_eq!(report, RenewalReport { renewed: 0, failed: 2 });
    }

    #[tokio::test]
    async fn test_sweep_swallows_store_errors() {
        // An empty mock has no result queued for the expiring query.
        let calendar = service(MockDatabase::new(DatabaseBackend::Postgres));

        assert!(renew_calendar_channels(&calendar).await.is_none());
    }
}
