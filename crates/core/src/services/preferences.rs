//! Preference store and quiet-hours evaluation.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use herald_common::{AppError, AppResult};
use herald_db::entities::delivery_preference::Model as DeliveryPreference;
use herald_db::repositories::DeliveryPreferenceRepository;
use serde::Deserialize;
use validator::Validate;

/// Partial settings update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    /// Master switch for all notifications
    pub enabled: Option<bool>,
    /// Calendar notifications
    pub calendar_enabled: Option<bool>,
    /// Banking notifications
    pub banking_enabled: Option<bool>,
    /// System notifications
    pub system_enabled: Option<bool>,
    /// Data change notifications
    pub data_change_enabled: Option<bool>,
    /// Show message bodies in push payloads
    pub show_preview: Option<bool>,
    /// Hold non-urgent notifications during quiet hours
    pub quiet_hours_enabled: Option<bool>,
    /// Quiet hours start, `HH:MM` local time
    pub quiet_hours_start: Option<String>,
    /// Quiet hours end, `HH:MM` local time
    pub quiet_hours_end: Option<String>,
    /// IANA timezone for quiet hours
    #[validate(length(min = 1, max = 64))]
    pub timezone: Option<String>,
    /// Push channel
    pub push_enabled: Option<bool>,
    /// Email channel
    pub email_enabled: Option<bool>,
    /// Chat channel
    pub chat_enabled: Option<bool>,
    /// Email address for the email channel
    #[validate(email)]
    pub email: Option<String>,
    /// Phone number for the chat channel
    #[validate(length(min = 5, max = 32))]
    pub phone: Option<String>,
}

/// Preference store service.
#[derive(Clone)]
pub struct PreferenceStore {
    repo: DeliveryPreferenceRepository,
}

impl PreferenceStore {
    /// Create a new preference store.
    #[must_use]
    pub const fn new(repo: DeliveryPreferenceRepository) -> Self {
        Self { repo }
    }

    /// Preferences of one owner, created with defaults on first access.
    pub async fn get(&self, user_id: &str, tenant_id: &str) -> AppResult<DeliveryPreference> {
        if let Some(existing) = self.repo.find(user_id, tenant_id).await? {
            return Ok(existing);
        }

        tracing::debug!(user_id = %user_id, tenant_id = %tenant_id, "Creating default preferences");
        self.repo
            .insert_default(default_preferences(user_id, tenant_id, Utc::now()))
            .await
    }

    /// Merge `update` over the stored preferences and persist the result.
    pub async fn update(
        &self,
        user_id: &str,
        tenant_id: &str,
        update: PreferenceUpdate,
    ) -> AppResult<DeliveryPreference> {
        update.validate()?;
        if let Some(start) = &update.quiet_hours_start {
            parse_clock(start)?;
        }
        if let Some(end) = &update.quiet_hours_end {
            parse_clock(end)?;
        }
        if let Some(tz) = &update.timezone {
            tz.parse::<Tz>()
                .map_err(|_| AppError::Validation(format!("Unknown timezone: {tz}")))?;
        }

        let current = match self.repo.find(user_id, tenant_id).await? {
            Some(existing) => existing,
            None => default_preferences(user_id, tenant_id, Utc::now()),
        };

        let merged = merge(current, update, Utc::now());
        self.repo.upsert(merged).await
    }
}

/// Defaults for a user seen for the first time.
#[must_use]
pub fn default_preferences(user_id: &str, tenant_id: &str, now: DateTime<Utc>) -> DeliveryPreference {
    DeliveryPreference {
        user_id: user_id.to_string(),
        tenant_id: tenant_id.to_string(),
        enabled: true,
        calendar_enabled: true,
        banking_enabled: true,
        system_enabled: true,
        data_change_enabled: true,
        show_preview: true,
        quiet_hours_enabled: false,
        quiet_hours_start: "22:00".to_string(),
        quiet_hours_end: "08:00".to_string(),
        timezone: "UTC".to_string(),
        push_enabled: true,
        email_enabled: false,
        chat_enabled: false,
        email: None,
        phone: None,
        created_at: now.into(),
        updated_at: None,
    }
}

fn merge(mut prefs: DeliveryPreference, update: PreferenceUpdate, now: DateTime<Utc>) -> DeliveryPreference {
    macro_rules! apply {
        ($($field:ident),* $(,)?) => {
            $(if let Some(value) = update.$field { prefs.$field = value; })*
        };
    }
    apply!(
        enabled,
        calendar_enabled,
        banking_enabled,
        system_enabled,
        data_change_enabled,
        show_preview,
        quiet_hours_enabled,
        quiet_hours_start,
        quiet_hours_end,
        timezone,
        push_enabled,
        email_enabled,
        chat_enabled,
    );
    if update.email.is_some() {
        prefs.email = update.email;
    }
    if update.phone.is_some() {
        prefs.phone = update.phone;
    }
    prefs.updated_at = Some(now.into());
    prefs
}

/// Parse a `HH:MM` clock time.
pub fn parse_clock(value: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| AppError::Validation(format!("Expected HH:MM, got {value:?}")))
}

/// Whether `now` falls inside the quiet window `[start, end]`.
///
/// Compared at minute resolution with both bounds inclusive. A window with
/// `start >= end` wraps past midnight.
#[must_use]
pub fn is_quiet_time(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    let minutes = |t: NaiveTime| t.hour() * 60 + t.minute();
    let (start, end, now) = (minutes(start), minutes(end), minutes(now));

    if start < end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}

/// Whether quiet hours suppress push for these preferences at `now`.
///
/// Unparseable stored values disable the window rather than silence the
/// user forever; an unknown zone falls back to UTC.
#[must_use]
pub fn quiet_hours_active(prefs: &DeliveryPreference, now: DateTime<Utc>) -> bool {
    if !prefs.quiet_hours_enabled {
        return false;
    }

    let (Ok(start), Ok(end)) = (
        parse_clock(&prefs.quiet_hours_start),
        parse_clock(&prefs.quiet_hours_end),
    ) else {
        tracing::warn!(
            user_id = %prefs.user_id,
            tenant_id = %prefs.tenant_id,
            "Stored quiet hours are malformed, ignoring"
        );
        return false;
    };

    let local = prefs
        .timezone
        .parse::<Tz>()
        .map_or_else(|_| now.time(), |tz| now.with_timezone(&tz).time());

    is_quiet_time(start, end, local)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn t(value: &str) -> NaiveTime {
        parse_clock(value).unwrap()
    }

    #[test]
    fn test_quiet_hours_wrap_past_midnight() {
        let (start, end) = (t("22:00"), t("08:00"));

        assert!(is_quiet_time(start, end, t("23:30")));
        assert!(is_quiet_time(start, end, t("03:00")));
        assert!(is_quiet_time(start, end, t("22:00")));
        assert!(is_quiet_time(start, end, t("08:00")));
        assert!(!is_quiet_time(start, end, t("12:00")));
        assert!(!is_quiet_time(start, end, t("08:01")));
    }

    #[test]
    fn test_quiet_hours_same_day_window() {
        let (start, end) = (t("13:00"), t("14:30"));

        assert!(is_quiet_time(start, end, t("13:00")));
        assert!(is_quiet_time(start, end, t("14:30")));
        assert!(!is_quiet_time(start, end, t("12:59")));
        assert!(!is_quiet_time(start, end, t("23:00")));
    }

    #[test]
    fn test_quiet_hours_ignore_seconds() {
        let now = NaiveTime::from_hms_opt(8, 0, 59).unwrap();
        assert!(is_quiet_time(t("22:00"), t("08:00"), now));
    }

    #[test]
    fn test_quiet_hours_use_local_timezone() {
        let mut prefs = default_preferences("u1", "t1", Utc::now());
        prefs.quiet_hours_enabled = true;
        prefs.timezone = "America/Sao_Paulo".to_string();

        // 02:00 UTC is 23:00 in Sao Paulo
        let night = Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap();
        // 15:00 UTC is 12:00 in Sao Paulo
        let noon = Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap();

        assert!(quiet_hours_active(&prefs, night));
        assert!(!quiet_hours_active(&prefs, noon));

        prefs.quiet_hours_enabled = false;
        assert!(!quiet_hours_active(&prefs, night));
    }

    #[test]
    fn test_parse_clock_rejects_garbage() {
        assert!(parse_clock("25:00").is_err());
        assert!(parse_clock("7pm").is_err());
        assert!(parse_clock("07:05").is_ok());
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut current = default_preferences("u1", "t1", Utc::now());
        current.email = Some("old@example.com".to_string());

        let merged = merge(
            current,
            PreferenceUpdate {
                show_preview: Some(false),
                chat_enabled: Some(true),
                ..Default::default()
            },
            Utc::now(),
        );

        assert!(!merged.show_preview);
        assert!(merged.chat_enabled);
        assert!(merged.enabled);
        assert_eq!(merged.email.as_deref(), Some("old@example.com"));
        assert!(merged.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_get_returns_stored_row() {
        let mut stored = default_preferences("u1", "t1", Utc::now());
        stored.banking_enabled = false;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[stored]])
                .into_connection(),
        );
        let store = PreferenceStore::new(DeliveryPreferenceRepository::new(db));

        let prefs = store.get("u1", "t1").await.unwrap();
        assert!(!prefs.banking_enabled);
    }

    #[tokio::test]
    async fn test_get_creates_defaults_lazily() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<DeliveryPreference>::new()])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let store = PreferenceStore::new(DeliveryPreferenceRepository::new(db));

        let prefs = store.get("u1", "t1").await.unwrap();

        assert!(prefs.enabled);
        assert!(prefs.calendar_enabled && prefs.banking_enabled);
        assert!(prefs.system_enabled && prefs.data_change_enabled);
        assert!(!prefs.quiet_hours_enabled);
        assert_eq!(prefs.tenant_id, "t1");
    }

    #[tokio::test]
    async fn test_update_validates_before_touching_store() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let store = PreferenceStore::new(DeliveryPreferenceRepository::new(db));

        let bad_clock = store
            .update(
                "u1",
                "t1",
                PreferenceUpdate {
                    quiet_hours_start: Some("10pm".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad_clock, Err(AppError::Validation(_))));

        let bad_zone = store
            .update(
                "u1",
                "t1",
                PreferenceUpdate {
                    timezone: Some("Mars/Olympus".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad_zone, Err(AppError::Validation(_))));

        let bad_email = store
            .update(
                "u1",
                "t1",
                PreferenceUpdate {
                    email: Some("not-an-email".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad_email, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_merges_and_upserts() {
        let stored = default_preferences("u1", "t1", Utc::now());

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[stored]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let store = PreferenceStore::new(DeliveryPreferenceRepository::new(db));

        let updated = store
            .update(
                "u1",
                "t1",
                PreferenceUpdate {
                    quiet_hours_enabled: Some(true),
                    quiet_hours_start: Some("23:00".to_string()),
                    email_enabled: Some(true),
                    email: Some("ana@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.quiet_hours_enabled);
        assert_eq!(updated.quiet_hours_start, "23:00");
        assert_eq!(updated.quiet_hours_end, "08:00");
        assert_eq!(updated.email.as_deref(), Some("ana@example.com"));
    }
}
