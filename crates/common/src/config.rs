//! Application configuration.

use chrono::TimeDelta;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::AppError;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Web Push configuration.
    #[serde(default)]
    pub push: PushConfig,
    /// SMTP configuration for the email channel.
    #[serde(default)]
    pub email: Option<SmtpConfig>,
    /// System-level chat gateway (WhatsApp) configuration.
    #[serde(default)]
    pub chat: Option<ChatGatewayConfig>,
    /// Calendar watch configuration.
    #[serde(default)]
    pub calendar: CalendarConfig,
    /// Banking aggregator configuration.
    #[serde(default)]
    pub banking: BankingConfig,
    /// Dispatcher tuning.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Per-tenant credential overrides, keyed by tenant id.
    #[serde(default)]
    pub tenants: HashMap<String, TenantCredentialsConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this deployment.
    pub public_url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Web Push (VAPID) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// VAPID public key (base64url, uncompressed P-256 point).
    #[serde(default)]
    pub vapid_public_key: Option<String>,
    /// VAPID private key (base64url, raw P-256 scalar).
    #[serde(default)]
    pub vapid_private_key: Option<String>,
    /// VAPID subject, a `mailto:` or `https:` URL.
    #[serde(default = "default_vapid_subject")]
    pub subject: String,
    /// Time-to-live handed to the push provider, in seconds.
    #[serde(default = "default_push_ttl")]
    pub ttl_secs: u32,
    /// Upper bound for a single push request, in seconds.
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Use implicit TLS.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Username.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// From address.
    pub from_address: String,
    /// From display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Send timeout, in seconds.
    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,
}

/// Chat gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatGatewayConfig {
    /// Gateway base URL.
    pub base_url: String,
    /// Gateway API key.
    pub api_key: String,
    /// Gateway instance (sender line) name.
    pub instance: String,
    /// Request timeout, in seconds.
    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,
}

/// Calendar watch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    /// Calendar API base URL.
    #[serde(default = "default_calendar_api")]
    pub api_base_url: String,
    /// Public URL the provider posts change notifications to.
    #[serde(default)]
    pub webhook_address: Option<String>,
    /// Requested channel lifetime, in seconds.
    #[serde(default = "default_watch_ttl")]
    pub watch_ttl_secs: u64,
    /// How far ahead to look for events when a change arrives, in hours.
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: i64,
    /// Renew channels expiring within this many seconds.
    #[serde(default = "default_renew_before")]
    pub renew_before_secs: i64,
    /// Interval of the in-process renewal ticker (0 disables it).
    #[serde(default = "default_renewal_interval")]
    pub renewal_interval_secs: u64,
    /// System-level OAuth access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Request timeout, in seconds.
    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,
}

/// Banking aggregator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BankingConfig {
    /// System-level webhook signing secret.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound for one email/chat attempt, in seconds.
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_secs: u64,
    /// Body used in place of the real text when previews are off.
    #[serde(default = "default_preview_placeholder")]
    pub preview_placeholder: String,
    /// Number of recent webhook keys remembered for dedup.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

/// Credentials configured for a single tenant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantCredentialsConfig {
    /// Chat gateway API key.
    #[serde(default)]
    pub chat_api_key: Option<String>,
    /// Chat gateway instance name.
    #[serde(default)]
    pub chat_instance: Option<String>,
    /// Chat gateway base URL (falls back to the system gateway).
    #[serde(default)]
    pub chat_base_url: Option<String>,
    /// Calendar OAuth access token.
    #[serde(default)]
    pub calendar_access_token: Option<String>,
    /// Banking webhook signing secret.
    #[serde(default)]
    pub bank_webhook_secret: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_vapid_subject() -> String {
    "mailto:admin@localhost".to_string()
}

const fn default_push_ttl() -> u32 {
    86_400
}

const fn default_push_timeout() -> u64 {
    30
}

const fn default_smtp_port() -> u16 {
    465
}

const fn default_true() -> bool {
    true
}

fn default_from_name() -> String {
    "Herald".to_string()
}

const fn default_channel_timeout() -> u64 {
    15
}

fn default_calendar_api() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

const fn default_watch_ttl() -> u64 {
    7 * 24 * 3600
}

const fn default_lookahead_hours() -> i64 {
    24
}

const fn default_renew_before() -> i64 {
    24 * 3600
}

const fn default_renewal_interval() -> u64 {
    3600
}

fn default_preview_placeholder() -> String {
    "You have a new notification".to_string()
}

const fn default_dedup_capacity() -> usize {
    1024
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            vapid_private_key: None,
            subject: default_vapid_subject(),
            ttl_secs: default_push_ttl(),
            timeout_secs: default_push_timeout(),
        }
    }
}

impl CalendarConfig {
    /// Window of upcoming events fetched per change notification.
    pub fn lookahead(&self) -> Result<TimeDelta, AppError> {
        if self.lookahead_hours <= 0 {
            return Err(AppError::Config(
                "calendar.lookahead_hours must be positive".to_string(),
            ));
        }
        TimeDelta::try_hours(self.lookahead_hours).ok_or_else(|| {
            AppError::Config("calendar.lookahead_hours is out of range".to_string())
        })
    }

    /// How long before expiry a watch channel is renewed.
    pub fn renew_before(&self) -> Result<TimeDelta, AppError> {
        if self.renew_before_secs < 0 {
            return Err(AppError::Config(
                "calendar.renew_before_secs must not be negative".to_string(),
            ));
        }
        TimeDelta::try_seconds(self.renew_before_secs).ok_or_else(|| {
            AppError::Config("calendar.renew_before_secs is out of range".to_string())
        })
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_calendar_api(),
            webhook_address: None,
            watch_ttl_secs: default_watch_ttl(),
            lookahead_hours: default_lookahead_hours(),
            renew_before_secs: default_renew_before(),
            renewal_interval_secs: default_renewal_interval(),
            access_token: None,
            timeout_secs: default_channel_timeout(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_timeout_secs: default_channel_timeout(),
            preview_placeholder: default_preview_placeholder(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `HERALD_ENV`)
    /// 4. Environment variables with `HERALD__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = Self::load_unchecked()?;
        config
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    fn load_unchecked() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("HERALD_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("HERALD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject values that would make services misbehave at runtime.
    pub fn validate(&self) -> Result<(), AppError> {
        self.calendar.lookahead()?;
        self.calendar.renew_before()?;
        Ok(())
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("HERALD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
