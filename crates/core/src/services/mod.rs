//! Business logic services.

pub mod channels;
pub mod chat;
pub mod credentials;
pub mod device_registry;
pub mod dispatcher;
pub mod email;
pub mod event;
pub mod history;
pub mod ingestion;
pub mod preferences;
pub mod push;

pub use channels::{ChannelAdapter, ChannelMessage, Recipient};
pub use chat::{ChatChannel, ChatGatewayClient};
pub use credentials::{
    ClientCache, ConfigCredentialResolver, CredentialKind, CredentialResolver, Credentials,
    SYSTEM_SCOPE,
};
pub use device_registry::{DeviceInfo, DeviceRegistry, DeviceSummary};
pub use dispatcher::{ChannelOutcome, DispatchResult, Dispatcher, SuppressionReason};
pub use email::EmailChannel;
pub use event::{Channel, NotificationCategory, NotificationEvent, Priority};
pub use history::HistoryLog;
pub use ingestion::feeds::{FeedConnections, FeedSource};
pub use ingestion::{
    CalendarWatchService, GoogleCalendarProvider, Headers, IgnoreReason, IngestOutcome,
    RenewalReport, WebhookIngestion, WebhookSource,
};
pub use preferences::{PreferenceStore, PreferenceUpdate};
pub use push::{PushDeliveryEngine, PushFailure, PushTransport, WebPushTransport, load_vapid_keys};
