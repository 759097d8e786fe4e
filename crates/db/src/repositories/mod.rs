//! Repositories.
//!
//! Every query that touches per-owner data filters on both `user_id` and
//! `tenant_id`; the only owner-agnostic paths are the ones keyed by an
//! identifier the system itself issued (endpoint hash, channel id).

mod delivery_preference;
mod delivery_record;
mod device_endpoint;
mod feed_connection;
mod webhook_subscription;

pub use delivery_preference::DeliveryPreferenceRepository;
pub use delivery_record::DeliveryRecordRepository;
pub use device_endpoint::DeviceEndpointRepository;
pub use feed_connection::FeedConnectionRepository;
pub use webhook_subscription::WebhookSubscriptionRepository;
