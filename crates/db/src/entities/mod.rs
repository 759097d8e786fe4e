//! Database entities.

pub mod delivery_preference;
pub mod delivery_record;
pub mod device_endpoint;
pub mod feed_connection;
pub mod webhook_subscription;

pub use delivery_preference::Entity as DeliveryPreference;
pub use delivery_record::Entity as DeliveryRecord;
pub use device_endpoint::Entity as DeviceEndpoint;
pub use feed_connection::Entity as FeedConnection;
pub use webhook_subscription::Entity as WebhookSubscription;
