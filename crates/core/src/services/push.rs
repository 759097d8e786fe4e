//! Push delivery engine (Web Push with VAPID).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use herald_common::config::PushConfig;
use herald_common::{AppError, AppResult, VapidKeypair};
use herald_db::entities::device_endpoint;
use serde::Serialize;
use thiserror::Error;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder,
};

use super::credentials::{CredentialKind, CredentialResolver, Credentials, SYSTEM_SCOPE};
use super::device_registry::DeviceRegistry;

/// Load the deployment's VAPID key pair through the credential resolver,
/// or generate one.
///
/// A generated pair only lives as long as the process. Every subscription
/// created against it silently stops working after a restart, so both
/// halves are logged for the operator to persist.
pub async fn load_vapid_keys(credentials: &dyn CredentialResolver) -> AppResult<VapidKeypair> {
    if let Some(Credentials::PushKeys {
        public_key,
        private_key,
    }) = credentials
        .resolve(CredentialKind::PushKeys, SYSTEM_SCOPE)
        .await?
    {
        let keys = VapidKeypair::from_private_key(&private_key)?;
        if let Some(public_key) = public_key {
            if public_key.trim_end_matches('=') != keys.public_key {
                tracing::warn!(
                    configured = %public_key,
                    derived = %keys.public_key,
                    "Configured VAPID public key does not match the private key; using the derived key"
                );
            }
        }
        tracing::info!(public_key = %keys.public_key, "Loaded VAPID keys");
        return Ok(keys);
    }

    let keys = VapidKeypair::generate()?;
    tracing::warn!(
        public_key = %keys.public_key,
        private_key = %keys.private_key,
        "No VAPID keys configured; generated an ephemeral pair. Set push.vapid_public_key and \
         push.vapid_private_key to these values or existing subscriptions will break on restart"
    );
    Ok(keys)
}

/// Provider-level outcome of a single push send.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushSendError {
    /// The provider no longer knows the endpoint (404/410).
    #[error("endpoint gone")]
    Gone,
    /// The provider refused the message for another reason.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The message never reached the provider.
    #[error("transport: {0}")]
    Transport(String),
}

/// Sends one encrypted message to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Deliver `payload` with the given TTL.
    async fn send(
        &self,
        subscription: &SubscriptionInfo,
        payload: &[u8],
        ttl_secs: u32,
    ) -> Result<(), PushSendError>;
}

/// [`PushTransport`] over the `web-push` crate.
pub struct WebPushTransport {
    client: IsahcWebPushClient,
    private_key_pem: String,
    subject: String,
}

impl WebPushTransport {
    /// Create a transport signing with `keys`.
    pub fn new(keys: &VapidKeypair, subject: &str) -> AppResult<Self> {
        let client = IsahcWebPushClient::new()
            .map_err(|e| AppError::Internal(format!("Failed to build push client: {e}")))?;

        Ok(Self {
            client,
            private_key_pem: keys.private_key_pem.clone(),
            subject: subject.to_string(),
        })
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn send(
        &self,
        subscription: &SubscriptionInfo,
        payload: &[u8],
        ttl_secs: u32,
    ) -> Result<(), PushSendError> {
        let mut signature =
            VapidSignatureBuilder::from_pem(self.private_key_pem.as_bytes(), subscription)
                .map_err(|e| PushSendError::Rejected(format!("VAPID signing failed: {e}")))?;
        signature.add_claim("sub", self.subject.as_str());
        let signature = signature
            .build()
            .map_err(|e| PushSendError::Rejected(format!("VAPID signing failed: {e}")))?;

        let mut builder = WebPushMessageBuilder::new(subscription);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(ttl_secs);
        builder.set_vapid_signature(signature);
        let message = builder
            .build()
            .map_err(|e| PushSendError::Rejected(format!("Failed to build message: {e}")))?;

        self.client.send(message).await.map_err(classify)
    }
}

fn classify(err: WebPushError) -> PushSendError {
    match err {
        WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. } => {
            PushSendError::Gone
        }
        WebPushError::Unauthorized { .. }
        | WebPushError::BadRequest { .. }
        | WebPushError::PayloadTooLarge { .. }
        | WebPushError::InvalidUri { .. }
        | WebPushError::InvalidCryptoKeys { .. } => PushSendError::Rejected(err.to_string()),
        other => PushSendError::Transport(other.to_string()),
    }
}

/// Why a single device delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushFailure {
    /// Stored subscription JSON is unusable. Not evicted.
    #[error("malformed subscription: {0}")]
    MalformedSubscription(String),
    /// The endpoint is dead and was evicted.
    #[error("endpoint gone")]
    Gone,
    /// Anything else; the caller does not retry.
    #[error("transient: {0}")]
    Transient(String),
}

/// Body handed to the service worker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    /// Delivery record id, so the client can mark it read.
    pub id: String,
    /// Category name; serialized as `type`
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Notification title
    pub title: String,
    /// Body text, or a placeholder when previews are off
    pub body: String,
    /// Priority name
    pub priority: String,
    /// Event data
    pub data: serde_json::Value,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

/// Delivers payloads to single endpoints and heals the registry.
#[derive(Clone)]
pub struct PushDeliveryEngine {
    transport: Arc<dyn PushTransport>,
    registry: DeviceRegistry,
    ttl_secs: u32,
    timeout: Duration,
}

impl PushDeliveryEngine {
    /// Create a new push delivery engine.
    #[must_use]
    pub fn new(transport: Arc<dyn PushTransport>, registry: DeviceRegistry, config: &PushConfig) -> Self {
        Self {
            transport,
            registry,
            ttl_secs: config.ttl_secs,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Deliver an already serialized payload to one device.
    pub async fn deliver(
        &self,
        endpoint: &device_endpoint::Model,
        payload: &[u8],
    ) -> Result<(), PushFailure> {
        let subscription: SubscriptionInfo = serde_json::from_str(&endpoint.subscription_payload)
            .map_err(|e| {
                tracing::warn!(
                    token_hash = %endpoint.token_hash,
                    error = %e,
                    "Stored subscription is malformed"
                );
                PushFailure::MalformedSubscription(e.to_string())
            })?;

        let sent = tokio::time::timeout(
            self.timeout,
            self.transport.send(&subscription, payload, self.ttl_secs),
        )
        .await;

        match sent {
            Ok(Ok(())) => {
                tracing::debug!(token_hash = %endpoint.token_hash, "Push delivered");
                if let Err(e) = self.registry.touch(&endpoint.token_hash, Utc::now()).await {
                    tracing::debug!(token_hash = %endpoint.token_hash, error = %e, "Failed to touch device");
                }
                Ok(())
            }
            Ok(Err(PushSendError::Gone)) => {
                tracing::warn!(
                    token_hash = %endpoint.token_hash,
                    user_id = %endpoint.user_id,
                    tenant_id = %endpoint.tenant_id,
                    "Push endpoint gone, evicting"
                );
                if let Err(e) = self.registry.evict(&endpoint.token_hash).await {
                    tracing::error!(token_hash = %endpoint.token_hash, error = %e, "Failed to evict device");
                }
                Err(PushFailure::Gone)
            }
            Ok(Err(e)) => {
                tracing::debug!(token_hash = %endpoint.token_hash, error = %e, "Push failed");
                Err(PushFailure::Transient(e.to_string()))
            }
            Err(_) => {
                tracing::debug!(token_hash = %endpoint.token_hash, "Push timed out");
                Err(PushFailure::Transient("timed out".to_string()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::services::credentials::ConfigCredentialResolver;
    use herald_db::entities::device_endpoint::DeviceType;
    use herald_db::repositories::DeviceEndpointRepository;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Transport that answers from a table keyed by endpoint URL and
    /// records every payload it receives.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub(crate) responses: HashMap<String, PushSendError>,
        pub(crate) sent: Mutex<Vec<(String, Vec<u8>, u32)>>,
    }

    impl FakeTransport {
        pub(crate) fn failing(endpoint: &str, err: PushSendError) -> Self {
            let mut responses = HashMap::new();
            responses.insert(endpoint.to_string(), err);
            Self {
                responses,
                sent: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl PushTransport for FakeTransport {
        async fn send(
            &self,
            subscription: &SubscriptionInfo,
            payload: &[u8],
            ttl_secs: u32,
        ) -> Result<(), PushSendError> {
            self.sent
                .lock()
                .await
                .push((subscription.endpoint.clone(), payload.to_vec(), ttl_secs));
            match self.responses.get(&subscription.endpoint) {
                Some(PushSendError::Gone) => Err(PushSendError::Gone),
                Some(PushSendError::Rejected(m)) => Err(PushSendError::Rejected(m.clone())),
                Some(PushSendError::Transport(m)) => Err(PushSendError::Transport(m.clone())),
                None => Ok(()),
            }
        }
    }

    pub(crate) fn device(token_hash: &str, endpoint: &str) -> device_endpoint::Model {
        device_endpoint::Model {
            token_hash: token_hash.to_string(),
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            subscription_payload: serde_json::json!({
                "endpoint": endpoint,
                "keys": { "p256dh": "p256dh-key", "auth": "auth-key" }
            })
            .to_string(),
            device_type: DeviceType::Web,
            user_agent: None,
            last_active_at: Utc::now().into(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn engine(transport: Arc<FakeTransport>, db: MockDatabase) -> PushDeliveryEngine {
        let registry = DeviceRegistry::new(DeviceEndpointRepository::new(Arc::new(db.into_connection())));
        PushDeliveryEngine::new(transport, registry, &PushConfig::default())
    }

    fn exec_ok(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_deliver_success_uses_configured_ttl() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine(
            transport.clone(),
            MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([exec_ok(1)]),
        );

        let result = engine
            .deliver(&device("h1", "https://push.example.net/a"), b"{}")
            .await;

        assert!(result.is_ok());
        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, 86_400);
    }

    #[tokio::test]
    async fn test_deliver_gone_evicts() {
        let transport = Arc::new(FakeTransport::failing(
            "https://push.example.net/dead",
            PushSendError::Gone,
        ));
        let engine = engine(
            transport,
            MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([exec_ok(1)]),
        );

        let result = engine
            .deliver(&device("h1", "https://push.example.net/dead"), b"{}")
            .await;

        assert_eq!(result, Err(PushFailure::Gone));
    }

    #[tokio::test]
    async fn test_deliver_transport_error_is_transient() {
        let transport = Arc::new(FakeTransport::failing(
            "https://push.example.net/flaky",
            PushSendError::Transport("connection reset".to_string()),
        ));
        let engine = engine(transport, MockDatabase::new(DatabaseBackend::Postgres));

        let result = engine
            .deliver(&device("h1", "https://push.example.net/flaky"), b"{}")
            .await;

        assert!(matches!(result, Err(PushFailure::Transient(_))));
    }

    #[tokio::test]
    async fn test_deliver_malformed_subscription_is_not_evicted() {
        let transport = Arc::new(FakeTransport::default());
        // No exec results: an eviction attempt would surface as a logged
        // error, but the assertion below is on the transport never running.
        let engine = engine(transport.clone(), MockDatabase::new(DatabaseBackend::Postgres));

        let mut broken = device("h1", "https://push.example.net/a");
        broken.subscription_payload = "{not json".to_string();

        let result = engine.deliver(&broken, b"{}").await;

        assert!(matches!(result, Err(PushFailure::MalformedSubscription(_))));
        assert!(transport.sent.lock().await.is_empty());
    }

    struct StaticPushKeys(Option<(Option<String>, String)>);

    #[async_trait]
    impl CredentialResolver for StaticPushKeys {
        async fn resolve(
            &self,
            kind: CredentialKind,
            tenant_id: &str,
        ) -> AppResult<Option<Credentials>> {
            assert_eq!(kind, CredentialKind::PushKeys);
            assert_eq!(tenant_id, SYSTEM_SCOPE);
            Ok(self.0.clone().map(|(public_key, private_key)| Credentials::PushKeys {
                public_key,
                private_key,
            }))
        }
    }

    #[tokio::test]
    async fn test_load_vapid_keys_generates_when_absent() {
        let keys = load_vapid_keys(&StaticPushKeys(None)).await.unwrap();
        assert!(!keys.public_key.is_empty());
    }

    #[tokio::test]
    async fn test_load_vapid_keys_derives_public_half() {
        let generated = VapidKeypair::generate().unwrap();
        let resolver = StaticPushKeys(Some((
            Some("mismatched".to_string()),
            generated.private_key.clone(),
        )));

        let loaded = load_vapid_keys(&resolver).await.unwrap();
        assert_eq!(loaded.public_key, generated.public_key);
    }

    #[tokio::test]
    async fn test_load_vapid_keys_rejects_bad_private_key() {
        let resolver = StaticPushKeys(Some((None, "definitely-not-a-key".to_string())));
        assert!(load_vapid_keys(&resolver).await.is_err());
    }

    #[tokio::test]
    async fn test_load_vapid_keys_from_config_resolver() {
        let generated = VapidKeypair::generate().unwrap();
        let mut config: herald_common::Config = serde_json::from_value(serde_json::json!({
            "server": { "public_url": "http://localhost:3000" },
            "database": { "url": "postgres://localhost/herald" }
        }))
        .unwrap();
        config.push.vapid_private_key = Some(generated.private_key.clone());
        let resolver = ConfigCredentialResolver::new(&config);

        let loaded = load_vapid_keys(&resolver).await.unwrap();
        assert_eq!(loaded.public_key, generated.public_key);
    }

    #[test]
    fn test_classify_invalid_uri_as_rejected() {
        assert!(matches!(
            classify(WebPushError::InvalidUri),
            PushSendError::Rejected(_)
        ));
    }
}
