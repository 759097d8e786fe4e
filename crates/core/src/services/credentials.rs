//! Credential resolution and per-tenant client caching.
//!
//! Adapters never read configuration directly. They ask a
//! [`CredentialResolver`] for the credentials of a `(kind, tenant)` pair and
//! keep the client built from them in a [`ClientCache`], which is the only
//! place a constructed client lives. Rotating a tenant's credentials means
//! invalidating its cache entry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{AppResult, Config, config::TenantCredentialsConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Tenant id under which deployment-wide credentials are resolved.
///
/// VAPID keys are shared by every tenant because browsers pin the public
/// key a subscription was created with.
pub const SYSTEM_SCOPE: &str = "*";

/// Kinds of credentials the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// VAPID key pair
    PushKeys,
    /// Chat gateway instance
    ChatGateway,
    /// Calendar API OAuth token
    CalendarOauth,
    /// Banking webhook HMAC secret
    BankWebhook,
}

impl CredentialKind {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PushKeys => "push_keys",
            Self::ChatGateway => "chat_gateway",
            Self::CalendarOauth => "calendar_oauth",
            Self::BankWebhook => "bank_webhook",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decrypted credentials, one shape per [`CredentialKind`].
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// VAPID key pair; the public half is derived when absent
    PushKeys {
        /// Base64url public key
        public_key: Option<String>,
        /// Base64url private key
        private_key: String,
    },
    /// Chat gateway connection
    ChatGateway {
        /// Gateway base URL
        base_url: String,
        /// Gateway API key
        api_key: String,
        /// Gateway instance name
        instance: String,
    },
    /// Calendar OAuth access
    CalendarOauth {
        /// Bearer token
        access_token: String,
    },
    /// Banking webhook signing key
    BankWebhook {
        /// Shared HMAC secret
        secret: String,
    },
}

impl Credentials {
    /// The kind these credentials satisfy.
    #[must_use]
    pub const fn kind(&self) -> CredentialKind {
        match self {
            Self::PushKeys { .. } => CredentialKind::PushKeys,
            Self::ChatGateway { .. } => CredentialKind::ChatGateway,
            Self::CalendarOauth { .. } => CredentialKind::CalendarOauth,
            Self::BankWebhook { .. } => CredentialKind::BankWebhook,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets never reach logs.
        f.debug_struct("Credentials")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Source of per-tenant or system-level credentials.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve credentials of `kind` for `tenant_id`, or `None` if the
    /// tenant has none and no system-level fallback exists.
    async fn resolve(&self, kind: CredentialKind, tenant_id: &str)
    -> AppResult<Option<Credentials>>;
}

/// Resolver backed by the `[tenants.*]` and system sections of [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentialResolver {
    system_push: Option<(Option<String>, String)>,
    system_chat: Option<(String, String, String)>,
    system_calendar_token: Option<String>,
    system_bank_secret: Option<String>,
    tenants: HashMap<String, TenantCredentialsConfig>,
}

impl ConfigCredentialResolver {
    /// Build a resolver from loaded configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let system_push = config
            .push
            .vapid_private_key
            .clone()
            .map(|private| (config.push.vapid_public_key.clone(), private));

        Self {
            system_push,
            system_chat: config
                .chat
                .as_ref()
                .map(|c| (c.base_url.clone(), c.api_key.clone(), c.instance.clone())),
            system_calendar_token: config.calendar.access_token.clone(),
            system_bank_secret: config.banking.webhook_secret.clone(),
            tenants: config.tenants.clone(),
        }
    }

    fn chat_for(&self, tenant: Option<&TenantCredentialsConfig>) -> Option<Credentials> {
        let system = self.system_chat.as_ref();

        if let Some(api_key) = tenant.and_then(|t| t.chat_api_key.clone()) {
            let instance = tenant
                .and_then(|t| t.chat_instance.clone())
                .or_else(|| system.map(|s| s.2.clone()))?;
            let base_url = tenant
                .and_then(|t| t.chat_base_url.clone())
                .or_else(|| system.map(|s| s.0.clone()))?;
            return Some(Credentials::ChatGateway {
                base_url,
                api_key,
                instance,
            });
        }

        system.map(|(base_url, api_key, instance)| Credentials::ChatGateway {
            base_url: base_url.clone(),
            api_key: api_key.clone(),
            instance: instance.clone(),
        })
    }
}

#[async_trait]
impl CredentialResolver for ConfigCredentialResolver {
    async fn resolve(
        &self,
        kind: CredentialKind,
        tenant_id: &str,
    ) -> AppResult<Option<Credentials>> {
        let tenant = self.tenants.get(tenant_id);

        let resolved = match kind {
            CredentialKind::PushKeys => {
                self.system_push
                    .as_ref()
                    .map(|(public_key, private_key)| Credentials::PushKeys {
                        public_key: public_key.clone(),
                        private_key: private_key.clone(),
                    })
            }
            CredentialKind::ChatGateway => self.chat_for(tenant),
            CredentialKind::CalendarOauth => tenant
                .and_then(|t| t.calendar_access_token.clone())
                .or_else(|| self.system_calendar_token.clone())
                .map(|access_token| Credentials::CalendarOauth { access_token }),
            CredentialKind::BankWebhook => tenant
                .and_then(|t| t.bank_webhook_secret.clone())
                .or_else(|| self.system_bank_secret.clone())
                .map(|secret| Credentials::BankWebhook { secret }),
        };

        Ok(resolved)
    }
}

/// Lazily built clients keyed by `(kind, tenant)`.
pub struct ClientCache<T> {
    entries: Arc<RwLock<HashMap<(CredentialKind, String), Arc<T>>>>,
}

impl<T> Clone for ClientCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for ClientCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T> ClientCache<T> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client or build, store and return a new one.
    ///
    /// A failed build caches nothing.
    pub async fn get_or_try_init<F, Fut>(
        &self,
        kind: CredentialKind,
        tenant_id: &str,
        init: F,
    ) -> AppResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let key = (kind, tenant_id.to_string());

        if let Some(client) = self.entries.read().await.get(&key) {
            return Ok(client.clone());
        }

        let client = Arc::new(init().await?);
        let mut entries = self.entries.write().await;
        // Another task may have won the race; keep its client.
        Ok(entries.entry(key).or_insert(client).clone())
    }

    /// Drop the client of one tenant so the next use rebuilds it.
    pub async fn invalidate(&self, kind: CredentialKind, tenant_id: &str) -> bool {
        self.entries
            .write()
            .await
            .remove(&(kind, tenant_id.to_string()))
            .is_some()
    }

    /// Drop every cached client.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of cached clients.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
