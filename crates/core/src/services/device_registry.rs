//! Device registry.
//!
//! Owns the mapping from a push endpoint to its `(user, tenant)` owner. The
//! registry key is the SHA-256 of the endpoint URL, so the same browser
//! subscription always lands on the same row.

use chrono::{DateTime, Utc};
use herald_common::{AppError, AppResult, hash_endpoint};
use herald_db::entities::device_endpoint::{self, DeviceType};
use herald_db::repositories::DeviceEndpointRepository;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client metadata sent alongside a subscription.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Kind of client the subscription came from
    #[serde(default)]
    pub device_type: DeviceType,
    /// Browser user agent, if the client reported one
    pub user_agent: Option<String>,
}

/// Device listing entry. The endpoint URL is never echoed back whole.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    /// Opaque device token (hash of the endpoint URL)
    pub token: String,
    /// Truncated endpoint URL
    pub endpoint: String,
    /// Kind of client
    pub device_type: DeviceType,
    /// Browser user agent
    pub user_agent: Option<String>,
    /// Last successful registration or delivery (RFC 3339)
    pub last_active_at: String,
    /// First registration time (RFC 3339)
    pub created_at: String,
}

/// Device registry service.
#[derive(Clone)]
pub struct DeviceRegistry {
    repo: DeviceEndpointRepository,
}

impl DeviceRegistry {
    /// Create a new device registry.
    #[must_use]
    pub const fn new(repo: DeviceEndpointRepository) -> Self {
        Self { repo }
    }

    /// Register (or re-register) a push subscription and return its token.
    ///
    /// Registering the same endpoint again only refreshes ownership and
    /// metadata; the last writer wins.
    pub async fn register(
        &self,
        user_id: &str,
        tenant_id: &str,
        subscription: &Value,
        info: DeviceInfo,
    ) -> AppResult<String> {
        let endpoint = validate_subscription(subscription)?;
        let token_hash = hash_endpoint(endpoint);
        let now = Utc::now();

        let model = device_endpoint::ActiveModel {
            token_hash: Set(token_hash.clone()),
            user_id: Set(user_id.to_string()),
            tenant_id: Set(tenant_id.to_string()),
            subscription_payload: Set(subscription.to_string()),
            device_type: Set(info.device_type),
            user_agent: Set(info.user_agent),
            last_active_at: Set(now.into()),
            created_at: Set(now.into()),
            updated_at: Set(Some(now.into())),
        };
        self.repo.upsert(model).await?;

        tracing::info!(
            user_id = %user_id,
            tenant_id = %tenant_id,
            token_hash = %token_hash,
            "Registered push device"
        );

        Ok(token_hash)
    }

    /// Remove a device if, and only if, the caller owns it.
    ///
    /// An unknown or foreign token is not an error.
    pub async fn unregister(&self, user_id: &str, tenant_id: &str, token_hash: &str) -> AppResult<()> {
        let removed = self.repo.delete_owned(token_hash, user_id, tenant_id).await?;

        if removed == 0 {
            tracing::debug!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                token_hash = %token_hash,
                "Unregister matched no owned device"
            );
        } else {
            tracing::info!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                token_hash = %token_hash,
                "Unregistered push device"
            );
        }

        Ok(())
    }

    /// Devices of one owner.
    pub async fn list_for_owner(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> AppResult<Vec<device_endpoint::Model>> {
        self.repo.find_by_owner(user_id, tenant_id).await
    }

    /// Devices of one owner with masked endpoints, for display.
    pub async fn list_masked(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<DeviceSummary>> {
        Ok(self
            .list_for_owner(user_id, tenant_id)
            .await?
            .into_iter()
            .map(to_summary)
            .collect())
    }

    /// Remove a dead endpoint regardless of owner.
    pub async fn evict(&self, token_hash: &str) -> AppResult<bool> {
        Ok(self.repo.evict(token_hash).await? > 0)
    }

    /// Record that an endpoint accepted a delivery.
    pub async fn touch(&self, token_hash: &str, at: DateTime<Utc>) -> AppResult<()> {
        self.repo.touch(token_hash, at).await
    }
}

/// Check the parts of a subscription the push engine needs later and
/// return its endpoint URL.
fn validate_subscription(subscription: &Value) -> AppResult<&str> {
    let endpoint = subscription
        .get("endpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::InvalidPayload("missing endpoint".to_string()))?;

    let url = url::Url::parse(endpoint)
        .map_err(|e| AppError::InvalidPayload(format!("endpoint is not a URL: {e}")))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(AppError::InvalidPayload(format!(
            "unsupported endpoint scheme: {}",
            url.scheme()
        )));
    }

    let keys = subscription
        .get("keys")
        .ok_or_else(|| AppError::InvalidPayload("missing keys".to_string()))?;
    for name in ["p256dh", "auth"] {
        let present = keys
            .get(name)
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty());
        if !present {
            return Err(AppError::InvalidPayload(format!("missing keys.{name}")));
        }
    }

    Ok(endpoint)
}

fn mask_endpoint(endpoint: &str) -> String {
    url::Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(|h| format!("{}://{h}/***", u.scheme())))
        .unwrap_or_else(|| "***".to_string())
}

fn to_summary(model: device_endpoint::Model) -> DeviceSummary {
    let endpoint = serde_json::from_str::<Value>(&model.subscription_payload)
        .ok()
        .and_then(|v| v.get("endpoint").and_then(Value::as_str).map(mask_endpoint))
        .unwrap_or_else(|| "***".to_string());

    DeviceSummary {
        token: model.token_hash,
        endpoint,
        device_type: model.device_type,
        user_agent: model.user_agent,
        last_active_at: model.last_active_at.to_rfc3339(),
        created_at: model.created_at.to_rfc3339(),
    }
}
