//! API middleware.

use std::sync::Arc;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use herald_core::{
    CalendarWatchService, DeviceRegistry, Dispatcher, FeedConnections, HistoryLog,
    PreferenceStore, WebhookIngestion,
};

use crate::extractors::TenantUser;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's tenant id.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

const MAX_ID_LEN: usize = 128;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Public VAPID key handed to browsers
    pub vapid_public_key: String,
    /// Push subscriptions
    pub devices: DeviceRegistry,
    /// Per-user settings
    pub preferences: PreferenceStore,
    /// Delivery history
    pub history: HistoryLog,
    /// Notification dispatcher
    pub dispatcher: Arc<Dispatcher>,
    /// Inbound webhook processing
    pub ingestion: Arc<WebhookIngestion>,
    /// Calendar watch lifecycle
    pub calendar: CalendarWatchService,
    /// Banking and database feed connections
    pub feeds: FeedConnections,
}

fn identity_part<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_ID_LEN)
}

/// Lift gateway identity headers into request extensions.
///
/// Requests without both headers pass through unauthenticated; handlers
/// that need a caller reject them through [`TenantUser`].
pub async fn identity_middleware(mut req: Request<Body>, next: Next) -> Response {
    let identity = match (
        identity_part(&req, USER_ID_HEADER),
        identity_part(&req, TENANT_ID_HEADER),
    ) {
        (Some(user_id), Some(tenant_id)) => Some(TenantUser {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
        }),
        _ => None,
    };

    if let Some(identity) = identity {
        req.extensions_mut().insert(identity);
    }

    next.run(req).await
}
