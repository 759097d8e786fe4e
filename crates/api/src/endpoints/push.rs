//! Push configuration and device registration endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get},
};
use herald_common::AppResult;
use herald_core::{DeviceInfo, DeviceSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    extractors::TenantUser,
    middleware::AppState,
    response::{Ack, ApiResponse},
};

/// VAPID public key handed to browsers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfigResponse {
    /// Base64url VAPID public key
    pub public_key: String,
}

/// Device registration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    /// Subscription as produced by the browser's push manager
    pub subscription: Value,
    /// Client metadata
    #[serde(flatten)]
    pub info: DeviceInfo,
}

/// Token of a registered device.
#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    /// Device token
    pub token: String,
}

async fn config(State(state): State<AppState>) -> ApiResponse<PushConfigResponse> {
    ApiResponse::ok(PushConfigResponse {
        public_key: state.vapid_public_key.clone(),
    })
}

async fn register(
    user: TenantUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterDeviceRequest>,
) -> AppResult<ApiResponse<RegisterDeviceResponse>> {
    let mut info = req.info;
    if info.user_agent.is_none() {
        info.user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
    }

    let token = state
        .devices
        .register(&user.user_id, &user.tenant_id, &req.subscription, info)
        .await?;

    Ok(ApiResponse::ok(RegisterDeviceResponse { token }))
}

async fn list(
    user: TenantUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<DeviceSummary>>> {
    let devices = state
        .devices
        .list_masked(&user.user_id, &user.tenant_id)
        .await?;
    Ok(ApiResponse::ok(devices))
}

async fn unregister(
    user: TenantUser,
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<ApiResponse<Ack>> {
    state
        .devices
        .unregister(&user.user_id, &user.tenant_id, &token)
        .await?;
    Ok(Ack::yes())
}

/// Create push router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/push/config", get(config))
        .route("/push/devices", get(list).post(register))
        .route("/push/devices/{token}", delete(unregister))
}
