//! Delivery settings endpoints.

use axum::{Json, Router, extract::State, routing::get};
use herald_common::AppResult;
use herald_core::PreferenceUpdate;
use herald_db::entities::delivery_preference;

use crate::{extractors::TenantUser, middleware::AppState, response::ApiResponse};

async fn get_settings(
    user: TenantUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<delivery_preference::Model>> {
    let prefs = state
        .preferences
        .get(&user.user_id, &user.tenant_id)
        .await?;
    Ok(ApiResponse::ok(prefs))
}

async fn update_settings(
    user: TenantUser,
    State(state): State<AppState>,
    Json(update): Json<PreferenceUpdate>,
) -> AppResult<ApiResponse<delivery_preference::Model>> {
    let prefs = state
        .preferences
        .update(&user.user_id, &user.tenant_id, update)
        .await?;
    Ok(ApiResponse::ok(prefs))
}

/// Create settings router.
pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).patch(update_settings))
}
