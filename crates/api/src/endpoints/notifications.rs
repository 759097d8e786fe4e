//! Notification dispatch and history endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use herald_common::{AppError, AppResult};
use herald_core::{DispatchResult, NotificationCategory, NotificationEvent};
use herald_db::entities::delivery_record;
use serde::{Deserialize, Serialize};

use crate::{
    extractors::TenantUser,
    middleware::AppState,
    response::{Ack, ApiResponse},
};

/// History query.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Page size, clamped to the history maximum
    pub limit: Option<u64>,
}

/// Unread counter.
#[derive(Debug, Serialize)]
pub struct UnreadCount {
    /// Unread records
    pub count: u64,
}

/// Result of marking everything read.
#[derive(Debug, Serialize)]
pub struct MarkedRead {
    /// Records marked read
    pub updated: u64,
}

/// Send a system notification to the caller.
async fn test(
    user: TenantUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DispatchResult>> {
    let event = NotificationEvent::new(
        NotificationCategory::System,
        "Test notification",
        "Notifications are working.",
        user.user_id,
        user.tenant_id,
    );
    let result = state.dispatcher.dispatch(event).await?;
    Ok(ApiResponse::ok(result))
}

/// Dispatch an event to any user of the caller's tenant.
async fn dispatch(
    user: TenantUser,
    State(state): State<AppState>,
    Json(event): Json<NotificationEvent>,
) -> AppResult<ApiResponse<DispatchResult>> {
    if event.target_tenant_id != user.tenant_id {
        return Err(AppError::Forbidden(
            "Cannot dispatch to another tenant".to_string(),
        ));
    }
    let result = state.dispatcher.dispatch(event).await?;
    Ok(ApiResponse::ok(result))
}

async fn history(
    user: TenantUser,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<ApiResponse<Vec<delivery_record::Model>>> {
    let records = state
        .history
        .list(&user.user_id, &user.tenant_id, query.limit)
        .await?;
    Ok(ApiResponse::ok(records))
}

async fn unread_count(
    user: TenantUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<UnreadCount>> {
    let count = state
        .history
        .unread_count(&user.user_id, &user.tenant_id)
        .await?;
    Ok(ApiResponse::ok(UnreadCount { count }))
}

async fn mark_read(
    user: TenantUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Ack>> {
    let updated = state
        .history
        .mark_read(&user.user_id, &user.tenant_id, &id)
        .await?;
    Ok(Ack::of(updated))
}

async fn mark_all_read(
    user: TenantUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<MarkedRead>> {
    let updated = state
        .history
        .mark_all_read(&user.user_id, &user.tenant_id)
        .await?;
    Ok(ApiResponse::ok(MarkedRead { updated }))
}

/// Create notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/test", post(test))
        .route("/notifications/dispatch", post(dispatch))
        .route("/notifications/history", get(history))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
}
