//! Calendar and passive feed connection endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use herald_common::AppResult;
use herald_core::FeedSource;
use herald_db::entities::{feed_connection, webhook_subscription};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    extractors::TenantUser,
    middleware::AppState,
    response::{Ack, ApiResponse},
};

/// Calendar to watch.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WatchCalendarRequest {
    /// Provider calendar id
    #[validate(length(min = 1, max = 256))]
    pub calendar_id: String,
}

/// Feed resource to connect.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConnectFeedRequest {
    /// `banking` or `database`
    pub source: String,
    /// Resource id at the source
    #[validate(length(min = 1, max = 256))]
    pub external_id: String,
}

/// A freshly connected feed, with the secret its deliveries must be
/// signed with. The secret is only ever returned here.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedFeed {
    /// Stored connection
    #[serde(flatten)]
    pub connection: feed_connection::Model,
    /// HMAC key for the feed's deliveries
    pub signing_secret: String,
}

/// Number of channels closed.
#[derive(Debug, Serialize)]
pub struct Disconnected {
    /// Channels or connections removed
    pub disconnected: usize,
}

async fn watch_calendar(
    user: TenantUser,
    State(state): State<AppState>,
    Json(req): Json<WatchCalendarRequest>,
) -> AppResult<ApiResponse<webhook_subscription::Model>> {
    req.validate()?;
    let subscription = state
        .calendar
        .subscribe(&user.user_id, &user.tenant_id, &req.calendar_id)
        .await?;
    Ok(ApiResponse::ok(subscription))
}

async fn disconnect_calendar(
    user: TenantUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Disconnected>> {
    let disconnected = state
        .calendar
        .disconnect(&user.user_id, &user.tenant_id)
        .await?;
    Ok(ApiResponse::ok(Disconnected { disconnected }))
}

async fn list_feeds(
    user: TenantUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<feed_connection::Model>>> {
    let feeds = state.feeds.list(&user.user_id, &user.tenant_id).await?;
    Ok(ApiResponse::ok(feeds))
}

async fn connect_feed(
    user: TenantUser,
    State(state): State<AppState>,
    Json(req): Json<ConnectFeedRequest>,
) -> AppResult<ApiResponse<ConnectedFeed>> {
    req.validate()?;
    let source: FeedSource = req.source.parse()?;
    let connection = state
        .feeds
        .connect(&user.user_id, &user.tenant_id, source, &req.external_id)
        .await?;
    Ok(ApiResponse::ok(ConnectedFeed {
        signing_secret: connection.signing_secret.clone(),
        connection,
    }))
}

async fn disconnect_feed(
    user: TenantUser,
    State(state): State<AppState>,
    Path((source, external_id)): Path<(String, String)>,
) -> AppResult<ApiResponse<Ack>> {
    let source: FeedSource = source.parse()?;
    let removed = state
        .feeds
        .disconnect(&user.user_id, &user.tenant_id, source, &external_id)
        .await?;
    Ok(Ack::of(removed))
}

/// Create integrations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/integrations/calendar/watch", post(watch_calendar))
        .route("/integrations/calendar", delete(disconnect_calendar))
        .route("/integrations/feeds", get(list_feeds).post(connect_feed))
        .route(
            "/integrations/feeds/{source}/{external_id}",
            delete(disconnect_feed),
        )
}
