//! Inbound webhook endpoint.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
};
use herald_common::AppResult;
use herald_core::{Headers, WebhookSource};
use tower_http::limit::RequestBodyLimitLayer;

use crate::{
    middleware::AppState,
    response::{Ack, ApiResponse},
};

/// Largest webhook body we accept.
const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

/// Acknowledge at once; mapping and dispatch run in the background.
async fn receive(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<ApiResponse<Ack>> {
    let source: WebhookSource = source.parse()?;

    let headers: Headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    tracing::debug!(source = %source, bytes = body.len(), "Webhook received");
    state.ingestion.ingest(source, body.to_vec(), headers);
    Ok(Ack::yes())
}

/// Create webhooks router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/webhooks/{source}",
        post(receive).layer(RequestBodyLimitLayer::new(MAX_WEBHOOK_BODY)),
    )
}
