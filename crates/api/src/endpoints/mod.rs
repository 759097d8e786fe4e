//! API endpoints.

mod integrations;
mod notifications;
mod push;
mod settings;
mod webhooks;

use axum::{Router, middleware::from_fn};

use crate::middleware::{AppState, identity_middleware};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(push::router())
        .merge(settings::router())
        .merge(notifications::router())
        .merge(integrations::router())
        .merge(webhooks::router())
        .layer(from_fn(identity_middleware))
}
