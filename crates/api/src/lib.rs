//! HTTP API layer for herald.
//!
//! This crate exposes the dispatch engine over HTTP:
//!
//! - **Endpoints**: device registration, settings, history, integrations
//!   and inbound webhooks
//! - **Extractors**: caller identity set by the upstream gateway
//! - **Middleware**: identity propagation, shared application state
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use extractors::TenantUser;
pub use middleware::{AppState, identity_middleware};
