//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use herald_common::AppError;

/// The authenticated caller, as asserted by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantUser {
    /// Caller's user id
    pub user_id: String,
    /// Caller's tenant id
    pub tenant_id: String,
}

impl<S> FromRequestParts<S> for TenantUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by identity middleware
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
