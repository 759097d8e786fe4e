//! Device endpoint repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::{Expr, OnConflict},
};

use crate::entities::device_endpoint::{ActiveModel, Column, Entity, Model};
use herald_common::{AppError, AppResult};

/// Repository for push device endpoints.
#[derive(Clone)]
pub struct DeviceEndpointRepository {
    db: Arc<DatabaseConnection>,
}

/// Rows owned by `user_id` within `tenant_id`.
#[must_use]
pub fn owned_by(user_id: &str, tenant_id: &str) -> Condition {
    Condition::all()
        .add(Column::UserId.eq(user_id))
        .add(Column::TenantId.eq(tenant_id))
}

impl DeviceEndpointRepository {
    /// Create a new device endpoint repository.
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert or overwrite the endpoint keyed by its token hash.
    ///
    /// A re-registration from another owner takes the row over; the
    /// original `created_at` is kept.
    pub async fn upsert(&self, endpoint: ActiveModel) -> AppResult<()> {
        Entity::insert(endpoint)
            .on_conflict(
                OnConflict::column(Column::TokenHash)
                    .update_columns([
                        Column::UserId,
                        Column::TenantId,
                        Column::SubscriptionPayload,
                        Column::DeviceType,
                        Column::UserAgent,
                        Column::LastActiveAt,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Find an endpoint by token hash, regardless of owner.
    pub async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id(token_hash)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All endpoints of one owner, most recently active first.
    pub async fn find_by_owner(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(owned_by(user_id, tenant_id))
            .order_by_desc(Column::LastActiveAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete an endpoint only if it belongs to the given owner.
    ///
    /// Returns the number of rows removed (0 or 1).
    pub async fn delete_owned(
        &self,
        token_hash: &str,
        user_id: &str,
        tenant_id: &str,
    ) -> AppResult<u64> {
        let result = Entity::delete_many()
            .filter(Column::TokenHash.eq(token_hash))
            .filter(owned_by(user_id, tenant_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Remove an endpoint the push service reported as gone.
    pub async fn evict(&self, token_hash: &str) -> AppResult<u64> {
        let result = Entity::delete_by_id(token_hash)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Record activity on an endpoint.
    pub async fn touch(&self, token_hash: &str, at: DateTime<Utc>) -> AppResult<()> {
        Entity::update_many()
            .col_expr(Column::LastActiveAt, Expr::value(at.fixed_offset()))
            .filter(Column::TokenHash.eq(token_hash))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
