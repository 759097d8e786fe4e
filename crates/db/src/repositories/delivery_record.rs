//! Delivery record repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};

use crate::entities::delivery_record::{ActiveModel, Column, Entity, Model};
use herald_common::{AppError, AppResult};

/// Repository for the delivery history log.
#[derive(Clone)]
pub struct DeliveryRecordRepository {
    db: Arc<DatabaseConnection>,
}

fn owned_by(user_id: &str, tenant_id: &str) -> Condition {
    Condition::all()
        .add(Column::UserId.eq(user_id))
        .add(Column::TenantId.eq(tenant_id))
}

impl DeliveryRecordRepository {
    /// Create a new delivery record repository.
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append a record.
    pub async fn append(&self, record: ActiveModel) -> AppResult<Model> {
        record
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Newest records of one owner.
    pub async fn list(&self, user_id: &str, tenant_id: &str, limit: u64) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(owned_by(user_id, tenant_id))
            .order_by_desc(Column::SentAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark one record read if the owner matches.
    ///
    /// Returns whether a row was updated.
    pub async fn mark_read(
        &self,
        id: &str,
        user_id: &str,
        tenant_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = Entity::update_many()
            .col_expr(Column::Read, Expr::value(true))
            .col_expr(Column::ReadAt, Expr::value(Some(at.fixed_offset())))
            .filter(Column::Id.eq(id))
            .filter(owned_by(user_id, tenant_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    /// Mark every unread record of one owner read.
    pub async fn mark_all_read(
        &self,
        user_id: &str,
        tenant_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = Entity::update_many()
            .col_expr(Column::Read, Expr::value(true))
            .col_expr(Column::ReadAt, Expr::value(Some(at.fixed_offset())))
            .filter(owned_by(user_id, tenant_id))
            .filter(Column::Read.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Count unread records of one owner.
    pub async fn count_unread(&self, user_id: &str, tenant_id: &str) -> AppResult<u64> {
        Entity::find()
            .filter(owned_by(user_id, tenant_id))
            .filter(Column::Read.eq(false))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
