//! Feed connection repository.

use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, sea_query::OnConflict};

use crate::entities::feed_connection::{ActiveModel, Column, Entity, Model};
use herald_common::{AppError, AppResult};

/// Repository mapping passive feed resources to owners.
#[derive(Clone)]
pub struct FeedConnectionRepository {
    db: Arc<DatabaseConnection>,
}

impl FeedConnectionRepository {
    /// Create a new feed connection repository.
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolve the owner of an external resource.
    pub async fn find(&self, source: &str, external_id: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id((source.to_string(), external_id.to_string()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All connections of one owner.
    pub async fn find_by_owner(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::TenantId.eq(tenant_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Connect an external resource unless it is already connected.
    ///
    /// An existing row is left untouched, whoever owns it. Returns the
    /// number of rows written (0 or 1).
    pub async fn insert_if_absent(&self, connection: ActiveModel) -> AppResult<u64> {
        Entity::insert(connection)
            .on_conflict(
                OnConflict::columns([Column::Source, Column::ExternalId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Disconnect a resource if it belongs to the given owner.
    pub async fn delete_owned(
        &self,
        source: &str,
        external_id: &str,
        user_id: &str,
        tenant_id: &str,
    ) -> AppResult<u64> {
        let result = Entity::delete_many()
            .filter(Column::Source.eq(source))
            .filter(Column::ExternalId.eq(external_id))
            .filter(Column::UserId.eq(user_id))
            .filter(Column::TenantId.eq(tenant_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}
