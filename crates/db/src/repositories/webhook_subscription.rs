//! Webhook subscription repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, sea_query::OnConflict,
};

use crate::entities::webhook_subscription::{ActiveModel, Column, Entity, Model};
use herald_common::{AppError, AppResult};

/// Repository for provider watch channels.
#[derive(Clone)]
pub struct WebhookSubscriptionRepository {
    db: Arc<DatabaseConnection>,
}

impl WebhookSubscriptionRepository {
    /// Create a new webhook subscription repository.
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolve an inbound channel id.
    pub async fn find_by_channel_id(&self, channel_id: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id(channel_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The subscription watching one calendar of one owner.
    pub async fn find_for_calendar(
        &self,
        user_id: &str,
        tenant_id: &str,
        external_calendar_id: &str,
    ) -> AppResult<Option<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::ExternalCalendarId.eq(external_calendar_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All subscriptions of one owner.
    pub async fn find_by_owner(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::TenantId.eq(tenant_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Subscriptions whose channel lapses before `deadline`, soonest first.
    pub async fn find_expiring_before(&self, deadline: DateTime<Utc>) -> AppResult<Vec<Model>> {
        Entity::find()
            .filter(Column::ExpiresAt.lt(deadline.fixed_offset()))
            .order_by_asc(Column::ExpiresAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Store a channel, replacing the previous one for the same calendar.
    ///
    /// Old channel ids stop resolving once this returns.
    pub async fn upsert(&self, subscription: ActiveModel) -> AppResult<()> {
        Entity::insert(subscription)
            .on_conflict(
                OnConflict::columns([
                    Column::UserId,
                    Column::TenantId,
                    Column::ExternalCalendarId,
                ])
                .update_columns([
                    Column::ChannelId,
                    Column::Provider,
                    Column::ResourceId,
                    Column::ChannelToken,
                    Column::ExpiresAt,
                    Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete a channel by id.
    pub async fn delete(&self, channel_id: &str) -> AppResult<u64> {
        let result = Entity::delete_by_id(channel_id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}
