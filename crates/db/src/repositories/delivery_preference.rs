//! Delivery preference repository.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, EntityTrait, sea_query::OnConflict};

use crate::entities::delivery_preference::{ActiveModel, Column, Entity, Model};
use herald_common::{AppError, AppResult};

/// Repository for per-user, per-tenant delivery preferences.
#[derive(Clone)]
pub struct DeliveryPreferenceRepository {
    db: Arc<DatabaseConnection>,
}

impl DeliveryPreferenceRepository {
    /// Create a new delivery preference repository.
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the preference row of one owner.
    pub async fn find(&self, user_id: &str, tenant_id: &str) -> AppResult<Option<Model>> {
        Entity::find_by_id((user_id.to_string(), tenant_id.to_string()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Persist a default row unless one already exists.
    ///
    /// Concurrent first reads race on the primary key; the loser reads
    /// back whatever the winner stored.
    pub async fn insert_default(&self, defaults: Model) -> AppResult<Model> {
        let inserted = Entity::insert(ActiveModel::from(defaults.clone()))
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::TenantId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if inserted > 0 {
            return Ok(defaults);
        }

        self.find(&defaults.user_id, &defaults.tenant_id)
            .await?
            .ok_or_else(|| {
                AppError::Database(format!(
                    "Preferences for {}/{} vanished after conflict",
                    defaults.user_id, defaults.tenant_id
                ))
            })
    }

    /// Write the full preference row, creating it if needed.
    pub async fn upsert(&self, preferences: Model) -> AppResult<Model> {
        Entity::insert(ActiveModel::from(preferences.clone()))
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::TenantId])
                    .update_columns([
                        Column::Enabled,
                        Column::CalendarEnabled,
                        Column::BankingEnabled,
                        Column::SystemEnabled,
                        Column::DataChangeEnabled,
                        Column::ShowPreview,
                        Column::QuietHoursEnabled,
                        Column::QuietHoursStart,
                        Column::QuietHoursEnd,
                        Column::Timezone,
                        Column::PushEnabled,
                        Column::EmailEnabled,
                        Column::ChatEnabled,
                        Column::Email,
                        Column::Phone,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(preferences)
    }
}
