//! Delivery history log.

use chrono::Utc;
use herald_common::AppResult;
use herald_db::entities::delivery_record;
use herald_db::repositories::DeliveryRecordRepository;

/// Default page size for history listings.
pub const DEFAULT_LIMIT: u64 = 20;
/// Largest page a caller may request.
pub const MAX_LIMIT: u64 = 100;

/// Delivery history service.
#[derive(Clone)]
pub struct HistoryLog {
    repo: DeliveryRecordRepository,
}

impl HistoryLog {
    /// Create a new history log.
    #[must_use]
    pub const fn new(repo: DeliveryRecordRepository) -> Self {
        Self { repo }
    }

    /// Append one record.
    pub async fn append(&self, record: delivery_record::ActiveModel) -> AppResult<delivery_record::Model> {
        self.repo.append(record).await
    }

    /// Newest-first history of one owner.
    pub async fn list(
        &self,
        user_id: &str,
        tenant_id: &str,
        limit: Option<u64>,
    ) -> AppResult<Vec<delivery_record::Model>> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        self.repo.list(user_id, tenant_id, limit).await
    }

    /// Mark one record read. Returns `false` when the caller does not own it.
    pub async fn mark_read(&self, user_id: &str, tenant_id: &str, record_id: &str) -> AppResult<bool> {
        let updated = self
            .repo
            .mark_read(record_id, user_id, tenant_id, Utc::now())
            .await?;
        if !updated {
            tracing::debug!(
                user_id = %user_id,
                tenant_id = %tenant_id,
                record_id = %record_id,
                "Mark-read matched no owned record"
            );
        }
        Ok(updated)
    }

    /// Mark every record of one owner read.
    pub async fn mark_all_read(&self, user_id: &str, tenant_id: &str) -> AppResult<u64> {
        self.repo.mark_all_read(user_id, tenant_id, Utc::now()).await
    }

    /// Unread records of one owner.
    pub async fn unread_count(&self, user_id: &str, tenant_id: &str) -> AppResult<u64> {
        self.repo.count_unread(user_id, tenant_id).await
    }
}
