use std::sync::Arc;

use crate::db::keys::owner_files_key;
use crate::error::AppError;
use crate::store::RecordStore;

/// Default maximum number of live documents per owner.
pub const DEFAULT_MAX_DOCUMENTS_PER_OWNER: u64 = 10;

/// Read-through view of the per-owner set of document ids.
///
/// Membership is written by the document lifecycle (insert on create,
/// removal on delete). Entries whose document has expired stay counted
/// until the set's own TTL elapses.
#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn RecordStore>,
    limit: u64,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn RecordStore>, limit: u64) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of documents currently attributed to `owner_id`.
    pub async fn count(&self, owner_id: &str) -> Result<u64, AppError> {
        self.store.set_cardinality(&owner_files_key(owner_id)).await
    }

    /// Fail with [`AppError::QuotaExceeded`] when the owner is at or above the limit.
    pub async fn ensure_capacity(&self, owner_id: &str) -> Result<(), AppError> {
        let count = self.count(owner_id).await?;
        if count >= self.limit {
            tracing::debug!(owner_id, count, limit = self.limit, "quota reached");
            return Err(AppError::QuotaExceeded { limit: self.limit });
        }
        Ok(())
    }
}
