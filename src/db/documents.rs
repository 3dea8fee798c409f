use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::ids::generate_id;
use crate::db::keys::{comments_key, document_key, owner_files_key};
use crate::db::models::Document;
use crate::db::quota::QuotaTracker;
use crate::error::AppError;
use crate::store::{Batch, RecordStore};

/// Default lifetime of a document (24 hours).
pub const DEFAULT_DOCUMENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How many fresh identifiers `create` tries before giving up.
const MAX_ID_ATTEMPTS: usize = 4;

/// Creates, reads and deletes documents.
///
/// The quota check in `create` is not part of the write batch: concurrent
/// creates from one owner can overshoot the limit by the number in flight.
#[derive(Clone)]
pub struct DocumentManager {
    store: Arc<dyn RecordStore>,
    quota: QuotaTracker,
    ttl: Duration,
    id_source: fn() -> String,
}

impl DocumentManager {
    pub fn new(store: Arc<dyn RecordStore>, quota: QuotaTracker, ttl: Duration) -> Self {
        Self {
            store,
            quota,
            ttl,
            id_source: generate_id,
        }
    }

    /// Replace the identifier generator.
    pub fn with_id_source(mut self, id_source: fn() -> String) -> Self {
        self.id_source = id_source;
        self
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Store a new document for `owner_id`.
    ///
    /// The document hash and the owner's set membership are written in one
    /// atomic batch, both expiring after the document TTL.
    pub async fn create(&self, content: &str, owner_id: &str) -> Result<Document, AppError> {
        self.quota.ensure_capacity(owner_id).await?;

        let id = self.fresh_id().await?;
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                AppError::Internal(format!("Invalid document TTL: {:?}", self.ttl))
            })?;

        let doc = Document {
            id,
            content: content.to_string(),
            views: 0,
            owner_id: owner_id.to_string(),
            created_at,
            expires_at,
        };

        let batch = Batch::new()
            .write_fields(document_key(&doc.id), doc.to_fields(), self.ttl)
            .add_to_set(owner_files_key(owner_id), doc.id.clone(), self.ttl);
        self.store.execute(batch).await?;

        tracing::info!(id = %doc.id, owner_id, bytes = content.len(), "document created");
        Ok(doc)
    }

    /// Fetch a document. Expired and never-existing ids are both `NotFound`.
    pub async fn get(&self, id: &str) -> Result<Document, AppError> {
        let fields = self.store.read_fields(&document_key(id)).await?;
        Document::from_fields(&fields)?.ok_or_else(|| not_found(id))
    }

    /// Atomically bump the view counter and return the new value.
    pub async fn increment_views(&self, id: &str) -> Result<u64, AppError> {
        let views = self
            .store
            .increment_field(&document_key(id), "views", 1)
            .await?
            .ok_or_else(|| not_found(id))?;
        Ok(u64::try_from(views).unwrap_or(0))
    }

    /// Delete a document on behalf of `requester_id`.
    ///
    /// Removes the hash, the comment thread and the owner-set entry in one
    /// batch. A failed batch is not retried.
    pub async fn delete(&self, id: &str, requester_id: &str) -> Result<(), AppError> {
        let doc = self.get(id).await?;
        if doc.owner_id != requester_id {
            return Err(AppError::PermissionDenied(format!(
                "Document '{}' belongs to another session",
                id
            )));
        }

        let batch = Batch::new()
            .delete([document_key(id), comments_key(id)])
            .remove_from_set(owner_files_key(&doc.owner_id), id);
        self.store.execute(batch).await?;

        tracing::info!(id, "document deleted");
        Ok(())
    }

    /// An identifier with no live document behind it.
    ///
    /// The check is not atomic with the later write, so two creates can
    /// still race onto the same id.
    async fn fresh_id(&self) -> Result<String, AppError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = (self.id_source)();
            if !self.store.exists(&document_key(&id)).await? {
                return Ok(id);
            }
            tracing::warn!(id = %id, "document id collision, regenerating");
        }
        Err(AppError::Internal(format!(
            "No free document id after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Document '{}' not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryRecordStore;
    use crate::store::{MockRecordStore, Op, RecordStoreExt};
    use std::collections::HashMap;

    fn manager_with(store: Arc<dyn RecordStore>, limit: u64) -> DocumentManager {
        let quota = QuotaTracker::new(store.clone(), limit);
        DocumentManager::new(store, quota, DEFAULT_DOCUMENT_TTL)
    }

    fn memory_manager() -> (Arc<MemoryRecordStore>, DocumentManager) {
        let store = Arc::new(MemoryRecordStore::new());
        let manager = manager_with(store.clone(), 10);
        (store, manager)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (_, docs) = memory_manager();
        let created = docs.create("# Title\n\nbody", "owner-1").await.unwrap();

        let fetched = docs.get(&created.id).await.unwrap();
        assert_eq!(fetched.content, "# Title\n\nbody");
        assert_eq!(fetched.owner_id, "owner-1");
        assert_eq!(fetched.views, 0);
        assert_eq!(
            fetched.expires_at - fetched.created_at,
            chrono::Duration::hours(24)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_registers_owner_with_ttl() {
        let (store, docs) = memory_manager();
        let created = docs.create("content", "owner-1").await.unwrap();

        assert_eq!(docs.quota().count("owner-1").await.unwrap(), 1);
        let doc_ttl = store.time_to_live(&document_key(&created.id)).await.unwrap();
        let set_ttl = store.time_to_live(&owner_files_key("owner-1")).await.unwrap();
        assert_eq!(doc_ttl, Some(DEFAULT_DOCUMENT_TTL));
        assert_eq!(set_ttl, Some(DEFAULT_DOCUMENT_TTL));
    }

    #[tokio::test]
    async fn test_create_with_unusable_ttl_fails_cleanly() {
        for ttl in [Duration::ZERO, Duration::from_secs(10_000_000_000_000)] {
            let store = Arc::new(MemoryRecordStore::new());
            let quota = QuotaTracker::new(store.clone(), 10);
            let docs = DocumentManager::new(store.clone(), quota, ttl);

            assert!(matches!(
                docs.create("x", "owner-1").await,
                Err(AppError::Internal(_))
            ));
            assert_eq!(docs.quota().count("owner-1").await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_, docs) = memory_manager();
        assert!(matches!(docs.get("deadbeef").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_document_is_not_found() {
        let (_, docs) = memory_manager();
        let created = docs.create("content", "owner-1").await.unwrap();

        tokio::time::advance(DEFAULT_DOCUMENT_TTL + Duration::from_secs(1)).await;

        assert!(matches!(docs.get(&created.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            docs.increment_views(&created.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_increment_views_is_monotonic() {
        let (_, docs) = memory_manager();
        let created = docs.create("content", "owner-1").await.unwrap();

        assert_eq!(docs.increment_views(&created.id).await.unwrap(), 1);
        assert_eq!(docs.increment_views(&created.id).await.unwrap(), 2);
        assert_eq!(docs.get(&created.id).await.unwrap().views, 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (_, docs) = memory_manager();
        let created = docs.create("content", "owner-1").await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let docs = docs.clone();
                let id = created.id.clone();
                tokio::spawn(async move { docs.increment_views(&id).await })
            })
            .collect();
        for handle in futures::future::join_all(handles).await {
            handle.unwrap().unwrap();
        }

        assert_eq!(docs.get(&created.id).await.unwrap().views, 50);
    }

    #[tokio::test]
    async fn test_quota_blocks_eleventh_document() {
        let (_, docs) = memory_manager();
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(docs.create(&format!("doc {i}"), "owner-1").await.unwrap().id);
        }

        match docs.create("one too many", "owner-1").await {
            Err(AppError::QuotaExceeded { limit }) => assert_eq!(limit, 10),
            other => panic!("Expected QuotaExceeded, got: {:?}", other),
        }

        docs.delete(&ids[0], "owner-1").await.unwrap();
        docs.create("fits again", "owner-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_by_other_session_is_denied() {
        let (_, docs) = memory_manager();
        let created = docs.create("content", "owner-1").await.unwrap();

        assert!(matches!(
            docs.delete(&created.id, "intruder").await,
            Err(AppError::PermissionDenied(_))
        ));
        assert!(docs.get(&created.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (store, docs) = memory_manager();
        let created = docs.create("content", "owner-1").await.unwrap();
        store
            .append_to_list(&comments_key(&created.id), "{}", None)
            .await
            .unwrap();

        docs.delete(&created.id, "owner-1").await.unwrap();

        assert!(matches!(docs.get(&created.id).await, Err(AppError::NotFound(_))));
        assert!(!store.exists(&comments_key(&created.id)).await.unwrap());
        assert_eq!(docs.quota().count("owner-1").await.unwrap(), 0);
        assert!(matches!(
            docs.delete(&created.id, "owner-1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_colliding_id_is_regenerated() {
        fn fixed_then_fresh() -> String {
            use std::sync::atomic::{AtomicUsize, Ordering};
            static CALLS: AtomicUsize = AtomicUsize::new(0);
            match CALLS.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => "taken000".to_string(),
                n => format!("fresh{:03}", n),
            }
        }

        let (_, docs) = memory_manager();
        let docs = docs.with_id_source(fixed_then_fresh);
        let first = docs.create("first", "owner-1").await.unwrap();
        assert_eq!(first.id, "taken000");

        let second = docs.create("second", "owner-1").await.unwrap();
        assert_eq!(second.id, "fresh002");
        assert_eq!(docs.get("taken000").await.unwrap().content, "first");
    }

    #[tokio::test]
    async fn test_create_gives_up_when_ids_keep_colliding() {
        let (_, docs) = memory_manager();
        let docs = docs.with_id_source(|| "samesame".to_string());
        docs.create("first", "owner-1").await.unwrap();

        assert!(matches!(
            docs.create("second", "owner-1").await,
            Err(AppError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_create_write_failure_is_storage_error() {
        let mut store = MockRecordStore::new();
        store.expect_set_cardinality().returning(|_| Ok(0));
        store.expect_exists().returning(|_| Ok(false));
        store
            .expect_execute()
            .withf(|batch: &Batch| {
                matches!(batch.ops(), [Op::WriteFields { .. }, Op::AddToSet { .. }])
            })
            .times(1)
            .returning(|_| Err(AppError::Storage("EXECABORT".into())));

        let docs = manager_with(Arc::new(store), 10);
        assert!(matches!(
            docs.create("content", "owner-1").await,
            Err(AppError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_denied_delete_writes_nothing() {
        let mut store = MockRecordStore::new();
        store.expect_read_fields().returning(|_| {
            Ok(HashMap::from([
                ("id".to_string(), "a1b2c3d4".to_string()),
                ("owner_id".to_string(), "owner-1".to_string()),
            ]))
        });
        store.expect_execute().never();

        let docs = manager_with(Arc::new(store), 10);
        assert!(matches!(
            docs.delete("a1b2c3d4", "owner-2").await,
            Err(AppError::PermissionDenied(_))
        ));
    }
}
