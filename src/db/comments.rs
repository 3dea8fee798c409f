use std::sync::Arc;

use chrono::Utc;

use crate::db::ids::generate_id;
use crate::db::keys::{comments_key, document_key};
use crate::db::models::{Comment, NewComment};
use crate::error::AppError;
use crate::store::{Batch, RecordStore};

/// Append-only comment threads, one list per document.
///
/// The thread's expiry follows the parent document's remaining TTL at the
/// time of each append. Whether the parent exists is checked by the caller
/// beforehand; a delete landing in between leaves an orphaned list that
/// expires on its own.
#[derive(Clone)]
pub struct CommentThread {
    store: Arc<dyn RecordStore>,
}

impl CommentThread {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Store a comment at the end of the document's thread.
    pub async fn append(&self, document_id: &str, new: NewComment) -> Result<Comment, AppError> {
        let comment = Comment {
            id: generate_id(),
            document_id: document_id.to_string(),
            line: new.line,
            text: new.text,
            author: new.author,
            created_at: Utc::now(),
        };
        let payload = serde_json::to_string(&comment)?;

        // An unknown or already elapsed parent TTL leaves the thread's
        // current expiry untouched.
        let ttl = match self.store.time_to_live(&document_key(document_id)).await {
            Ok(ttl) => ttl.filter(|ttl| !ttl.is_zero()),
            Err(e) => {
                tracing::warn!(document_id, "Failed to read document TTL: {e}");
                None
            }
        };

        self.store
            .execute(Batch::new().append_to_list(comments_key(document_id), payload, ttl))
            .await?;

        tracing::debug!(
            document_id,
            comment_id = %comment.id,
            line = comment.line,
            "comment added"
        );
        Ok(comment)
    }

    /// All comments of a document in insertion order.
    ///
    /// Entries that fail to decode are skipped.
    pub async fn list(&self, document_id: &str) -> Result<Vec<Comment>, AppError> {
        let raw = self.store.read_list(&comments_key(document_id)).await?;

        let comments = raw
            .iter()
            .filter_map(|entry| match serde_json::from_str::<Comment>(entry) {
                Ok(comment) => Some(comment),
                Err(e) => {
                    tracing::warn!(document_id, "Skipping malformed comment: {e}");
                    None
                }
            })
            .collect();

        Ok(comments)
    }
}
