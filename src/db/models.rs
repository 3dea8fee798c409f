use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The author label stored when a comment is submitted without one.
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// A shared markdown document.
///
/// Stored as a Redis hash under `md:{id}` and visible only until its TTL
/// elapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    /// Number of reads so far. Only ever incremented.
    pub views: u64,
    /// Opaque session identifier of the creator.
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Document {
    /// The hash fields written for this document. Timestamps are unix seconds.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".to_string(), self.id.clone()),
            ("content".to_string(), self.content.clone()),
            ("views".to_string(), self.views.to_string()),
            ("owner_id".to_string(), self.owner_id.clone()),
            ("created_at".to_string(), self.created_at.timestamp().to_string()),
            ("expires_at".to_string(), self.expires_at.timestamp().to_string()),
        ]
    }

    /// Rebuild a document from its hash fields.
    ///
    /// Returns `Ok(None)` when the hash has no `id` field, i.e. there is no
    /// document there.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Option<Self>, AppError> {
        let Some(id) = fields.get("id") else {
            return Ok(None);
        };

        Ok(Some(Self {
            id: id.clone(),
            content: fields.get("content").cloned().unwrap_or_default(),
            views: parse_field(fields, "views")?.unwrap_or(0),
            owner_id: fields.get("owner_id").cloned().unwrap_or_default(),
            created_at: parse_timestamp(fields, "created_at")?,
            expires_at: parse_timestamp(fields, "expires_at")?,
        }))
    }
}

fn parse_field<T: std::str::FromStr>(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, AppError> {
    fields
        .get(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                AppError::Serialization(format!("field '{}' has invalid value '{}'", name, raw))
            })
        })
        .transpose()
}

fn parse_timestamp(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<DateTime<Utc>, AppError> {
    let secs: i64 = parse_field(fields, name)?.unwrap_or(0);
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| AppError::Serialization(format!("field '{}' is out of range", name)))
}

/// A comment anchored to one line of a document.
///
/// Serialized as JSON into the `md:{id}:comments` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    /// Back-reference to the commented document.
    #[serde(default)]
    pub document_id: String,
    /// 1-based line number.
    pub line: u32,
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// A validated comment that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub line: u32,
    pub text: String,
    pub author: String,
}

impl NewComment {
    /// Build a comment, substituting [`ANONYMOUS_AUTHOR`] for a missing or
    /// empty author.
    pub fn new(line: u32, text: impl Into<String>, author: Option<String>) -> Self {
        let author = author
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());
        Self {
            line,
            text: text.into(),
            author,
        }
    }
}

/// Request body for `POST /api/markdown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentRequest {
    pub content: String,
}

/// Response body for a successful `POST /api/markdown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDocumentResponse {
    pub id: String,
    pub share_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Response body for `GET /api/markdown/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: String,
    pub content: String,
    pub views: u64,
    pub is_owner: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Request body for `POST /api/markdown/{id}/comments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub line: i64,
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// Response body for `GET /api/markdown/{id}/comments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsResponse {
    pub comments: Vec<Comment>,
}

/// Response body for `GET /api/user/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatsResponse {
    pub files_count: u64,
    pub files_limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        Document {
            id: "a1b2c3d4".to_string(),
            content: "# Hello\n\nworld".to_string(),
            views: 7,
            owner_id: "session-1".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            expires_at: Utc.timestamp_opt(1_700_086_400, 0).unwrap(),
        }
    }

    #[test]
    fn test_document_fields_roundtrip() {
        let doc = sample_document();
        let fields: HashMap<String, String> = doc.to_fields().into_iter().collect();
        assert_eq!(fields["created_at"], "1700000000");

        let restored = Document::from_fields(&fields).unwrap().unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_document_from_empty_fields_is_absent() {
        assert!(Document::from_fields(&HashMap::new()).unwrap().is_none());

        // A hash holding only a counter is not a document.
        let fields = HashMap::from([("views".to_string(), "3".to_string())]);
        assert!(Document::from_fields(&fields).unwrap().is_none());
    }

    #[test]
    fn test_document_from_fields_rejects_garbage_counter() {
        let mut fields: HashMap<String, String> =
            sample_document().to_fields().into_iter().collect();
        fields.insert("views".to_string(), "many".to_string());

        match Document::from_fields(&fields) {
            Err(AppError::Serialization(msg)) => assert!(msg.contains("views")),
            other => panic!("Expected Serialization error, got: {:?}", other),
        }
    }

    #[test]
    fn test_comment_serialization_roundtrip() {
        let comment = Comment {
            id: "c0ffee00".to_string(),
            document_id: "a1b2c3d4".to_string(),
            line: 12,
            text: "Typo here — \"recieve\"".to_string(),
            author: "Ada".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&comment).unwrap();
        let restored: Comment = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, comment);
    }

    #[test]
    fn test_comment_without_document_id_deserializes() {
        let json = r###"{
            "id": "c0ffee00",
            "line": 3,
            "text": "nice",
            "author": "Anonymous",
            "created_at": "2024-01-01T00:00:00Z"
        }"###;

        let comment: Comment = serde_json::from_str(json).unwrap();
        assert_eq!(comment.document_id, "");
        assert_eq!(comment.line, 3);
    }

    #[test]
    fn test_new_comment_defaults_author() {
        assert_eq!(NewComment::new(1, "x", None).author, ANONYMOUS_AUTHOR);
        assert_eq!(
            NewComment::new(1, "x", Some(String::new())).author,
            ANONYMOUS_AUTHOR
        );
        assert_eq!(NewComment::new(1, "x", Some("Bo".into())).author, "Bo");
    }

    #[test]
    fn test_create_comment_request_author_optional() {
        let req: CreateCommentRequest =
            serde_json::from_str(r#"{"line": 4, "text": "hm"}"#).unwrap();
        assert_eq!(req.line, 4);
        assert!(req.author.is_none());
    }
}
