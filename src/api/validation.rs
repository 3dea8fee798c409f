use crate::db::models::{CreateCommentRequest, NewComment};
use crate::error::AppError;

/// Default maximum document size in bytes (1 MiB).
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 1024 * 1024;

/// Default maximum comment length in characters.
pub const DEFAULT_MAX_COMMENT_CHARS: usize = 1000;

/// Size limits enforced on incoming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_content_bytes: usize,
    pub max_comment_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            max_comment_chars: DEFAULT_MAX_COMMENT_CHARS,
        }
    }
}

/// Document content must not be blank and must fit the byte limit.
pub fn validate_content(content: &str, limits: &Limits) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::BadRequest("Content cannot be empty".into()));
    }
    if content.len() > limits.max_content_bytes {
        return Err(AppError::BadRequest(format!(
            "Content too large (max {} bytes)",
            limits.max_content_bytes
        )));
    }
    Ok(())
}

/// Check a comment request and turn it into a storable comment.
pub fn validate_comment(
    request: CreateCommentRequest,
    limits: &Limits,
) -> Result<NewComment, AppError> {
    let line = u32::try_from(request.line)
        .ok()
        .filter(|line| *line >= 1)
        .ok_or_else(|| AppError::BadRequest("Line number must be positive".into()))?;

    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("Comment text cannot be empty".into()));
    }
    if request.text.chars().count() > limits.max_comment_chars {
        return Err(AppError::BadRequest(format!(
            "Comment too long (max {} characters)",
            limits.max_comment_chars
        )));
    }

    Ok(NewComment::new(line, request.text, request.author))
}
