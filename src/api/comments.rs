use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::validation::{validate_comment, Limits};
use crate::app::AppState;
use crate::db::comments::CommentThread;
use crate::db::documents::DocumentManager;
use crate::db::models::{Comment, CommentsResponse, CreateCommentRequest};
use crate::error::AppError;

/// Attach a comment to an existing document.
///
/// The document must exist before the body is even looked at, so a missing
/// document is `NotFound` regardless of what was sent.
pub async fn process_create_comment(
    documents: &DocumentManager,
    comments: &CommentThread,
    limits: &Limits,
    document_id: &str,
    body: Result<CreateCommentRequest, AppError>,
) -> Result<Comment, AppError> {
    documents.get(document_id).await?;

    let new_comment = validate_comment(body?, limits)?;
    comments.append(document_id, new_comment).await
}

/// Axum handler for `POST /api/markdown/{id}/comments`.
pub async fn create_comment_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let body = body
        .map(|Json(request)| request)
        .map_err(|_| AppError::BadRequest("Invalid request body".into()));

    let comment =
        process_create_comment(&state.documents, &state.comments, &state.limits, &id, body)
            .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Axum handler for `GET /api/markdown/{id}/comments`.
pub async fn list_comments_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommentsResponse>, AppError> {
    let comments = state.comments.list(&id).await?;
    Ok(Json(CommentsResponse { comments }))
}
