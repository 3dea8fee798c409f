use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::validation::{validate_content, Limits};
use crate::app::AppState;
use crate::db::documents::DocumentManager;
use crate::db::models::{CreateDocumentRequest, CreateDocumentResponse, DocumentResponse};
use crate::error::AppError;
use crate::session::Session;

/// Validate and store a new document, returning its share link.
pub async fn process_create(
    documents: &DocumentManager,
    limits: &Limits,
    base_url: &str,
    request: CreateDocumentRequest,
    owner_id: &str,
) -> Result<CreateDocumentResponse, AppError> {
    validate_content(&request.content, limits)?;

    let doc = documents.create(&request.content, owner_id).await?;

    Ok(CreateDocumentResponse {
        share_url: format!("{}/view/{}", base_url, doc.id),
        id: doc.id,
        expires_at: doc.expires_at,
    })
}

/// Read a document and count the view.
///
/// The increment is best-effort: when it fails the stored count is
/// returned and the read still succeeds.
pub async fn process_view(
    documents: &DocumentManager,
    id: &str,
    session_id: &str,
) -> Result<DocumentResponse, AppError> {
    let mut doc = documents.get(id).await?;

    match documents.increment_views(id).await {
        Ok(views) => doc.views = views,
        Err(e) => tracing::warn!(id, "Failed to increment views: {e}"),
    }

    Ok(DocumentResponse {
        is_owner: doc.owner_id == session_id,
        id: doc.id,
        content: doc.content,
        views: doc.views,
        created_at: doc.created_at,
        expires_at: doc.expires_at,
    })
}

/// Axum handler for `POST /api/markdown`.
pub async fn create_document_handler(
    State(state): State<AppState>,
    session: Session,
    body: Result<Json<CreateDocumentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateDocumentResponse>), AppError> {
    let Json(request) = body.map_err(|_| AppError::BadRequest("Invalid request body".into()))?;

    let response = process_create(
        &state.documents,
        &state.limits,
        &state.base_url,
        request,
        session.id(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Axum handler for `GET /api/markdown/{id}`.
pub async fn get_document_handler(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, AppError> {
    let response = process_view(&state.documents, &id, session.id()).await?;
    Ok(Json(response))
}

/// Axum handler for `DELETE /api/markdown/{id}`.
pub async fn delete_document_handler(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.documents.delete(&id, session.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}
