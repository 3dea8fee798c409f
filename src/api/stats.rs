use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::db::models::UserStatsResponse;
use crate::error::AppError;
use crate::session::Session;

/// Axum handler for `GET /api/user/stats`.
pub async fn user_stats_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<UserStatsResponse>, AppError> {
    let quota = state.documents.quota();
    let files_count = quota.count(session.id()).await?;

    Ok(Json(UserStatsResponse {
        files_count,
        files_limit: quota.limit(),
    }))
}
