use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::api::validation::Limits;
use crate::config::AppConfig;
use crate::db::comments::CommentThread;
use crate::db::documents::DocumentManager;
use crate::db::quota::QuotaTracker;
use crate::session::session_middleware;
use crate::store::RecordStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub documents: DocumentManager,
    pub comments: CommentThread,
    pub limits: Limits,
    pub base_url: String,
}

impl AppState {
    /// Wire the managers to one shared record store.
    pub fn new(store: Arc<dyn RecordStore>, config: &AppConfig) -> Self {
        let quota = QuotaTracker::new(store.clone(), config.max_documents_per_owner);
        Self {
            documents: DocumentManager::new(store.clone(), quota, config.document_ttl()),
            comments: CommentThread::new(store),
            limits: config.limits(),
            base_url: config.base_url(),
        }
    }
}

/// Build the full router: JSON API, health check and static pages.
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    // Leave room for JSON escaping so oversized content reaches validation
    // instead of being cut off by the transport.
    let body_limit = state.limits.max_content_bytes.saturating_mul(4);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route(
            "/markdown",
            axum::routing::post(api::documents::create_document_handler),
        )
        .route(
            "/markdown/{id}",
            get(api::documents::get_document_handler)
                .delete(api::documents::delete_document_handler),
        )
        .route(
            "/markdown/{id}/comments",
            get(api::comments::list_comments_handler)
                .post(api::comments::create_comment_handler),
        )
        .route("/user/stats", get(api::stats::user_stats_handler));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .route_service("/view/{id}", ServeFile::new(static_dir.join("view.html")))
        .fallback_service(ServeDir::new(static_dir))
        .layer(axum::middleware::from_fn(session_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
