use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::{Redis, REDIS_PORT};

use mdspace::app::{build_router, AppState};
use mdspace::config::AppConfig;
use mdspace::session::SESSION_COOKIE;
use mdspace::store::memory::MemoryRecordStore;
use mdspace::store::redis_store::RedisRecordStore;
use mdspace::store::RecordStore;

pub const BASE_URL: &str = "http://mdspace.test";

/// Holds the record store (and its container, if any) plus the Axum router
/// for integration tests.
///
/// A Redis container is kept alive for as long as this struct lives and is
/// stopped when it is dropped.
pub struct TestEnv {
    _redis: Option<ContainerAsync<Redis>>,
    pub store: Arc<dyn RecordStore>,
    pub state: AppState,
    pub router: Router,
}

impl TestEnv {
    /// Build the environment on the in-process store.
    pub fn in_memory() -> Self {
        Self::build(None, Arc::new(MemoryRecordStore::new()))
    }

    /// Spin up a Redis container and build the environment on it.
    pub async fn start() -> Self {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = container
            .get_host_port_ipv4(REDIS_PORT)
            .await
            .expect("Failed to get Redis port");

        let redis = RedisRecordStore::connect(
            &format!("redis://127.0.0.1:{}", port),
            Duration::from_secs(5),
        )
        .await
        .expect("Failed to connect to Redis");

        Self::build(Some(container), Arc::new(redis))
    }

    fn build(redis: Option<ContainerAsync<Redis>>, store: Arc<dyn RecordStore>) -> Self {
        let config = AppConfig::from_sources(
            None,
            Some(HashMap::from([("BASE_URL".to_string(), BASE_URL.to_string())])),
        )
        .expect("Failed to build test config");

        let state = AppState::new(store.clone(), &config);
        let router = build_router(state.clone(), Path::new("./static-does-not-exist"));

        Self {
            _redis: redis,
            store,
            state,
            router,
        }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .save_cookies()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .build(self.router.clone())
    }

    /// Helper: create a document as `session` via the API.
    pub async fn create(
        &self,
        server: &axum_test::TestServer,
        session: &str,
        content: &str,
    ) -> axum_test::TestResponse {
        server
            .post("/api/markdown")
            .add_cookie(session_cookie(session))
            .json(&serde_json::json!({ "content": content }))
            .await
    }

    /// Helper: create a document and return its id.
    pub async fn create_id(
        &self,
        server: &axum_test::TestServer,
        session: &str,
        content: &str,
    ) -> String {
        let response = self.create(server, session, content).await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        body["id"].as_str().expect("id in response").to_string()
    }
}

/// The session cookie a browser would send for `session`.
pub fn session_cookie(session: &str) -> cookie::Cookie<'static> {
    cookie::Cookie::new(SESSION_COOKIE, session.to_string())
}
