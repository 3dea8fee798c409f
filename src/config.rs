use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::api::validation::{Limits, DEFAULT_MAX_COMMENT_CHARS, DEFAULT_MAX_CONTENT_BYTES};
use crate::db::documents::DEFAULT_DOCUMENT_TTL;
use crate::db::quota::DEFAULT_MAX_DOCUMENTS_PER_OWNER;

/// Upper bound for `document_ttl_secs` (one year).
pub const MAX_DOCUMENT_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Which record store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    /// Process-local store; contents vanish on restart.
    Memory,
}

/// Server configuration.
///
/// Layered as defaults, then an optional config file, then environment
/// variables (`PORT`, `REDIS_URL`, `BASE_URL`, `STATIC_DIR`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub redis_url: String,
    /// Public URL used to build share links. Defaults to `http://localhost:{port}`.
    #[serde(default)]
    pub base_url: Option<String>,
    pub static_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub store_timeout_ms: u64,
    pub document_ttl_secs: u64,
    pub max_documents_per_owner: u64,
    pub max_content_bytes: usize,
    pub max_comment_chars: usize,
}

impl AppConfig {
    /// Load from the process environment and an optional config file.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(file, None)
    }

    /// Load with explicit environment values instead of the process
    /// environment (useful for testing).
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("port", 8080_i64)?
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("static_dir", "./static")?
            .set_default("store_backend", "redis")?
            .set_default("store_timeout_ms", 5000_i64)?
            .set_default("document_ttl_secs", DEFAULT_DOCUMENT_TTL.as_secs() as i64)?
            .set_default("max_documents_per_owner", DEFAULT_MAX_DOCUMENTS_PER_OWNER as i64)?
            .set_default("max_content_bytes", DEFAULT_MAX_CONTENT_BYTES as i64)?
            .set_default("max_comment_chars", DEFAULT_MAX_COMMENT_CHARS as i64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        let config: Self = builder
            .add_source(Environment::default().try_parsing(true).source(env))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_DOCUMENT_TTL_SECS).contains(&self.document_ttl_secs) {
            return Err(ConfigError::Message(format!(
                "document_ttl_secs must be between 1 and {}, got {}",
                MAX_DOCUMENT_TTL_SECS, self.document_ttl_secs
            )));
        }
        Ok(())
    }

    /// Share-link prefix without a trailing slash.
    pub fn base_url(&self) -> String {
        let base = match self.base_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("http://localhost:{}", self.port),
        };
        base.trim_end_matches('/').to_string()
    }

    pub fn document_ttl(&self) -> Duration {
        Duration::from_secs(self.document_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_content_bytes: self.max_content_bytes,
            max_comment_chars: self.max_comment_chars,
        }
    }
}
