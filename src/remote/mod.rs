//! Remote index abstraction.
//!
//! Defines the [`RemoteIndex`] trait with exactly three operations and the
//! [`RemoteSession`] that carries credentials into a backend. Concrete
//! backend:
//! - **[`OpenAIVectorStore`]**: uploads each note as a file attached to an
//!   OpenAI vector store.
//!
//! # Error classification
//!
//! Backends map failures onto [`RemoteError`]:
//! - HTTP 408, 409, 429 and 5xx, timeouts, connection errors → transient
//! - Other HTTP 4xx → permanent
//! - `Retry-After` (seconds) is carried as the backoff hint

pub mod openai;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::error::RemoteError;

pub use openai::OpenAIVectorStore;

/// A single hit from a remote semantic search.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteHit {
    pub remote_file_id: String,
    pub score: f64,
    pub snippet: String,
}

/// The hosted index the sync engine reconciles against.
#[async_trait]
pub trait RemoteIndex: Send + Sync {
    /// Embed and index `content`, returning the remote file handle.
    async fn index(&self, local_id: &str, content: &str) -> Result<String, RemoteError>;

    /// Remove a previously indexed file. Removing a file the backend no
    /// longer knows about succeeds.
    async fn remove(&self, remote_file_id: &str) -> Result<(), RemoteError>;

    /// Semantic search over indexed files. Not used by the sync path.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RemoteHit>, RemoteError>;
}

/// Credentials and endpoint settings, built once by the CLI and passed in.
#[derive(Clone)]
pub struct RemoteSession {
    pub api_key: String,
    pub base_url: String,
    pub vector_store_id: Option<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("vector_store_id", &self.vector_store_id)
            .finish()
    }
}

impl RemoteSession {
    /// Build a session from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &RemoteConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        if api_key.trim().is_empty() {
            anyhow::bail!("{} is empty", config.api_key_env);
        }

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            vector_store_id: config.vector_store_id.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        })
    }

    pub fn with_vector_store(mut self, id: impl Into<String>) -> Self {
        self.vector_store_id = Some(id.into());
        self
    }
}

/// Document body uploaded for a note. The `ID:` line lets answers cite the note.
pub fn render_document(local_id: &str, title: &str, body: &str) -> String {
    format!("Title: {}\nID: {}\n\nContent: {}", title, local_id, body)
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> RemoteError {
    let message = format!("HTTP {}: {}", status, truncate(body, 300));
    let code = status.as_u16();
    if code == 408 || code == 409 || code == 429 || status.is_server_error() {
        RemoteError::Transient {
            message,
            retry_after,
        }
    } else {
        RemoteError::Permanent(message)
    }
}

/// Classify a transport-level failure.
pub fn classify_transport(err: &reqwest::Error) -> RemoteError {
    if err.is_builder() {
        RemoteError::permanent(format!("invalid request: {}", err))
    } else {
        RemoteError::transient(format!("network error: {}", err))
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
