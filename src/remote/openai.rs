//! OpenAI vector-store backend.
//!
//! - `index`: `POST /files` (purpose `assistants`) → `POST /vector_stores/{id}/files`
//!   → poll `GET /vector_stores/{id}/files/{file_id}` until processing ends.
//! - `remove`: `DELETE /vector_stores/{id}/files/{file_id}` then `DELETE /files/{file_id}`.
//!   A 404 on either call counts as already removed.
//! - `search`: `POST /vector_stores/{id}/search`.
//!
//! If attaching or processing fails after the upload, the uploaded file is
//! deleted best-effort so no orphan is left behind.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    classify_status, classify_transport, parse_retry_after, RemoteHit, RemoteIndex, RemoteSession,
};
use crate::error::RemoteError;
use crate::fingerprint::short_id_hash;

pub struct OpenAIVectorStore {
    client: reqwest::Client,
    session: RemoteSession,
    vector_store_id: String,
}

/// Processing state of a file attached to a vector store.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Processing {
    InProgress,
    Completed,
    Failed { code: String, message: String },
    Cancelled,
}

impl OpenAIVectorStore {
    /// Create a backend bound to the session's vector store.
    pub fn new(session: RemoteSession) -> Result<Self> {
        let vector_store_id = session.vector_store_id.clone().ok_or_else(|| {
            anyhow!("no vector store configured; set remote.vector_store_id or run `nh init --create-vector-store`")
        })?;
        let client = build_client(&session)?;
        Ok(Self {
            client,
            session,
            vector_store_id,
        })
    }

    pub fn vector_store_id(&self) -> &str {
        &self.vector_store_id
    }

    /// Create a new, empty vector store and return its id.
    pub async fn create_vector_store(session: &RemoteSession, name: &str) -> Result<String> {
        let client = build_client(session)?;
        let resp = authorized(
            client.post(format!("{}/vector_stores", session.base_url)),
            session,
        )
        .json(&json!({ "name": name }))
        .send()
        .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("failed to create vector store: HTTP {}: {}", status, body);
        }

        let json: Value = resp.json().await?;
        parse_id(&json).map_err(|e| anyhow!("failed to create vector store: {}", e))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.session.base_url, path)
    }

    /// Send a request and decode the JSON response, classifying failures.
    async fn send(&self, req: RequestBuilder) -> Result<Value, RemoteError> {
        match self.send_allow_missing(req).await? {
            Some(json) => Ok(json),
            None => Err(RemoteError::permanent("HTTP 404: resource not found")),
        }
    }

    /// Like [`send`](Self::send), but a 404 yields `Ok(None)`.
    async fn send_allow_missing(&self, req: RequestBuilder) -> Result<Option<Value>, RemoteError> {
        let response = authorized(req, &self.session)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            let json: Value = response
                .json()
                .await
                .map_err(|e| RemoteError::transient(format!("unreadable response: {}", e)))?;
            return Ok(Some(json));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let retry_after = parse_retry_after(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, retry_after))
    }

    async fn upload_file(&self, local_id: &str, content: &str) -> Result<String, RemoteError> {
        let filename = format!("note-{}.txt", short_id_hash(local_id));
        let part = Part::bytes(content.as_bytes().to_vec())
            .file_name(filename)
            .mime_str("text/plain")
            .map_err(|e| RemoteError::permanent(format!("invalid upload: {}", e)))?;
        let form = Form::new().text("purpose", "assistants").part("file", part);

        let json = self
            .send(self.client.post(self.url("/files")).multipart(form))
            .await?;
        parse_id(&json).map_err(RemoteError::transient)
    }

    async fn attach(&self, file_id: &str) -> Result<(), RemoteError> {
        let path = format!("/vector_stores/{}/files", self.vector_store_id);
        self.send(
            self.client
                .post(self.url(&path))
                .json(&json!({ "file_id": file_id })),
        )
        .await?;
        Ok(())
    }

    async fn wait_for_processing(&self, file_id: &str) -> Result<(), RemoteError> {
        let path = format!("/vector_stores/{}/files/{}", self.vector_store_id, file_id);
        let deadline = tokio::time::Instant::now() + self.session.poll_timeout;

        loop {
            let json = self.send(self.client.get(self.url(&path))).await?;
            match parse_processing(&json) {
                Processing::Completed => return Ok(()),
                Processing::Failed { code, message } => {
                    return Err(classify_processing_failure(&code, &message))
                }
                Processing::Cancelled => {
                    return Err(RemoteError::transient("file processing was cancelled"))
                }
                Processing::InProgress => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(RemoteError::transient(format!(
                    "file {} still processing after {:?}",
                    file_id, self.session.poll_timeout
                )));
            }
            tokio::time::sleep(self.session.poll_interval).await;
        }
    }

    async fn detach(&self, file_id: &str) -> Result<(), RemoteError> {
        let path = format!("/vector_stores/{}/files/{}", self.vector_store_id, file_id);
        if self
            .send_allow_missing(self.client.delete(self.url(&path)))
            .await?
            .is_none()
        {
            debug!(file_id, "vector store file already detached");
        }
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let path = format!("/files/{}", file_id);
        if self
            .send_allow_missing(self.client.delete(self.url(&path)))
            .await?
            .is_none()
        {
            debug!(file_id, "file already deleted");
        }
        Ok(())
    }

    async fn discard_orphan(&self, file_id: &str, attached: bool) {
        if attached {
            if let Err(e) = self.detach(file_id).await {
                warn!(file_id, error = %e, "could not detach file after failed indexing");
            }
        }
        if let Err(e) = self.delete_file(file_id).await {
            warn!(file_id, error = %e, "could not delete file after failed indexing");
        }
    }
}

#[async_trait]
impl RemoteIndex for OpenAIVectorStore {
    async fn index(&self, local_id: &str, content: &str) -> Result<String, RemoteError> {
        let file_id = self.upload_file(local_id, content).await?;

        if let Err(e) = self.attach(&file_id).await {
            self.discard_orphan(&file_id, false).await;
            return Err(e);
        }
        if let Err(e) = self.wait_for_processing(&file_id).await {
            self.discard_orphan(&file_id, true).await;
            return Err(e);
        }

        debug!(local_id, file_id = %file_id, "indexed note");
        Ok(file_id)
    }

    async fn remove(&self, remote_file_id: &str) -> Result<(), RemoteError> {
        self.detach(remote_file_id).await?;
        self.delete_file(remote_file_id).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RemoteHit>, RemoteError> {
        let path = format!("/vector_stores/{}/search", self.vector_store_id);
        let json = self
            .send(
                self.client
                    .post(self.url(&path))
                    .json(&json!({ "query": query, "max_num_results": limit.clamp(1, 50) })),
            )
            .await?;
        parse_search(&json).map_err(RemoteError::transient)
    }
}

fn build_client(session: &RemoteSession) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(session.timeout).build()?)
}

fn authorized(req: RequestBuilder, session: &RemoteSession) -> RequestBuilder {
    req.header("Authorization", format!("Bearer {}", session.api_key))
        .header("OpenAI-Beta", "assistants=v2")
}

fn parse_id(json: &Value) -> Result<String, String> {
    json.get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| "invalid response: missing id".to_string())
}

fn parse_processing(json: &Value) -> Processing {
    match json.get("status").and_then(|s| s.as_str()) {
        Some("completed") => Processing::Completed,
        Some("cancelled") => Processing::Cancelled,
        Some("failed") => {
            let last_error = json.get("last_error");
            let field = |name: &str| {
                last_error
                    .and_then(|e| e.get(name))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            Processing::Failed {
                code: field("code"),
                message: field("message"),
            }
        }
        _ => Processing::InProgress,
    }
}

fn classify_processing_failure(code: &str, message: &str) -> RemoteError {
    let detail = format!("file processing failed ({}): {}", code, message);
    match code {
        "server_error" | "rate_limit_exceeded" => RemoteError::transient(detail),
        _ => RemoteError::permanent(detail),
    }
}

fn parse_search(json: &Value) -> Result<Vec<RemoteHit>, String> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| "invalid search response: missing data array".to_string())?;

    let mut hits = Vec::with_capacity(data.len());
    for item in data {
        let remote_file_id = item
            .get("file_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "invalid search response: missing file_id".to_string())?
            .to_string();
        let score = item.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let snippet = item
            .get("content")
            .and_then(|c| c.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        hits.push(RemoteHit {
            remote_file_id,
            score,
            snippet,
        });
    }
    Ok(hits)
}
