//! JSON export source.
//!
//! Reads a file holding a JSON array of notes:
//!
//! ```json
//! [{"id": "n1", "title": "Groceries", "body": "milk", "modified_at": "2024-01-02T03:04:05Z"}]
//! ```
//!
//! `modified_at` is optional. Useful off macOS and for scripted exports.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;

use crate::models::NoteSnapshot;
use crate::traits::NoteSource;

#[derive(Debug, Deserialize)]
struct ExportedNote {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
}

pub struct ExportFileSource {
    path: PathBuf,
}

impl ExportFileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl NoteSource for ExportFileSource {
    fn name(&self) -> &str {
        "export"
    }

    async fn snapshot(&self) -> Result<Vec<NoteSnapshot>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read note export: {}", self.path.display()))?;
        parse_export(&content)
            .with_context(|| format!("Failed to parse note export: {}", self.path.display()))
    }
}

fn parse_export(content: &str) -> Result<Vec<NoteSnapshot>> {
    let notes: Vec<ExportedNote> = serde_json::from_str(content)?;
    notes
        .into_iter()
        .map(|n| {
            if n.id.trim().is_empty() {
                anyhow::bail!("note with empty id (title: '{}')", n.title);
            }
            Ok(NoteSnapshot {
                local_id: n.id,
                title: n.title,
                body: n.body,
                modified_at: n.modified_at.unwrap_or_default(),
            })
        })
        .collect()
}
