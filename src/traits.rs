//! Extension points for note sources.
//!
//! A [`NoteSource`] produces the whole corpus as [`NoteSnapshot`]s. The sync
//! core pulls from it once per pass and treats it as an opaque collaborator.
//! Built-in sources:
//!
//! | Kind | Type |
//! |------|------|
//! | `apple-notes` | [`AppleNotesSource`](crate::connector_notes::AppleNotesSource) |
//! | `export` | [`ExportFileSource`](crate::connector_export::ExportFileSource) |
//!
//! # Example
//!
//! ```rust
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use chrono::Utc;
//! use notes_harness::models::NoteSnapshot;
//! use notes_harness::traits::NoteSource;
//!
//! struct FixedSource;
//!
//! #[async_trait]
//! impl NoteSource for FixedSource {
//!     fn name(&self) -> &str { "fixed" }
//!
//!     async fn snapshot(&self) -> Result<Vec<NoteSnapshot>> {
//!         Ok(vec![NoteSnapshot {
//!             local_id: "n1".into(),
//!             title: "Hello".into(),
//!             body: "World".into(),
//!             modified_at: Utc::now(),
//!         }])
//!     }
//! }
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::connector_export::ExportFileSource;
use crate::connector_notes::AppleNotesSource;
use crate::models::NoteSnapshot;

/// Pull source for the local note corpus.
#[async_trait]
pub trait NoteSource: Send + Sync {
    /// Short label used in logs and status output.
    fn name(&self) -> &str;

    /// Produce the full corpus. May be slow (minutes for large collections).
    async fn snapshot(&self) -> Result<Vec<NoteSnapshot>>;
}

/// Build the source selected by `[source] kind`.
pub fn source_from_config(config: &Config) -> Result<Box<dyn NoteSource>> {
    match config.source.kind.as_str() {
        "apple-notes" => Ok(Box::new(AppleNotesSource::new(&config.source.osascript))),
        "export" => match &config.source.export_path {
            Some(path) => Ok(Box::new(ExportFileSource::new(path.clone()))),
            None => bail!("source.export_path must be set when source.kind is 'export'"),
        },
        other => bail!("Unknown note source: '{}'", other),
    }
}
