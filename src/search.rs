//! `nh search`: query the remote index and map hits back to notes.
//!
//! The vector store returns file handles and chunk snippets. Hits are grouped
//! per file (best chunk wins), joined with the fingerprint store to recover
//! the note, and decorated with an external locator when one resolves.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::ingest;
use crate::migrate;
use crate::models::ExternalLocator;
use crate::remote::{RemoteHit, RemoteIndex};
use crate::resolve::{resolver_from_config, IdentifierResolver};
use crate::store::{FingerprintStore, SqliteFingerprintStore};

/// One search result, ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct NoteHit {
    pub remote_file_id: String,
    /// `None` when the file is not tracked locally (e.g. left over from an
    /// interrupted update).
    pub local_id: Option<String>,
    pub title: Option<String>,
    pub score: f64,
    pub snippet: String,
    pub locator: Option<ExternalLocator>,
}

pub async fn search_notes(
    backend: &dyn RemoteIndex,
    store: &dyn FingerprintStore,
    resolver: &dyn IdentifierResolver,
    query: &str,
    limit: usize,
) -> Result<Vec<NoteHit>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let hits = backend.search(query, limit).await?;

    // MAX aggregation per file.
    let mut best: HashMap<String, RemoteHit> = HashMap::new();
    for hit in hits {
        match best.get(&hit.remote_file_id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.remote_file_id.clone(), hit);
            }
        }
    }

    let mut results = Vec::with_capacity(best.len());
    for (remote_file_id, hit) in best {
        let record = store.find_by_remote_id(&remote_file_id).await?;
        let locator = match &record {
            Some(r) => resolver.resolve(&r.local_id).await,
            None => None,
        };
        results.push(NoteHit {
            remote_file_id,
            local_id: record.as_ref().map(|r| r.local_id.clone()),
            title: record.map(|r| r.title),
            score: hit.score,
            snippet: hit.snippet,
            locator,
        });
    }

    // Sort: score desc, then file id for a stable order
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.remote_file_id.cmp(&b.remote_file_id))
    });
    results.truncate(limit);

    Ok(results)
}

pub async fn run_search(config: &Config, query: &str, limit: usize, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let backend = ingest::open_backend(config, &pool).await?;
    let store = SqliteFingerprintStore::new(pool.clone());
    let resolver = resolver_from_config(config);

    let results = search_notes(
        backend.as_ref(),
        &store,
        resolver.as_ref(),
        query,
        limit,
    )
    .await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let title = result
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("(untitled)");
        println!("{}. [{:.2}] {}", i + 1, result.score, title);
        match &result.local_id {
            Some(id) => println!("    note: {}", id),
            None => println!("    note: (untracked file {})", result.remote_file_id),
        }
        if let Some(locator) = &result.locator {
            println!("    open: {}", locator.url);
        }
        println!(
            "    excerpt: \"{}\"",
            result.snippet.replace('\n', " ").trim()
        );
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::models::{FingerprintRecord, SyncState};
    use crate::resolve::{locator_for, NoopResolver};
    use crate::store::InMemoryFingerprintStore;
    use async_trait::async_trait;

    struct CannedIndex(Vec<RemoteHit>);

    #[async_trait]
    impl RemoteIndex for CannedIndex {
        async fn index(&self, _local_id: &str, _content: &str) -> Result<String, RemoteError> {
            Err(RemoteError::permanent("read-only"))
        }

        async fn remove(&self, _remote_file_id: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<RemoteHit>, RemoteError> {
            Ok(self.0.clone())
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl IdentifierResolver for FixedResolver {
        async fn resolve(&self, local_id: &str) -> Option<ExternalLocator> {
            Some(locator_for(&format!("ID-{}", local_id)))
        }
    }

    fn hit(file: &str, score: f64, snippet: &str) -> RemoteHit {
        RemoteHit {
            remote_file_id: file.to_string(),
            score,
            snippet: snippet.to_string(),
        }
    }

    fn record(id: &str, file: &str, title: &str) -> FingerprintRecord {
        FingerprintRecord {
            local_id: id.to_string(),
            content_hash: "h".to_string(),
            remote_file_id: Some(file.to_string()),
            sync_state: SyncState::Synced,
            title: title.to_string(),
            last_error: None,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn hits_are_grouped_sorted_and_joined() {
        let backend = CannedIndex(vec![
            hit("file-b", 0.4, "b chunk"),
            hit("file-a", 0.6, "a weak chunk"),
            hit("file-a", 0.9, "a strong chunk"),
            hit("file-x", 0.5, "orphan"),
        ]);
        let store = InMemoryFingerprintStore::from_records(vec![
            record("n-a", "file-a", "Alpha"),
            record("n-b", "file-b", "Beta"),
        ]);

        let results = search_notes(&backend, &store, &FixedResolver, "alpha", 10)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].local_id.as_deref(), Some("n-a"));
        assert_eq!(results[0].snippet, "a strong chunk");
        assert_eq!(
            results[0].locator.as_ref().map(|l| l.url.as_str()),
            Some("notes://showNote?identifier=ID-n-a")
        );
        assert_eq!(results[1].remote_file_id, "file-x");
        assert!(results[1].local_id.is_none());
        assert!(results[1].locator.is_none());
        assert_eq!(results[2].title.as_deref(), Some("Beta"));
    }

    #[tokio::test]
    async fn limit_and_unresolvable_links() {
        let backend = CannedIndex(vec![hit("file-a", 0.9, "a"), hit("file-b", 0.8, "b")]);
        let store = InMemoryFingerprintStore::from_records(vec![
            record("n-a", "file-a", "Alpha"),
            record("n-b", "file-b", "Beta"),
        ]);

        let results = search_notes(&backend, &store, &NoopResolver, "q", 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].locator.is_none());
        assert_eq!(results[0].title.as_deref(), Some("Alpha"));
    }

    #[tokio::test]
    async fn blank_query_returns_nothing() {
        let backend = CannedIndex(vec![hit("file-a", 0.9, "a")]);
        let store = InMemoryFingerprintStore::new();
        let results = search_notes(&backend, &store, &NoopResolver, "   ", 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
