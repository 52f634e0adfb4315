//! Identifier resolution.
//!
//! Apple Notes hands out Core Data URLs (`x-coredata://<store>/ICNote/p123`)
//! that cannot be opened directly. The Notes database maps the trailing
//! primary key to the note's `ZIDENTIFIER`, which `notes://showNote` accepts.
//!
//! Resolution is read-only, lazy (query time only) and advisory: every
//! failure yields `None` and the caller renders the result without a link.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::Config;
use crate::db;
use crate::models::ExternalLocator;

#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn resolve(&self, local_id: &str) -> Option<ExternalLocator>;
}

/// Resolver used when locators are disabled.
pub struct NoopResolver;

#[async_trait]
impl IdentifierResolver for NoopResolver {
    async fn resolve(&self, _local_id: &str) -> Option<ExternalLocator> {
        None
    }
}

/// Looks identifiers up in the Notes app's `NoteStore.sqlite`.
pub struct NoteStoreResolver {
    path: PathBuf,
    pool: OnceCell<Option<SqlitePool>>,
}

impl NoteStoreResolver {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pool: OnceCell::new(),
        }
    }

    /// Open the database on first use. A failure is remembered so we warn once.
    async fn pool(&self) -> Option<&SqlitePool> {
        self.pool
            .get_or_init(|| async {
                match db::connect_read_only(&self.path).await {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        warn!(
                            path = %self.path.display(),
                            error = %e,
                            "cannot open notes database; links disabled (grant Full Disk Access to the terminal)"
                        );
                        None
                    }
                }
            })
            .await
            .as_ref()
    }
}

#[async_trait]
impl IdentifierResolver for NoteStoreResolver {
    async fn resolve(&self, local_id: &str) -> Option<ExternalLocator> {
        let pk = primary_key(local_id)?;
        let pool = self.pool().await?;

        let found: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT ZIDENTIFIER FROM ZICCLOUDSYNCINGOBJECT WHERE Z_PK = ?")
                .bind(pk)
                .fetch_optional(pool)
                .await;

        match found {
            Ok(Some(identifier)) if !identifier.is_empty() => Some(locator_for(&identifier)),
            Ok(_) => {
                debug!(local_id, "no notes database row for identifier");
                None
            }
            Err(e) => {
                warn!(local_id, error = %e, "identifier lookup failed");
                None
            }
        }
    }
}

/// Build the resolver selected by `[locator]`.
pub fn resolver_from_config(config: &Config) -> Box<dyn IdentifierResolver> {
    if config.locator.enabled {
        Box::new(NoteStoreResolver::new(config.locator.note_store_path.clone()))
    } else {
        Box::new(NoopResolver)
    }
}

/// Extract the numeric primary key from a Core Data URL.
pub fn primary_key(local_id: &str) -> Option<i64> {
    local_id
        .rsplit('/')
        .next()
        .map(|segment| segment.trim_start_matches('p'))
        .and_then(|digits| digits.parse::<i64>().ok())
}

pub fn locator_for(identifier: &str) -> ExternalLocator {
    ExternalLocator {
        identifier: identifier.to_string(),
        url: format!("notes://showNote?identifier={}", identifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn notes_db(tmp: &TempDir) -> PathBuf {
        let path = tmp.path().join("NoteStore.sqlite");
        let pool = db::connect_path(&path).await.unwrap();
        sqlx::query("CREATE TABLE ZICCLOUDSYNCINGOBJECT (Z_PK INTEGER PRIMARY KEY, ZIDENTIFIER TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO ZICCLOUDSYNCINGOBJECT (Z_PK, ZIDENTIFIER) VALUES (123, 'A1B2-C3D4')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
        path
    }

    #[test]
    fn primary_key_parsing() {
        assert_eq!(primary_key("x-coredata://ABC-123/ICNote/p123"), Some(123));
        assert_eq!(primary_key("p7"), Some(7));
        assert_eq!(primary_key("x-coredata://ABC/ICNote/"), None);
        assert_eq!(primary_key("not-a-url"), None);
    }

    #[tokio::test]
    async fn resolves_known_note() {
        let tmp = TempDir::new().unwrap();
        let resolver = NoteStoreResolver::new(notes_db(&tmp).await);

        let locator = resolver
            .resolve("x-coredata://STORE/ICNote/p123")
            .await
            .unwrap();
        assert_eq!(locator.identifier, "A1B2-C3D4");
        assert_eq!(locator.url, "notes://showNote?identifier=A1B2-C3D4");
    }

    #[tokio::test]
    async fn unknown_note_and_bad_id_are_unavailable() {
        let tmp = TempDir::new().unwrap();
        let resolver = NoteStoreResolver::new(notes_db(&tmp).await);

        assert!(resolver.resolve("x-coredata://STORE/ICNote/p999").await.is_none());
        assert!(resolver.resolve("garbage").await.is_none());
    }

    #[tokio::test]
    async fn missing_database_degrades_gracefully() {
        let resolver = NoteStoreResolver::new(PathBuf::from("/nonexistent/NoteStore.sqlite"));
        assert!(resolver.resolve("x-coredata://S/ICNote/p1").await.is_none());
        assert!(resolver.resolve("x-coredata://S/ICNote/p2").await.is_none());
    }

    #[tokio::test]
    async fn noop_resolver_never_resolves() {
        assert!(NoopResolver.resolve("x-coredata://S/ICNote/p1").await.is_none());
    }
}
