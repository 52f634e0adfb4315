//! SQLite-backed [`FingerprintStore`].
//!
//! Each trait method is a single statement, so a crash between two item
//! writes can only lose the in-progress item's bookkeeping.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::FingerprintRecord;

use super::FingerprintStore;

pub struct SqliteFingerprintStore {
    pool: SqlitePool,
}

impl SqliteFingerprintStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SELECT_COLUMNS: &str =
    "SELECT local_id, content_hash, remote_file_id, sync_state, title, last_error, updated_at FROM fingerprints";

fn row_to_record(row: &SqliteRow) -> Result<FingerprintRecord> {
    let state: String = row.get("sync_state");
    let local_id: String = row.get("local_id");
    let sync_state = state
        .parse()
        .with_context(|| format!("corrupt fingerprint row for '{}'", local_id))?;

    Ok(FingerprintRecord {
        local_id,
        content_hash: row.get("content_hash"),
        remote_file_id: row.get("remote_file_id"),
        sync_state,
        title: row.get("title"),
        last_error: row.get("last_error"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn get(&self, local_id: &str) -> Result<Option<FingerprintRecord>> {
        let row = sqlx::query(&format!("{} WHERE local_id = ?", SELECT_COLUMNS))
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn put(&self, record: &FingerprintRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fingerprints (local_id, content_hash, remote_file_id, sync_state, title, last_error, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(local_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                remote_file_id = excluded.remote_file_id,
                sync_state = excluded.sync_state,
                title = excluded.title,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.local_id)
        .bind(&record.content_hash)
        .bind(&record.remote_file_id)
        .bind(record.sync_state.as_str())
        .bind(&record.title)
        .bind(&record.last_error)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write fingerprint for '{}'", record.local_id))?;

        Ok(())
    }

    async fn remove(&self, local_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM fingerprints WHERE local_id = ?")
            .bind(local_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete fingerprint for '{}'", local_id))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<FingerprintRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY local_id ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_remote_id(&self, remote_file_id: &str) -> Result<Option<FingerprintRecord>> {
        let row = sqlx::query(&format!("{} WHERE remote_file_id = ? LIMIT 1", SELECT_COLUMNS))
            .bind(remote_file_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use crate::models::SyncState;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir) -> SqliteFingerprintStore {
        let pool = db::connect_path(&tmp.path().join("nh.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        SqliteFingerprintStore::new(pool)
    }

    fn record(id: &str, state: SyncState, remote: Option<&str>) -> FingerprintRecord {
        FingerprintRecord {
            local_id: id.to_string(),
            content_hash: "abc".to_string(),
            remote_file_id: remote.map(str::to_string),
            sync_state: state,
            title: "Title".to_string(),
            last_error: None,
            updated_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open(&tmp).await;
            store
                .put(&record("n1", SyncState::Synced, Some("file-1")))
                .await
                .unwrap();
            store.pool().close().await;
        }

        let store = open(&tmp).await;
        let got = store.get("n1").await.unwrap().unwrap();
        assert_eq!(got.remote_file_id.as_deref(), Some("file-1"));
        assert_eq!(got.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn put_overwrites_in_place() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;

        store
            .put(&record("n1", SyncState::Synced, Some("file-1")))
            .await
            .unwrap();
        let mut failed = record("n1", SyncState::Failed, Some("file-1"));
        failed.last_error = Some("rate limited".to_string());
        store.put(&failed).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sync_state, SyncState::Failed);
        assert_eq!(all[0].last_error.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn reverse_lookup_and_remove() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        store
            .put(&record("n1", SyncState::Synced, Some("file-1")))
            .await
            .unwrap();
        store.put(&record("n2", SyncState::Failed, None)).await.unwrap();

        let hit = store.find_by_remote_id("file-1").await.unwrap().unwrap();
        assert_eq!(hit.local_id, "n1");

        store.remove("n1").await.unwrap();
        assert!(store.find_by_remote_id("file-1").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_state_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        sqlx::query(
            "INSERT INTO fingerprints (local_id, content_hash, sync_state, updated_at) VALUES ('x', 'h', 'bogus', 0)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        assert!(store.get("x").await.is_err());
        assert!(store.list().await.is_err());
    }
}
