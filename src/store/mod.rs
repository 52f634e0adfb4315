//! Fingerprint storage.
//!
//! The [`FingerprintStore`] trait is the single source of truth for what has
//! been synchronized. Only the executor mutates it, and only after a remote
//! call's result is known.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteFingerprintStore`] | Durable store used by the CLI |
//! | [`InMemoryFingerprintStore`] | Tests and library callers without a database |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::FingerprintRecord;

pub use memory::InMemoryFingerprintStore;
pub use sqlite::SqliteFingerprintStore;

/// Durable key-value mapping from `local_id` to [`FingerprintRecord`].
///
/// Every method is a single, independent operation; writes for one note
/// never touch another note's record.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Read one record.
    async fn get(&self, local_id: &str) -> Result<Option<FingerprintRecord>>;

    /// Insert or overwrite one record.
    async fn put(&self, record: &FingerprintRecord) -> Result<()>;

    /// Delete one record. Deleting a missing record is not an error.
    async fn remove(&self, local_id: &str) -> Result<()>;

    /// Enumerate every record, ordered by `local_id`.
    async fn list(&self) -> Result<Vec<FingerprintRecord>>;

    /// Reverse lookup used when rendering remote search hits.
    async fn find_by_remote_id(&self, remote_file_id: &str) -> Result<Option<FingerprintRecord>>;
}
