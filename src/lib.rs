//! # Notes Harness
//!
//! Incremental synchronization of a personal note corpus into a hosted
//! semantic index.
//!
//! Every pass pulls a full snapshot from a note source, diffs it against a
//! local fingerprint store, and pushes only the delta (additions, updates,
//! deletions) to the remote index. The store is written only after the remote
//! side confirms each change, so an interrupted or partially failed pass is
//! simply resumed by the next one.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │ NoteSource  │──▶│ Planner  │──▶│ Executor │──▶│ RemoteIndex  │
//! │ Notes/JSON  │   │ (diff)   │   │ (batched)│   │ vector store │
//! └─────────────┘   └────┬─────┘   └────┬─────┘   └──────────────┘
//!                        │              │
//!                        ▼              ▼
//!                   ┌──────────────────────┐
//!                   │  FingerprintStore    │
//!                   │  (SQLite)            │
//!                   └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nh init --create-vector-store   # create database and remote index
//! nh sync --dry-run               # show what would change
//! nh sync                         # push the delta
//! nh search "tax documents"       # query, with links back into Notes
//! nh status                       # tracked notes and recent failures
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Content normalization and hashing |
//! | [`traits`] | The [`NoteSource`](traits::NoteSource) extension point |
//! | [`connector_notes`] | Apple Notes source (`osascript`) |
//! | [`connector_export`] | JSON export source |
//! | [`store`] | Fingerprint store trait and backends |
//! | [`planner`] | Snapshot vs. store reconciliation |
//! | [`executor`] | Batched, retrying remote application |
//! | [`remote`] | Remote index trait and OpenAI vector store backend |
//! | [`ingest`] | Sync pass orchestration |
//! | [`resolve`] | Identifier → external locator |
//! | [`search`] | Remote search joined with local records |
//! | [`stats`] | Store summary for `nh status` |
//! | [`progress`] | Progress reporting on stderr |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod connector_export;
pub mod connector_notes;
pub mod db;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod planner;
pub mod progress;
pub mod remote;
pub mod resolve;
pub mod search;
pub mod stats;
pub mod store;
pub mod traits;
