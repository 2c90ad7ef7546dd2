//!
//! commentboard storage module
//! ---------------------------
//! The comment store is an ordered table of immutable comment records with exactly
//! two operations: insert one record, and list every record ordered by `created_at`
//! ascending. The endpoint only ever talks to it through the `CommentStore` trait,
//! usually as a `SharedStore` (`Arc<dyn CommentStore>`).
//!
//! Backends:
//! - `MemoryStore`: process-local, used for tests and single-process demos.
//! - `ParquetStore`: a single Parquet table file under a data directory.
//! - `RestTableStore`: a hosted PostgREST-style table reached over HTTPS.
//!
//! Local backends assign ids (UUID v4) and timestamps themselves; timestamps never
//! go backwards, so listing by `created_at` preserves insertion order.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};

use crate::model::{Comment, NewComment};

pub mod memory;
pub mod parquet;
pub mod remote;

pub use memory::MemoryStore;
pub use parquet::ParquetStore;
pub use remote::{RestTableConfig, RestTableStore};

/// Failure reported by a store. The message is surfaced to HTTP callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self { Self { message: message.into() } }
    pub fn message(&self) -> &str { &self.message }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self { StoreError::new(e.to_string()) }
}

impl From<polars::prelude::PolarsError> for StoreError {
    fn from(e: polars::prelude::PolarsError) -> Self { StoreError::new(e.to_string()) }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self { StoreError::new(e.to_string()) }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CommentStore: Send + Sync + 'static {
    /// Insert one record and return it exactly as stored.
    async fn insert(&self, new: NewComment) -> StoreResult<Comment>;
    /// Every record, `created_at` ascending.
    async fn list_ordered(&self) -> StoreResult<Vec<Comment>>;
    /// Short human-readable description for startup logs.
    fn describe(&self) -> String;
}

pub type SharedStore = Arc<dyn CommentStore>;

/// Which backend the server runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Parquet { data_dir: PathBuf },
    Rest(RestTableConfig),
}

impl StoreConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Parquet { .. } => "parquet",
            StoreConfig::Rest(_) => "rest",
        }
    }
}

pub fn open_store(cfg: &StoreConfig) -> anyhow::Result<SharedStore> {
    let store: SharedStore = match cfg {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Parquet { data_dir } => Arc::new(
            ParquetStore::open(data_dir)
                .with_context(|| format!("While opening parquet comment store under {}", data_dir.display()))?,
        ),
        StoreConfig::Rest(rc) => Arc::new(RestTableStore::new(rc.clone()).context("While configuring hosted table store")?),
    };
    Ok(store)
}

/// Insert timestamp for a local backend: now, unless the previous insert carries a
/// later stamp (clock stepped back), in which case the previous stamp is reused.
/// Stamps carry microsecond precision so they survive a Parquet round trip intact.
pub(crate) fn next_created_at(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match last {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

/// Stable sort so equal timestamps keep insertion order.
pub(crate) fn sort_by_creation(rows: &mut [Comment]) {
    rows.sort_by_key(|c| c.created_at);
}
