//! Partitioned market-data store.
//!
//! One SQLite file per symbol+calendar-month (bars) or per
//! symbol+month+expiration (option chains). A partition's content never
//! spans a month boundary; partitions are the unit of creation, eviction,
//! and file-system placement.
//!
//! Layered leaf-first:
//! - [`path`] — pure partition-path resolution and symbol validation
//! - [`schema`] — DDL, schema creation, and integrity validation
//! - [`pool`] — shared per-partition connections with bounded LRU eviction
//! - [`query`] — cross-partition range/chain queries and idempotent writes

pub mod path;
pub mod pool;
pub mod query;
pub mod schema;

use std::path::PathBuf;
use thiserror::Error;

pub use path::{AssetClass, PartitionKey, PartitionKind};
pub use pool::{PartitionHandle, PartitionPool};
pub use query::MarketStore;

/// Errors surfaced by the storage layer.
///
/// `NoData` is deliberately absent: a missing partition or missing snapshot
/// is represented as an empty result / `None`, never as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid symbol '{0}': only alphanumerics, '.', '-', '=' allowed")]
    InvalidSymbol(String),
    #[error("partition {path} failed schema validation: {detail}")]
    StorageCorruption { path: PathBuf, detail: String },
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("database failure: {0}")]
    Database(#[from] rusqlite::Error),
}
