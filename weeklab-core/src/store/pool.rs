//! Partition connection manager.
//!
//! Hands out shared, reference-counted handles to open partition
//! connections. Concurrent acquisitions of the *same* partition share one
//! underlying connection; distinct partitions never block each other (each
//! connection carries its own mutex, and the pool map is only locked for
//! bookkeeping). The number of simultaneously open connections is bounded:
//! exceeding the bound closes the least-recently-used idle connection first.
//!
//! An existing partition file that fails schema validation surfaces as
//! `StorageCorruption` — the pool never silently recreates it.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::path::PartitionKey;
use super::schema::{ensure_schema, validate_schema};
use super::StoreError;

/// One open partition connection. Callers serialize access through `with`.
pub struct PartitionConn {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl PartitionConn {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a closure against the underlying connection.
    ///
    /// Acquire → use → release on every exit path: the lock is dropped when
    /// the closure returns, error or not.
    pub fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

impl std::fmt::Debug for PartitionConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionConn")
            .field("path", &self.path)
            .finish()
    }
}

/// Scoped, reference-counted handle to an open partition.
pub type PartitionHandle = Arc<PartitionConn>;

struct PoolState {
    open: HashMap<PathBuf, PartitionHandle>,
    /// Monotone clock for LRU ordering.
    clock: u64,
    last_used: HashMap<PathBuf, u64>,
}

/// Bounded pool of open partition connections, keyed by resolved path.
pub struct PartitionPool {
    root: PathBuf,
    max_open: usize,
    state: Mutex<PoolState>,
}

impl PartitionPool {
    pub fn new(root: impl Into<PathBuf>, max_open: usize) -> Self {
        Self {
            root: root.into(),
            max_open: max_open.max(1),
            state: Mutex::new(PoolState {
                open: HashMap::new(),
                clock: 0,
                last_used: HashMap::new(),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of currently open partition connections.
    pub fn open_count(&self) -> usize {
        self.state.lock().open.len()
    }

    /// Acquire a handle to the partition, creating the file (and parent
    /// directories) if it does not exist yet.
    pub fn connection(&self, key: &PartitionKey) -> Result<PartitionHandle, StoreError> {
        self.acquire(key, true)
            .map(|h| h.expect("create=true always yields a handle"))
    }

    /// Acquire a handle only when the partition file already exists.
    ///
    /// Read paths use this so that querying a month with no data never
    /// materializes an empty partition on disk.
    pub fn connection_if_exists(
        &self,
        key: &PartitionKey,
    ) -> Result<Option<PartitionHandle>, StoreError> {
        self.acquire(key, false)
    }

    fn acquire(
        &self,
        key: &PartitionKey,
        create: bool,
    ) -> Result<Option<PartitionHandle>, StoreError> {
        let path = key.resolve(&self.root)?;

        // Fast path: already open.
        {
            let mut state = self.state.lock();
            if let Some(handle) = state.open.get(&path).cloned() {
                state.clock += 1;
                let clock = state.clock;
                state.last_used.insert(path.clone(), clock);
                return Ok(Some(handle));
            }
        }

        let existed = path.exists();
        if !existed && !create {
            return Ok(None);
        }

        if !existed {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(std::time::Duration::from_millis(5_000))?;

        if existed {
            // Pre-existing file must already carry a valid schema.
            validate_schema(&conn, key.kind(), &path)?;
        } else {
            ensure_schema(&conn, key.kind())?;
        }

        let handle: PartitionHandle = Arc::new(PartitionConn {
            path: path.clone(),
            conn: Mutex::new(conn),
        });

        let mut state = self.state.lock();
        // Another thread may have opened the same partition while we were
        // outside the lock; prefer the one already registered.
        if let Some(existing) = state.open.get(&path).cloned() {
            state.clock += 1;
            let clock = state.clock;
            state.last_used.insert(path, clock);
            return Ok(Some(existing));
        }

        if state.open.len() >= self.max_open {
            Self::evict_lru_idle(&mut state);
        }

        state.clock += 1;
        let clock = state.clock;
        state.last_used.insert(path.clone(), clock);
        state.open.insert(path, handle.clone());
        Ok(Some(handle))
    }

    /// Close the least-recently-used connection that no caller currently
    /// holds. In-use connections (outstanding handles) are never evicted,
    /// so the bound may be exceeded transiently under heavy fan-out.
    fn evict_lru_idle(state: &mut PoolState) {
        let victim = state
            .open
            .iter()
            .filter(|(_, handle)| Arc::strong_count(handle) == 1)
            .min_by_key(|(path, _)| state.last_used.get(*path).copied().unwrap_or(0))
            .map(|(path, _)| path.clone());

        if let Some(path) = victim {
            debug!(path = %path.display(), "evicting idle partition connection");
            state.open.remove(&path);
            state.last_used.remove(&path);
        }
    }
}

impl std::fmt::Debug for PartitionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionPool")
            .field("root", &self.root)
            .field("max_open", &self.max_open)
            .field("open", &self.open_count())
            .finish()
    }
}
