//! Partition schema: DDL, creation, and integrity validation.
//!
//! A bars partition carries the `bars` table; a chain partition carries
//! `chain_snapshots` + `contracts`. Validation checks table presence and
//! required columns via `PRAGMA table_info`; a partition that exists but
//! fails validation is surfaced as `StorageCorruption`, never recreated.

use rusqlite::Connection;
use std::path::Path;

use super::path::PartitionKind;
use super::StoreError;

const BARS_DDL: &str = "
CREATE TABLE IF NOT EXISTS bars (
    symbol      TEXT    NOT NULL,
    ts          INTEGER NOT NULL,
    open        REAL    NOT NULL,
    high        REAL    NOT NULL,
    low         REAL    NOT NULL,
    close       REAL    NOT NULL,
    volume      INTEGER NOT NULL,
    vwap        REAL,
    PRIMARY KEY (symbol, ts)
);
CREATE INDEX IF NOT EXISTS idx_bars_ts ON bars (ts);
";

const CHAINS_DDL: &str = "
CREATE TABLE IF NOT EXISTS chain_snapshots (
    symbol      TEXT    NOT NULL,
    expiration  TEXT    NOT NULL,
    snapshot_ts INTEGER NOT NULL,
    underlying  REAL    NOT NULL,
    PRIMARY KEY (symbol, expiration, snapshot_ts)
);
CREATE TABLE IF NOT EXISTS contracts (
    symbol        TEXT    NOT NULL,
    expiration    TEXT    NOT NULL,
    snapshot_ts   INTEGER NOT NULL,
    strike        REAL    NOT NULL,
    right_code    TEXT    NOT NULL,
    bid           REAL    NOT NULL,
    ask           REAL    NOT NULL,
    last          REAL    NOT NULL,
    volume        INTEGER NOT NULL,
    open_interest INTEGER NOT NULL,
    delta         REAL    NOT NULL,
    gamma         REAL    NOT NULL,
    theta         REAL    NOT NULL,
    vega          REAL    NOT NULL,
    implied_vol   REAL    NOT NULL,
    underlying    REAL    NOT NULL,
    PRIMARY KEY (symbol, expiration, snapshot_ts, strike, right_code)
);
CREATE INDEX IF NOT EXISTS idx_contracts_snapshot
    ON contracts (symbol, expiration, snapshot_ts);
";

/// Tables and the columns each must carry, per partition kind.
fn required_tables(kind: PartitionKind) -> &'static [(&'static str, &'static [&'static str])] {
    match kind {
        PartitionKind::Bars => &[(
            "bars",
            &["symbol", "ts", "open", "high", "low", "close", "volume", "vwap"],
        )],
        PartitionKind::Chains => &[
            (
                "chain_snapshots",
                &["symbol", "expiration", "snapshot_ts", "underlying"],
            ),
            (
                "contracts",
                &[
                    "symbol",
                    "expiration",
                    "snapshot_ts",
                    "strike",
                    "right_code",
                    "bid",
                    "ask",
                    "last",
                    "volume",
                    "open_interest",
                    "delta",
                    "gamma",
                    "theta",
                    "vega",
                    "implied_vol",
                    "underlying",
                ],
            ),
        ],
    }
}

/// Create the tables and indexes for a fresh partition.
pub fn ensure_schema(conn: &Connection, kind: PartitionKind) -> Result<(), StoreError> {
    let ddl = match kind {
        PartitionKind::Bars => BARS_DDL,
        PartitionKind::Chains => CHAINS_DDL,
    };
    conn.execute_batch(ddl)?;
    Ok(())
}

/// Validate an existing partition's schema.
///
/// Returns `StorageCorruption` when a required table or column is missing.
pub fn validate_schema(
    conn: &Connection,
    kind: PartitionKind,
    path: &Path,
) -> Result<(), StoreError> {
    for (table, columns) in required_tables(kind) {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)?;
        if !exists {
            return Err(StoreError::StorageCorruption {
                path: path.to_path_buf(),
                detail: format!("missing table '{table}'"),
            });
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let present: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;
        for col in *columns {
            if !present.iter().any(|p| p == col) {
                return Err(StoreError::StorageCorruption {
                    path: path.to_path_buf(),
                    detail: format!("table '{table}' missing column '{col}'"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bars_schema_validates() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, PartitionKind::Bars).unwrap();
        validate_schema(&conn, PartitionKind::Bars, Path::new("mem")).unwrap();
    }

    #[test]
    fn fresh_chains_schema_validates() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, PartitionKind::Chains).unwrap();
        validate_schema(&conn, PartitionKind::Chains, Path::new("mem")).unwrap();
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, PartitionKind::Bars).unwrap();
        ensure_schema(&conn, PartitionKind::Bars).unwrap();
        validate_schema(&conn, PartitionKind::Bars, Path::new("mem")).unwrap();
    }

    #[test]
    fn missing_table_is_corruption() {
        let conn = Connection::open_in_memory().unwrap();
        let err = validate_schema(&conn, PartitionKind::Bars, Path::new("mem")).unwrap_err();
        assert!(matches!(err, StoreError::StorageCorruption { .. }));
    }

    #[test]
    fn missing_column_is_corruption() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE bars (symbol TEXT, ts INTEGER)")
            .unwrap();
        let err = validate_schema(&conn, PartitionKind::Bars, Path::new("mem")).unwrap_err();
        match err {
            StoreError::StorageCorruption { detail, .. } => {
                assert!(detail.contains("missing column"), "{detail}");
            }
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn wrong_kind_is_corruption() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, PartitionKind::Bars).unwrap();
        assert!(validate_schema(&conn, PartitionKind::Chains, Path::new("mem")).is_err());
    }
}
