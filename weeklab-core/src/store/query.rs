//! Cross-partition query engine.
//!
//! Routes reads and writes to the partition each record belongs to, then
//! stitches results back together. Range queries enumerate every month the
//! range crosses; a covered month with no partition file contributes
//! nothing — the overall call succeeds with partial data. Results are
//! merged in ascending timestamp order regardless of fetch order.
//!
//! Writes are idempotent under overwrite-by-key: re-storing the same
//! (symbol, ts) bar or (symbol, expiration, snapshot_ts) chain replaces the
//! prior content for that key instead of duplicating it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::calendar::months_between;
use crate::domain::{Greeks, MarketBar, OptionContract, OptionRight, OptionsChain};

use super::path::{AssetClass, PartitionKey};
use super::pool::PartitionPool;
use super::StoreError;

/// Partitioned market-data store: bars and option chains.
pub struct MarketStore {
    pool: PartitionPool,
}

impl MarketStore {
    /// Open a store rooted at `root`, keeping at most `max_open` partition
    /// connections alive at once.
    pub fn open(root: impl Into<PathBuf>, max_open: usize) -> Self {
        Self {
            pool: PartitionPool::new(root, max_open),
        }
    }

    pub fn pool(&self) -> &PartitionPool {
        &self.pool
    }

    // ── Bars ────────────────────────────────────────────────────────

    /// Store bars, routing each to its symbol+month partition.
    ///
    /// Returns the number of rows written. Same-key rows replace prior
    /// content (idempotent).
    pub fn put_bars(
        &self,
        asset_class: AssetClass,
        bars: &[MarketBar],
    ) -> Result<usize, StoreError> {
        // Group by partition so each file is opened once per call.
        let mut by_partition: HashMap<PartitionKey, Vec<&MarketBar>> = HashMap::new();
        for bar in bars {
            let key = PartitionKey::bars(
                &bar.symbol,
                asset_class,
                bar.ts.date().year(),
                bar.ts.date().month(),
            );
            by_partition.entry(key).or_default().push(bar);
        }

        let mut written = 0;
        for (key, group) in by_partition {
            let handle = self.pool.connection(&key)?;
            handle.with(|conn| {
                let tx_conn = conn;
                tx_conn.execute_batch("BEGIN")?;
                let result = (|| -> Result<usize, StoreError> {
                    let mut stmt = tx_conn.prepare_cached(
                        "INSERT OR REPLACE INTO bars
                         (symbol, ts, open, high, low, close, volume, vwap)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )?;
                    let mut n = 0;
                    for bar in &group {
                        stmt.execute(params![
                            bar.symbol,
                            to_epoch(bar.ts),
                            bar.open,
                            bar.high,
                            bar.low,
                            bar.close,
                            bar.volume as i64,
                            bar.vwap,
                        ])?;
                        n += 1;
                    }
                    Ok(n)
                })();
                match result {
                    Ok(n) => {
                        tx_conn.execute_batch("COMMIT")?;
                        written += n;
                        Ok(())
                    }
                    Err(e) => {
                        let _ = tx_conn.execute_batch("ROLLBACK");
                        Err(e)
                    }
                }
            })?;
        }
        Ok(written)
    }

    /// All bars for `symbol` with `start <= ts <= end`, ascending by ts.
    ///
    /// Months without a partition file contribute nothing; the call still
    /// succeeds with whatever data exists.
    pub fn get_bars(
        &self,
        symbol: &str,
        asset_class: AssetClass,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<MarketBar>, StoreError> {
        let mut out = Vec::new();
        // Months enumerated ascending, each partition queried in ts order,
        // so concatenation preserves global ascending order.
        for (year, month) in months_between(start.date(), end.date()) {
            let key = PartitionKey::bars(symbol, asset_class, year, month);
            let Some(handle) = self.pool.connection_if_exists(&key)? else {
                continue;
            };
            handle.with(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT symbol, ts, open, high, low, close, volume, vwap
                     FROM bars
                     WHERE symbol = ?1 AND ts >= ?2 AND ts <= ?3
                     ORDER BY ts ASC",
                )?;
                let rows = stmt.query_map(
                    params![symbol, to_epoch(start), to_epoch(end)],
                    row_to_bar,
                )?;
                for row in rows {
                    out.push(row?);
                }
                Ok(())
            })?;
        }
        Ok(out)
    }

    // ── Option chains ───────────────────────────────────────────────

    /// Store a chain snapshot, replacing any prior snapshot with the same
    /// (symbol, expiration, snapshot_ts) key.
    pub fn put_chain(&self, chain: &OptionsChain) -> Result<(), StoreError> {
        let key = PartitionKey::chain(&chain.symbol, chain.expiration);
        let handle = self.pool.connection(&key)?;
        let exp = chain.expiration.to_string();
        let ts = to_epoch(chain.snapshot_ts);

        handle.with(|conn| {
            conn.execute_batch("BEGIN")?;
            let result = (|| -> Result<(), StoreError> {
                // Replace-by-key: clear the snapshot before re-inserting.
                conn.execute(
                    "DELETE FROM contracts
                     WHERE symbol = ?1 AND expiration = ?2 AND snapshot_ts = ?3",
                    params![chain.symbol, exp, ts],
                )?;
                conn.execute(
                    "INSERT OR REPLACE INTO chain_snapshots
                     (symbol, expiration, snapshot_ts, underlying)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![chain.symbol, exp, ts, chain.underlying],
                )?;
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO contracts
                     (symbol, expiration, snapshot_ts, strike, right_code,
                      bid, ask, last, volume, open_interest,
                      delta, gamma, theta, vega, implied_vol, underlying)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16)",
                )?;
                for c in &chain.contracts {
                    stmt.execute(params![
                        chain.symbol,
                        exp,
                        ts,
                        c.strike,
                        c.right.code(),
                        c.bid,
                        c.ask,
                        c.last,
                        c.volume as i64,
                        c.open_interest as i64,
                        c.greeks.delta,
                        c.greeks.gamma,
                        c.greeks.theta,
                        c.greeks.vega,
                        c.implied_vol,
                        c.underlying,
                    ])?;
                }
                Ok(())
            })();
            match result {
                Ok(()) => {
                    conn.execute_batch("COMMIT")?;
                    Ok(())
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(e)
                }
            }
        })
    }

    /// Exact-match chain lookup. `None` when the partition or snapshot does
    /// not exist; no nearest-neighbor fallback happens here.
    pub fn get_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        as_of: NaiveDateTime,
    ) -> Result<Option<OptionsChain>, StoreError> {
        let key = PartitionKey::chain(symbol, expiration);
        let Some(handle) = self.pool.connection_if_exists(&key)? else {
            return Ok(None);
        };
        handle.with(|conn| self.read_chain(conn, symbol, expiration, to_epoch(as_of)))
    }

    /// Most recent snapshot at or before `as_of`, within a bounded window.
    ///
    /// This is the explicit opt-in lookup behind
    /// `SnapshotPolicy::NearestWithin`; `get_chain` never falls back on its
    /// own, since silently substituting nearby data changes backtest
    /// semantics.
    pub fn latest_chain_at_or_before(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        as_of: NaiveDateTime,
        within: Duration,
    ) -> Result<Option<OptionsChain>, StoreError> {
        let key = PartitionKey::chain(symbol, expiration);
        let Some(handle) = self.pool.connection_if_exists(&key)? else {
            return Ok(None);
        };
        let floor = to_epoch(as_of - within);
        let exp = expiration.to_string();
        handle.with(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT MAX(snapshot_ts) FROM chain_snapshots
                     WHERE symbol = ?1 AND expiration = ?2
                       AND snapshot_ts <= ?3 AND snapshot_ts >= ?4",
                    params![symbol, exp, to_epoch(as_of), floor],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            match found {
                Some(ts) => self.read_chain(conn, symbol, expiration, ts),
                None => Ok(None),
            }
        })
    }

    fn read_chain(
        &self,
        conn: &Connection,
        symbol: &str,
        expiration: NaiveDate,
        snapshot_ts: i64,
    ) -> Result<Option<OptionsChain>, StoreError> {
        let exp = expiration.to_string();
        let underlying: Option<f64> = conn
            .query_row(
                "SELECT underlying FROM chain_snapshots
                 WHERE symbol = ?1 AND expiration = ?2 AND snapshot_ts = ?3",
                params![symbol, exp, snapshot_ts],
                |row| row.get(0),
            )
            .optional()?;
        let Some(underlying) = underlying else {
            return Ok(None);
        };

        let mut stmt = conn.prepare_cached(
            "SELECT strike, right_code, bid, ask, last, volume, open_interest,
                    delta, gamma, theta, vega, implied_vol, underlying
             FROM contracts
             WHERE symbol = ?1 AND expiration = ?2 AND snapshot_ts = ?3
             ORDER BY strike ASC, right_code ASC",
        )?;
        let rows = stmt.query_map(params![symbol, exp, snapshot_ts], |row| {
            let right_code: String = row.get(1)?;
            Ok(OptionContract {
                symbol: symbol.to_string(),
                strike: row.get(0)?,
                right: OptionRight::from_code(&right_code).unwrap_or(OptionRight::Call),
                expiration,
                bid: row.get(2)?,
                ask: row.get(3)?,
                last: row.get(4)?,
                volume: row.get::<_, i64>(5)? as u64,
                open_interest: row.get::<_, i64>(6)? as u64,
                greeks: Greeks {
                    delta: row.get(7)?,
                    gamma: row.get(8)?,
                    theta: row.get(9)?,
                    vega: row.get(10)?,
                },
                implied_vol: row.get(11)?,
                underlying: row.get(12)?,
            })
        })?;

        let mut contracts = Vec::new();
        for row in rows {
            contracts.push(row?);
        }
        Ok(Some(OptionsChain::new(
            symbol,
            expiration,
            from_epoch(snapshot_ts),
            underlying,
            contracts,
        )))
    }
}

impl std::fmt::Debug for MarketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStore").field("pool", &self.pool).finish()
    }
}

fn to_epoch(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp()
}

fn from_epoch(secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

fn row_to_bar(row: &rusqlite::Row<'_>) -> rusqlite::Result<MarketBar> {
    Ok(MarketBar {
        symbol: row.get(0)?,
        ts: from_epoch(row.get(1)?),
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get::<_, i64>(6)? as u64,
        vwap: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Greeks;
    use tempfile::TempDir;

    fn bar(day: u32, month: u32, close: f64) -> MarketBar {
        MarketBar {
            symbol: "SPY".into(),
            ts: NaiveDate::from_ymd_opt(2024, month, day)
                .unwrap()
                .and_hms_opt(16, 0, 0)
                .unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000_000,
            vwap: None,
        }
    }

    fn contract(strike: f64, right: OptionRight) -> OptionContract {
        OptionContract {
            symbol: "SPY".into(),
            strike,
            right,
            expiration: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            bid: 1.0,
            ask: 1.2,
            last: 1.1,
            volume: 500,
            open_interest: 2_000,
            greeks: Greeks {
                delta: if right == OptionRight::Call { 0.3 } else { -0.3 },
                gamma: 0.02,
                theta: -0.4,
                vega: 0.1,
            },
            implied_vol: 0.2,
            underlying: 510.0,
        }
    }

    fn sample_chain(snapshot_hour: u32) -> OptionsChain {
        OptionsChain::new(
            "SPY",
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 11)
                .unwrap()
                .and_hms_opt(snapshot_hour, 0, 0)
                .unwrap(),
            510.0,
            vec![
                contract(505.0, OptionRight::Put),
                contract(515.0, OptionRight::Call),
            ],
        )
    }

    fn store(dir: &TempDir) -> MarketStore {
        MarketStore::open(dir.path(), 8)
    }

    #[test]
    fn range_query_returns_all_bars_ordered() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        // 20 bars in January, written out of order
        let mut bars: Vec<MarketBar> = (1..=20).map(|d| bar(d, 1, 470.0 + d as f64)).collect();
        bars.reverse();
        store.put_bars(AssetClass::Etf, &bars).unwrap();

        let got = store
            .get_bars(
                "SPY",
                AssetClass::Etf,
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(23, 59, 59).unwrap(),
            )
            .unwrap();

        assert_eq!(got.len(), 20);
        for pair in got.windows(2) {
            assert!(pair[0].ts < pair[1].ts, "ascending order");
        }
    }

    #[test]
    fn writes_are_idempotent_by_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put_bars(AssetClass::Etf, &[bar(2, 1, 470.0)]).unwrap();
        store.put_bars(AssetClass::Etf, &[bar(2, 1, 999.0)]).unwrap();

        let got = store
            .get_bars(
                "SPY",
                AssetClass::Etf,
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(23, 59, 59).unwrap(),
            )
            .unwrap();
        assert_eq!(got.len(), 1, "exactly one row for the key");
        assert_eq!(got[0].close, 999.0, "latest value wins");
    }

    #[test]
    fn range_spanning_months_stitches_partitions() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .put_bars(
                AssetClass::Etf,
                &[bar(30, 1, 470.0), bar(15, 2, 480.0), bar(10, 3, 490.0)],
            )
            .unwrap();

        let got = store
            .get_bars(
                "SPY",
                AssetClass::Etf,
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(23, 59, 59).unwrap(),
            )
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].close, 470.0);
        assert_eq!(got[2].close, 490.0);
    }

    #[test]
    fn missing_month_contributes_nothing_without_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        // January and March exist; February has no partition file.
        store
            .put_bars(AssetClass::Etf, &[bar(30, 1, 470.0), bar(10, 3, 490.0)])
            .unwrap();

        let got = store
            .get_bars(
                "SPY",
                AssetClass::Etf,
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(23, 59, 59).unwrap(),
            )
            .unwrap();
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn query_with_no_partitions_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let got = store
            .get_bars(
                "SPY",
                AssetClass::Etf,
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            )
            .unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn chain_roundtrip_exact_match() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let chain = sample_chain(10);

        store.put_chain(&chain).unwrap();
        let got = store
            .get_chain("SPY", chain.expiration, chain.snapshot_ts)
            .unwrap()
            .unwrap();
        assert_eq!(got, chain);
    }

    #[test]
    fn chain_lookup_requires_exact_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let chain = sample_chain(10);
        store.put_chain(&chain).unwrap();

        let off_by_an_hour = chain.snapshot_ts + Duration::hours(1);
        assert!(store
            .get_chain("SPY", chain.expiration, off_by_an_hour)
            .unwrap()
            .is_none());
    }

    #[test]
    fn chain_rewrite_replaces_not_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut chain = sample_chain(10);
        store.put_chain(&chain).unwrap();

        // Same key, fewer contracts
        chain.contracts.truncate(1);
        store.put_chain(&chain).unwrap();

        let got = store
            .get_chain("SPY", chain.expiration, chain.snapshot_ts)
            .unwrap()
            .unwrap();
        assert_eq!(got.contracts.len(), 1);
    }

    #[test]
    fn at_or_before_lookup_is_opt_in_and_bounded() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let chain = sample_chain(10);
        store.put_chain(&chain).unwrap();

        let later = chain.snapshot_ts + Duration::hours(2);

        // Exact lookup misses
        assert!(store.get_chain("SPY", chain.expiration, later).unwrap().is_none());

        // Bounded at-or-before lookup finds the earlier snapshot
        let got = store
            .latest_chain_at_or_before("SPY", chain.expiration, later, Duration::hours(3))
            .unwrap();
        assert_eq!(got.unwrap().snapshot_ts, chain.snapshot_ts);

        // Window too small: nothing
        let got = store
            .latest_chain_at_or_before("SPY", chain.expiration, later, Duration::minutes(30))
            .unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn missing_chain_partition_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let got = store
            .get_chain(
                "SPY",
                NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 17).unwrap().and_hms_opt(10, 0, 0).unwrap(),
            )
            .unwrap();
        assert!(got.is_none());
    }
}
