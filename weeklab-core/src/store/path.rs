//! Partition path resolution.
//!
//! Pure and deterministic: identical inputs always produce the identical
//! path. Two layouts:
//!
//! - bars:   `{root}/bars/{asset_class}/{SYMBOL}/{year}/{SYMBOL}_{YYYY}-{MM}.db`
//! - chains: `{root}/options/{SYMBOL}/{year}/{MM}/{SYMBOL}_{YYYY-MM-DD}.db`
//!
//! Option partitions nest by symbol and key by expiration date; the month
//! component is the expiration's month, so no file ever represents more
//! than one month of data.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::StoreError;

/// Asset class of a time-series partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Etf,
    Index,
    Future,
}

impl AssetClass {
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Etf => "etf",
            AssetClass::Index => "index",
            AssetClass::Future => "future",
        }
    }
}

/// Which table set a partition file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Bars,
    Chains,
}

/// Identity of one partition file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    Bars {
        symbol: String,
        asset_class: AssetClass,
        year: i32,
        month: u32,
    },
    Chain {
        symbol: String,
        expiration: NaiveDate,
    },
}

impl PartitionKey {
    pub fn bars(symbol: &str, asset_class: AssetClass, year: i32, month: u32) -> Self {
        PartitionKey::Bars {
            symbol: symbol.to_string(),
            asset_class,
            year,
            month,
        }
    }

    pub fn chain(symbol: &str, expiration: NaiveDate) -> Self {
        PartitionKey::Chain {
            symbol: symbol.to_string(),
            expiration,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            PartitionKey::Bars { symbol, .. } => symbol,
            PartitionKey::Chain { symbol, .. } => symbol,
        }
    }

    pub fn kind(&self) -> PartitionKind {
        match self {
            PartitionKey::Bars { .. } => PartitionKind::Bars,
            PartitionKey::Chain { .. } => PartitionKind::Chains,
        }
    }

    /// Resolve this key to its partition file path under `root`.
    ///
    /// Rejects symbols outside the allow-list before any path is formed.
    pub fn resolve(&self, root: &Path) -> Result<PathBuf, StoreError> {
        validate_symbol(self.symbol())?;
        Ok(match self {
            PartitionKey::Bars {
                symbol,
                asset_class,
                year,
                month,
            } => root
                .join("bars")
                .join(asset_class.dir_name())
                .join(symbol)
                .join(year.to_string())
                .join(format!("{symbol}_{year}-{month:02}.db")),
            PartitionKey::Chain { symbol, expiration } => root
                .join("options")
                .join(symbol)
                .join(expiration.year().to_string())
                .join(format!("{:02}", expiration.month()))
                .join(format!("{symbol}_{expiration}.db")),
        })
    }
}

/// Symbols may contain alphanumerics plus `.`, `-`, `=` (covers classes
/// like BRK.B, BF-B, and futures roots like ES=F). Anything else is
/// rejected before touching the file system.
pub fn validate_symbol(symbol: &str) -> Result<(), StoreError> {
    let ok = !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '=');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidSymbol(symbol.to_string()))
    }
}
