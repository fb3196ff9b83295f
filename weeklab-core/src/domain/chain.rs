//! Option contracts and chains.
//!
//! A chain is a point-in-time view of every quoted contract for one
//! symbol+expiration, uniquely identified by (symbol, expiration, snapshot_ts).
//! Chains are immutable once stored.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Single-character code used in storage and export ("C" / "P").
    pub fn code(&self) -> &'static str {
        match self {
            OptionRight::Call => "C",
            OptionRight::Put => "P",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "C" => Some(OptionRight::Call),
            "P" => Some(OptionRight::Put),
            _ => None,
        }
    }
}

/// First-order greeks for a single contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
}

/// A single quoted option contract at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub strike: f64,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: u64,
    pub open_interest: u64,
    pub greeks: Greeks,
    pub implied_vol: f64,
    pub underlying: f64,
}

impl OptionContract {
    /// Quote midpoint. Falls back to `last` when the quote is one-sided.
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last
        }
    }

    /// Bid/ask spread; NaN-free even for one-sided quotes.
    pub fn spread(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            self.ask - self.bid
        } else {
            0.0
        }
    }

    /// True when both sides are quoted and not crossed.
    pub fn has_two_sided_quote(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.ask >= self.bid
    }
}

/// Full chain for one symbol+expiration at one snapshot instant.
///
/// Contracts are kept sorted by (strike, right) so lookups and exports are
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsChain {
    pub symbol: String,
    pub expiration: NaiveDate,
    pub snapshot_ts: NaiveDateTime,
    pub underlying: f64,
    pub contracts: Vec<OptionContract>,
}

impl OptionsChain {
    pub fn new(
        symbol: impl Into<String>,
        expiration: NaiveDate,
        snapshot_ts: NaiveDateTime,
        underlying: f64,
        mut contracts: Vec<OptionContract>,
    ) -> Self {
        contracts.sort_by(|a, b| {
            a.strike
                .partial_cmp(&b.strike)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.right.code().cmp(b.right.code()))
        });
        Self {
            symbol: symbol.into(),
            expiration,
            snapshot_ts,
            underlying,
            contracts,
        }
    }

    /// Exact-strike lookup.
    pub fn contract(&self, strike: f64, right: OptionRight) -> Option<&OptionContract> {
        self.contracts
            .iter()
            .find(|c| c.right == right && (c.strike - strike).abs() < 1e-9)
    }

    /// Distinct strikes, ascending.
    pub fn strikes(&self) -> Vec<f64> {
        let mut strikes: Vec<f64> = self.contracts.iter().map(|c| c.strike).collect();
        strikes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        strikes.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        strikes
    }

    /// Contract of the given right whose |delta| is closest to `target`.
    ///
    /// Weekly premium-selling strategies pick strikes by delta, not price.
    pub fn nearest_by_delta(&self, right: OptionRight, target: f64) -> Option<&OptionContract> {
        self.contracts
            .iter()
            .filter(|c| c.right == right)
            .min_by(|a, b| {
                let da = (a.greeks.delta.abs() - target.abs()).abs();
                let db = (b.greeks.delta.abs() - target.abs()).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Contract of the given right whose strike is closest to `price`.
    pub fn nearest_by_strike(&self, right: OptionRight, price: f64) -> Option<&OptionContract> {
        self.contracts
            .iter()
            .filter(|c| c.right == right)
            .min_by(|a, b| {
                let da = (a.strike - price).abs();
                let db = (b.strike - price).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
