//! Per-week backtest result.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::order::{TradeRecord, TradeStatus};

/// The realized outcome of replaying one sampled week.
///
/// Immutable once produced. P&L is the signed sum of every leg cashflow
/// across entry, management, and exit records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyResult {
    /// Monday of the replayed week.
    pub week_start: NaiveDate,
    pub trades: Vec<TradeRecord>,
    pub pnl: f64,
    pub trade_count: usize,
}

impl WeeklyResult {
    pub fn from_trades(week_start: NaiveDate, trades: Vec<TradeRecord>) -> Self {
        let pnl = trades.iter().map(|t| t.cashflow).sum();
        let trade_count = trades.len();
        Self {
            week_start,
            trades,
            pnl,
            trade_count,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    /// Number of trade records that executed in full.
    pub fn executed_count(&self) -> usize {
        self.trades
            .iter()
            .filter(|t| t.status == TradeStatus::Executed)
            .count()
    }
}
