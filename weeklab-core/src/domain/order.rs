//! Orders, legs, fills, and per-week trade records.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::chain::OptionRight;

/// Which side of a leg is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegSide {
    Buy,
    Sell,
}

impl LegSide {
    /// Cashflow sign per contract: buying pays, selling collects.
    pub fn sign(&self) -> f64 {
        match self {
            LegSide::Buy => -1.0,
            LegSide::Sell => 1.0,
        }
    }

    pub fn opposite(&self) -> LegSide {
        match self {
            LegSide::Buy => LegSide::Sell,
            LegSide::Sell => LegSide::Buy,
        }
    }
}

/// One leg of a multi-leg option order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLeg {
    pub symbol: String,
    pub strike: f64,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub side: LegSide,
    pub quantity: u32,
}

/// A proposed multi-leg order from the strategy collaborator.
///
/// The harness executes legs independently; "executed" means every leg
/// filled. The core does not validate the semantic correctness of the ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTicket {
    /// Strategy-assigned label (e.g. "short_strangle").
    pub label: String,
    pub legs: Vec<OrderLeg>,
    /// Optional net price hint for the fill engine; not enforced by the core.
    pub limit_hint: Option<f64>,
}

impl OrderTicket {
    pub fn new(label: impl Into<String>, legs: Vec<OrderLeg>) -> Self {
        Self {
            label: label.into(),
            legs,
            limit_hint: None,
        }
    }
}

/// A filled leg with its execution price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegFill {
    pub leg: OrderLeg,
    pub fill_price: f64,
    pub slippage: f64,
}

impl LegFill {
    /// Signed cashflow for this fill, including the contract multiplier.
    pub fn cashflow(&self) -> f64 {
        self.leg.side.sign() * self.fill_price * self.leg.quantity as f64 * 100.0
    }
}

/// Outcome of attempting a single leg against the fill engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FillOutcome {
    Filled(LegFill),
    Unfilled { reason: String },
}

/// Which decision point of the week produced a trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradePhase {
    Entry,
    Management,
    Exit,
}

/// Whether the order behind a trade record executed in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Every leg filled.
    Executed,
    /// Some legs filled, some did not; filled legs remain open.
    PartialFill,
    /// Nothing filled, or the attempt errored.
    Failed { reason: String },
}

/// One entry/management/exit attempt recorded on a week's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub phase: TradePhase,
    pub ts: NaiveDateTime,
    pub label: String,
    pub fills: Vec<LegFill>,
    /// Signed net cashflow across all fills (positive = credit).
    pub cashflow: f64,
    pub status: TradeStatus,
}

impl TradeRecord {
    pub fn new(
        phase: TradePhase,
        ts: NaiveDateTime,
        label: impl Into<String>,
        fills: Vec<LegFill>,
        status: TradeStatus,
    ) -> Self {
        let cashflow = fills.iter().map(LegFill::cashflow).sum();
        Self {
            phase,
            ts,
            label: label.into(),
            fills,
            cashflow,
            status,
        }
    }
}
