//! Strategy-decision collaborator.
//!
//! The harness treats the strategy as a capability: given a snapshot it
//! proposes entry orders on Monday and per-position management actions on
//! Wednesday. The core executes what is returned without validating its
//! semantic correctness. Concrete deciders are selected by configuration
//! (a tagged enum + factory), never by subclassing.

use serde::{Deserialize, Serialize};

use crate::domain::{
    LegSide, OptionRight, OptionsChain, OrderLeg, OrderTicket, Position,
};
use chrono::NaiveDateTime;

/// Point-in-time market view handed to the strategy collaborator.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub ts: NaiveDateTime,
    pub underlying: f64,
    /// Chain for the week's expiration.
    pub chain: OptionsChain,
}

/// Management decision for one open position.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagementAction {
    Hold,
    /// Close every leg now.
    Close { reason: String },
    /// Close every leg now and open the replacement ticket.
    Roll { replacement: OrderTicket },
}

/// Capability interface for the strategy-decision collaborator.
pub trait StrategyDecider: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate entry orders for Monday's snapshot. May be empty.
    fn entry_orders(&self, snapshot: &MarketSnapshot) -> Vec<OrderTicket>;

    /// Wednesday management decision for one open position.
    fn manage(&self, snapshot: &MarketSnapshot, position: &Position) -> ManagementAction;
}

// ─── Configuration + factory ─────────────────────────────────────────

/// Serializable strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    /// Delta-targeted short strangle: sell an OTM call and an OTM put at
    /// the week's expiration, manage on a profit target / loss limit.
    ShortStrangle {
        call_delta: f64,
        put_delta: f64,
        quantity: u32,
        /// Close when the structure can be bought back for this fraction
        /// of the entry credit (e.g. 0.5 = 50% profit).
        profit_target: f64,
        /// Close when buying back costs this multiple of the entry credit.
        loss_limit: f64,
    },
    /// Never enters; useful for planner/store dry runs.
    NoEntry,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::ShortStrangle {
            call_delta: 0.16,
            put_delta: 0.16,
            quantity: 1,
            profit_target: 0.5,
            loss_limit: 2.0,
        }
    }
}

/// Build a decider from its configuration.
pub fn build_strategy(kind: &StrategyKind) -> Box<dyn StrategyDecider> {
    match kind {
        StrategyKind::ShortStrangle {
            call_delta,
            put_delta,
            quantity,
            profit_target,
            loss_limit,
        } => Box::new(ShortStrangle {
            call_delta: *call_delta,
            put_delta: *put_delta,
            quantity: *quantity,
            profit_target: *profit_target,
            loss_limit: *loss_limit,
        }),
        StrategyKind::NoEntry => Box::new(NoEntry),
    }
}

// ─── Built-in deciders ───────────────────────────────────────────────

/// Delta-targeted weekly short strangle.
#[derive(Debug, Clone)]
pub struct ShortStrangle {
    pub call_delta: f64,
    pub put_delta: f64,
    pub quantity: u32,
    pub profit_target: f64,
    pub loss_limit: f64,
}

impl ShortStrangle {
    /// Current cost to close the position at chain midpoints.
    ///
    /// `None` when any leg's contract is missing from the snapshot.
    fn close_cost(&self, snapshot: &MarketSnapshot, position: &Position) -> Option<f64> {
        let mut cost = 0.0;
        for fill in &position.legs {
            let quote = snapshot
                .chain
                .contract(fill.leg.strike, fill.leg.right)?;
            // Closing a short leg is a buy (debit), closing a long leg a sell.
            cost += -fill.leg.side.opposite().sign()
                * quote.mid()
                * fill.leg.quantity as f64
                * 100.0;
        }
        Some(cost)
    }
}

impl StrategyDecider for ShortStrangle {
    fn name(&self) -> &str {
        "short_strangle"
    }

    fn entry_orders(&self, snapshot: &MarketSnapshot) -> Vec<OrderTicket> {
        let chain = &snapshot.chain;
        let call = chain.nearest_by_delta(OptionRight::Call, self.call_delta);
        let put = chain.nearest_by_delta(OptionRight::Put, self.put_delta);
        let (Some(call), Some(put)) = (call, put) else {
            return Vec::new();
        };
        // Refuse degenerate chains where the "strangle" would invert.
        if call.strike <= put.strike {
            return Vec::new();
        }
        vec![OrderTicket::new(
            "short_strangle",
            vec![
                OrderLeg {
                    symbol: chain.symbol.clone(),
                    strike: call.strike,
                    right: OptionRight::Call,
                    expiration: chain.expiration,
                    side: LegSide::Sell,
                    quantity: self.quantity,
                },
                OrderLeg {
                    symbol: chain.symbol.clone(),
                    strike: put.strike,
                    right: OptionRight::Put,
                    expiration: chain.expiration,
                    side: LegSide::Sell,
                    quantity: self.quantity,
                },
            ],
        )]
    }

    fn manage(&self, snapshot: &MarketSnapshot, position: &Position) -> ManagementAction {
        let credit = position.entry_cashflow();
        if credit <= 0.0 {
            return ManagementAction::Hold;
        }
        let Some(cost) = self.close_cost(snapshot, position) else {
            return ManagementAction::Hold;
        };
        if cost <= credit * (1.0 - self.profit_target) {
            ManagementAction::Close {
                reason: "profit_target".into(),
            }
        } else if cost >= credit * self.loss_limit {
            ManagementAction::Close {
                reason: "loss_limit".into(),
            }
        } else {
            ManagementAction::Hold
        }
    }
}

/// Decider that never trades.
#[derive(Debug, Clone, Copy)]
pub struct NoEntry;

impl StrategyDecider for NoEntry {
    fn name(&self) -> &str {
        "no_entry"
    }

    fn entry_orders(&self, _snapshot: &MarketSnapshot) -> Vec<OrderTicket> {
        Vec::new()
    }

    fn manage(&self, _snapshot: &MarketSnapshot, _position: &Position) -> ManagementAction {
        ManagementAction::Hold
    }
}
