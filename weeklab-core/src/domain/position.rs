//! Open multi-leg positions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::order::LegFill;

/// An open multi-leg option structure.
///
/// Created on a filled entry order, mutated on a filled roll, removed from
/// the open set on exit or forced Friday flatten. Positions never persist
/// across weeks — each week starts with an empty open set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub entry_ts: NaiveDateTime,
    pub strategy_label: String,
    pub legs: Vec<LegFill>,
    pub max_risk: f64,
    /// True when the entry order only partially filled, leaving naked legs.
    pub partial: bool,
}

impl Position {
    pub fn new(
        id: u64,
        entry_ts: NaiveDateTime,
        strategy_label: impl Into<String>,
        legs: Vec<LegFill>,
        max_risk: f64,
        partial: bool,
    ) -> Self {
        Self {
            id,
            entry_ts,
            strategy_label: strategy_label.into(),
            legs,
            max_risk,
            partial,
        }
    }

    /// Net entry cashflow (positive = the position was opened for a credit).
    pub fn entry_cashflow(&self) -> f64 {
        self.legs.iter().map(LegFill::cashflow).sum()
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }
}
