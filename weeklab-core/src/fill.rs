//! Fill-engine collaborator.
//!
//! Turns one order leg plus a quote into a fill outcome. The core treats
//! the engine as a black box and never retries: an unfilled leg is simply
//! recorded as such. The built-in model fills at the quote midpoint with
//! side-adverse slippage drawn from the week's seeded RNG, so runs are
//! reproducible from a master seed.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{FillOutcome, LegFill, OptionContract, OrderLeg};

/// Capability interface for the pricing/fill collaborator.
pub trait FillEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Attempt to fill a single leg against a quote.
    fn fill(&self, leg: &OrderLeg, quote: &OptionContract, rng: &mut StdRng) -> FillOutcome;
}

/// Serializable fill-model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillKind {
    /// Midpoint fill with slippage up to `max_slippage_frac` of the half
    /// spread, adverse to the taker. Requires a two-sided quote.
    Midpoint { max_slippage_frac: f64 },
    /// Always fills exactly at the midpoint (ideal case).
    Ideal,
}

impl Default for FillKind {
    fn default() -> Self {
        FillKind::Midpoint {
            max_slippage_frac: 0.5,
        }
    }
}

/// Build a fill engine from its configuration.
pub fn build_fill(kind: &FillKind) -> Box<dyn FillEngine> {
    match kind {
        FillKind::Midpoint { max_slippage_frac } => Box::new(MidpointFill {
            max_slippage_frac: *max_slippage_frac,
        }),
        FillKind::Ideal => Box::new(MidpointFill {
            max_slippage_frac: 0.0,
        }),
    }
}

/// Midpoint fill model with bounded adverse slippage.
#[derive(Debug, Clone)]
pub struct MidpointFill {
    pub max_slippage_frac: f64,
}

impl FillEngine for MidpointFill {
    fn name(&self) -> &str {
        "midpoint"
    }

    fn fill(&self, leg: &OrderLeg, quote: &OptionContract, rng: &mut StdRng) -> FillOutcome {
        if !quote.has_two_sided_quote() {
            return FillOutcome::Unfilled {
                reason: format!(
                    "no two-sided quote for {} {} {}",
                    leg.symbol,
                    leg.strike,
                    leg.right.code()
                ),
            };
        }

        let mid = quote.mid();
        let half_spread = quote.spread() / 2.0;
        let slippage = if self.max_slippage_frac > 0.0 {
            half_spread * self.max_slippage_frac * rng.gen::<f64>()
        } else {
            0.0
        };
        // Adverse to the taker: buys pay up, sells receive less.
        let fill_price = (mid - leg.side.sign() * slippage).max(0.0);

        FillOutcome::Filled(LegFill {
            leg: leg.clone(),
            fill_price,
            slippage,
        })
    }
}
