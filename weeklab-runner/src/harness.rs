//! Weekly replay harness.
//!
//! Drives one sampled week through a fixed decision calendar: Monday entry,
//! Wednesday management (only while positions are open), Friday forced
//! flatten. Every week starts with an empty open set and ends with one —
//! nothing carries across weeks. A missing Monday snapshot means the week
//! produced no data at all and is reported as such rather than failed.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;

use weeklab_core::calendar::{friday_of_week, wednesday_of_week};
use weeklab_core::domain::{
    FillOutcome, LegFill, OrderLeg, OrderTicket, Position, TradePhase, TradeRecord, TradeStatus,
    WeeklyResult,
};
use weeklab_core::fill::FillEngine;
use weeklab_core::store::{MarketStore, StoreError};
use weeklab_core::strategy::{ManagementAction, MarketSnapshot, StrategyDecider};

use crate::config::{RunConfig, SnapshotPolicy};

/// Terminal outcome of replaying one week.
#[derive(Debug, Clone, PartialEq)]
pub enum WeekOutcome {
    /// The week ran to Friday; all positions are flat.
    Completed(WeeklyResult),
    /// No snapshot existed at Monday's decision time. Not an error — the
    /// week is simply excluded from aggregation.
    NoData,
}

/// Replays single weeks against the store with injected collaborators.
pub struct WeeklyHarness<'a> {
    store: &'a MarketStore,
    strategy: &'a dyn StrategyDecider,
    fills: &'a dyn FillEngine,
    config: &'a RunConfig,
}

impl<'a> WeeklyHarness<'a> {
    pub fn new(
        store: &'a MarketStore,
        strategy: &'a dyn StrategyDecider,
        fills: &'a dyn FillEngine,
        config: &'a RunConfig,
    ) -> Self {
        Self {
            store,
            strategy,
            fills,
            config,
        }
    }

    /// Replay one week. `week_start` must be a Monday.
    ///
    /// The week's expiration is its own Friday; by Friday's close every
    /// position is flattened (or recorded as unflattenable), so the open
    /// set is always empty on return.
    pub fn run_week(
        &self,
        week_start: NaiveDate,
        rng: &mut StdRng,
    ) -> Result<WeekOutcome, StoreError> {
        let expiration = friday_of_week(week_start);
        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut open: Vec<Position> = Vec::new();
        let mut next_id: u64 = 1;

        // Monday entry
        let entry_ts = week_start.and_time(self.config.entry_time);
        let Some(snapshot) = self.snapshot(expiration, entry_ts)? else {
            return Ok(WeekOutcome::NoData);
        };
        for ticket in self.strategy.entry_orders(&snapshot) {
            self.execute_entry(
                &ticket,
                &snapshot,
                entry_ts,
                TradePhase::Entry,
                rng,
                &mut trades,
                &mut open,
                &mut next_id,
            );
        }

        // Wednesday management, only while something is open
        if !open.is_empty() {
            let mgmt_ts = wednesday_of_week(week_start).and_time(self.config.management_time);
            match self.snapshot(expiration, mgmt_ts)? {
                Some(snapshot) => {
                    self.manage_positions(&snapshot, mgmt_ts, rng, &mut trades, &mut open, &mut next_id);
                }
                None => {
                    tracing::warn!(
                        week = %week_start,
                        "no management snapshot, holding to Friday"
                    );
                }
            }
        }

        // Friday forced flatten. Positions are drained unconditionally;
        // anything that cannot be closed is recorded as a failed exit.
        if !open.is_empty() {
            let exit_ts = expiration.and_time(self.config.exit_time);
            let exit_snapshot = self.snapshot(expiration, exit_ts)?;
            for position in open.drain(..) {
                match &exit_snapshot {
                    Some(snapshot) => {
                        let record = self.close_position(
                            &position,
                            snapshot,
                            exit_ts,
                            TradePhase::Exit,
                            rng,
                        );
                        trades.push(record);
                    }
                    None => {
                        trades.push(TradeRecord::new(
                            TradePhase::Exit,
                            exit_ts,
                            position.strategy_label.clone(),
                            Vec::new(),
                            TradeStatus::Failed {
                                reason: "no exit snapshot".into(),
                            },
                        ));
                    }
                }
            }
        }

        debug_assert!(open.is_empty());
        Ok(WeekOutcome::Completed(WeeklyResult::from_trades(
            week_start, trades,
        )))
    }

    /// Chain lookup at a decision instant, honoring the snapshot policy.
    ///
    /// Spot comes from the underlying bar series when it covers the
    /// decision day; the chain's recorded underlying is the fallback.
    fn snapshot(
        &self,
        expiration: NaiveDate,
        as_of: NaiveDateTime,
    ) -> Result<Option<MarketSnapshot>, StoreError> {
        let chain = match self.config.snapshot_policy {
            SnapshotPolicy::Exact => {
                self.store
                    .get_chain(&self.config.symbol, expiration, as_of)?
            }
            SnapshotPolicy::NearestWithin { minutes } => self.store.latest_chain_at_or_before(
                &self.config.symbol,
                expiration,
                as_of,
                Duration::minutes(minutes),
            )?,
        };
        let Some(chain) = chain else {
            return Ok(None);
        };
        let underlying = match self.bar_spot(as_of)? {
            Some(close) => close,
            None => chain.underlying,
        };
        Ok(Some(MarketSnapshot {
            ts: as_of,
            underlying,
            chain,
        }))
    }

    /// Close of the latest bar at or before `as_of` on the same day.
    fn bar_spot(&self, as_of: NaiveDateTime) -> Result<Option<f64>, StoreError> {
        let day_open = as_of.date().and_time(chrono::NaiveTime::MIN);
        let bars = self.store.get_bars(
            &self.config.symbol,
            self.config.asset_class,
            day_open,
            as_of,
        )?;
        Ok(bars.last().map(|bar| bar.close))
    }

    /// Fill a ticket's legs independently and record the attempt.
    ///
    /// All legs filled opens a full position; a subset opens a partial one
    /// whose unmatched legs stay naked until Friday; none filled records a
    /// failure and opens nothing.
    #[allow(clippy::too_many_arguments)]
    fn execute_entry(
        &self,
        ticket: &OrderTicket,
        snapshot: &MarketSnapshot,
        ts: NaiveDateTime,
        phase: TradePhase,
        rng: &mut StdRng,
        trades: &mut Vec<TradeRecord>,
        open: &mut Vec<Position>,
        next_id: &mut u64,
    ) {
        let (fills, misses) = self.fill_legs(&ticket.legs, snapshot, rng);

        let status = if misses.is_empty() {
            TradeStatus::Executed
        } else if fills.is_empty() {
            TradeStatus::Failed {
                reason: misses.join("; "),
            }
        } else {
            TradeStatus::PartialFill
        };

        if !fills.is_empty() {
            let partial = !misses.is_empty();
            open.push(Position::new(
                *next_id,
                ts,
                ticket.label.clone(),
                fills.clone(),
                self.config.max_risk_per_position,
                partial,
            ));
            *next_id += 1;
        }
        trades.push(TradeRecord::new(phase, ts, ticket.label.clone(), fills, status));
    }

    fn manage_positions(
        &self,
        snapshot: &MarketSnapshot,
        ts: NaiveDateTime,
        rng: &mut StdRng,
        trades: &mut Vec<TradeRecord>,
        open: &mut Vec<Position>,
        next_id: &mut u64,
    ) {
        let mut kept: Vec<Position> = Vec::new();
        for position in open.drain(..) {
            match self.strategy.manage(snapshot, &position) {
                ManagementAction::Hold => kept.push(position),
                ManagementAction::Close { reason: _ } => {
                    let record = self.close_position(
                        &position,
                        snapshot,
                        ts,
                        TradePhase::Management,
                        rng,
                    );
                    // A close that did not fully execute leaves the
                    // unclosed legs open for the Friday flatten.
                    if let Some(remainder) = self.unclosed_remainder(&position, &record) {
                        kept.push(remainder);
                    }
                    trades.push(record);
                }
                ManagementAction::Roll { replacement } => {
                    let record = self.close_position(
                        &position,
                        snapshot,
                        ts,
                        TradePhase::Management,
                        rng,
                    );
                    let fully_closed = record.status == TradeStatus::Executed;
                    if let Some(remainder) = self.unclosed_remainder(&position, &record) {
                        kept.push(remainder);
                    }
                    trades.push(record);
                    // Only roll into the replacement once the old structure
                    // is actually flat.
                    if fully_closed {
                        self.execute_entry(
                            &replacement,
                            snapshot,
                            ts,
                            TradePhase::Management,
                            rng,
                            trades,
                            &mut kept,
                            next_id,
                        );
                    }
                }
            }
        }
        *open = kept;
    }

    /// Attempt to flatten every leg of a position at current quotes.
    fn close_position(
        &self,
        position: &Position,
        snapshot: &MarketSnapshot,
        ts: NaiveDateTime,
        phase: TradePhase,
        rng: &mut StdRng,
    ) -> TradeRecord {
        let closing_legs: Vec<OrderLeg> = position
            .legs
            .iter()
            .map(|fill| OrderLeg {
                side: fill.leg.side.opposite(),
                ..fill.leg.clone()
            })
            .collect();
        let (fills, misses) = self.fill_legs(&closing_legs, snapshot, rng);

        let status = if misses.is_empty() {
            TradeStatus::Executed
        } else if fills.is_empty() {
            TradeStatus::Failed {
                reason: misses.join("; "),
            }
        } else {
            TradeStatus::PartialFill
        };
        TradeRecord::new(phase, ts, position.strategy_label.clone(), fills, status)
    }

    /// The still-open part of `position` after a close attempt, if any.
    fn unclosed_remainder(&self, position: &Position, record: &TradeRecord) -> Option<Position> {
        if record.status == TradeStatus::Executed {
            return None;
        }
        let remaining: Vec<LegFill> = position
            .legs
            .iter()
            .filter(|fill| {
                // A leg is closed only by a fill matching its entire
                // opposite-side identity, quantity included.
                let closing = OrderLeg {
                    side: fill.leg.side.opposite(),
                    ..fill.leg.clone()
                };
                !record.fills.iter().any(|closed| closed.leg == closing)
            })
            .cloned()
            .collect();
        if remaining.is_empty() {
            return None;
        }
        Some(Position {
            legs: remaining,
            partial: true,
            ..position.clone()
        })
    }

    /// Fill legs independently; returns the fills plus miss reasons.
    fn fill_legs(
        &self,
        legs: &[OrderLeg],
        snapshot: &MarketSnapshot,
        rng: &mut StdRng,
    ) -> (Vec<LegFill>, Vec<String>) {
        let mut fills = Vec::new();
        let mut misses = Vec::new();
        for leg in legs {
            let Some(quote) = snapshot.chain.contract(leg.strike, leg.right) else {
                misses.push(format!(
                    "no quote for {} {} {}",
                    leg.symbol,
                    leg.strike,
                    leg.right.code()
                ));
                continue;
            };
            match self.fills.fill(leg, quote, rng) {
                FillOutcome::Filled(fill) => fills.push(fill),
                FillOutcome::Unfilled { reason } => misses.push(reason),
            }
        }
        (fills, misses)
    }
}
