//! Weeklab Runner — sampling planner, weekly harness, coverage, orchestration.
//!
//! Replays a strategy against decades of stored market snapshots without
//! re-simulating every week of history: the planner selects a statistically
//! representative set of weeks, the harness drives each selected week
//! through a fixed decision calendar (Monday entry, Wednesday management,
//! Friday forced flatten), and the aggregator folds the per-week results
//! into regime/event coverage tables and portfolio statistics.

pub mod config;
pub mod coverage;
pub mod eras;
pub mod export;
pub mod harness;
pub mod planner;
pub mod runner;

pub use config::{RunConfig, SamplingStrategyKind, SnapshotPolicy};
pub use coverage::CoverageStats;
pub use eras::Regime;
pub use harness::{WeekOutcome, WeeklyHarness};
pub use planner::{plan, SampleReason, SampledWeek, WeekStatus};
pub use runner::{open_store, run, CancelToken, RunSummary};
