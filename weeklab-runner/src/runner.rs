//! Run orchestration.
//!
//! Plans the sampled weeks, replays them (in parallel by default — weeks
//! are independent by construction), and folds the outcomes into a summary.
//! A fault inside one week is contained to that week: the run continues and
//! the failure is recorded on the week itself.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use weeklab_core::fill::build_fill;
use weeklab_core::rng::RunRng;
use weeklab_core::store::MarketStore;
use weeklab_core::strategy::build_strategy;

use crate::config::{ConfigError, RunConfig, RunId};
use crate::coverage::{self, CoverageStats};
use crate::harness::{WeekOutcome, WeeklyHarness};
use crate::planner::{plan, PlanError, SampledWeek, WeekStatus};

/// Cooperative cancellation flag checked between weeks.
///
/// Cancellation never interrupts a week mid-replay; pending weeks are
/// marked skipped and the partial summary is still produced.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fatal errors: nothing at all could be replayed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Complete output of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub weeks: Vec<SampledWeek>,
    pub executed: usize,
    pub no_data: usize,
    pub failed: usize,
    pub skipped: usize,
    pub coverage: CoverageStats,
}

/// Open the partition store the way the run is configured: the pool bound
/// comes from `max_open_partitions`, never from a caller-chosen literal.
pub fn open_store(root: impl Into<std::path::PathBuf>, config: &RunConfig) -> MarketStore {
    MarketStore::open(root, config.max_open_partitions)
}

/// Plan and replay every sampled week, then aggregate.
pub fn run(
    config: &RunConfig,
    store: &MarketStore,
    cancel: &CancelToken,
) -> Result<RunSummary, RunError> {
    config.validate()?;
    let run_id = config.run_id();
    let mut weeks = plan(config)?;
    tracing::info!(
        run_id = %run_id,
        weeks = weeks.len(),
        sampling = ?config.sampling,
        "starting run"
    );

    let strategy = build_strategy(&config.strategy);
    let fills = build_fill(&config.fill);
    let harness = WeeklyHarness::new(store, strategy.as_ref(), fills.as_ref(), config);
    let rng = RunRng::new(config.seed);

    let replay = |week: &mut SampledWeek| {
        if cancel.is_cancelled() {
            week.status = WeekStatus::Skipped;
            return;
        }
        let mut week_rng = rng.rng_for_week(week.week_start);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            harness.run_week(week.week_start, &mut week_rng)
        }));
        match outcome {
            Ok(Ok(WeekOutcome::Completed(result))) => {
                week.status = WeekStatus::Executed;
                week.result = Some(result);
            }
            Ok(Ok(WeekOutcome::NoData)) => {
                week.status = WeekStatus::NoData;
            }
            Ok(Err(e)) => {
                tracing::warn!(week = %week.week_start, error = %e, "week failed");
                week.status = WeekStatus::Failed {
                    reason: e.to_string(),
                };
            }
            Err(_) => {
                tracing::warn!(week = %week.week_start, "week panicked");
                week.status = WeekStatus::Failed {
                    reason: "panic during replay".into(),
                };
            }
        }
    };

    if config.parallel {
        weeks.par_iter_mut().for_each(replay);
    } else {
        weeks.iter_mut().for_each(replay);
    }

    let coverage = coverage::compute(&weeks);
    let count = |wanted: fn(&WeekStatus) -> bool| weeks.iter().filter(|w| wanted(&w.status)).count();
    let summary = RunSummary {
        run_id,
        executed: count(|s| *s == WeekStatus::Executed),
        no_data: count(|s| *s == WeekStatus::NoData),
        failed: count(|s| matches!(s, WeekStatus::Failed { .. })),
        skipped: count(|s| *s == WeekStatus::Skipped),
        coverage,
        weeks,
    };
    tracing::info!(
        executed = summary.executed,
        no_data = summary.no_data,
        failed = summary.failed,
        skipped = summary.skipped,
        "run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingStrategyKind;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;
    use weeklab_core::calendar::friday_of_week;
    use weeklab_core::domain::{Greeks, OptionContract, OptionRight, OptionsChain};
    use weeklab_core::fill::FillKind;

    fn contract(
        expiration: NaiveDate,
        strike: f64,
        right: OptionRight,
        delta: f64,
    ) -> OptionContract {
        OptionContract {
            symbol: "SPY".into(),
            strike,
            right,
            expiration,
            bid: 1.45,
            ask: 1.55,
            last: 1.50,
            volume: 100,
            open_interest: 1_000,
            greeks: Greeks {
                delta,
                ..Greeks::default()
            },
            implied_vol: 0.2,
            underlying: 510.0,
        }
    }

    fn seed_week(store: &MarketStore, monday: NaiveDate, config: &RunConfig) {
        let expiration = friday_of_week(monday);
        let seed_at = |ts: NaiveDateTime| {
            let chain = OptionsChain::new(
                "SPY",
                expiration,
                ts,
                510.0,
                vec![
                    contract(expiration, 520.0, OptionRight::Call, 0.16),
                    contract(expiration, 500.0, OptionRight::Put, -0.16),
                ],
            );
            store.put_chain(&chain).unwrap();
        };
        seed_at(monday.and_time(config.entry_time));
        seed_at(expiration.and_time(config.exit_time));
    }

    fn base_config() -> RunConfig {
        RunConfig {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            sampling: SamplingStrategyKind::Seasonal,
            fill: FillKind::Ideal,
            parallel: false,
            ..RunConfig::default()
        }
    }

    #[test]
    fn run_executes_seeded_weeks_and_reports_missing_ones() {
        let dir = TempDir::new().unwrap();
        let config = base_config();
        let store = open_store(dir.path(), &config);

        let planned = plan(&config).unwrap();
        assert!(planned.len() >= 5);
        // Seed all but the last planned week
        for week in &planned[..planned.len() - 1] {
            seed_week(&store, week.week_start, &config);
        }

        let summary = run(&config, &store, &CancelToken::new()).unwrap();
        assert_eq!(summary.executed, planned.len() - 1);
        assert_eq!(summary.no_data, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.coverage.executed_weeks, planned.len() - 1);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config();
        let store = open_store(dir.path(), &config);

        for week in plan(&config).unwrap() {
            seed_week(&store, week.week_start, &config);
        }

        let sequential = run(&config, &store, &CancelToken::new()).unwrap();
        config.parallel = true;
        let parallel = run(&config, &store, &CancelToken::new()).unwrap();

        assert_eq!(sequential.executed, parallel.executed);
        for (a, b) in sequential.weeks.iter().zip(parallel.weeks.iter()) {
            assert_eq!(a.result, b.result, "week {}", a.week_start);
        }
    }

    #[test]
    fn corrupt_partition_fails_only_its_week() {
        let dir = TempDir::new().unwrap();
        let config = base_config();

        let planned = plan(&config).unwrap();
        {
            // Seed through a scoped store so no connection stays cached
            // over the file we are about to clobber.
            let seeder = open_store(dir.path(), &config);
            for week in &planned {
                seed_week(&seeder, week.week_start, &config);
            }
        }
        // Overwrite one week's chain partition with garbage
        let victim = planned[1].week_start;
        let expiration = friday_of_week(victim);
        let path = dir
            .path()
            .join("options")
            .join("SPY")
            .join(expiration.format("%Y").to_string())
            .join(expiration.format("%m").to_string())
            .join(format!("SPY_{expiration}.db"));
        std::fs::write(&path, b"not a database").unwrap();

        let store = open_store(dir.path(), &config);
        let summary = run(&config, &store, &CancelToken::new()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.executed, planned.len() - 1);
        let failed_week = summary
            .weeks
            .iter()
            .find(|w| w.week_start == victim)
            .unwrap();
        assert!(matches!(failed_week.status, WeekStatus::Failed { .. }));
    }

    #[test]
    fn cancelled_run_skips_all_weeks() {
        let dir = TempDir::new().unwrap();
        let config = base_config();
        let store = open_store(dir.path(), &config);

        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = run(&config, &store, &cancel).unwrap();
        assert_eq!(summary.executed, 0);
        assert_eq!(summary.skipped, summary.weeks.len());
    }

    #[test]
    fn invalid_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config();
        let store = open_store(dir.path(), &config);
        config.symbol = String::new();

        assert!(matches!(
            run(&config, &store, &CancelToken::new()),
            Err(RunError::Config(_))
        ));
    }

    #[test]
    fn open_store_honors_the_configured_pool_bound() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config();
        config.max_open_partitions = 1;
        let store = open_store(dir.path(), &config);

        // Three distinct chain partitions; the pool keeps at most one idle.
        for monday in [
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(),
        ] {
            seed_week(&store, monday, &config);
        }
        assert_eq!(store.pool().open_count(), 1);
    }

    #[test]
    fn summary_is_reproducible_from_the_seed() {
        let dir = TempDir::new().unwrap();
        let mut config = base_config();
        config.fill = FillKind::Midpoint {
            max_slippage_frac: 0.5,
        };
        let store = open_store(dir.path(), &config);

        for week in plan(&config).unwrap() {
            seed_week(&store, week.week_start, &config);
        }
        let a = run(&config, &store, &CancelToken::new()).unwrap();
        let b = run(&config, &store, &CancelToken::new()).unwrap();
        for (x, y) in a.weeks.iter().zip(b.weeks.iter()) {
            assert_eq!(x.result, y.result);
        }
    }
}
