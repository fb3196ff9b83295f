//! Sampling planner.
//!
//! Builds the ordered, deduplicated set of representative weeks to replay
//! across a multi-decade span. Every candidate date is normalized to the
//! Monday of its containing ISO week; the first assignment for a given week
//! wins when multiple sub-strategies propose it (later proposals only merge
//! their event tags into the existing entry).

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use weeklab_core::calendar::week_start;
use weeklab_core::domain::WeeklyResult;

use crate::config::{RunConfig, SamplingStrategyKind};
use crate::eras::{self, Regime};

/// Why the planner selected a week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleReason {
    Stratified { era: String },
    Event { name: String },
    Recovery { name: String },
    Seasonal { name: String },
    Stress { name: String },
}

/// Execution status of a sampled week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeekStatus {
    /// Not yet replayed.
    Pending,
    /// Replayed and produced a `WeeklyResult`.
    Executed,
    /// No snapshot data existed for the week; excluded from aggregation.
    NoData,
    /// An unexpected fault occurred; isolated to this week.
    Failed { reason: String },
    /// The run was cancelled before this week started.
    Skipped,
}

/// One calendar week selected for full replay.
///
/// Created by the planner; the harness only attaches a result or a failure
/// reason. Entries are never deleted, only accumulated into the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledWeek {
    /// Monday of the selected week.
    pub week_start: NaiveDate,
    pub regime: Regime,
    pub event_tags: Vec<String>,
    pub reason: SampleReason,
    pub status: WeekStatus,
    pub result: Option<WeeklyResult>,
}

impl SampledWeek {
    fn new(
        week_start: NaiveDate,
        regime: Regime,
        event_tags: Vec<String>,
        reason: SampleReason,
    ) -> Self {
        Self {
            week_start,
            regime,
            event_tags,
            reason,
            status: WeekStatus::Pending,
            result: None,
        }
    }
}

/// Errors during planning. Fatal to the run: no weeks can be produced.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid span: start {start} is after end {end}")]
    InvalidSpan { start: NaiveDate, end: NaiveDate },
    #[error("span {start}..{end} contains no complete week")]
    EmptySpan { start: NaiveDate, end: NaiveDate },
}

/// Build the ordered plan for the configured span and sampling strategy.
pub fn plan(config: &RunConfig) -> Result<Vec<SampledWeek>, PlanError> {
    if config.start > config.end {
        return Err(PlanError::InvalidSpan {
            start: config.start,
            end: config.end,
        });
    }

    let lo = week_start(config.start);
    let hi = config.end;
    let mut weeks: BTreeMap<NaiveDate, SampledWeek> = BTreeMap::new();

    match config.sampling {
        SamplingStrategyKind::Comprehensive => {
            add_stratified(&mut weeks, lo, hi, config.era_target_weeks);
            add_event_weeks(&mut weeks, lo, hi);
            add_seasonal_weeks(&mut weeks, lo, hi);
        }
        SamplingStrategyKind::RegimeFocused => {
            add_stratified(&mut weeks, lo, hi, config.era_target_weeks);
            add_event_weeks(&mut weeks, lo, hi);
            add_seasonal_weeks(&mut weeks, lo, hi);
            return Ok(cap_per_regime(weeks, config.regime_cap));
        }
        SamplingStrategyKind::EventDriven => {
            add_event_weeks(&mut weeks, lo, hi);
        }
        SamplingStrategyKind::StressTest => {
            add_stress_weeks(&mut weeks, lo, hi);
        }
        SamplingStrategyKind::Seasonal => {
            add_seasonal_weeks(&mut weeks, lo, hi);
        }
    }

    if weeks.is_empty() {
        return Err(PlanError::EmptySpan {
            start: config.start,
            end: config.end,
        });
    }
    Ok(weeks.into_values().collect())
}

/// First assignment wins; later proposals merge their tags only.
fn propose(weeks: &mut BTreeMap<NaiveDate, SampledWeek>, week: SampledWeek) {
    match weeks.entry(week.week_start) {
        std::collections::btree_map::Entry::Vacant(slot) => {
            slot.insert(week);
        }
        std::collections::btree_map::Entry::Occupied(mut slot) => {
            let existing = slot.get_mut();
            for tag in week.event_tags {
                if !existing.event_tags.contains(&tag) {
                    existing.event_tags.push(tag);
                }
            }
        }
    }
}

/// All Mondays in `[lo, hi]` (lo is already a Monday).
fn mondays_between(lo: NaiveDate, hi: NaiveDate) -> Vec<NaiveDate> {
    let mut mondays = Vec::new();
    let mut m = lo;
    while m <= hi {
        mondays.push(m);
        m += Duration::days(7);
    }
    mondays
}

/// Stratified per-era sampling: every week when the era window holds at
/// most `target` weeks, otherwise `target` weeks evenly spaced through it.
fn add_stratified(
    weeks: &mut BTreeMap<NaiveDate, SampledWeek>,
    lo: NaiveDate,
    hi: NaiveDate,
    target: usize,
) {
    // The even-spacing arithmetic needs at least two picks per era.
    let target = target.max(2);
    for era in eras::eras() {
        let era_lo = week_start(era.start.max(lo));
        let era_hi = era.end.min(hi);
        if era_lo > era_hi {
            continue;
        }
        let mondays = mondays_between(era_lo.max(lo), era_hi);
        if mondays.is_empty() {
            continue;
        }

        let picked: Vec<NaiveDate> = if mondays.len() <= target {
            mondays
        } else {
            // Evenly spaced through the era, endpoints included.
            (0..target)
                .map(|i| mondays[i * (mondays.len() - 1) / (target - 1)])
                .collect()
        };

        for monday in picked {
            propose(
                weeks,
                SampledWeek::new(
                    monday,
                    era.regime,
                    era.tags.iter().map(|t| t.to_string()).collect(),
                    SampleReason::Stratified {
                        era: era.name.to_string(),
                    },
                ),
            );
        }
    }

    // Span not covered by the era table: sample it as a calm catch-all so
    // stratified coverage still reaches every requested year.
    let covered: Vec<(NaiveDate, NaiveDate)> = eras::eras()
        .iter()
        .map(|e| (e.start, e.end))
        .collect();
    let uncovered_mondays: Vec<NaiveDate> = mondays_between(lo, hi)
        .into_iter()
        .filter(|m| !covered.iter().any(|(s, e)| s <= m && m <= e))
        .collect();
    if !uncovered_mondays.is_empty() {
        let picked: Vec<NaiveDate> = if uncovered_mondays.len() <= target {
            uncovered_mondays
        } else {
            (0..target)
                .map(|i| uncovered_mondays[i * (uncovered_mondays.len() - 1) / (target - 1)])
                .collect()
        };
        for monday in picked {
            propose(
                weeks,
                SampledWeek::new(
                    monday,
                    Regime::Calm,
                    Vec::new(),
                    SampleReason::Stratified {
                        era: "uncategorized".to_string(),
                    },
                ),
            );
        }
    }
}

/// Event weeks plus the following recovery week.
fn add_event_weeks(weeks: &mut BTreeMap<NaiveDate, SampledWeek>, lo: NaiveDate, hi: NaiveDate) {
    for event in eras::stress_events() {
        let event_week = week_start(event.date);
        if event_week >= lo && event_week <= hi {
            propose(
                weeks,
                SampledWeek::new(
                    event_week,
                    event.regime,
                    event.tags.iter().map(|t| t.to_string()).collect(),
                    SampleReason::Event {
                        name: event.name.to_string(),
                    },
                ),
            );
        }
        let recovery_week = event_week + Duration::days(7);
        if recovery_week >= lo && recovery_week <= hi {
            propose(
                weeks,
                SampledWeek::new(
                    recovery_week,
                    Regime::Recovery,
                    event.tags.iter().map(|t| t.to_string()).collect(),
                    SampleReason::Recovery {
                        name: event.name.to_string(),
                    },
                ),
            );
        }
    }
}

fn add_seasonal_weeks(weeks: &mut BTreeMap<NaiveDate, SampledWeek>, lo: NaiveDate, hi: NaiveDate) {
    for (monday, name) in eras::seasonal_anchor_weeks(lo.year(), hi.year()) {
        if monday >= lo && monday <= hi {
            propose(
                weeks,
                SampledWeek::new(
                    monday,
                    eras::regime_for(monday),
                    vec![name.to_string()],
                    SampleReason::Seasonal {
                        name: name.to_string(),
                    },
                ),
            );
        }
    }
}

fn add_stress_weeks(weeks: &mut BTreeMap<NaiveDate, SampledWeek>, lo: NaiveDate, hi: NaiveDate) {
    for (monday, name) in eras::crisis_weeks() {
        if monday >= lo && monday <= hi {
            propose(
                weeks,
                SampledWeek::new(
                    monday,
                    Regime::Crisis,
                    vec![name.to_string()],
                    SampleReason::Stress {
                        name: name.to_string(),
                    },
                ),
            );
        }
    }
}

/// Keep at most `cap` weeks per regime label, earliest first.
fn cap_per_regime(weeks: BTreeMap<NaiveDate, SampledWeek>, cap: usize) -> Vec<SampledWeek> {
    let mut counts: BTreeMap<Regime, usize> = BTreeMap::new();
    weeks
        .into_values()
        .filter(|week| {
            let count = counts.entry(week.regime).or_insert(0);
            if *count < cap {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use std::collections::HashSet;

    fn config(start: NaiveDate, end: NaiveDate, sampling: SamplingStrategyKind) -> RunConfig {
        RunConfig {
            start,
            end,
            sampling,
            ..RunConfig::default()
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn full_span(sampling: SamplingStrategyKind) -> Vec<SampledWeek> {
        plan(&config(d(2000, 1, 3), d(2024, 12, 27), sampling)).unwrap()
    }

    #[test]
    fn comprehensive_plan_is_deduplicated_and_ordered() {
        let weeks = full_span(SamplingStrategyKind::Comprehensive);
        let mut seen = HashSet::new();
        for week in &weeks {
            assert!(seen.insert(week.week_start), "duplicate {}", week.week_start);
        }
        for pair in weeks.windows(2) {
            assert!(pair[0].week_start < pair[1].week_start);
        }
    }

    #[test]
    fn every_week_start_is_a_monday() {
        for kind in [
            SamplingStrategyKind::Comprehensive,
            SamplingStrategyKind::EventDriven,
            SamplingStrategyKind::StressTest,
            SamplingStrategyKind::Seasonal,
        ] {
            for week in full_span(kind) {
                assert_eq!(week.week_start.weekday(), Weekday::Mon);
            }
        }
    }

    #[test]
    fn comprehensive_includes_event_and_seasonal_weeks() {
        let weeks = full_span(SamplingStrategyKind::Comprehensive);
        let starts: HashSet<NaiveDate> = weeks.iter().map(|w| w.week_start).collect();
        // Lehman week and its recovery week
        assert!(starts.contains(&d(2008, 9, 15)));
        assert!(starts.contains(&d(2008, 9, 22)));
        // Quad witching March 2024 (third Friday = Mar 15, week of Mar 11)
        assert!(starts.contains(&d(2024, 3, 11)));
    }

    #[test]
    fn short_era_window_samples_every_week() {
        // Six weeks inside a single era: all of them selected.
        let weeks = plan(&config(
            d(2013, 2, 4),
            d(2013, 3, 15),
            SamplingStrategyKind::Comprehensive,
        ))
        .unwrap();
        let stratified: Vec<_> = weeks
            .iter()
            .filter(|w| matches!(w.reason, SampleReason::Stratified { .. }))
            .collect();
        assert_eq!(stratified.len(), 6);
    }

    #[test]
    fn long_era_capped_near_target() {
        // One full calm era (2004..2007-02), far more than 12 weeks.
        let weeks = plan(&config(
            d(2004, 1, 5),
            d(2007, 2, 19),
            SamplingStrategyKind::Comprehensive,
        ))
        .unwrap();
        let stratified = weeks
            .iter()
            .filter(|w| matches!(&w.reason, SampleReason::Stratified { era } if era == "mid_cycle_calm"))
            .count();
        assert!(
            (10..=15).contains(&stratified),
            "expected 10..=15 stratified weeks, got {stratified}"
        );
    }

    #[test]
    fn event_driven_only_contains_events_and_recoveries() {
        let weeks = full_span(SamplingStrategyKind::EventDriven);
        assert!(!weeks.is_empty());
        for week in &weeks {
            assert!(matches!(
                week.reason,
                SampleReason::Event { .. } | SampleReason::Recovery { .. }
            ));
        }
    }

    #[test]
    fn stress_test_is_curated_crisis_weeks() {
        let weeks = full_span(SamplingStrategyKind::StressTest);
        assert!(!weeks.is_empty());
        for week in &weeks {
            assert_eq!(week.regime, Regime::Crisis);
            assert!(matches!(week.reason, SampleReason::Stress { .. }));
        }
    }

    #[test]
    fn seasonal_only_contains_anchor_weeks() {
        let weeks = plan(&config(
            d(2024, 1, 1),
            d(2024, 12, 31),
            SamplingStrategyKind::Seasonal,
        ))
        .unwrap();
        // 1 january + 4 quad witching + 1 holiday, minus overlaps
        assert!(weeks.len() >= 5 && weeks.len() <= 6);
        for week in &weeks {
            assert!(matches!(week.reason, SampleReason::Seasonal { .. }));
        }
    }

    #[test]
    fn regime_focused_respects_cap() {
        let mut cfg = config(
            d(2000, 1, 3),
            d(2024, 12, 27),
            SamplingStrategyKind::RegimeFocused,
        );
        cfg.regime_cap = 5;
        let weeks = plan(&cfg).unwrap();
        let mut counts: BTreeMap<Regime, usize> = BTreeMap::new();
        for week in &weeks {
            *counts.entry(week.regime).or_insert(0) += 1;
        }
        for (regime, count) in counts {
            assert!(count <= 5, "{regime:?} has {count} weeks");
        }
    }

    #[test]
    fn overlapping_proposals_merge_tags() {
        // Volmageddon week (2018-02-05) is both an era start and an event.
        let weeks = plan(&config(
            d(2018, 1, 29),
            d(2018, 2, 16),
            SamplingStrategyKind::Comprehensive,
        ))
        .unwrap();
        let vol_week = weeks
            .iter()
            .find(|w| w.week_start == d(2018, 2, 5))
            .unwrap();
        assert!(vol_week.event_tags.iter().any(|t| t == "volmageddon"));
    }

    #[test]
    fn degenerate_era_target_is_clamped() {
        // plan() is callable without going through RunConfig::validate, so
        // a target below the spacing minimum must not divide by zero.
        for target in [0, 1] {
            let mut cfg = config(
                d(2004, 1, 5),
                d(2007, 2, 19),
                SamplingStrategyKind::Comprehensive,
            );
            cfg.era_target_weeks = target;
            let weeks = plan(&cfg).unwrap();
            assert!(!weeks.is_empty());
        }
    }

    #[test]
    fn inverted_span_is_fatal() {
        let err = plan(&config(
            d(2024, 2, 1),
            d(2024, 1, 1),
            SamplingStrategyKind::Comprehensive,
        ))
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidSpan { .. }));
    }

    #[test]
    fn all_new_weeks_start_pending() {
        for week in full_span(SamplingStrategyKind::Comprehensive) {
            assert_eq!(week.status, WeekStatus::Pending);
            assert!(week.result.is_none());
        }
    }

    proptest::proptest! {
        #[test]
        fn plans_over_arbitrary_spans_are_normalized(
            start_offset in 0i64..8_000,
            len in 0i64..2_000,
        ) {
            let start = d(2000, 1, 1) + Duration::days(start_offset);
            let end = start + Duration::days(len);
            if let Ok(weeks) = plan(&config(start, end, SamplingStrategyKind::Comprehensive)) {
                for pair in weeks.windows(2) {
                    proptest::prop_assert!(pair[0].week_start < pair[1].week_start);
                }
                for week in &weeks {
                    proptest::prop_assert_eq!(week.week_start.weekday(), Weekday::Mon);
                    proptest::prop_assert!(week.week_start <= end);
                }
            }
        }
    }
}
