//! Coverage aggregation across sampled weeks.
//!
//! Folds per-week results into regime and event coverage tables plus
//! portfolio-level statistics. Only weeks that actually executed contribute;
//! no-data, failed, and skipped weeks are counted but never pollute the
//! averages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::planner::{SampledWeek, WeekStatus};

/// Per-label aggregate (one row of a regime or event table).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagStats {
    pub weeks: usize,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub wins: usize,
    pub win_rate: f64,
}

/// Aggregated coverage and performance statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub by_regime: BTreeMap<String, TagStats>,
    pub by_event: BTreeMap<String, TagStats>,
    pub executed_weeks: usize,
    pub win_rate: f64,
    pub mean_pnl: f64,
    /// Weekly Sharpe annualized by sqrt(52); zero when undefined.
    pub sharpe: f64,
    /// Maximum peak-to-trough drop of the cumulative P&L curve, reported
    /// as a positive dollar amount.
    pub max_drawdown: f64,
}

/// Aggregate executed weeks into coverage tables and portfolio stats.
///
/// Weeks are folded in plan order, which is chronological, so the drawdown
/// curve follows the sampled timeline.
pub fn compute(weeks: &[SampledWeek]) -> CoverageStats {
    let mut stats = CoverageStats::default();
    let mut pnls: Vec<f64> = Vec::new();

    for week in weeks {
        if week.status != WeekStatus::Executed {
            continue;
        }
        let Some(result) = &week.result else {
            continue;
        };

        let pnl = result.pnl;
        let win = result.is_win();
        pnls.push(pnl);

        fold_tag(&mut stats.by_regime, week.regime.as_str(), pnl, win);
        for tag in &week.event_tags {
            fold_tag(&mut stats.by_event, tag, pnl, win);
        }
    }

    stats.executed_weeks = pnls.len();
    if pnls.is_empty() {
        return stats;
    }

    let wins = pnls.iter().filter(|p| **p > 0.0).count();
    stats.win_rate = wins as f64 / pnls.len() as f64;
    stats.mean_pnl = mean(&pnls);
    stats.sharpe = annualized_sharpe(&pnls);
    stats.max_drawdown = max_drawdown(&equity_curve(&pnls));

    finalize_tags(&mut stats.by_regime);
    finalize_tags(&mut stats.by_event);
    stats
}

fn fold_tag(table: &mut BTreeMap<String, TagStats>, tag: &str, pnl: f64, win: bool) {
    let entry = table.entry(tag.to_string()).or_default();
    entry.weeks += 1;
    entry.total_pnl += pnl;
    if win {
        entry.wins += 1;
    }
}

fn finalize_tags(table: &mut BTreeMap<String, TagStats>) {
    for entry in table.values_mut() {
        if entry.weeks > 0 {
            entry.avg_pnl = entry.total_pnl / entry.weeks as f64;
            entry.win_rate = entry.wins as f64 / entry.weeks as f64;
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator).
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Weekly-to-annual Sharpe: mean / std * sqrt(52), zero when degenerate.
fn annualized_sharpe(pnls: &[f64]) -> f64 {
    let sd = std_dev(pnls);
    if sd < 1e-15 {
        return 0.0;
    }
    mean(pnls) / sd * 52.0_f64.sqrt()
}

/// Cumulative P&L curve, one point per executed week.
fn equity_curve(pnls: &[f64]) -> Vec<f64> {
    let mut cumulative = 0.0;
    pnls.iter()
        .map(|pnl| {
            cumulative += pnl;
            cumulative
        })
        .collect()
}

/// Largest drop from a running peak of the equity curve, in dollars.
fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for value in curve {
        peak = peak.max(*value);
        worst = worst.max(peak - value);
    }
    worst
}
