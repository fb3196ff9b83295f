//! Result export and re-import.
//!
//! Two artifacts per run: a per-week CSV table for spreadsheet analysis and
//! a JSON summary for programmatic consumption. The JSON carries a schema
//! version so stale files from older builds are rejected on import instead
//! of being misread.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::planner::{SampledWeek, WeekStatus};
use crate::runner::RunSummary;

/// Bumped on any breaking change to the summary layout.
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SummaryFile {
    schema_version: u32,
    summary: RunSummary,
}

/// Write the per-week result table as CSV.
///
/// One row per planned week, executed or not, with a running cumulative
/// P&L column over the executed weeks.
pub fn export_weeks_csv(path: &Path, weeks: &[SampledWeek]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "week",
        "regime",
        "event_tags",
        "reason",
        "status",
        "trade_count",
        "pnl",
        "win",
        "cumulative_pnl",
    ])?;

    let mut cumulative = 0.0;
    for week in weeks {
        let (trade_count, pnl, win) = match &week.result {
            Some(result) => {
                cumulative += result.pnl;
                (
                    result.trade_count.to_string(),
                    format!("{:.2}", result.pnl),
                    if result.is_win() { "1" } else { "0" }.to_string(),
                )
            }
            None => (String::new(), String::new(), String::new()),
        };
        writer.write_record([
            week.week_start.to_string(),
            week.regime.as_str().to_string(),
            week.event_tags.join("|"),
            reason_label(week),
            status_label(&week.status),
            trade_count,
            pnl,
            win,
            format!("{cumulative:.2}"),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

/// Write the versioned JSON summary.
pub fn export_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let file = SummaryFile {
        schema_version: SUMMARY_SCHEMA_VERSION,
        summary: summary.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Read a summary back, rejecting files from incompatible builds.
pub fn import_summary_json(path: &Path) -> Result<RunSummary> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let file: SummaryFile =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    if file.schema_version != SUMMARY_SCHEMA_VERSION {
        bail!(
            "summary schema version {} does not match expected {}",
            file.schema_version,
            SUMMARY_SCHEMA_VERSION
        );
    }
    Ok(file.summary)
}

fn reason_label(week: &SampledWeek) -> String {
    use crate::planner::SampleReason::*;
    match &week.reason {
        Stratified { era } => format!("stratified:{era}"),
        Event { name } => format!("event:{name}"),
        Recovery { name } => format!("recovery:{name}"),
        Seasonal { name } => format!("seasonal:{name}"),
        Stress { name } => format!("stress:{name}"),
    }
}

fn status_label(status: &WeekStatus) -> String {
    match status {
        WeekStatus::Pending => "pending".into(),
        WeekStatus::Executed => "executed".into(),
        WeekStatus::NoData => "no_data".into(),
        WeekStatus::Failed { reason } => format!("failed:{reason}"),
        WeekStatus::Skipped => "skipped".into(),
    }
}
