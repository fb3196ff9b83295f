//! Historical eras, stress events, crisis weeks, and seasonal anchors.
//!
//! Static tables the planner samples from. Era spans partition 2000–2025
//! into named market environments; dates outside the table fall into a
//! calm-labeled catch-all so stratified sampling still covers them.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use weeklab_core::calendar::{third_friday, week_start};

/// Coarse market-condition label attached to a sampled week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    Calm,
    Trending,
    Volatile,
    Crisis,
    Recovery,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Calm => "calm",
            Regime::Trending => "trending",
            Regime::Volatile => "volatile",
            Regime::Crisis => "crisis",
            Regime::Recovery => "recovery",
        }
    }
}

/// A named historical era with an expected regime and event tags.
#[derive(Debug, Clone)]
pub struct Era {
    pub name: &'static str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub regime: Regime,
    pub tags: &'static [&'static str],
}

/// A known market-stress date. The planner samples the containing week
/// plus the following week to capture recovery behavior.
#[derive(Debug, Clone)]
pub struct StressEvent {
    pub name: &'static str,
    pub date: NaiveDate,
    pub regime: Regime,
    pub tags: &'static [&'static str],
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("valid table date")
}

/// Named eras, ascending and non-overlapping, 2000–2025.
pub fn eras() -> Vec<Era> {
    vec![
        Era { name: "dotcom_bust", start: d(2000, 3, 27), end: d(2002, 10, 7), regime: Regime::Crisis, tags: &["tech_bust"] },
        Era { name: "post_bust_recovery", start: d(2002, 10, 14), end: d(2003, 12, 29), regime: Regime::Recovery, tags: &["early_bull"] },
        Era { name: "mid_cycle_calm", start: d(2004, 1, 5), end: d(2007, 2, 19), regime: Regime::Calm, tags: &["low_vol"] },
        Era { name: "credit_stress", start: d(2007, 2, 26), end: d(2008, 8, 29), regime: Regime::Volatile, tags: &["credit_crunch"] },
        Era { name: "financial_crisis", start: d(2008, 9, 1), end: d(2009, 3, 9), regime: Regime::Crisis, tags: &["gfc"] },
        Era { name: "gfc_recovery", start: d(2009, 3, 16), end: d(2011, 4, 25), regime: Regime::Recovery, tags: &["qe1"] },
        Era { name: "euro_crisis", start: d(2011, 5, 2), end: d(2012, 7, 23), regime: Regime::Volatile, tags: &["eurozone"] },
        Era { name: "qe_bull", start: d(2012, 7, 30), end: d(2015, 8, 10), regime: Regime::Trending, tags: &["qe"] },
        Era { name: "china_vol", start: d(2015, 8, 17), end: d(2016, 6, 27), regime: Regime::Volatile, tags: &["china", "brexit"] },
        Era { name: "low_vol_grind", start: d(2016, 7, 4), end: d(2018, 1, 29), regime: Regime::Calm, tags: &["short_vol"] },
        Era { name: "vol_normalization", start: d(2018, 2, 5), end: d(2019, 12, 30), regime: Regime::Volatile, tags: &["volmageddon", "rate_hikes"] },
        Era { name: "covid_crash", start: d(2020, 1, 6), end: d(2020, 4, 27), regime: Regime::Crisis, tags: &["pandemic"] },
        Era { name: "stimulus_bull", start: d(2020, 5, 4), end: d(2021, 12, 27), regime: Regime::Trending, tags: &["stimulus", "meme"] },
        Era { name: "inflation_bear", start: d(2022, 1, 3), end: d(2022, 12, 26), regime: Regime::Volatile, tags: &["rate_shock"] },
        Era { name: "ai_bull", start: d(2023, 1, 2), end: d(2025, 12, 29), regime: Regime::Trending, tags: &["ai_rally"] },
    ]
}

/// Known stress events, ascending.
pub fn stress_events() -> Vec<StressEvent> {
    vec![
        StressEvent { name: "dotcom_peak", date: d(2000, 3, 10), regime: Regime::Volatile, tags: &["tech_bust"] },
        StressEvent { name: "sept11_reopen", date: d(2001, 9, 17), regime: Regime::Crisis, tags: &["terror_shock"] },
        StressEvent { name: "lehman", date: d(2008, 9, 15), regime: Regime::Crisis, tags: &["gfc"] },
        StressEvent { name: "flash_crash", date: d(2010, 5, 6), regime: Regime::Volatile, tags: &["liquidity"] },
        StressEvent { name: "us_downgrade", date: d(2011, 8, 5), regime: Regime::Crisis, tags: &["eurozone", "downgrade"] },
        StressEvent { name: "china_deval", date: d(2015, 8, 24), regime: Regime::Volatile, tags: &["china"] },
        StressEvent { name: "brexit_vote", date: d(2016, 6, 24), regime: Regime::Volatile, tags: &["brexit"] },
        StressEvent { name: "volmageddon", date: d(2018, 2, 5), regime: Regime::Crisis, tags: &["short_vol", "volmageddon"] },
        StressEvent { name: "christmas_selloff", date: d(2018, 12, 24), regime: Regime::Volatile, tags: &["rate_hikes"] },
        StressEvent { name: "covid_selloff", date: d(2020, 2, 24), regime: Regime::Crisis, tags: &["pandemic"] },
        StressEvent { name: "covid_circuit_breakers", date: d(2020, 3, 16), regime: Regime::Crisis, tags: &["pandemic", "circuit_breaker"] },
        StressEvent { name: "meme_squeeze", date: d(2021, 1, 27), regime: Regime::Volatile, tags: &["meme", "gamma_squeeze"] },
        StressEvent { name: "cpi_shock", date: d(2022, 6, 13), regime: Regime::Volatile, tags: &["rate_shock"] },
        StressEvent { name: "svb_failure", date: d(2023, 3, 10), regime: Regime::Crisis, tags: &["bank_stress"] },
        StressEvent { name: "yen_carry_unwind", date: d(2024, 8, 5), regime: Regime::Volatile, tags: &["carry_unwind"] },
    ]
}

/// Curated crisis weeks for the StressTest strategy: the worst weeks the
/// dataset is expected to contain, each already normalized to its Monday.
pub fn crisis_weeks() -> Vec<(NaiveDate, &'static str)> {
    vec![
        (week_start(d(2001, 9, 17)), "sept11_reopen"),
        (week_start(d(2008, 9, 15)), "lehman"),
        (week_start(d(2008, 10, 6)), "gfc_panic"),
        (week_start(d(2010, 5, 6)), "flash_crash"),
        (week_start(d(2011, 8, 8)), "us_downgrade"),
        (week_start(d(2015, 8, 24)), "china_deval"),
        (week_start(d(2018, 2, 5)), "volmageddon"),
        (week_start(d(2020, 3, 9)), "covid_waterfall"),
        (week_start(d(2020, 3, 16)), "covid_circuit_breakers"),
        (week_start(d(2022, 6, 13)), "cpi_shock"),
        (week_start(d(2023, 3, 13)), "bank_stress"),
        (week_start(d(2024, 8, 5)), "yen_carry_unwind"),
    ]
}

/// Seasonal anchor weeks for every year in `[start_year, end_year]`:
/// the first ISO week of January, the quad-witching weeks (third Friday of
/// Mar/Jun/Sep/Dec), and the week containing December 25.
pub fn seasonal_anchor_weeks(start_year: i32, end_year: i32) -> Vec<(NaiveDate, &'static str)> {
    let mut weeks = Vec::new();
    for year in start_year..=end_year {
        // ISO week 1 always contains January 4.
        weeks.push((week_start(d(year, 1, 4)), "january_open"));
        for month in [3u32, 6, 9, 12] {
            weeks.push((week_start(third_friday(year, month)), "quad_witching"));
        }
        weeks.push((week_start(d(year, 12, 25)), "holiday_week"));
    }
    weeks
}

/// Era containing `date`, if any.
pub fn era_for(date: NaiveDate) -> Option<Era> {
    eras().into_iter().find(|e| e.start <= date && date <= e.end)
}

/// Regime for a date: its era's regime, or `Calm` outside the table.
pub fn regime_for(date: NaiveDate) -> Regime {
    era_for(date).map(|e| e.regime).unwrap_or(Regime::Calm)
}
