// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pure collection policy: season dating, refresh and staleness decisions.

use crate::models::{RaceStats, Season};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Weeks 0-12 of a season.
pub const MAX_RACE_WEEK: i64 = 12;
/// Week collected from the previous quarter when the current week is 0.
pub const LAST_WEEK_OF_PREVIOUS_SEASON: i64 = 11;

const WEEKS_PER_SEASON: i64 = 13;
const SEASONS_PER_YEAR: i64 = 4;
/// First day of 2018 Season 1.
const EPOCH_YEAR: i32 = 2018;

fn season_short_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(20[1-5][0-9]) Season ([1-4])").ok())
        .as_ref()
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 12, 12).unwrap_or_default()
}

pub fn is_valid_week(week: i64) -> bool {
    (0..=MAX_RACE_WEEK).contains(&week)
}

/// Year and quarter from a short display name like `2024 Season 2`.
pub fn parse_season_short_name(short_name: &str) -> Option<(i32, i32)> {
    let caps = season_short_name_pattern()?.captures(short_name)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let quarter = caps.get(2)?.as_str().parse().ok()?;
    Some((year, quarter))
}

/// Year and quarter derived from the calendar alone, counting fixed
/// 13-week seasons from the 2018 Season 1 start.
pub fn quarter_from_epoch(now: DateTime<Utc>) -> (i32, i32) {
    let days = (now.date_naive() - epoch()).num_days().max(0);
    let seasons = days / 7 / WEEKS_PER_SEASON;
    let years = seasons / SEASONS_PER_YEAR;
    let year = EPOCH_YEAR + years as i32;
    let quarter = (seasons % SEASONS_PER_YEAR) as i32 + 1;
    (year, quarter)
}

/// Parsed year/quarter, or the epoch computation when the name is
/// missing or implausible.
pub fn season_year_quarter(short_name: &str, now: DateTime<Utc>) -> (i32, i32) {
    match parse_season_short_name(short_name) {
        Some((year, quarter)) if year >= 2010 && (1..=4).contains(&quarter) => (year, quarter),
        _ => {
            let (year, quarter) = quarter_from_epoch(now);
            tracing::debug!(short_name, year, quarter, "Season dated from epoch");
            (year, quarter)
        }
    }
}

/// The quarter before `(year, quarter)`, wrapping Q1 into Q4 of the prior year.
pub fn previous_quarter(year: i32, quarter: i32) -> (i32, i32) {
    if quarter <= 1 {
        (year - 1, 4)
    } else {
        (year, quarter - 1)
    }
}

/// Whether stored season metadata has to be rewritten.
pub fn season_needs_refresh(
    stored: Option<&Season>,
    now: DateTime<Utc>,
    max_age: chrono::Duration,
) -> bool {
    match stored {
        None => true,
        Some(season) => season.schedule.is_empty() || now - season.updated_at > max_age,
    }
}

/// Whether a subsession's detailed result must be (re)fetched.
///
/// Settled races are never fetched again unless forced.
pub fn needs_detail_fetch(
    existing: Option<&RaceStats>,
    forced: bool,
    now: DateTime<Utc>,
    multiplier: f64,
) -> bool {
    if forced {
        return true;
    }
    match existing {
        Some(stats) => !stats.is_settled(now, multiplier),
        None => true,
    }
}
