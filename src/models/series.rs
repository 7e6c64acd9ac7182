// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Series, season and race week records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statically tracked series (catalog entry, seeded by an operator).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    /// Canonical series ID (also used as document ID)
    pub series_id: i64,
    /// Display name
    pub name: String,
    pub short_name: String,
    /// Regular expression matched against a season's display name
    pub pattern: String,
}

/// One week of a season's published schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub race_week: i64,
    pub track_id: i64,
    pub track_name: String,
    #[serde(default)]
    pub config_name: Option<String>,
    /// First day of the week (YYYY-MM-DD), when published
    #[serde(default)]
    pub start_date: Option<String>,
}

/// A series instantiated for one year/quarter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Season {
    pub series_id: i64,
    /// Globally unique season ID (also used as document ID)
    pub season_id: i64,
    pub year: i32,
    /// 1-4
    pub quarter: i32,
    pub category: String,
    pub season_name: String,
    pub season_short_name: String,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    /// When this record was last rewritten
    pub updated_at: DateTime<Utc>,
}

/// A week-long slot (0-12) within a season.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaceWeek {
    pub season_id: i64,
    pub week: i64,
    pub track_id: i64,
}

impl RaceWeek {
    /// Natural key, unique per (season, week).
    pub fn key(&self) -> String {
        race_week_key(self.season_id, self.week)
    }
}

/// Document ID for a race week.
pub fn race_week_key(season_id: i64, week: i64) -> String {
    format!("{}_{}", season_id, week)
}
