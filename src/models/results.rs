// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Race results: per-week subsession list, per-subsession stats and
//! per-driver rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lap time in ten-thousandths of a second, the unit the remote service uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Laptime(pub i64);

impl Laptime {
    pub fn from_millis(millis: i64) -> Self {
        Laptime(millis * 10)
    }

    /// Unset lap times are reported as zero or negative.
    pub fn is_set(&self) -> bool {
        self.0 > 0
    }

    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::microseconds(self.0.max(0) * 100)
    }
}

impl fmt::Display for Laptime {
    /// Renders as `m:ss.mmm`, e.g. `1:28.514`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_set() {
            return write!(f, "-");
        }
        let millis = self.0 / 10;
        let minutes = millis / 60_000;
        let seconds = (millis % 60_000) / 1000;
        let rest = millis % 1000;
        write!(f, "{}:{:02}.{:03}", minutes, seconds, rest)
    }
}

/// One subsession held during a race week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceWeekResult {
    pub season_id: i64,
    pub week: i64,
    /// Globally unique subsession ID (also used as document ID)
    pub subsession_id: i64,
    pub session_id: i64,
    pub car_class_id: i64,
    pub track_id: i64,
    pub official: bool,
    pub size_of_field: i64,
    pub strength_of_field: i64,
    pub start_time: DateTime<Utc>,
}

/// Per-subsession race aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceStats {
    /// Document ID
    pub subsession_id: i64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub simulated_start_time: Option<DateTime<Utc>>,
    pub lead_changes: i64,
    pub laps: i64,
    pub cautions: i64,
    pub caution_laps: i64,
    pub corners_per_lap: i64,
    pub avg_laptime: Laptime,
    pub avg_quali_laps: i64,
    pub weather_rh: i64,
    pub weather_temp: i64,
}

impl RaceStats {
    /// Whether enough wall-clock time has passed since the start that the
    /// result can no longer change.
    ///
    /// A race counts as settled once `avg_laptime * laps * multiplier` has
    /// elapsed. Records without laps are never settled; an unset average
    /// lap time makes the window zero.
    pub fn is_settled(&self, now: DateTime<Utc>, multiplier: f64) -> bool {
        if self.laps <= 0 {
            return false;
        }
        let race_micros = self.avg_laptime.as_duration().num_microseconds().unwrap_or(i64::MAX) as f64
            * self.laps as f64
            * multiplier;
        let elapsed = now.signed_duration_since(self.start_time);
        let elapsed_micros = elapsed.num_microseconds().unwrap_or(i64::MAX) as f64;
        elapsed_micros > race_micros
    }
}

/// Per-(subsession, driver) race row. Insert-once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceResult {
    pub subsession_id: i64,
    pub driver_id: i64,
    pub car_id: i64,
    pub car_class_id: i64,
    pub car_number: String,
    pub irating_before: i64,
    pub irating_after: i64,
    pub license_level_before: i64,
    pub license_level_after: i64,
    pub safety_rating_before: i64,
    pub safety_rating_after: i64,
    pub cpi_before: f64,
    pub cpi_after: f64,
    pub aggregate_champ_points: i64,
    pub champ_points: i64,
    pub club_points: i64,
    pub starting_position: i64,
    pub position: i64,
    pub finishing_position: i64,
    pub finishing_position_in_class: i64,
    pub division: i64,
    pub interval: i64,
    pub class_interval: i64,
    pub avg_laptime: Laptime,
    pub best_laptime: Laptime,
    pub laps_completed: i64,
    pub laps_led: i64,
    pub incidents: i64,
    pub reason_out: String,
}

impl RaceResult {
    /// Natural key, unique per (subsession, driver).
    pub fn key(&self) -> String {
        race_result_key(self.subsession_id, self.driver_id)
    }
}

pub fn race_result_key(subsession_id: i64, driver_id: i64) -> String {
    format!("{}_{}", subsession_id, driver_id)
}
