// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Standings that keep changing during a season (overwrite semantics).

use super::results::Laptime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fastest-lap ranking of a driver in one car on a race week's track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeRanking {
    pub season_id: i64,
    pub week: i64,
    pub driver_id: i64,
    pub car_id: i64,
    pub track_id: i64,
    pub time_trial: Laptime,
    /// -1 when the driver has no time trial session
    pub time_trial_subsession_id: i64,
    #[serde(default)]
    pub time_trial_start_time: Option<DateTime<Utc>>,
    pub race: Laptime,
    pub license_class: String,
    pub irating: i64,
}

impl TimeRanking {
    pub fn key(&self) -> String {
        format!("{}_{}_{}_{}", self.season_id, self.week, self.driver_id, self.car_id)
    }
}

/// Time trial championship standing for one car class in a race week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeTrialResult {
    pub season_id: i64,
    pub week: i64,
    pub driver_id: i64,
    pub car_class_id: i64,
    pub rank: i64,
    pub position: i64,
    pub points: i64,
    pub starts: i64,
    pub wins: i64,
    pub weeks: i64,
    pub dropped: i64,
    pub division: i64,
}

impl TimeTrialResult {
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.season_id, self.week, self.driver_id, self.car_class_id
        )
    }
}
