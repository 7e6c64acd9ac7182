// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod rankings;
pub mod reference;
pub mod results;
pub mod series;

pub use rankings::{TimeRanking, TimeTrialResult};
pub use reference::{Car, CarClass, Club, Driver, Track};
pub use results::{race_result_key, Laptime, RaceResult, RaceStats, RaceWeekResult};
pub use series::{race_week_key, RaceWeek, ScheduleEntry, Season, Series};
