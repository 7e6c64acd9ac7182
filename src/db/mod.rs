//! Persistence layer.
//!
//! The collector only talks to the [`Store`] trait. Natural keys from the
//! remote service double as document IDs, so uniqueness per (season, week),
//! per subsession and per (subsession, driver) is enforced by the key.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{
    Car, CarClass, Club, Driver, RaceResult, RaceStats, RaceWeek, RaceWeekResult, Season, Series,
    TimeRanking, TimeTrialResult, Track,
};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const SERIES: &str = "series";
    pub const SEASONS: &str = "seasons";
    pub const TRACKS: &str = "tracks";
    pub const CARS: &str = "cars";
    pub const CAR_CLASSES: &str = "car_classes";
    /// Keyed by `{season_id}_{week}`
    pub const RACE_WEEKS: &str = "race_weeks";
    /// Keyed by subsession ID
    pub const RACE_WEEK_RESULTS: &str = "race_week_results";
    /// Keyed by subsession ID, insert-once
    pub const RACE_STATS: &str = "race_stats";
    /// Keyed by `{subsession_id}_{driver_id}`, insert-once
    pub const RACE_RESULTS: &str = "race_results";
    pub const CLUBS: &str = "clubs";
    pub const DRIVERS: &str = "drivers";
    pub const TIME_RANKINGS: &str = "time_rankings";
    pub const TIME_TRIAL_RESULTS: &str = "time_trial_results";
}

/// Storage operations used by the collector.
///
/// `upsert_*` overwrite, `insert_*` never replace an existing record and
/// report whether anything was written.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Series & seasons ────────────────────────────────────────

    async fn list_tracked_series(&self) -> Result<Vec<Series>, AppError>;
    async fn upsert_series(&self, series: &Series) -> Result<(), AppError>;

    async fn get_season(&self, season_id: i64) -> Result<Option<Season>, AppError>;
    async fn list_seasons_by_series(&self, series_id: i64) -> Result<Vec<Season>, AppError>;
    async fn upsert_season(&self, season: &Season) -> Result<(), AppError>;

    // ─── Catalog ─────────────────────────────────────────────────

    async fn upsert_track(&self, track: &Track) -> Result<(), AppError>;
    async fn upsert_car(&self, car: &Car) -> Result<(), AppError>;
    async fn upsert_car_class(&self, car_class: &CarClass) -> Result<(), AppError>;
    async fn get_car_class(&self, car_class_id: i64) -> Result<Option<CarClass>, AppError>;
    async fn upsert_club(&self, club: &Club) -> Result<(), AppError>;
    async fn upsert_driver(&self, driver: &Driver) -> Result<(), AppError>;

    // ─── Race weeks ──────────────────────────────────────────────

    /// Insert the race week if absent; returns the stored record.
    async fn insert_race_week(&self, race_week: &RaceWeek) -> Result<RaceWeek, AppError>;
    async fn get_race_week(&self, season_id: i64, week: i64) -> Result<Option<RaceWeek>, AppError>;
    async fn upsert_race_week_result(&self, result: &RaceWeekResult) -> Result<(), AppError>;

    // ─── Race details ────────────────────────────────────────────

    async fn get_race_stats(&self, subsession_id: i64) -> Result<Option<RaceStats>, AppError>;
    /// Insert-once unless `overwrite` is set.
    async fn insert_race_stats(&self, stats: &RaceStats, overwrite: bool) -> Result<bool, AppError>;
    async fn insert_race_result(&self, result: &RaceResult) -> Result<bool, AppError>;
    async fn get_race_result(
        &self,
        subsession_id: i64,
        driver_id: i64,
    ) -> Result<Option<RaceResult>, AppError>;

    // ─── Standings ───────────────────────────────────────────────

    async fn upsert_time_ranking(&self, ranking: &TimeRanking) -> Result<(), AppError>;
    async fn upsert_time_trial_result(&self, result: &TimeTrialResult) -> Result<(), AppError>;
}
