// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory [`Store`] for tests and local dry runs.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{
    race_result_key, race_week_key, Car, CarClass, Club, Driver, RaceResult, RaceStats, RaceWeek,
    RaceWeekResult, Season, Series, TimeRanking, TimeTrialResult, Track,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Same keys and write semantics as the Firestore store, held in DashMaps.
#[derive(Default)]
pub struct MemoryStore {
    series: DashMap<i64, Series>,
    seasons: DashMap<i64, Season>,
    tracks: DashMap<i64, Track>,
    cars: DashMap<i64, Car>,
    car_classes: DashMap<i64, CarClass>,
    clubs: DashMap<i64, Club>,
    drivers: DashMap<i64, Driver>,
    race_weeks: DashMap<String, RaceWeek>,
    race_week_results: DashMap<i64, RaceWeekResult>,
    race_stats: DashMap<i64, RaceStats>,
    race_results: DashMap<String, RaceResult>,
    time_rankings: DashMap<String, TimeRanking>,
    time_trial_results: DashMap<String, TimeTrialResult>,
}

fn insert_once<K, V>(map: &DashMap<K, V>, key: K, value: &V) -> bool
where
    K: Eq + std::hash::Hash,
    V: Clone,
{
    match map.entry(key) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
            slot.insert(value.clone());
            true
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Inspection (tests, health) ──────────────────────────────

    pub fn race_weeks(&self) -> Vec<RaceWeek> {
        let mut weeks: Vec<_> = self.race_weeks.iter().map(|e| e.value().clone()).collect();
        weeks.sort_by_key(|w| (w.season_id, w.week));
        weeks
    }

    pub fn race_week_results(&self) -> Vec<RaceWeekResult> {
        let mut results: Vec<_> = self
            .race_week_results
            .iter()
            .map(|e| e.value().clone())
            .collect();
        results.sort_by_key(|r| r.subsession_id);
        results
    }

    pub fn race_results(&self) -> Vec<RaceResult> {
        let mut results: Vec<_> = self.race_results.iter().map(|e| e.value().clone()).collect();
        results.sort_by_key(|r| (r.subsession_id, r.driver_id));
        results
    }

    pub fn time_rankings(&self) -> Vec<TimeRanking> {
        let mut rankings: Vec<_> = self.time_rankings.iter().map(|e| e.value().clone()).collect();
        rankings.sort_by_key(|r| (r.season_id, r.week, r.driver_id, r.car_id));
        rankings
    }

    pub fn time_trial_results(&self) -> Vec<TimeTrialResult> {
        let mut results: Vec<_> = self
            .time_trial_results
            .iter()
            .map(|e| e.value().clone())
            .collect();
        results.sort_by_key(|r| (r.season_id, r.week, r.driver_id));
        results
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn driver(&self, driver_id: i64) -> Option<Driver> {
        self.drivers.get(&driver_id).map(|d| d.clone())
    }

    pub fn club(&self, club_id: i64) -> Option<Club> {
        self.clubs.get(&club_id).map(|c| c.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_tracked_series(&self) -> Result<Vec<Series>, AppError> {
        let mut series: Vec<_> = self.series.iter().map(|e| e.value().clone()).collect();
        series.sort_by_key(|s| s.series_id);
        Ok(series)
    }

    async fn upsert_series(&self, series: &Series) -> Result<(), AppError> {
        self.series.insert(series.series_id, series.clone());
        Ok(())
    }

    async fn get_season(&self, season_id: i64) -> Result<Option<Season>, AppError> {
        Ok(self.seasons.get(&season_id).map(|s| s.clone()))
    }

    async fn list_seasons_by_series(&self, series_id: i64) -> Result<Vec<Season>, AppError> {
        let mut seasons: Vec<_> = self
            .seasons
            .iter()
            .filter(|e| e.value().series_id == series_id)
            .map(|e| e.value().clone())
            .collect();
        seasons.sort_by_key(|s| (s.year, s.quarter));
        Ok(seasons)
    }

    async fn upsert_season(&self, season: &Season) -> Result<(), AppError> {
        self.seasons.insert(season.season_id, season.clone());
        Ok(())
    }

    async fn upsert_track(&self, track: &Track) -> Result<(), AppError> {
        self.tracks.insert(track.track_id, track.clone());
        Ok(())
    }

    async fn upsert_car(&self, car: &Car) -> Result<(), AppError> {
        self.cars.insert(car.car_id, car.clone());
        Ok(())
    }

    async fn upsert_car_class(&self, car_class: &CarClass) -> Result<(), AppError> {
        self.car_classes
            .insert(car_class.car_class_id, car_class.clone());
        Ok(())
    }

    async fn get_car_class(&self, car_class_id: i64) -> Result<Option<CarClass>, AppError> {
        Ok(self.car_classes.get(&car_class_id).map(|c| c.clone()))
    }

    async fn upsert_club(&self, club: &Club) -> Result<(), AppError> {
        self.clubs.insert(club.club_id, club.clone());
        Ok(())
    }

    async fn upsert_driver(&self, driver: &Driver) -> Result<(), AppError> {
        self.drivers.insert(driver.driver_id, driver.clone());
        Ok(())
    }

    async fn insert_race_week(&self, race_week: &RaceWeek) -> Result<RaceWeek, AppError> {
        let stored = self
            .race_weeks
            .entry(race_week.key())
            .or_insert_with(|| race_week.clone());
        Ok(stored.clone())
    }

    async fn get_race_week(&self, season_id: i64, week: i64) -> Result<Option<RaceWeek>, AppError> {
        Ok(self
            .race_weeks
            .get(&race_week_key(season_id, week))
            .map(|w| w.clone()))
    }

    async fn upsert_race_week_result(&self, result: &RaceWeekResult) -> Result<(), AppError> {
        self.race_week_results
            .insert(result.subsession_id, result.clone());
        Ok(())
    }

    async fn get_race_stats(&self, subsession_id: i64) -> Result<Option<RaceStats>, AppError> {
        Ok(self.race_stats.get(&subsession_id).map(|s| s.clone()))
    }

    async fn insert_race_stats(&self, stats: &RaceStats, overwrite: bool) -> Result<bool, AppError> {
        if overwrite {
            self.race_stats.insert(stats.subsession_id, stats.clone());
            return Ok(true);
        }
        Ok(insert_once(&self.race_stats, stats.subsession_id, stats))
    }

    async fn insert_race_result(&self, result: &RaceResult) -> Result<bool, AppError> {
        Ok(insert_once(&self.race_results, result.key(), result))
    }

    async fn get_race_result(
        &self,
        subsession_id: i64,
        driver_id: i64,
    ) -> Result<Option<RaceResult>, AppError> {
        Ok(self
            .race_results
            .get(&race_result_key(subsession_id, driver_id))
            .map(|r| r.clone()))
    }

    async fn upsert_time_ranking(&self, ranking: &TimeRanking) -> Result<(), AppError> {
        self.time_rankings.insert(ranking.key(), ranking.clone());
        Ok(())
    }

    async fn upsert_time_trial_result(&self, result: &TimeTrialResult) -> Result<(), AppError> {
        self.time_trial_results.insert(result.key(), result.clone());
        Ok(())
    }
}
