// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync engine.
//!
//! One sequential loop: refresh the catalogs (on forced cycles), match the
//! current seasons against the tracked series, then collect the active and
//! the previous race week of each match. Record-level failures are counted
//! and skipped; `Auth` and `Schema` errors end the loop.

use crate::config::SyncSettings;
use crate::db::Store;
use crate::error::AppError;
use crate::models::{
    Club, Driver, RaceWeek, RaceWeekResult, ScheduleEntry, Season, Series, TimeRanking,
    TimeTrialResult,
};
use crate::services::clock::Clock;
use crate::services::iracing::{DriverRaceRow, IracingClient, RemoteRaceWeekResult, RemoteSeason};
use crate::services::legacy::{TtStandingRow, WorldRecordRow};
use crate::services::metrics::{Counter, MetricsSink};
use crate::services::policy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Drives collection from the remote service into the store.
pub struct Collector {
    client: IracingClient,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    settings: SyncSettings,
}

impl Collector {
    pub fn new(
        client: IracingClient,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            client,
            store,
            clock,
            metrics,
            settings,
        }
    }

    /// Collect forever. Only returns on a fatal error.
    ///
    /// A forced cycle stays armed until it has refreshed the catalog.
    pub async fn run(&self) -> Result<(), AppError> {
        let mut forced = true;
        let mut cycles: u32 = 0;

        loop {
            tracing::info!(forced, "Starting collection cycle");
            let catalog_refreshed = forced && self.refresh_catalog_logged().await?;

            if let Err(e) = self.collect_seasons(forced).await {
                if e.is_fatal() {
                    tracing::error!(error = %e, "Fatal collector error");
                    return Err(e);
                }
                self.metrics.incr(Counter::CollectorError);
                tracing::error!(error = %e, "Collection cycle aborted");
            }

            if catalog_refreshed {
                forced = false;
            }
            self.clock.sleep(self.settings.cycle_interval).await;

            cycles += 1;
            if cycles >= self.settings.forced_resync_every {
                cycles = 0;
                forced = true;
            }
        }
    }

    /// One pass over catalogs (when forced) and tracked seasons.
    pub async fn run_cycle(&self, forced: bool) -> Result<(), AppError> {
        if forced {
            self.refresh_catalog_logged().await?;
        }
        self.collect_seasons(forced).await
    }

    /// Refresh the catalog; a non-fatal failure is counted and reported
    /// as `false` so the season step still runs.
    async fn refresh_catalog_logged(&self) -> Result<bool, AppError> {
        match self.refresh_catalog().await {
            Ok(()) => Ok(true),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.metrics.incr(Counter::CollectorError);
                tracing::error!(error = %e, "Catalog refresh failed");
                Ok(false)
            }
        }
    }

    /// Match the current seasons against the tracked series and collect each.
    pub async fn collect_seasons(&self, forced: bool) -> Result<(), AppError> {
        let seasons = self.client.get_current_seasons().await?;
        if seasons.is_empty() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "season catalog is empty"
            )));
        }

        let tracked = self.store.list_tracked_series().await?;
        for series in &tracked {
            let pattern = match Regex::new(&series.pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(series_id = series.series_id, error = %e, "Invalid series pattern");
                    None
                }
            };

            for remote in seasons.iter().filter(|s| {
                s.series_id == series.series_id
                    || pattern.as_ref().is_some_and(|re| re.is_match(&s.season_name))
            }) {
                if let Err(e) = self.process_season(series, remote, forced).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    self.metrics.incr(Counter::CollectorError);
                    tracing::error!(
                        season_id = remote.season_id,
                        error = %e,
                        "Could not process season"
                    );
                }
            }
        }
        Ok(())
    }

    /// Full-table refresh of tracks, cars and car classes.
    pub async fn refresh_catalog(&self) -> Result<(), AppError> {
        let tracks = self.client.get_tracks().await?;
        self.metrics.set(Counter::TracksSeen, tracks.len() as u64);
        for track in &tracks {
            if let Err(e) = self.store.upsert_track(track).await {
                self.skip_record("track", track.track_id, &e);
            }
        }

        let cars = self.client.get_cars().await?;
        self.metrics.set(Counter::CarsSeen, cars.len() as u64);
        for car in &cars {
            if let Err(e) = self.store.upsert_car(car).await {
                self.skip_record("car", car.car_id, &e);
            }
        }

        let classes = self.client.get_car_classes().await?;
        for class in &classes {
            if let Err(e) = self.store.upsert_car_class(class).await {
                self.skip_record("car class", class.car_class_id, &e);
            }
        }

        tracing::info!(
            tracks = tracks.len(),
            cars = cars.len(),
            car_classes = classes.len(),
            "Catalog refreshed"
        );
        Ok(())
    }

    async fn process_season(
        &self,
        series: &Series,
        remote: &RemoteSeason,
        forced: bool,
    ) -> Result<(), AppError> {
        let season = self.upsert_season(series, remote).await?;
        tracing::info!(
            season_id = season.season_id,
            year = season.year,
            quarter = season.quarter,
            week = remote.race_week,
            "Processing season"
        );

        self.collect_week_logged(season.season_id, remote.race_week, forced)
            .await?;

        if remote.race_week > 0 {
            self.collect_week_logged(season.season_id, remote.race_week - 1, forced)
                .await
        } else {
            let (year, quarter) = policy::previous_quarter(season.year, season.quarter);
            let previous = self
                .store
                .list_seasons_by_series(series.series_id)
                .await?
                .into_iter()
                .find(|s| s.year == year && s.quarter == quarter);
            match previous {
                Some(previous) => {
                    self.collect_week_logged(
                        previous.season_id,
                        policy::LAST_WEEK_OF_PREVIOUS_SEASON,
                        forced,
                    )
                    .await
                }
                None => {
                    tracing::warn!(
                        series_id = series.series_id,
                        year,
                        quarter,
                        "Previous season not found"
                    );
                    Ok(())
                }
            }
        }
    }

    /// Store season metadata unless the stored copy is recent and complete.
    async fn upsert_season(&self, series: &Series, remote: &RemoteSeason) -> Result<Season, AppError> {
        let now = self.clock.now();
        let stored = self.store.get_season(remote.season_id).await?;
        if let Some(season) = stored.as_ref() {
            if !policy::season_needs_refresh(Some(season), now, self.settings.season_refresh_after) {
                return Ok(season.clone());
            }
        }

        let (year, quarter) = policy::season_year_quarter(&remote.season_short_name, now);
        let season = Season {
            series_id: series.series_id,
            season_id: remote.season_id,
            year,
            quarter,
            category: remote.category(),
            season_name: remote.season_name.clone(),
            season_short_name: remote.season_short_name.clone(),
            schedule: remote
                .schedules
                .iter()
                .map(|s| ScheduleEntry {
                    race_week: s.race_week_num,
                    track_id: s.track.track_id,
                    track_name: s.track.track_name.clone(),
                    config_name: s.track.config_name.clone(),
                    start_date: s.start_date.clone(),
                })
                .collect(),
            updated_at: now,
        };
        self.store.upsert_season(&season).await?;
        tracing::debug!(season_id = season.season_id, "Season stored");
        Ok(season)
    }

    /// Week-level failures are logged; only fatal errors propagate.
    async fn collect_week_logged(&self, season_id: i64, week: i64, forced: bool) -> Result<(), AppError> {
        match self.collect_race_week(season_id, week, forced).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e @ AppError::EmptyResultSet { .. }) => {
                self.metrics.incr(Counter::EmptyResultSet);
                tracing::warn!(error = %e, "Skipping race week");
                Ok(())
            }
            Err(e) => {
                self.metrics.incr(Counter::CollectorError);
                tracing::error!(season_id, week, error = %e, "Could not collect race week");
                Ok(())
            }
        }
    }

    /// Collect every week of a stored season.
    pub async fn collect_season(&self, season_id: i64, forced: bool) -> Result<(), AppError> {
        if self.store.get_season(season_id).await?.is_none() {
            return Err(AppError::NotFound(format!("season {}", season_id)));
        }
        for week in 0..=policy::MAX_RACE_WEEK {
            self.collect_week_logged(season_id, week, forced).await?;
        }
        Ok(())
    }

    /// Collect results, details and standings of one race week.
    pub async fn collect_race_week(&self, season_id: i64, week: i64, forced: bool) -> Result<(), AppError> {
        if !policy::is_valid_week(week) {
            return Err(AppError::BadRequest(format!("week {} is invalid", week)));
        }
        let season = self
            .store
            .get_season(season_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("season {}", season_id)))?;
        tracing::info!(season_id, week, "Collecting race week");

        let results = self.client.get_race_week_results(season_id, week).await?;
        let Some(first) = results.first() else {
            return Err(AppError::EmptyResultSet { season_id, week });
        };

        let race_week = self
            .store
            .insert_race_week(&RaceWeek {
                season_id,
                week,
                track_id: first.track.track_id,
            })
            .await?;

        let mut car_classes = BTreeSet::new();
        for result in &results {
            car_classes.insert(result.car_class_id);
            if let Err(e) = self.store_race_week_result(&race_week, result).await {
                self.skip_record("race week result", result.subsession_id, &e);
                continue;
            }
            if !result.official_session {
                continue;
            }
            if let Err(e) = self.collect_subsession(result.subsession_id, forced).await {
                if e.is_fatal() {
                    return Err(e);
                }
                self.metrics.incr(Counter::CollectorError);
                tracing::error!(subsession_id = result.subsession_id, error = %e, "Could not collect subsession");
            }
        }

        for car_class_id in car_classes {
            if let Err(e) = self.collect_standings(&season, &race_week, car_class_id).await {
                if e.is_fatal() {
                    return Err(e);
                }
                self.metrics.incr(Counter::CollectorError);
                tracing::error!(car_class_id, error = %e, "Could not collect standings");
            }
        }
        Ok(())
    }

    async fn store_race_week_result(
        &self,
        race_week: &RaceWeek,
        result: &RemoteRaceWeekResult,
    ) -> Result<(), AppError> {
        self.store
            .upsert_race_week_result(&RaceWeekResult {
                season_id: race_week.season_id,
                week: race_week.week,
                subsession_id: result.subsession_id,
                session_id: result.session_id,
                car_class_id: result.car_class_id,
                track_id: result.track.track_id,
                official: result.official_session,
                size_of_field: result.num_drivers,
                strength_of_field: result.event_strength_of_field,
                start_time: result.start_time,
            })
            .await
    }

    /// Race stats and per-driver rows of one official subsession.
    async fn collect_subsession(&self, subsession_id: i64, forced: bool) -> Result<(), AppError> {
        let existing = self.store.get_race_stats(subsession_id).await?;
        if !policy::needs_detail_fetch(
            existing.as_ref(),
            forced,
            self.clock.now(),
            self.settings.staleness_multiplier,
        ) {
            tracing::debug!(subsession_id, "Race already settled, skipping");
            return Ok(());
        }

        let detail = self.client.get_subsession_result(subsession_id).await?;
        if detail.stats.laps <= 0 {
            self.metrics.incr(Counter::RecordSkipped);
            tracing::warn!(subsession_id, laps = detail.stats.laps, "Race without laps, skipping");
            return Ok(());
        }
        self.store.insert_race_stats(&detail.stats, forced).await?;

        for row in detail.race_rows {
            let outcome = match row {
                Ok(row) => self.store_driver_row(&row).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                self.skip_record("race result", subsession_id, &e);
            }
        }
        Ok(())
    }

    async fn store_driver_row(&self, row: &DriverRaceRow) -> Result<(), AppError> {
        self.store.upsert_club(&row.club).await?;
        self.store.upsert_driver(&row.driver).await?;
        if !self.store.insert_race_result(&row.result).await? {
            tracing::debug!(
                subsession_id = row.result.subsession_id,
                driver_id = row.result.driver_id,
                "Race result already stored"
            );
        }
        Ok(())
    }

    async fn upsert_driver_and_club(
        &self,
        driver_id: i64,
        driver_name: &str,
        club_id: i64,
        club_name: &str,
    ) -> Result<(), AppError> {
        self.store
            .upsert_club(&Club {
                club_id,
                name: club_name.to_string(),
            })
            .await?;
        self.store
            .upsert_driver(&Driver {
                driver_id,
                name: driver_name.to_string(),
                club_id,
            })
            .await
    }

    /// Time rankings for every car of the class, then its time trial standings.
    ///
    /// Rankings need the class's car list; standings only need its ID.
    async fn collect_standings(
        &self,
        season: &Season,
        race_week: &RaceWeek,
        car_class_id: i64,
    ) -> Result<(), AppError> {
        match self.store.get_car_class(car_class_id).await? {
            Some(car_class) => {
                for &car_id in &car_class.cars_in_class {
                    self.collect_time_rankings(season, race_week, car_id).await?;
                }
            }
            None => tracing::warn!(car_class_id, "Unknown car class, skipping time rankings"),
        }

        let rows = self
            .client
            .get_time_trial_results(race_week.season_id, car_class_id, race_week.week)
            .await?;
        for row in rows {
            let outcome = match row {
                Ok(row) => self.store_time_trial_result(race_week, car_class_id, row).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                self.skip_record("time trial result", car_class_id, &e);
            }
        }
        Ok(())
    }

    async fn collect_time_rankings(
        &self,
        season: &Season,
        race_week: &RaceWeek,
        car_id: i64,
    ) -> Result<(), AppError> {
        let rows = self
            .client
            .get_time_rankings(season.year, season.quarter, car_id, race_week.track_id)
            .await?;
        for row in rows {
            let outcome = match row {
                Ok(row) => self.store_time_ranking(race_week, car_id, row).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                self.skip_record("time ranking", car_id, &e);
            }
        }
        Ok(())
    }

    async fn store_time_ranking(
        &self,
        race_week: &RaceWeek,
        car_id: i64,
        row: WorldRecordRow,
    ) -> Result<(), AppError> {
        self.upsert_driver_and_club(row.driver_id, &row.driver_name, row.club_id, &row.club_name)
            .await?;
        self.store
            .upsert_time_ranking(&TimeRanking {
                season_id: race_week.season_id,
                week: race_week.week,
                driver_id: row.driver_id,
                car_id,
                track_id: race_week.track_id,
                time_trial: row.time_trial,
                time_trial_subsession_id: row.time_trial_subsession_id,
                time_trial_start_time: row.time_trial_start_time,
                race: row.race,
                license_class: row.license_class,
                irating: row.irating,
            })
            .await
    }

    async fn store_time_trial_result(
        &self,
        race_week: &RaceWeek,
        car_class_id: i64,
        row: TtStandingRow,
    ) -> Result<(), AppError> {
        self.upsert_driver_and_club(row.driver_id, &row.driver_name, row.club_id, &row.club_name)
            .await?;
        self.store
            .upsert_time_trial_result(&TimeTrialResult {
                season_id: race_week.season_id,
                week: race_week.week,
                driver_id: row.driver_id,
                car_class_id,
                rank: row.rank,
                position: row.position,
                points: row.points,
                starts: row.starts,
                wins: row.wins,
                weeks: row.weeks,
                dropped: row.dropped,
                division: row.division,
            })
            .await
    }

    fn skip_record(&self, kind: &'static str, id: i64, error: &AppError) {
        self.metrics.incr(Counter::RecordSkipped);
        tracing::error!(kind, id, error = %error, "Skipping record");
    }
}
