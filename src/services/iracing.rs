// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed client for the remote racing statistics service.
//!
//! Handles:
//! - Season catalog, race week result lists and subsession results
//!   (data API, behind cached links and chunk manifests)
//! - Track, car and car class catalogs with their image assets
//! - Time rankings and time trial standings (legacy member site)
//!
//! Callers never see which API generation served a response.

use crate::config::ApiEndpoints;
use crate::error::AppError;
use crate::models::{Car, CarClass, Club, Driver, Laptime, RaceResult, RaceStats, Track};
use crate::services::legacy::{self, TtStandingRow, WorldRecordRow};
use crate::services::resolver::Resolver;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// Event type of race sessions in result searches.
const EVENT_TYPE_RACE: i64 = 5;
/// Row limits of the two world record queries.
const TIME_TRIAL_RANKING_LIMIT: u32 = 33;
const RACE_RANKING_LIMIT: u32 = 44;

// ─── Data API payloads ───────────────────────────────────────────

/// One entry of the current season catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSeason {
    pub season_id: i64,
    pub series_id: i64,
    pub season_name: String,
    #[serde(default)]
    pub season_short_name: String,
    /// Currently active race week
    #[serde(default)]
    pub race_week: i64,
    #[serde(default)]
    pub track_types: Vec<RemoteTrackType>,
    #[serde(default)]
    pub schedules: Vec<RemoteSchedule>,
}

impl RemoteSeason {
    /// Category as used by the catalog (`road`, `oval`, ...).
    pub fn category(&self) -> String {
        self.track_types
            .first()
            .map(|t| t.track_type.to_lowercase())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTrackType {
    pub track_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSchedule {
    pub race_week_num: i64,
    pub track: RemoteTrackRef,
    #[serde(default)]
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTrackRef {
    pub track_id: i64,
    #[serde(default)]
    pub track_name: String,
    #[serde(default)]
    pub config_name: Option<String>,
}

/// One subsession found by a race week result search.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRaceWeekResult {
    pub session_id: i64,
    pub subsession_id: i64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub official_session: bool,
    #[serde(default)]
    pub event_strength_of_field: i64,
    #[serde(default)]
    pub num_drivers: i64,
    #[serde(default)]
    pub car_class_id: i64,
    pub track: RemoteTrackRef,
}

#[derive(Debug, Deserialize)]
struct RemoteSubsession {
    subsession_id: i64,
    start_time: DateTime<Utc>,
    #[serde(default)]
    event_average_lap: i64,
    #[serde(default)]
    event_laps_complete: i64,
    #[serde(default)]
    num_cautions: i64,
    #[serde(default)]
    num_caution_laps: i64,
    #[serde(default)]
    num_lead_changes: i64,
    #[serde(default)]
    corners_per_lap: i64,
    #[serde(default)]
    num_laps_for_qual_average: i64,
    #[serde(default)]
    weather: Option<RemoteWeather>,
    #[serde(default)]
    session_results: Vec<RemoteSimSession>,
}

#[derive(Debug, Deserialize)]
struct RemoteWeather {
    #[serde(default)]
    rel_humidity: i64,
    #[serde(default)]
    temp_value: i64,
    #[serde(default)]
    simulated_start_utc_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RemoteSimSession {
    simsession_number: i64,
    #[serde(default)]
    simsession_type_name: String,
    #[serde(default)]
    simsession_name: String,
    /// Kept untyped so one malformed row doesn't sink the others
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

impl RemoteSimSession {
    fn is_race(&self) -> bool {
        self.simsession_number == 0
            && self.simsession_name.eq_ignore_ascii_case("race")
            && self.simsession_type_name.eq_ignore_ascii_case("race")
    }
}

#[derive(Debug, Deserialize)]
struct RemoteDriverRow {
    cust_id: i64,
    display_name: String,
    #[serde(default)]
    club_id: i64,
    #[serde(default)]
    club_name: String,
    #[serde(default)]
    car_id: i64,
    #[serde(default)]
    car_class_id: i64,
    #[serde(default)]
    livery: Option<RemoteLivery>,
    #[serde(default)]
    oldi_rating: i64,
    #[serde(default)]
    newi_rating: i64,
    #[serde(default)]
    old_license_level: i64,
    #[serde(default)]
    new_license_level: i64,
    #[serde(default)]
    old_sub_level: i64,
    #[serde(default)]
    new_sub_level: i64,
    #[serde(default)]
    old_cpi: f64,
    #[serde(default)]
    new_cpi: f64,
    #[serde(default)]
    aggregate_champ_points: i64,
    #[serde(default)]
    champ_points: i64,
    #[serde(default)]
    club_points: i64,
    #[serde(default)]
    starting_position: i64,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    finish_position: i64,
    #[serde(default)]
    finish_position_in_class: i64,
    #[serde(default)]
    division: i64,
    #[serde(default)]
    interval: i64,
    #[serde(default)]
    class_interval: i64,
    #[serde(default)]
    average_lap: i64,
    #[serde(default)]
    best_lap_time: i64,
    #[serde(default)]
    laps_complete: i64,
    #[serde(default)]
    laps_lead: i64,
    #[serde(default)]
    incidents: i64,
    #[serde(default)]
    reason_out: String,
}

#[derive(Debug, Deserialize)]
struct RemoteLivery {
    #[serde(default)]
    car_number: Option<String>,
}

/// A driver's race row together with the reference entities it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverRaceRow {
    pub club: Club,
    pub driver: Driver,
    pub result: RaceResult,
}

/// Detailed result of one subsession.
#[derive(Debug)]
pub struct SubsessionResult {
    pub stats: RaceStats,
    /// Race session rows only; each decoded on its own
    pub race_rows: Vec<Result<DriverRaceRow, AppError>>,
}

#[derive(Debug, Deserialize)]
struct RemoteTrack {
    track_id: i64,
    track_name: String,
    #[serde(default)]
    config_name: Option<String>,
    #[serde(default)]
    category: String,
}

#[derive(Debug, Deserialize)]
struct RemoteCar {
    car_id: i64,
    car_name: String,
    #[serde(default)]
    car_make: Option<String>,
    #[serde(default)]
    car_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteAsset {
    #[serde(default)]
    logo: Option<String>,
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    small_image: Option<String>,
    #[serde(default)]
    large_image: Option<String>,
    #[serde(default)]
    detail_copy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteCarClass {
    car_class_id: i64,
    name: String,
    #[serde(default)]
    short_name: String,
    #[serde(default)]
    cars_in_class: Vec<RemoteCarRef>,
}

#[derive(Debug, Deserialize)]
struct RemoteCarRef {
    car_id: i64,
}

// ─── Client ──────────────────────────────────────────────────────

/// Remote statistics API client.
#[derive(Clone)]
pub struct IracingClient {
    resolver: Resolver,
    endpoints: ApiEndpoints,
}

impl IracingClient {
    pub fn new(resolver: Resolver, endpoints: ApiEndpoints) -> Self {
        Self {
            resolver,
            endpoints,
        }
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.data_base_url, path)
    }

    fn legacy_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.legacy_base_url, path)
    }

    /// All currently active seasons.
    pub async fn get_current_seasons(&self) -> Result<Vec<RemoteSeason>, AppError> {
        tracing::info!("Get current seasons");
        let url = self.data_url("series/seasons?include_series=true");
        let body = self.resolver.follow_link(&url).await?;
        self.resolver.decode(&url, &body)
    }

    /// Race subsessions held in one week of a season.
    pub async fn get_race_week_results(
        &self,
        season_id: i64,
        week: i64,
    ) -> Result<Vec<RemoteRaceWeekResult>, AppError> {
        tracing::info!(season_id, week, "Get race week results");
        let url = self.data_url(&format!(
            "results/search_series?season_id={}&race_week_num={}&event_types={}",
            season_id, week, EVENT_TYPE_RACE
        ));
        self.resolver.follow_chunked(&url).await
    }

    /// Detailed result of one subsession.
    pub async fn get_subsession_result(
        &self,
        subsession_id: i64,
    ) -> Result<SubsessionResult, AppError> {
        tracing::info!(subsession_id, "Get subsession result");
        let url = self.data_url(&format!(
            "results/get?include_licenses=false&subsession_id={}",
            subsession_id
        ));
        let body = self.resolver.follow_link(&url).await?;
        let remote: RemoteSubsession = self.resolver.decode(&url, &body)?;
        Ok(map_subsession(remote))
    }

    /// Full track catalog with image URLs.
    pub async fn get_tracks(&self) -> Result<Vec<Track>, AppError> {
        tracing::info!("Get all tracks");
        let url = self.data_url("track/get");
        let body = self.resolver.follow_link(&url).await?;
        let tracks: Vec<RemoteTrack> = self.resolver.decode(&url, &body)?;

        let url = self.data_url("track/assets");
        let body = self.resolver.follow_link(&url).await?;
        let assets: HashMap<String, RemoteAsset> = self.resolver.decode(&url, &body)?;

        let base = &self.endpoints.asset_base_url;
        Ok(tracks
            .into_iter()
            .map(|t| {
                let asset = assets.get(&t.track_id.to_string());
                Track {
                    track_id: t.track_id,
                    name: t.track_name,
                    config: t.config_name.unwrap_or_default(),
                    category: t.category.to_lowercase(),
                    banner_image: asset_image(base, asset, |a| a.small_image.as_deref()),
                    panel_image: asset_image(base, asset, |a| a.large_image.as_deref()),
                    logo_image: asset_logo(base, asset),
                }
            })
            .collect())
    }

    /// Full car catalog with image URLs.
    pub async fn get_cars(&self) -> Result<Vec<Car>, AppError> {
        tracing::info!("Get all cars");
        let url = self.data_url("car/get");
        let body = self.resolver.follow_link(&url).await?;
        let cars: Vec<RemoteCar> = self.resolver.decode(&url, &body)?;

        let url = self.data_url("car/assets");
        let body = self.resolver.follow_link(&url).await?;
        let assets: HashMap<String, RemoteAsset> = self.resolver.decode(&url, &body)?;

        let base = &self.endpoints.asset_base_url;
        Ok(cars
            .into_iter()
            .map(|c| {
                let asset = assets.get(&c.car_id.to_string());
                Car {
                    car_id: c.car_id,
                    name: c.car_name,
                    description: asset
                        .and_then(|a| a.detail_copy.as_deref())
                        .unwrap_or_default()
                        .replace(['\r', '\n'], ""),
                    make: c.car_make.unwrap_or_default(),
                    model: c.car_model.unwrap_or_default(),
                    panel_image: asset_image(base, asset, |a| a.large_image.as_deref()),
                    logo_image: asset_logo(base, asset),
                    car_image: asset_image(base, asset, |a| a.small_image.as_deref()),
                }
            })
            .collect())
    }

    /// Car class catalog.
    pub async fn get_car_classes(&self) -> Result<Vec<CarClass>, AppError> {
        tracing::info!("Get all car classes");
        let url = self.data_url("carclass/get");
        let body = self.resolver.follow_link(&url).await?;
        let classes: Vec<RemoteCarClass> = self.resolver.decode(&url, &body)?;
        Ok(classes
            .into_iter()
            .map(|c| CarClass {
                car_class_id: c.car_class_id,
                name: c.name,
                short_name: c.short_name,
                cars_in_class: c.cars_in_class.into_iter().map(|r| r.car_id).collect(),
            })
            .collect())
    }

    /// Combined time trial and race lap rankings of one car on one track.
    ///
    /// Queried twice (time trial order, race order) and merged per driver.
    pub async fn get_time_rankings(
        &self,
        year: i32,
        quarter: i32,
        car_id: i64,
        track_id: i64,
    ) -> Result<Vec<Result<WorldRecordRow, AppError>>, AppError> {
        tracing::info!(year, quarter, car_id, track_id, "Get time rankings");
        let time_trial = self
            .world_records(year, quarter, car_id, track_id, "timetrial", TIME_TRIAL_RANKING_LIMIT)
            .await?;
        let race = self
            .world_records(year, quarter, car_id, track_id, "race", RACE_RANKING_LIMIT)
            .await?;
        Ok(merge_rankings(race, time_trial))
    }

    async fn world_records(
        &self,
        year: i32,
        quarter: i32,
        car_id: i64,
        track_id: i64,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<Result<WorldRecordRow, AppError>>, AppError> {
        let url = self.legacy_url(&format!(
            "memberstats/member/GetWorldRecords?seasonyear={}&seasonquarter={}&carid={}&trackid={}&format=json&upperbound={}&sort={}&order=asc",
            year, quarter, car_id, track_id, limit, sort
        ));
        let body = self.resolver.fetch(&url).await?;
        legacy::world_records_v1(&body)
    }

    /// Time trial standings of one car class in one race week.
    pub async fn get_time_trial_results(
        &self,
        season_id: i64,
        car_class_id: i64,
        week: i64,
    ) -> Result<Vec<Result<TtStandingRow, AppError>>, AppError> {
        tracing::info!(season_id, car_class_id, week, "Get time trial results");
        let url = self.legacy_url(&format!(
            "memberstats/member/GetSeasonTTStandings?seasonid={}&clubid=-1&carclassid={}&raceweek={}&division=-1&start=1&end=50&sort=points&order=desc",
            season_id, car_class_id, week
        ));
        let body = self.resolver.fetch(&url).await?;
        legacy::tt_standings_v1(&body)
    }
}

fn asset_logo(base: &str, asset: Option<&RemoteAsset>) -> String {
    asset
        .and_then(|a| a.logo.as_deref())
        .map(|logo| format!("{}{}", base, logo))
        .unwrap_or_default()
}

fn asset_image(
    base: &str,
    asset: Option<&RemoteAsset>,
    pick: impl Fn(&RemoteAsset) -> Option<&str>,
) -> String {
    let Some(asset) = asset else {
        return String::new();
    };
    match (asset.folder.as_deref(), pick(asset)) {
        (Some(folder), Some(file)) => format!("{}{}/{}", base, folder, file),
        _ => String::new(),
    }
}

/// Fold time trial rows into race rows by driver; unmatched time trial
/// rows are appended. Undecodable rows pass through untouched.
fn merge_rankings(
    mut race: Vec<Result<WorldRecordRow, AppError>>,
    time_trial: Vec<Result<WorldRecordRow, AppError>>,
) -> Vec<Result<WorldRecordRow, AppError>> {
    for tt in time_trial {
        let tt = match tt {
            Ok(row) => row,
            Err(e) => {
                race.push(Err(e));
                continue;
            }
        };
        let existing = race
            .iter_mut()
            .filter_map(|r| r.as_mut().ok())
            .find(|r| r.driver_id == tt.driver_id);
        match existing {
            Some(row) => {
                row.time_trial = tt.time_trial;
                row.time_trial_subsession_id = tt.time_trial_subsession_id;
                row.time_trial_start_time = tt.time_trial_start_time;
            }
            None => race.push(Ok(tt)),
        }
    }
    race
}

fn map_subsession(remote: RemoteSubsession) -> SubsessionResult {
    let weather = remote.weather.as_ref();
    let stats = RaceStats {
        subsession_id: remote.subsession_id,
        start_time: remote.start_time,
        simulated_start_time: weather.and_then(|w| w.simulated_start_utc_time),
        lead_changes: remote.num_lead_changes,
        laps: remote.event_laps_complete,
        cautions: remote.num_cautions,
        caution_laps: remote.num_caution_laps,
        corners_per_lap: remote.corners_per_lap,
        avg_laptime: Laptime(remote.event_average_lap),
        avg_quali_laps: remote.num_laps_for_qual_average,
        weather_rh: weather.map(|w| w.rel_humidity).unwrap_or_default(),
        weather_temp: weather.map(|w| w.temp_value).unwrap_or_default(),
    };

    let subsession_id = remote.subsession_id;
    let race_rows = remote
        .session_results
        .into_iter()
        .filter(RemoteSimSession::is_race)
        .flat_map(|s| s.results)
        .map(|value| {
            serde_json::from_value::<RemoteDriverRow>(value)
                .map(|row| map_driver_row(subsession_id, row))
                .map_err(|e| AppError::Decode(format!("subsession {} driver row: {}", subsession_id, e)))
        })
        .collect();

    SubsessionResult { stats, race_rows }
}

fn map_driver_row(subsession_id: i64, row: RemoteDriverRow) -> DriverRaceRow {
    let club = Club {
        club_id: row.club_id,
        name: row.club_name,
    };
    let driver = Driver {
        driver_id: row.cust_id,
        name: row.display_name,
        club_id: row.club_id,
    };
    let result = RaceResult {
        subsession_id,
        driver_id: row.cust_id,
        car_id: row.car_id,
        car_class_id: row.car_class_id,
        car_number: row.livery.and_then(|l| l.car_number).unwrap_or_default(),
        irating_before: row.oldi_rating,
        irating_after: row.newi_rating,
        license_level_before: row.old_license_level,
        license_level_after: row.new_license_level,
        safety_rating_before: row.old_sub_level,
        safety_rating_after: row.new_sub_level,
        cpi_before: row.old_cpi,
        cpi_after: row.new_cpi,
        aggregate_champ_points: row.aggregate_champ_points,
        champ_points: row.champ_points,
        club_points: row.club_points,
        starting_position: row.starting_position,
        position: row.position,
        finishing_position: row.finish_position,
        finishing_position_in_class: row.finish_position_in_class,
        division: row.division,
        interval: row.interval,
        class_interval: row.class_interval,
        avg_laptime: Laptime(row.average_lap),
        best_laptime: Laptime(row.best_lap_time),
        laps_completed: row.laps_complete,
        laps_led: row.laps_lead,
        incidents: row.incidents,
        reason_out: row.reason_out,
    };
    DriverRaceRow {
        club,
        driver,
        result,
    }
}
