// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end collection against the fake remote service.

use ircollector::db::Store;
use ircollector::error::AppError;
use ircollector::models::{CarClass, Laptime, RaceWeek, ScheduleEntry, Season, Series};
use ircollector::services::metrics::Counter;
use serde_json::json;
use std::time::Duration;

mod common;
use common::{
    create_test_app_with, race_week_row, race_week_rows, season_json, start_time,
    subsession_json, test_config, tt_standings_json, world_records_json, FakeApi, TestApp,
};

const SERIES_ID: i64 = 139;
const SEASON_ID: i64 = 4660;
const SUBSESSION_ID: i64 = 43774896;

const SEASONS_PATH: &str = "/data/series/seasons?include_series=true";
const WORLD_RECORDS_PATH: &str = "/legacy/memberstats/member/GetWorldRecords";
const TT_STANDINGS_PATH: &str = "/legacy/memberstats/member/GetSeasonTTStandings";

fn search_path(season_id: i64, week: i64) -> String {
    format!(
        "/data/results/search_series?season_id={}&race_week_num={}&event_types=5",
        season_id, week
    )
}

fn subsession_path(subsession_id: i64) -> String {
    format!(
        "/data/results/get?include_licenses=false&subsession_id={}",
        subsession_id
    )
}

async fn setup() -> (FakeApi, TestApp) {
    let fake = FakeApi::start().await;
    let app = create_test_app_with(test_config(&fake));
    app.store
        .upsert_series(&Series {
            series_id: SERIES_ID,
            name: "Advanced Mazda MX-5 Cup".to_string(),
            short_name: "Mazda".to_string(),
            pattern: "Mazda".to_string(),
        })
        .await
        .unwrap();
    fake.json(TT_STANDINGS_PATH, tt_standings_json(&[]));
    (fake, app)
}

/// Empty track, car and car class catalogs.
fn empty_catalog(fake: &FakeApi) {
    fake.link("/data/track/get", json!([]));
    fake.link("/data/track/assets", json!({}));
    fake.link("/data/car/get", json!([]));
    fake.link("/data/car/assets", json!({}));
    fake.link("/data/carclass/get", json!([]));
}

fn track_catalog_fetches(fake: &FakeApi) -> usize {
    fake.requests()
        .iter()
        .filter(|r| r.starts_with("/data/track/get"))
        .count()
}

fn current_season(fake: &FakeApi, race_week: i64) {
    fake.link(
        SEASONS_PATH,
        json!([season_json(SEASON_ID, 3500, "2024 Season 2", race_week)]),
    );
}

fn stored_season(season_id: i64, year: i32, quarter: i32) -> Season {
    Season {
        series_id: SERIES_ID,
        season_id,
        year,
        quarter,
        category: "road".to_string(),
        season_name: format!("Advanced Mazda MX-5 Cup - {} Season {}", year, quarter),
        season_short_name: format!("{} Season {}", year, quarter),
        schedule: vec![ScheduleEntry {
            race_week: 0,
            track_id: 47,
            track_name: "Laguna Seca".to_string(),
            config_name: None,
            start_date: None,
        }],
        updated_at: start_time(),
    }
}

fn mazda_class() -> CarClass {
    CarClass {
        car_class_id: 74,
        name: "Mazda MX-5 Cup".to_string(),
        short_name: "MX5".to_string(),
        cars_in_class: vec![67],
    }
}

#[tokio::test]
async fn test_collects_current_and_previous_week() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.chunked(&search_path(SEASON_ID, 3), "w3", vec![race_week_rows(2, 1000)]);
    fake.chunked(&search_path(SEASON_ID, 2), "w2", vec![race_week_rows(1, 2000)]);

    app.state.collector.run_cycle(false).await.unwrap();

    assert_eq!(
        app.store.race_weeks(),
        vec![
            RaceWeek { season_id: SEASON_ID, week: 2, track_id: 47 },
            RaceWeek { season_id: SEASON_ID, week: 3, track_id: 47 },
        ]
    );
    let results = app.store.race_week_results();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.season_id == SEASON_ID && !r.official));

    // Matched by pattern, stored under the tracked series
    let season = app.store.get_season(SEASON_ID).await.unwrap().unwrap();
    assert_eq!(season.series_id, SERIES_ID);
    assert_eq!((season.year, season.quarter), (2024, 2));
    assert_eq!(season.category, "road");
    assert_eq!(season.schedule.len(), 2);
    assert_eq!(app.state.metrics.get(Counter::CollectorError), 0);
}

#[tokio::test]
async fn test_week_zero_reaches_into_previous_season() {
    let (fake, app) = setup().await;
    app.store
        .upsert_season(&stored_season(4500, 2024, 1))
        .await
        .unwrap();
    current_season(&fake, 0);
    fake.chunked(&search_path(SEASON_ID, 0), "w0", vec![race_week_rows(1, 3000)]);
    fake.chunked(&search_path(4500, 11), "w11", vec![race_week_rows(1, 4000)]);

    app.state.collector.run_cycle(false).await.unwrap();

    let weeks: Vec<(i64, i64)> = app
        .store
        .race_weeks()
        .iter()
        .map(|w| (w.season_id, w.week))
        .collect();
    assert_eq!(weeks, vec![(4500, 11), (SEASON_ID, 0)]);
}

#[tokio::test]
async fn test_empty_week_is_not_an_error() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.empty_chunked(&search_path(SEASON_ID, 3));
    fake.chunked(&search_path(SEASON_ID, 2), "w2", vec![race_week_rows(1, 2000)]);

    app.state.collector.run_cycle(false).await.unwrap();

    assert_eq!(app.store.race_weeks().len(), 1);
    assert_eq!(app.state.metrics.get(Counter::CollectorError), 0);
    assert_eq!(app.state.metrics.get(Counter::EmptyResultSet), 1);
}

#[tokio::test]
async fn test_official_session_details_are_stored() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.chunked(
        &search_path(SEASON_ID, 3),
        "w3",
        vec![json!([
            race_week_row(SUBSESSION_ID, 47, 74, true),
            race_week_row(SUBSESSION_ID + 1, 47, 74, false),
        ])],
    );
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    fake.link(
        &subsession_path(SUBSESSION_ID),
        subsession_json(SUBSESSION_ID, 19, &[(509786, "Jane Doe"), (111, "John Roe")]),
    );

    app.state.collector.run_cycle(false).await.unwrap();

    let stats = app.store.get_race_stats(SUBSESSION_ID).await.unwrap().unwrap();
    assert_eq!(stats.laps, 19);
    assert_eq!(stats.avg_laptime, Laptime(841_938));
    assert_eq!(stats.weather_temp, 78);

    // Qualifying rows are ignored
    let rows = app.store.race_results();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].driver_id, 509786);
    assert_eq!(rows[1].laps_led, 19);
    assert_eq!(app.store.driver(509786).unwrap().name, "Jane Doe");
    assert_eq!(app.store.club(41).unwrap().name, "Italy");

    // Only the official subsession is fetched in detail
    assert!(!fake.requested(&format!("subsession_id={}", SUBSESSION_ID + 1)));
}

#[tokio::test]
async fn test_settled_race_is_not_refetched() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.chunked(
        &search_path(SEASON_ID, 3),
        "w3",
        vec![json!([race_week_row(SUBSESSION_ID, 47, 74, true)])],
    );
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    fake.link(
        &subsession_path(SUBSESSION_ID),
        subsession_json(SUBSESSION_ID, 19, &[(509786, "Jane Doe")]),
    );
    let detail_fetches = || {
        fake.requests()
            .iter()
            .filter(|r| r.starts_with("/data/results/get?"))
            .count()
    };

    app.state.collector.run_cycle(false).await.unwrap();
    assert_eq!(detail_fetches(), 1);

    // Four hours after the start the race may still change
    app.state.collector.run_cycle(false).await.unwrap();
    assert_eq!(detail_fetches(), 2);

    app.clock.advance(Duration::from_secs(24 * 3600));
    app.state.collector.run_cycle(false).await.unwrap();
    assert_eq!(detail_fetches(), 2);

    // A forced cycle refetches regardless (catalog included)
    empty_catalog(&fake);
    app.state.collector.run_cycle(true).await.unwrap();
    assert_eq!(detail_fetches(), 3);
}

#[tokio::test]
async fn test_race_without_laps_is_skipped() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.chunked(
        &search_path(SEASON_ID, 3),
        "w3",
        vec![json!([race_week_row(SUBSESSION_ID, 47, 74, true)])],
    );
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    fake.link(
        &subsession_path(SUBSESSION_ID),
        subsession_json(SUBSESSION_ID, 0, &[(509786, "Jane Doe")]),
    );

    app.state.collector.run_cycle(false).await.unwrap();

    assert!(app.store.get_race_stats(SUBSESSION_ID).await.unwrap().is_none());
    assert!(app.store.race_results().is_empty());
    assert_eq!(app.state.metrics.get(Counter::RecordSkipped), 1);
}

#[tokio::test]
async fn test_standings_for_each_car_class() {
    let (fake, app) = setup().await;
    app.store.upsert_car_class(&mazda_class()).await.unwrap();
    current_season(&fake, 3);
    fake.chunked(&search_path(SEASON_ID, 3), "w3", vec![race_week_rows(1, 1000)]);
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    fake.json(
        WORLD_RECORDS_PATH,
        world_records_json(&[(509786, "1:28.514", "1:29.000")]),
    );
    fake.json(TT_STANDINGS_PATH, tt_standings_json(&[333, 222]));

    app.state.collector.run_cycle(false).await.unwrap();

    let rankings = app.store.time_rankings();
    assert_eq!(rankings.len(), 1);
    assert_eq!(rankings[0].week, 3);
    assert_eq!(rankings[0].car_id, 67);
    assert_eq!(rankings[0].track_id, 47);
    assert_eq!(rankings[0].race, Laptime(885_140));
    assert_eq!(rankings[0].time_trial, Laptime(890_000));
    assert_eq!(rankings[0].license_class, "A 4.99");
    assert!(fake.requested("seasonyear=2024&seasonquarter=2&carid=67&trackid=47"));
    assert!(fake.requested("sort=timetrial"));
    assert!(fake.requested("sort=race"));

    let standings = app.store.time_trial_results();
    assert_eq!(standings.len(), 2);
    assert!(standings.iter().all(|s| s.week == 3 && s.car_class_id == 74));
    assert!(fake.requested("seasonid=4660&clubid=-1&carclassid=74&raceweek=3"));

    assert_eq!(app.store.driver(509786).unwrap().name, "Fast Driver");
    assert_eq!(app.store.driver(222).unwrap().name, "TT Driver");
    assert_eq!(app.store.club(41).unwrap().name, "Italy");
}

#[tokio::test]
async fn test_standings_without_known_car_class() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.chunked(&search_path(SEASON_ID, 3), "w3", vec![race_week_rows(1, 1000)]);
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    fake.json(TT_STANDINGS_PATH, tt_standings_json(&[333, 222]));

    app.state.collector.run_cycle(false).await.unwrap();

    // Rankings need the class's cars; standings only its ID
    assert!(app.store.time_rankings().is_empty());
    assert!(!fake.requested(WORLD_RECORDS_PATH));
    assert!(fake.requested("seasonid=4660&clubid=-1&carclassid=74&raceweek=3"));
    let standings = app.store.time_trial_results();
    assert_eq!(standings.len(), 2);
    assert!(standings.iter().all(|s| s.car_class_id == 74));
    assert_eq!(app.state.metrics.get(Counter::CollectorError), 0);
}

#[tokio::test]
async fn test_changed_legacy_header_is_fatal() {
    let (fake, app) = setup().await;
    app.store.upsert_car_class(&mazda_class()).await.unwrap();
    current_season(&fake, 3);
    fake.chunked(&search_path(SEASON_ID, 3), "w3", vec![race_week_rows(1, 1000)]);
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    fake.json(
        WORLD_RECORDS_PATH,
        json!({ "m": { "1": "custid", "2": "besttime" }, "d": { "r": [] } }),
    );

    let err = app.state.collector.run_cycle(false).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Schema { endpoint: "GetWorldRecords", .. }
    ));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_forced_cycle_refreshes_catalog() {
    let (fake, app) = setup().await;
    fake.link(
        "/data/track/get",
        json!([
            { "track_id": 47, "track_name": "Laguna Seca", "config_name": "Full Course", "category": "Road" },
            { "track_id": 18, "track_name": "Road America", "category": "Road" }
        ]),
    );
    fake.link(
        "/data/track/assets",
        json!({ "47": { "logo": "/img/logos/47.png", "folder": "/img/tracks/47", "small_image": "s.jpg", "large_image": "l.jpg" } }),
    );
    fake.link(
        "/data/car/get",
        json!([{ "car_id": 67, "car_name": "Global Mazda MX-5 Cup", "car_make": "Mazda", "car_model": "MX-5" }]),
    );
    fake.link(
        "/data/car/assets",
        json!({ "67": { "detail_copy": "Spec\r\nracer", "folder": "/img/cars/67", "large_image": "l.jpg" } }),
    );
    fake.link(
        "/data/carclass/get",
        json!([{ "car_class_id": 74, "name": "Mazda MX-5 Cup", "short_name": "MX5", "cars_in_class": [{ "car_id": 67 }] }]),
    );
    current_season(&fake, 3);
    fake.empty_chunked(&search_path(SEASON_ID, 3));
    fake.empty_chunked(&search_path(SEASON_ID, 2));

    app.state.collector.run_cycle(true).await.unwrap();

    assert_eq!(app.store.track_count(), 2);
    assert_eq!(app.store.car_count(), 1);
    assert_eq!(app.state.metrics.get(Counter::TracksSeen), 2);
    assert_eq!(app.state.metrics.get(Counter::CarsSeen), 1);
    assert_eq!(
        app.store.get_car_class(74).await.unwrap().unwrap(),
        mazda_class()
    );
}

#[tokio::test]
async fn test_failed_catalog_refresh_still_collects_seasons() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.chunked(&search_path(SEASON_ID, 3), "w3", vec![race_week_rows(1, 1000)]);
    fake.empty_chunked(&search_path(SEASON_ID, 2));

    app.state.collector.run_cycle(true).await.unwrap();

    assert_eq!(track_catalog_fetches(&fake), 1);
    assert_eq!(app.store.track_count(), 0);
    assert_eq!(app.store.race_weeks().len(), 1);
    assert_eq!(app.store.race_week_results().len(), 1);
    assert_eq!(app.state.metrics.get(Counter::CollectorError), 1);
}

#[tokio::test]
async fn test_empty_season_catalog_aborts_cycle() {
    let (fake, app) = setup().await;
    fake.link(SEASONS_PATH, json!([]));

    let err = app.state.collector.run_cycle(false).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_race_week_bounds_and_unknown_season() {
    let (_fake, app) = setup().await;
    app.store
        .upsert_season(&stored_season(SEASON_ID, 2024, 2))
        .await
        .unwrap();

    let err = app
        .state
        .collector
        .collect_race_week(SEASON_ID, 13, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = app
        .state
        .collector
        .collect_race_week(SEASON_ID, -1, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = app.state.collector.collect_season(9999, true).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_collect_season_walks_every_week() {
    let (fake, app) = setup().await;
    app.store
        .upsert_season(&stored_season(SEASON_ID, 2024, 2))
        .await
        .unwrap();
    for week in 0..=12 {
        fake.chunked(
            &search_path(SEASON_ID, week),
            &format!("w{}", week),
            vec![race_week_rows(1, 1000 + week * 10)],
        );
    }

    app.state.collector.collect_season(SEASON_ID, true).await.unwrap();

    assert_eq!(app.store.race_weeks().len(), 13);
    assert_eq!(app.store.race_week_results().len(), 13);
}

#[tokio::test]
async fn test_rejected_credentials_stop_the_loop() {
    let (fake, app) = setup().await;
    fake.set_token_status(401);

    let err = app.state.collector.run().await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(app.state.metrics.get(Counter::LoginError), 1);
}

#[tokio::test]
async fn test_loop_forces_a_catalog_refresh_every_nth_cycle() {
    let fake = FakeApi::start().await;
    let mut config = test_config(&fake);
    config.sync.forced_resync_every = 2;
    let cycle_interval = config.sync.cycle_interval;
    let app = create_test_app_with(config);
    app.store
        .upsert_series(&Series {
            series_id: SERIES_ID,
            name: "Advanced Mazda MX-5 Cup".to_string(),
            short_name: "Mazda".to_string(),
            pattern: "Mazda".to_string(),
        })
        .await
        .unwrap();
    empty_catalog(&fake);
    current_season(&fake, 3);
    fake.empty_chunked(&search_path(SEASON_ID, 3));
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    // One login per cycle; the fifth is rejected and ends the loop
    fake.fail_token_after(4);

    let err = app.state.collector.run().await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));

    // Cycles 1 and 3 are forced; cycle 5 stops at login
    assert_eq!(fake.token_calls(), 5);
    assert_eq!(track_catalog_fetches(&fake), 2);
    let cycle_sleeps = app
        .clock
        .sleeps()
        .into_iter()
        .filter(|d| *d == cycle_interval)
        .count();
    assert_eq!(cycle_sleeps, 4);
    assert_eq!(app.state.metrics.get(Counter::EmptyResultSet), 8);
    assert_eq!(app.state.metrics.get(Counter::CollectorError), 0);
}

#[tokio::test]
async fn test_failed_catalog_refresh_is_retried_next_cycle() {
    let (fake, app) = setup().await;
    current_season(&fake, 3);
    fake.empty_chunked(&search_path(SEASON_ID, 3));
    fake.empty_chunked(&search_path(SEASON_ID, 2));
    fake.fail_token_after(2);

    let err = app.state.collector.run().await.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));

    // The forced refresh stays armed after the first failure
    assert_eq!(track_catalog_fetches(&fake), 2);
    assert_eq!(app.state.metrics.get(Counter::CollectorError), 2);
}
