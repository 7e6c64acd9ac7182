// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    extract::{Form, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, TimeZone, Utc};
use ircollector::config::{ApiEndpoints, Config};
use ircollector::db::{MemoryStore, Store};
use ircollector::routes::create_router;
use ircollector::services::legacy::{TT_STANDINGS_V1_HEADER, WORLD_RECORDS_V1_HEADER};
use ircollector::services::{
    Clock, CounterRegistry, ManualClock, RequestExecutor, Resolver, SessionManager,
};
use ircollector::AppState;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed start of every manual clock.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

// ─── Fake remote service ─────────────────────────────────────────

#[derive(Clone)]
struct Canned {
    status: u16,
    body: Vec<u8>,
}

#[derive(Default)]
struct FakeState {
    responses: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<String>>,
    grant_types: Mutex<Vec<String>>,
    token_calls: AtomicUsize,
    token_status: Mutex<Option<u16>>,
    token_delay: Mutex<Duration>,
    token_limit: Mutex<Option<usize>>,
    rate_limit: Mutex<Option<(String, String)>>,
}

/// In-process stand-in for the remote statistics service.
///
/// Every non-auth request is answered from canned responses, looked up by
/// path and query first, then by path alone.
pub struct FakeApi {
    pub base_url: String,
    state: Arc<FakeState>,
}

#[allow(dead_code)]
impl FakeApi {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/oauth2/token", post(token))
            .route("/auth", post(session_login))
            .fallback(canned)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    pub fn endpoints(&self) -> ApiEndpoints {
        ApiEndpoints::local(&self.base_url)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn respond(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.state.responses.lock().unwrap().insert(
            path.to_string(),
            Canned {
                status,
                body: body.into(),
            },
        );
    }

    pub fn json(&self, path: &str, value: Value) {
        self.respond(path, 200, value.to_string());
    }

    /// Serve `value` behind a cached link.
    pub fn link(&self, path: &str, value: Value) {
        let target = format!("/cdn{}", path.replace(['?', '&', '='], "_"));
        self.json(path, json!({ "link": self.url(&target), "expires": "2099-01-01T00:00:00Z" }));
        self.json(&target, value);
    }

    /// Serve `chunks` as a chunked result set behind a cached link.
    pub fn chunked(&self, path: &str, name: &str, chunks: Vec<Value>) {
        let names: Vec<String> = (0..chunks.len())
            .map(|i| format!("{}_{}.json", name, i))
            .collect();
        let rows: usize = chunks
            .iter()
            .map(|c| c.as_array().map(Vec::len).unwrap_or(0))
            .sum();
        self.link(
            path,
            json!({
                "type": "search_series",
                "data": {
                    "success": true,
                    "chunk_info": {
                        "base_download_url": self.url("/chunks/"),
                        "chunk_file_names": names,
                        "rows": rows,
                    }
                }
            }),
        );
        for (name, chunk) in names.iter().zip(chunks) {
            self.json(&format!("/chunks/{}", name), chunk);
        }
    }

    /// Serve an empty result set behind a cached link.
    pub fn empty_chunked(&self, path: &str) {
        self.link(path, json!({ "type": "search_series", "data": { "success": true } }));
    }

    pub fn set_rate_limit(&self, remaining: &str, reset: &str) {
        *self.state.rate_limit.lock().unwrap() = Some((remaining.to_string(), reset.to_string()));
    }

    pub fn set_token_status(&self, status: u16) {
        *self.state.token_status.lock().unwrap() = Some(status);
    }

    /// Reject every token request after the first `n` with a 401.
    pub fn fail_token_after(&self, n: usize) {
        *self.state.token_limit.lock().unwrap() = Some(n);
    }

    pub fn set_token_delay(&self, delay: Duration) {
        *self.state.token_delay.lock().unwrap() = delay;
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn grant_types(&self) -> Vec<String> {
        self.state.grant_types.lock().unwrap().clone()
    }

    /// Paths (with query) of every non-auth request, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requested(&self, fragment: &str) -> bool {
        self.requests().iter().any(|r| r.contains(fragment))
    }
}

async fn token(
    State(state): State<Arc<FakeState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let call = state.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    state
        .grant_types
        .lock()
        .unwrap()
        .push(form.get("grant_type").cloned().unwrap_or_default());

    let delay = *state.token_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let over_limit = state
        .token_limit
        .lock()
        .unwrap()
        .is_some_and(|limit| call > limit);
    let status = if over_limit {
        401
    } else {
        state.token_status.lock().unwrap().unwrap_or(200)
    };
    if status != 200 {
        let code = StatusCode::from_u16(status).unwrap();
        return (code, Json(json!({ "error": "invalid_grant" }))).into_response();
    }

    Json(json!({
        "access_token": format!("access-{}", call),
        "refresh_token": format!("refresh-{}", call),
        "token_type": "Bearer",
        "expires_in": 600,
        "refresh_token_expires_in": 3600,
    }))
    .into_response()
}

async fn session_login(State(state): State<Arc<FakeState>>) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    let status = state.token_status.lock().unwrap().unwrap_or(200);
    let code = StatusCode::from_u16(status).unwrap();
    (code, [("set-cookie", "irsso_membersv2=abc; Path=/")], "").into_response()
}

async fn canned(State(state): State<Arc<FakeState>>, uri: Uri) -> Response {
    let full = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    state.requests.lock().unwrap().push(full.clone());

    let found = {
        let responses = state.responses.lock().unwrap();
        responses
            .get(&full)
            .or_else(|| responses.get(uri.path()))
            .cloned()
    };
    let Some(canned) = found else {
        return (StatusCode::NOT_FOUND, "no canned response").into_response();
    };

    let mut response = (
        StatusCode::from_u16(canned.status).unwrap(),
        [("content-type", "application/json")],
        canned.body,
    )
        .into_response();
    if let Some((remaining, reset)) = state.rate_limit.lock().unwrap().clone() {
        let headers = response.headers_mut();
        headers.insert("x-ratelimit-remaining", remaining.parse().unwrap());
        headers.insert("x-ratelimit-reset", reset.parse().unwrap());
    }
    response
}

// ─── Pipeline wiring ─────────────────────────────────────────────

#[allow(dead_code)]
pub fn test_config(fake: &FakeApi) -> Config {
    Config {
        endpoints: fake.endpoints(),
        ..Config::test_default()
    }
}

/// Session + executor + resolver against the fake, on a manual clock.
#[allow(dead_code)]
pub struct Pipeline {
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<CounterRegistry>,
    pub session: Arc<SessionManager>,
    pub executor: Arc<RequestExecutor>,
    pub resolver: Resolver,
}

#[allow(dead_code)]
pub fn pipeline(fake: &FakeApi) -> Pipeline {
    let config = test_config(fake);
    let clock = Arc::new(ManualClock::new(start_time()));
    let metrics = Arc::new(CounterRegistry::new());
    let http = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();

    let session = Arc::new(SessionManager::new(
        http.clone(),
        config.credentials.clone(),
        config.auth_scheme,
        &config.endpoints,
        clock.clone(),
        metrics.clone(),
    ));
    let executor = Arc::new(RequestExecutor::new(
        http,
        session.clone(),
        clock.clone(),
        metrics.clone(),
        &config.endpoints.legacy_base_url,
    ));
    let resolver = Resolver::new(executor.clone(), metrics.clone());

    Pipeline {
        clock,
        metrics,
        session,
        executor,
        resolver,
    }
}

/// Full app state backed by a memory store and a manual clock.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let dyn_store: Arc<dyn Store> = store.clone();
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let state = Arc::new(AppState::build(config, dyn_store, dyn_clock).unwrap());
    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        clock,
    }
}

/// Create a test app whose remote endpoints point nowhere.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    let config = Config {
        endpoints: ApiEndpoints::local("http://127.0.0.1:9"),
        ..Config::test_default()
    };
    let app = create_test_app_with(config);
    (app.router, app.state)
}

// ─── Payload fixtures ────────────────────────────────────────────

#[allow(dead_code)]
pub fn season_json(season_id: i64, series_id: i64, short_name: &str, race_week: i64) -> Value {
    json!({
        "season_id": season_id,
        "series_id": series_id,
        "season_name": format!("Advanced Mazda MX-5 Cup - {}", short_name),
        "season_short_name": short_name,
        "race_week": race_week,
        "track_types": [{ "track_type": "road" }],
        "schedules": [
            { "race_week_num": 0, "track": { "track_id": 47, "track_name": "Laguna Seca" }, "start_date": "2024-03-12" },
            { "race_week_num": 1, "track": { "track_id": 18, "track_name": "Road America", "config_name": "Full Course" } }
        ]
    })
}

#[allow(dead_code)]
pub fn race_week_row(subsession_id: i64, track_id: i64, car_class_id: i64, official: bool) -> Value {
    json!({
        "session_id": subsession_id / 10,
        "subsession_id": subsession_id,
        "start_time": "2024-06-01T08:00:00Z",
        "official_session": official,
        "event_strength_of_field": 1850,
        "num_drivers": 2,
        "car_class_id": car_class_id,
        "event_type": 5,
        "track": { "track_id": track_id, "track_name": "Laguna Seca" }
    })
}

#[allow(dead_code)]
pub fn race_week_rows(count: usize, first_id: i64) -> Value {
    Value::Array(
        (0..count)
            .map(|i| race_week_row(first_id + i as i64, 47, 74, false))
            .collect(),
    )
}

#[allow(dead_code)]
pub fn subsession_json(subsession_id: i64, laps: i64, drivers: &[(i64, &str)]) -> Value {
    let results: Vec<Value> = drivers
        .iter()
        .enumerate()
        .map(|(pos, (cust_id, name))| {
            json!({
                "cust_id": cust_id,
                "display_name": name,
                "club_id": 41,
                "club_name": "Italy",
                "car_id": 67,
                "car_class_id": 74,
                "livery": { "car_number": format!("{}", pos + 1) },
                "oldi_rating": 2500,
                "newi_rating": 2540,
                "finish_position": pos,
                "finish_position_in_class": pos,
                "laps_complete": laps,
                "laps_lead": if pos == 0 { laps } else { 0 },
                "average_lap": 841_938,
                "best_lap_time": 830_001,
                "incidents": 2,
                "reason_out": "Running"
            })
        })
        .collect();

    json!({
        "subsession_id": subsession_id,
        "start_time": "2024-06-01T08:00:00Z",
        "event_average_lap": 841_938,
        "event_laps_complete": laps,
        "num_cautions": 0,
        "num_caution_laps": 0,
        "num_lead_changes": 1,
        "corners_per_lap": 11,
        "num_laps_for_qual_average": 2,
        "weather": { "rel_humidity": 55, "temp_value": 78 },
        "session_results": [
            { "simsession_number": -1, "simsession_type_name": "Open Qualifying", "simsession_name": "QUALIFY", "results": results.clone() },
            { "simsession_number": 0, "simsession_type_name": "Race", "simsession_name": "RACE", "results": results }
        ]
    })
}

fn positional_header(names: &[&str]) -> Value {
    let map: Map<String, Value> = names
        .iter()
        .enumerate()
        .map(|(i, n)| ((i + 1).to_string(), Value::String(n.to_string())))
        .collect();
    Value::Object(map)
}

#[allow(dead_code)]
pub fn world_records_json(rows: &[(i64, &str, &str)]) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .map(|(cust_id, race, time_trial)| {
            json!({
                "1": 55501, "3": "A+4.99", "4": 3120, "7": 41,
                "20": race, "28": "%22Italy%22", "30": "Fast+Driver",
                "32": cust_id, "39": time_trial
            })
        })
        .collect();
    json!({ "m": positional_header(&WORLD_RECORDS_V1_HEADER), "d": { "r": rows } })
}

#[allow(dead_code)]
pub fn tt_standings_json(cust_ids: &[i64]) -> Value {
    let rows: Vec<Value> = cust_ids
        .iter()
        .enumerate()
        .map(|(i, cust_id)| {
            json!({
                "1": 2, "2": 5, "4": 1, "7": 41, "8": 1234 - i as i64, "9": 3,
                "11": "Italy", "13": "TT+Driver", "15": cust_id,
                "17": i + 1, "18": i + 1, "20": 9
            })
        })
        .collect();
    json!({ "m": positional_header(&TT_STANDINGS_V1_HEADER), "d": { "r": rows } })
}
