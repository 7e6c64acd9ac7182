// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! On-demand resync endpoints.
//!
//! Requests run the collector inline through the shared executor, so they
//! share its pacing and credential with the background loop. A resync is
//! always forced. A fatal error is also reported to the process so it
//! stops the same way a fatal error in the background loop does.

use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Admin routes (require basic auth, applied in routes/mod.rs).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/season/{season_id}", get(resync_season).post(resync_season))
        .route(
            "/season/{season_id}/week/{week}",
            get(resync_week).post(resync_week),
        )
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

fn check_season_id(season_id: i64) -> Result<()> {
    if season_id <= 0 {
        return Err(AppError::BadRequest(format!(
            "season id {} is invalid",
            season_id
        )));
    }
    Ok(())
}

/// Resync weeks 0-12 of a season.
async fn resync_season(
    State(state): State<Arc<AppState>>,
    Path(season_id): Path<i64>,
) -> Result<Json<StatusResponse>> {
    check_season_id(season_id)?;
    tracing::info!(season_id, "Admin resync of season");
    state
        .collector
        .collect_season(season_id, true)
        .await
        .inspect_err(|e| state.report_fatal(e))?;
    Ok(Json(StatusResponse::ok()))
}

/// Resync a single race week.
async fn resync_week(
    State(state): State<Arc<AppState>>,
    Path((season_id, week)): Path<(i64, i64)>,
) -> Result<Json<StatusResponse>> {
    check_season_id(season_id)?;
    tracing::info!(season_id, week, "Admin resync of race week");
    state
        .collector
        .collect_race_week(season_id, week, true)
        .await
        .inspect_err(|e| state.report_fatal(e))?;
    Ok(Json(StatusResponse::ok()))
}
