// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Decoders for the legacy member-site statistics endpoints.
//!
//! These endpoints answer with a header map `"m"` assigning column names to
//! stringified positions, and rows keyed by those positions. Each decoder
//! pins the exact header it was written against; any drift is a
//! [`AppError::Schema`] canary, never a best-effort parse.
//!
//! String cells are URL-encoded and wrapped in quotes, lap times are
//! `m:ss.fff` strings, timestamps are epoch milliseconds.

use crate::error::AppError;
use crate::models::Laptime;
use crate::time_utils;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

type Row = Map<String, Value>;

/// Expected header of `GetWorldRecords`.
pub const WORLD_RECORDS_V1_HEADER: [&str; 39] = [
    "timetrial_subsessionid",
    "practice",
    "licenseclass",
    "irating",
    "trackid",
    "countrycode",
    "clubid",
    "practice_start_time",
    "helmhelmettype",
    "carid",
    "catid",
    "race_subsessionid",
    "season_quarter",
    "practice_subsessionid",
    "licensegroup",
    "qualify",
    "custrow",
    "season_year",
    "race_start_time",
    "race",
    "rowcount",
    "qualify_start_time",
    "helmpattern",
    "licenselevel",
    "ttrating",
    "timetrial_start_time",
    "helmcolor3",
    "clubname",
    "helmcolor1",
    "displayname",
    "helmcolor2",
    "custid",
    "sublevel",
    "helmfacetype",
    "rn",
    "region",
    "category",
    "qualify_subsessionid",
    "timetrial",
];

/// Expected header of `GetSeasonTTStandings`.
pub const TT_STANDINGS_V1_HEADER: [&str; 21] = [
    "wins",
    "week",
    "rowcount",
    "dropped",
    "helmpattern",
    "maxlicenselevel",
    "clubid",
    "points",
    "division",
    "helmcolor3",
    "clubname",
    "helmcolor1",
    "displayname",
    "helmcolor2",
    "custid",
    "sublevel",
    "rank",
    "pos",
    "rn",
    "starts",
    "custrow",
];

/// One row of the world records (time ranking) table.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldRecordRow {
    pub driver_id: i64,
    pub driver_name: String,
    pub club_id: i64,
    pub club_name: String,
    pub time_trial: Laptime,
    pub race: Laptime,
    pub license_class: String,
    pub irating: i64,
    /// -1 when absent
    pub time_trial_subsession_id: i64,
    pub time_trial_start_time: Option<DateTime<Utc>>,
}

/// One row of the time trial season standings.
#[derive(Debug, Clone, PartialEq)]
pub struct TtStandingRow {
    pub driver_id: i64,
    pub driver_name: String,
    pub club_id: i64,
    pub club_name: String,
    pub rank: i64,
    pub position: i64,
    pub points: i64,
    pub starts: i64,
    pub wins: i64,
    pub weeks: i64,
    pub dropped: i64,
    pub division: i64,
}

#[derive(Deserialize)]
struct Positional {
    m: HashMap<String, String>,
    d: PositionalData,
}

#[derive(Deserialize)]
struct PositionalData {
    r: Vec<Row>,
}

/// Outcome of a decode: the table shape is verified, rows individually.
pub type DecodedRows<T> = Vec<Result<T, AppError>>;

/// Verify the header of a positional payload and return its raw rows.
fn verify_positional(
    endpoint: &'static str,
    expected: &[&str],
    payload: &[u8],
) -> Result<Vec<Row>, AppError> {
    let parsed: Positional =
        serde_json::from_slice(payload).map_err(|_| AppError::schema(endpoint, payload))?;

    let matches = parsed.m.len() == expected.len()
        && expected.iter().enumerate().all(|(idx, name)| {
            parsed.m.get(&(idx + 1).to_string()).map(String::as_str) == Some(*name)
        });
    if !matches {
        tracing::error!(endpoint, "Header format is not correct anymore");
        return Err(AppError::schema(endpoint, payload));
    }
    Ok(parsed.d.r)
}

/// `GetWorldRecords`, header version 1.
pub fn world_records_v1(payload: &[u8]) -> Result<DecodedRows<WorldRecordRow>, AppError> {
    let rows = verify_positional("GetWorldRecords", &WORLD_RECORDS_V1_HEADER, payload)?;
    Ok(rows.iter().map(decode_world_record).collect())
}

fn decode_world_record(row: &Row) -> Result<WorldRecordRow, AppError> {
    Ok(WorldRecordRow {
        driver_id: int_cell(row, "32")?,
        driver_name: string_cell(row, "30")?,
        club_id: int_cell(row, "7")?,
        club_name: string_cell(row, "28")?,
        time_trial: parse_laptime(&string_cell(row, "39")?)?,
        race: parse_laptime(&string_cell(row, "20")?)?,
        license_class: string_cell(row, "3")?,
        irating: int_cell(row, "4")?,
        time_trial_subsession_id: row.get("1").and_then(Value::as_i64).unwrap_or(-1),
        time_trial_start_time: timestamp_cell(row, "26")?,
    })
}

/// `GetSeasonTTStandings`, header version 1.
pub fn tt_standings_v1(payload: &[u8]) -> Result<DecodedRows<TtStandingRow>, AppError> {
    let rows = verify_positional("GetSeasonTTStandings", &TT_STANDINGS_V1_HEADER, payload)?;
    Ok(rows.iter().map(decode_tt_standing).collect())
}

fn decode_tt_standing(row: &Row) -> Result<TtStandingRow, AppError> {
    Ok(TtStandingRow {
        driver_id: int_cell(row, "15")?,
        driver_name: string_cell(row, "13")?,
        club_id: int_cell(row, "7")?,
        club_name: string_cell(row, "11")?,
        rank: int_cell(row, "17")?,
        position: int_cell(row, "18")?,
        points: int_cell(row, "8")?,
        starts: int_cell(row, "20")?,
        wins: int_cell(row, "1")?,
        weeks: int_cell(row, "2")?,
        dropped: int_cell(row, "4")?,
        division: int_cell(row, "9")?,
    })
}

fn int_cell(row: &Row, key: &str) -> Result<i64, AppError> {
    match row.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| AppError::Decode(format!("column {}: {} is not an integer", key, n))),
        Some(other) => Err(AppError::Decode(format!(
            "column {}: expected number, got {}",
            key, other
        ))),
        None => Err(AppError::Decode(format!("column {} missing", key))),
    }
}

/// Epoch-millisecond cell; empty, zero and missing cells mean "never".
fn timestamp_cell(row: &Row, key: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    let millis = match row.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    match millis {
        Some(0) => Ok(None),
        Some(ms) => time_utils::from_epoch_millis(ms)
            .map(Some)
            .ok_or_else(|| AppError::Decode(format!("column {}: timestamp {} out of range", key, ms))),
        None => Err(AppError::Decode(format!("column {}: invalid timestamp", key))),
    }
}

fn string_cell(row: &Row, key: &str) -> Result<String, AppError> {
    match row.get(key) {
        Some(Value::String(s)) => decode_encoded_string(s),
        Some(Value::Null) => Ok(String::new()),
        Some(other) => Err(AppError::Decode(format!(
            "column {}: expected string, got {}",
            key, other
        ))),
        None => Err(AppError::Decode(format!("column {} missing", key))),
    }
}

/// Decode a legacy string cell: `+` as space, percent escapes decoded,
/// surrounding quotes stripped.
pub fn decode_encoded_string(raw: &str) -> Result<String, AppError> {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced)
        .map_err(|e| AppError::Decode(format!("invalid encoded string {:?}: {}", raw, e)))?;
    let trimmed = decoded.trim();
    Ok(trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string())
}

/// Parse a legacy lap time (`"1:28.514"`, `"58.2"`) into ten-thousandths of
/// a second. Empty cells mean "no time".
pub fn parse_laptime(raw: &str) -> Result<Laptime, AppError> {
    let s = raw.trim();
    if s.is_empty() || s == "-" {
        return Ok(Laptime(0));
    }
    let invalid = || AppError::Decode(format!("invalid lap time {:?}", raw));

    let (minutes, rest) = match s.split_once(':') {
        Some((m, rest)) => (m.parse::<i64>().map_err(|_| invalid())?, rest),
        None => (0, s),
    };
    let (secs, frac) = match rest.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (rest, ""),
    };
    let secs: i64 = secs.parse().map_err(|_| invalid())?;
    if !(0..60).contains(&secs) || minutes < 0 || frac.len() > 4 {
        return Err(invalid());
    }
    let frac_value: i64 = if frac.is_empty() {
        0
    } else {
        let digits: i64 = frac.parse().map_err(|_| invalid())?;
        digits * 10_i64.pow(4 - frac.len() as u32)
    };
    Ok(Laptime((minutes * 60 + secs) * 10_000 + frac_value))
}
