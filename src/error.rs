// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types.
//!
//! Every failure the collector can hit is classified here so callers can
//! tell transient network noise apart from conditions that must stop the
//! process (rejected credentials, legacy payloads that changed shape).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The request never produced an HTTP response (connect, timeout, body read).
    #[error("Request failed: {0}")]
    Transport(String),

    /// Non-2xx response from the remote service.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The remote service answered 429.
    #[error("Rate limited by {0}")]
    RateLimited(String),

    /// Login or token refresh was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A legacy payload no longer matches its hard-coded contract.
    #[error("Unexpected response format from [{endpoint}]: {detail}")]
    Schema {
        endpoint: &'static str,
        detail: String,
    },

    /// A single record failed to decode.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No results for season [{season_id}], week [{week}]")]
    EmptyResultSet { season_id: i64, week: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Errors that must terminate the process instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Auth(_) | AppError::Schema { .. })
    }

    /// Errors worth retrying on a later pass.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Transport(_) | AppError::RateLimited(_) => true,
            AppError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Build a schema canary error, truncating the offending payload.
    pub fn schema(endpoint: &'static str, payload: &[u8]) -> Self {
        const MAX_PREVIEW: usize = 256;
        let text = String::from_utf8_lossy(payload);
        let detail = if text.len() > MAX_PREVIEW {
            let mut end = MAX_PREVIEW;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &text[..end])
        } else {
            text.into_owned()
        };
        AppError::Schema { endpoint, detail }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Transport(_)
            | AppError::Http { .. }
            | AppError::RateLimited(_)
            | AppError::Auth(_)
            | AppError::Schema { .. } => {
                tracing::error!(error = %self, "Remote API error");
                (StatusCode::BAD_GATEWAY, "upstream_error", Some(self.to_string()))
            }
            AppError::Decode(msg) => (StatusCode::BAD_GATEWAY, "decode_error", Some(msg.clone())),
            AppError::EmptyResultSet { .. } => {
                (StatusCode::NOT_FOUND, "empty_result", Some(self.to_string()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;
