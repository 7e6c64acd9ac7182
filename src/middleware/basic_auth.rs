// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP Basic authentication for the admin endpoints.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use subtle::ConstantTimeEq;

const CHALLENGE: &str = r#"Basic realm="iRcollector""#;

/// Middleware that requires the configured admin credentials.
pub async fn require_basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_basic);

    let authorized = match presented {
        Some((username, password)) => credentials_match(
            &username,
            &password,
            &state.config.admin_username,
            &state.config.admin_password,
        ),
        None => false,
    };

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return unauthorized();
    }

    next.run(request).await
}

/// Split an `Authorization: Basic ...` value into username and password.
fn parse_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Constant-time comparison; an empty configured password never matches.
fn credentials_match(username: &str, password: &str, expected_user: &str, expected_pass: &str) -> bool {
    if expected_pass.is_empty() {
        return false;
    }
    let user_ok = username.as_bytes().ct_eq(expected_user.as_bytes());
    let pass_ok = password.as_bytes().ct_eq(expected_pass.as_bytes());
    (user_ok & pass_ok).into()
}

fn unauthorized() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
    response
}
