// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rate-limited request executor.
//!
//! Every outbound call runs inside one process-wide exclusive section
//! covering the credential check, the HTTP call and the interpretation of
//! the rate-limit headers. The limiter is purely reactive: nothing is
//! remembered between calls except what the server last reported, and the
//! pause is taken before the section is released.

use crate::error::AppError;
use crate::services::clock::Clock;
use crate::services::metrics::{Counter, MetricsSink};
use crate::services::session::SessionManager;
use crate::time_utils;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use reqwest::header;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const USER_AGENT: &str = "iRcollector";

const REMAINING_HEADERS: [&str; 2] = ["ratelimit-remaining", "x-ratelimit-remaining"];
const RESET_HEADERS: [&str; 2] = ["ratelimit-reset", "x-ratelimit-reset"];

/// Pacing constants.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Below this many remaining calls, wait for the reset instant
    pub low_water_mark: i64,
    /// Wait this long when the reset header can't be parsed
    pub reset_fallback: Duration,
    /// Fixed pause after a legacy host call without rate-limit headers
    pub legacy_sleep: Duration,
    /// Pause after a call to any other host without rate-limit headers
    pub safety_sleep: Duration,
    /// Unconditional pause after every call
    pub trailing_sleep: Duration,
    /// Pause after a transport failure or non-2xx response
    pub error_cooldown: Duration,
    /// Pause after a 429
    pub rate_limit_cooldown: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            low_water_mark: 10,
            reset_fallback: Duration::from_secs(60),
            legacy_sleep: Duration::from_secs(2),
            safety_sleep: Duration::from_millis(444),
            trailing_sleep: Duration::from_millis(111),
            error_cooldown: Duration::from_secs(2),
            rate_limit_cooldown: Duration::from_secs(60),
        }
    }
}

/// Rate-limit state as last reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSignal {
    /// Unparsable values count as zero
    pub remaining: i64,
    /// Reset instant as epoch seconds; `None` when unparsable
    pub reset_epoch: Option<i64>,
}

impl RateLimitSignal {
    /// Read both header generations. Both remaining and reset must be
    /// present for the signal to count.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = first_header(headers, &REMAINING_HEADERS)?;
        let reset = first_header(headers, &RESET_HEADERS)?;
        Some(Self {
            remaining: remaining.trim().parse().unwrap_or(0),
            reset_epoch: reset.trim().parse().ok(),
        })
    }
}

fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
}

/// What to wait for after a successful call (on top of the trailing sleep).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    None,
    Until(DateTime<Utc>),
    For(Duration),
}

impl RateLimitPolicy {
    pub fn pause_after_success(
        &self,
        signal: Option<&RateLimitSignal>,
        is_legacy: bool,
        now: DateTime<Utc>,
    ) -> Pause {
        match signal {
            Some(signal) if signal.remaining < self.low_water_mark => {
                let until = signal
                    .reset_epoch
                    .and_then(time_utils::from_epoch_seconds)
                    .unwrap_or_else(|| {
                        now + chrono::Duration::from_std(self.reset_fallback)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60))
                    });
                Pause::Until(until)
            }
            Some(_) => Pause::None,
            None if is_legacy => Pause::For(self.legacy_sleep),
            None => Pause::For(self.safety_sleep),
        }
    }
}

/// One outbound GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    /// Cached-link targets and chunk files are fetched without credentials
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            authenticated: true,
        }
    }

    pub fn unauthenticated(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            authenticated: false,
        }
    }
}

/// Serialized, paced HTTP executor shared by every caller in the process.
pub struct RequestExecutor {
    http: reqwest::Client,
    session: Arc<SessionManager>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    policy: RateLimitPolicy,
    legacy_base_url: String,
    gate: Mutex<()>,
}

impl RequestExecutor {
    pub fn new(
        http: reqwest::Client,
        session: Arc<SessionManager>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        legacy_base_url: &str,
    ) -> Self {
        Self {
            http,
            session,
            clock,
            metrics,
            policy: RateLimitPolicy::default(),
            legacy_base_url: legacy_base_url.trim_end_matches('/').to_string(),
            gate: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Whether `url` lives on the legacy member site.
    pub fn is_legacy(&self, url: &str) -> bool {
        match url.strip_prefix(&self.legacy_base_url) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }

    /// Fetch `request.url` and return the raw body.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Vec<u8>, AppError> {
        let _gate = self.gate.lock().await;

        let result = self.execute_locked(request).await;
        self.clock.sleep(self.policy.trailing_sleep).await;
        result
    }

    async fn execute_locked(&self, request: &ApiRequest) -> Result<Vec<u8>, AppError> {
        let bearer = if request.authenticated {
            self.session.ensure_valid().await?
        } else {
            None
        };

        let mut builder = self
            .http
            .get(&request.url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(header::ACCEPT_CHARSET, "UTF-8,utf-8;q=0.7,*;q=0.3")
            .header(header::CACHE_CONTROL, "max-age=0")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.8");
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                self.metrics.incr(Counter::RequestError);
                tracing::warn!(url = %request.url, error = %e, "Request failed");
                self.clock.sleep(self.policy.error_cooldown).await;
                return Err(AppError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.metrics.incr(Counter::RequestError);
            tracing::warn!(url = %request.url, status = status.as_u16(), "Non-success response");

            if status.as_u16() == 429 {
                self.clock.sleep(self.policy.rate_limit_cooldown).await;
                return Err(AppError::RateLimited(request.url.clone()));
            }
            if status.as_u16() == 401 && request.authenticated {
                // Credential was revoked server-side; log in again next time.
                self.session.invalidate().await;
            }
            self.clock.sleep(self.policy.error_cooldown).await;
            return Err(AppError::Http {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        let signal = RateLimitSignal::from_headers(response.headers());
        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                self.metrics.incr(Counter::RequestError);
                return Err(AppError::Transport(format!("read body: {}", e)));
            }
        };

        match self.policy.pause_after_success(
            signal.as_ref(),
            self.is_legacy(&request.url),
            self.clock.now(),
        ) {
            Pause::None => {}
            Pause::Until(deadline) => {
                tracing::debug!(
                    until = %time_utils::format_utc_rfc3339(deadline),
                    "Sleeping for rate limit reset"
                );
                self.clock.sleep_until(deadline).await;
            }
            Pause::For(duration) => self.clock.sleep(duration).await,
        }

        self.metrics.incr(Counter::RequestTotal);
        Ok(body.to_vec())
    }
}
