// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session/token manager.
//!
//! Owns the single live credential of the process. Two schemes exist:
//! - `Token`: OAuth `password_limited` login plus `refresh_token` grants,
//!   the access token is sent as a bearer header.
//! - `Session`: JSON login against the legacy auth endpoint, the session
//!   cookie lives in the shared HTTP client's cookie store.
//!
//! At most one login or refresh is in flight at any time; concurrent
//! callers wait for it and then reuse its result.

use crate::config::{ApiEndpoints, AuthScheme, Credentials};
use crate::error::AppError;
use crate::services::clock::Clock;
use crate::services::metrics::{Counter, MetricsSink};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Sessions older than this always get a full login.
pub const MAX_SESSION_AGE_SECS: i64 = 2 * 60 * 60;
/// Credentials are treated as expired this long before they actually are.
pub const SAFETY_MARGIN_SECS: i64 = 30;
/// Pause after any failed login or refresh.
pub const LOGIN_COOLDOWN_SECS: u64 = 3;
/// Extra pause when the auth server answers 429.
pub const LOGIN_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;

/// Access token lifetime assumed when the server omits it.
const DEFAULT_EXPIRES_IN: i64 = 555;
/// Refresh token lifetime assumed when the server omits it.
const DEFAULT_REFRESH_EXPIRES_IN: i64 = 3456;

const OAUTH_SCOPE: &str = "iracing.auth";

/// Timing knobs of the credential lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub max_session_age: Duration,
    pub safety_margin: Duration,
    pub cooldown: std::time::Duration,
    pub rate_limit_cooldown: std::time::Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_session_age: Duration::seconds(MAX_SESSION_AGE_SECS),
            safety_margin: Duration::seconds(SAFETY_MARGIN_SECS),
            cooldown: std::time::Duration::from_secs(LOGIN_COOLDOWN_SECS),
            rate_limit_cooldown: std::time::Duration::from_secs(LOGIN_RATE_LIMIT_COOLDOWN_SECS),
        }
    }
}

/// What `ensure_valid` has to do before a request may go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    None,
    Refresh,
    Login,
}

/// The current credential. Lives only in memory.
#[derive(Clone)]
pub struct Credential {
    /// Bearer token; `None` for cookie sessions
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// When the last full login happened
    pub session_started_at: DateTime<Utc>,
    /// When the access token was issued (login or refresh)
    pub issued_at: DateTime<Utc>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: i64,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("session_started_at", &self.session_started_at)
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish()
    }
}

impl Credential {
    pub fn access_expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.expires_in)
    }

    pub fn refresh_expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.refresh_expires_in)
    }

    /// Decide whether this credential can be used as-is at `now`.
    pub fn next_action(&self, now: DateTime<Utc>, policy: &SessionPolicy) -> AuthAction {
        if now - self.session_started_at > policy.max_session_age {
            return AuthAction::Login;
        }
        if self.access_expires_at() - policy.safety_margin > now {
            return AuthAction::None;
        }
        if self.refresh_token.is_some() && self.refresh_expires_at() - policy.safety_margin > now {
            return AuthAction::Refresh;
        }
        AuthAction::Login
    }

    /// Build a credential from an OAuth token response, applying defaults.
    fn from_token_response(
        response: TokenResponse,
        session_started_at: DateTime<Utc>,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Auth("no access token in token response".to_string()))?;

        let expires_in = response
            .expires_in
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN);
        let refresh_token = response.refresh_token.filter(|t| !t.is_empty());

        // Without a refresh token the next expiry forces a full login.
        let refresh_expires_in = match refresh_token {
            Some(_) => response
                .refresh_token_expires_in
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_REFRESH_EXPIRES_IN),
            None => expires_in,
        };

        Ok(Self {
            access_token: Some(access_token),
            refresh_token,
            session_started_at,
            issued_at,
            expires_in,
            refresh_expires_in,
        })
    }
}

/// OAuth token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[allow(dead_code)]
    token_type: Option<String>,
    expires_in: Option<i64>,
    refresh_token_expires_in: Option<i64>,
}

/// Mask a secret the way the auth server expects:
/// `base64(sha256(secret + lowercase(identifier)))`.
pub fn mask_secret(secret: &str, identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(identifier.to_lowercase().as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Owner of the process-wide credential.
pub struct SessionManager {
    http: reqwest::Client,
    credentials: Credentials,
    scheme: AuthScheme,
    oauth_token_url: String,
    session_auth_url: String,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    policy: SessionPolicy,
    current: RwLock<Option<Credential>>,
    /// Serializes login/refresh operations
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    /// `http` must be the same client (and cookie store) the executor uses.
    pub fn new(
        http: reqwest::Client,
        credentials: Credentials,
        scheme: AuthScheme,
        endpoints: &ApiEndpoints,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            http,
            credentials,
            scheme,
            oauth_token_url: endpoints.oauth_token_url.clone(),
            session_auth_url: endpoints.session_auth_url.clone(),
            clock,
            metrics,
            policy: SessionPolicy::default(),
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Snapshot of the current credential, if any.
    pub async fn current(&self) -> Option<Credential> {
        self.current.read().await.clone()
    }

    /// Drop the current credential so the next call performs a full login.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    /// Make sure a usable credential exists.
    ///
    /// Returns the bearer token to send (token scheme), or `None` when the
    /// cookie store carries the session.
    pub async fn ensure_valid(&self) -> Result<Option<String>, AppError> {
        // Fast path: no locking beyond the read guard
        if let Some(cred) = self.current.read().await.as_ref() {
            if cred.next_action(self.clock.now(), &self.policy) == AuthAction::None {
                return Ok(cred.access_token.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have logged in or refreshed while we waited.
        let now = self.clock.now();
        let existing = self.current.read().await.clone();
        let action = existing
            .as_ref()
            .map(|c| c.next_action(now, &self.policy))
            .unwrap_or(AuthAction::Login);

        let result = match (action, existing) {
            (AuthAction::None, Some(cred)) => return Ok(cred.access_token),
            (AuthAction::Refresh, Some(cred)) => {
                tracing::debug!("Access token expiring, refreshing");
                self.refresh(&cred).await
            }
            _ => {
                tracing::debug!(scheme = ?self.scheme, "Logging in");
                self.login().await
            }
        };

        match result {
            Ok(cred) => {
                let token = cred.access_token.clone();
                *self.current.write().await = Some(cred);
                Ok(token)
            }
            Err(e) => {
                self.metrics.incr(Counter::LoginError);
                tracing::warn!(error = %e, "Authentication attempt failed");
                self.clock.sleep(self.policy.cooldown).await;
                Err(e)
            }
        }
    }

    async fn login(&self) -> Result<Credential, AppError> {
        match self.scheme {
            AuthScheme::Token => self.login_token().await,
            AuthScheme::Session => self.login_session().await,
        }
    }

    /// OAuth password_limited grant.
    async fn login_token(&self) -> Result<Credential, AppError> {
        let c = &self.credentials;
        let password = mask_secret(&c.password, &c.username);
        let client_secret = mask_secret(&c.client_secret, &c.client_id);

        let response = self
            .http
            .post(&self.oauth_token_url)
            .form(&[
                ("grant_type", "password_limited"),
                ("client_id", c.client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("username", c.username.as_str()),
                ("password", password.as_str()),
                ("scope", OAUTH_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Login request failed: {}", e)))?;

        let token: TokenResponse = self.check_auth_response(response, true).await?;
        let now = self.clock.now();
        let cred = Credential::from_token_response(token, now, now)?;
        tracing::info!(
            expires_in = cred.expires_in,
            refresh_expires_in = cred.refresh_expires_in,
            "Logged in"
        );
        Ok(cred)
    }

    /// OAuth refresh_token grant. Keeps the original session start.
    async fn refresh(&self, existing: &Credential) -> Result<Credential, AppError> {
        let Some(refresh_token) = existing.refresh_token.as_deref() else {
            return self.login().await;
        };
        let c = &self.credentials;
        let client_secret = mask_secret(&c.client_secret, &c.client_id);

        let response = self
            .http
            .post(&self.oauth_token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", c.client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Token refresh request failed: {}", e)))?;

        let token: TokenResponse = match self.check_auth_response(response, false).await {
            Ok(t) => t,
            Err(e) => {
                // A rejected refresh token is useless, start over next time.
                *self.current.write().await = None;
                return Err(e);
            }
        };
        let cred =
            Credential::from_token_response(token, existing.session_started_at, self.clock.now())?;
        tracing::debug!(expires_in = cred.expires_in, "Access token refreshed");
        Ok(cred)
    }

    /// Legacy JSON login; the cookie store keeps the session.
    async fn login_session(&self) -> Result<Credential, AppError> {
        let c = &self.credentials;
        let body = serde_json::json!({
            "email": c.username,
            "password": mask_secret(&c.password, &c.username),
        });

        let response = self
            .http
            .post(&self.session_auth_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Login request failed: {}", e)))?;

        let _: serde_json::Value = self.check_auth_response(response, true).await?;
        let now = self.clock.now();
        let lifetime = self.policy.max_session_age.num_seconds();
        tracing::info!("Logged in (cookie session)");
        Ok(Credential {
            access_token: None,
            refresh_token: None,
            session_started_at: now,
            issued_at: now,
            expires_in: lifetime,
            refresh_expires_in: lifetime,
        })
    }

    /// Classify an auth endpoint response and decode its JSON body.
    ///
    /// Rejected credentials on a full login are fatal; everything else is
    /// retried by the caller's own schedule.
    async fn check_auth_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        is_login: bool,
    ) -> Result<T, AppError> {
        let status = response.status();
        let url = response.url().to_string();

        if status.as_u16() == 429 {
            tracing::warn!(url = %url, "Auth endpoint rate limit hit (429)");
            self.clock.sleep(self.policy.rate_limit_cooldown).await;
            return Err(AppError::RateLimited(url));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Auth request rejected");
            return Err(match status.as_u16() {
                400 | 401 | 403 if is_login => {
                    AppError::Auth(format!("login rejected with HTTP {}", status.as_u16()))
                }
                code => AppError::Http { status: code, url },
            });
        }

        let bytes = response.bytes().await?;
        // Session logins may answer with an empty body.
        if bytes.is_empty() {
            return serde_json::from_slice(b"null").map_err(AppError::from);
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Auth(format!("could not decode auth response: {}", e))
        })
    }
}
