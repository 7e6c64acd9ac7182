//! Application configuration loaded from environment variables.
//!
//! Credentials and tuning knobs are read once at startup; nothing here is
//! mutated afterwards.

use std::env;
use std::time::Duration;

/// How the collector authenticates against the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Bearer access token + refresh token (OAuth password_limited flow).
    Token,
    /// Legacy cookie session established by a JSON login.
    Session,
}

impl AuthScheme {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "token" | "oauth" => Ok(AuthScheme::Token),
            "session" | "cookie" => Ok(AuthScheme::Session),
            _ => Err(ConfigError::Invalid("IR_AUTH_SCHEME", value.to_string())),
        }
    }
}

/// Which persistence backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Remote base URLs. Overridable so tests can target a local fake.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    /// OAuth token endpoint (login + refresh grants)
    pub oauth_token_url: String,
    /// Legacy cookie-session login endpoint
    pub session_auth_url: String,
    /// Base of the data API, e.g. `https://members-ng.iracing.com/data`
    pub data_base_url: String,
    /// Base of the legacy member site; any URL under it is paced as legacy
    pub legacy_base_url: String,
    /// Prefix for image asset paths
    pub asset_base_url: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            oauth_token_url: "https://oauth.iracing.com/oauth2/token".to_string(),
            session_auth_url: "https://members-ng.iracing.com/auth".to_string(),
            data_base_url: "https://members-ng.iracing.com/data".to_string(),
            legacy_base_url: "https://members.iracing.com".to_string(),
            asset_base_url: "https://images-static.iracing.com".to_string(),
        }
    }
}

impl ApiEndpoints {
    /// All endpoints served from one base URL (local fakes).
    pub fn local(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            oauth_token_url: format!("{}/oauth2/token", base),
            session_auth_url: format!("{}/auth", base),
            data_base_url: format!("{}/data", base),
            legacy_base_url: format!("{}/legacy", base),
            asset_base_url: format!("{}/assets", base),
        }
    }
}

/// Account credentials for the remote service.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Sync engine tuning. The multiplier and cadence are empirical.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Sleep between two collection cycles
    pub cycle_interval: Duration,
    /// Every Nth cycle is a forced full resync
    pub forced_resync_every: u32,
    /// A race is settled once `avg_lap * laps * multiplier` has elapsed since its start
    pub staleness_multiplier: f64,
    /// Stored season metadata younger than this is not rewritten
    pub season_refresh_after: chrono::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(99 * 60),
            forced_resync_every: 33,
            staleness_multiplier: 25.0,
            season_refresh_after: chrono::Duration::hours(12),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub auth_scheme: AuthScheme,
    pub endpoints: ApiEndpoints,
    /// Transport-level timeout for every outbound call
    pub http_timeout: Duration,

    /// Basic auth for the admin endpoints
    pub admin_username: String,
    pub admin_password: String,

    pub store_backend: StoreBackend,
    /// GCP project of the Firestore database
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    pub sync: SyncSettings,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            credentials: Credentials {
                username: "racer@example.com".to_string(),
                password: "hunter2".to_string(),
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
            },
            auth_scheme: AuthScheme::Token,
            endpoints: ApiEndpoints::default(),
            http_timeout: Duration::from_secs(5),
            admin_username: "admin".to_string(),
            admin_password: "secret".to_string(),
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            sync: SyncSettings::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let auth_scheme = match env::var("IR_AUTH_SCHEME") {
            Ok(v) => AuthScheme::parse(&v)?,
            Err(_) => AuthScheme::Token,
        };

        // The session scheme never talks to the OAuth server.
        let (client_id, client_secret) = match auth_scheme {
            AuthScheme::Token => (
                required("IR_CLIENT_ID")?,
                required("IR_CLIENT_SECRET")?,
            ),
            AuthScheme::Session => (
                env::var("IR_CLIENT_ID").unwrap_or_default(),
                env::var("IR_CLIENT_SECRET").unwrap_or_default(),
            ),
        };

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("firestore") | Err(_) => StoreBackend::Firestore,
            Ok(other) => return Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        };

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            cycle_interval: Duration::from_secs(parse_or("SYNC_INTERVAL_MINUTES", 99u64)? * 60),
            forced_resync_every: parse_or("FORCED_RESYNC_EVERY", defaults.forced_resync_every)?
                .max(1),
            staleness_multiplier: parse_or("STALENESS_MULTIPLIER", defaults.staleness_multiplier)?,
            season_refresh_after: defaults.season_refresh_after,
        };

        Ok(Self {
            credentials: Credentials {
                username: required("IR_USERNAME")?,
                password: required("IR_PASSWORD")?,
                client_id,
                client_secret,
            },
            auth_scheme,
            endpoints: ApiEndpoints::default(),
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 60u64)?),
            admin_username: required("AUTH_USERNAME")?,
            admin_password: required("AUTH_PASSWORD")?,
            store_backend,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080u16)?,
            sync,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, v.clone())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
