use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const API_URL_VAR: &str = "DRUGSPEAK_API_URL";
pub const API_TIMEOUT_VAR: &str = "DRUGSPEAK_API_TIMEOUT_MS";
pub const SYNC_DEBOUNCE_VAR: &str = "DRUGSPEAK_SYNC_DEBOUNCE_MS";
pub const EVAL_LATENCY_VAR: &str = "DRUGSPEAK_EVAL_LATENCY_MS";

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_millis(15_000);
const DEFAULT_SYNC_DEBOUNCE: Duration = Duration::from_millis(2_000);
const DEFAULT_EVAL_LATENCY: Duration = Duration::from_millis(500);

/// Where the backend lives and how long auth requests may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: String,
    pub auth_timeout: Duration,
}

impl ApiConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `base_url` does not parse.
    pub fn new(base_url: &str, auth_timeout: Duration) -> Result<Self, ConfigError> {
        Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl {
            var: API_URL_VAR,
            raw: base_url.to_owned(),
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth_timeout,
        })
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_owned(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

/// Runtime knobs for the whole app, read from `DRUGSPEAK_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub sync_debounce: Duration,
    pub evaluation_latency: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            sync_debounce: DEFAULT_SYNC_DEBOUNCE,
            evaluation_latency: DEFAULT_EVAL_LATENCY,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Unset or blank variables fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        let base_url = value(API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        let auth_timeout = millis(API_TIMEOUT_VAR, value(API_TIMEOUT_VAR), DEFAULT_AUTH_TIMEOUT)?;

        Ok(Self {
            api: ApiConfig::new(base_url.trim(), auth_timeout)?,
            sync_debounce: millis(
                SYNC_DEBOUNCE_VAR,
                value(SYNC_DEBOUNCE_VAR),
                DEFAULT_SYNC_DEBOUNCE,
            )?,
            evaluation_latency: millis(
                EVAL_LATENCY_VAR,
                value(EVAL_LATENCY_VAR),
                DEFAULT_EVAL_LATENCY,
            )?,
        })
    }
}

fn millis(
    var: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidMillis { var, raw })
}
