use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

const DEFAULT_PORT: u16 = 3001;
const TEMP_DIR_NAME: &str = "temp";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub temp_dir: PathBuf,
    pub log_format: LogFormat,
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub google_maps_api_key: Option<String>,
    pub property_api_token: Option<String>,
}

// Keys stay out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &state(&self.openai_api_key))
            .field("google_maps_api_key", &state(&self.google_maps_api_key))
            .field("property_api_token", &state(&self.property_api_token))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    pub google_maps_base_url: String,
    pub openai_base_url: String,
    pub property_api_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            temp_dir: default_temp_dir(),
            log_format: LogFormat::Pretty,
            credentials: Credentials::default(),
            endpoints: Endpoints {
                google_maps_base_url: maps::DEFAULT_BASE_URL.to_string(),
                openai_base_url: enhance::client::DEFAULT_BASE_URL.to_string(),
                property_api_base_url: None,
            },
            concurrency: ConcurrencyConfig {
                request_timeout_secs: 60,
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
        }
    }
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        // Empty values count as unset
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let log_format = match get("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            port: parse_or(&get, "PORT", defaults.port),
            temp_dir: get("TEMP_DIR").map(PathBuf::from).unwrap_or(defaults.temp_dir),
            log_format,
            credentials: Credentials {
                openai_api_key: get("OPENAI_API_KEY"),
                google_maps_api_key: get("GOOGLE_MAPS_API_KEY"),
                property_api_token: get("PROPERTY_API_TOKEN"),
            },
            endpoints: Endpoints {
                google_maps_base_url: get("GOOGLE_MAPS_BASE_URL")
                    .unwrap_or(defaults.endpoints.google_maps_base_url),
                openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.endpoints.openai_base_url),
                property_api_base_url: get("PROPERTY_API_BASE_URL"),
            },
            concurrency: ConcurrencyConfig {
                request_timeout_secs: parse_or(
                    &get,
                    "REQUEST_TIMEOUT_SECS",
                    defaults.concurrency.request_timeout_secs,
                ),
            },
            retry: RetryConfig {
                max_retries: parse_or(&get, "STAGE_MAX_RETRIES", defaults.retry.max_retries),
                initial_backoff_ms: parse_or(
                    &get,
                    "STAGE_INITIAL_BACKOFF_MS",
                    defaults.retry.initial_backoff_ms,
                ),
                max_backoff_ms: parse_or(&get, "STAGE_MAX_BACKOFF_MS", defaults.retry.max_backoff_ms),
            },
        }
    }

    /// Names of the credential variables that are not set
    pub fn missing_variables(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.credentials.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.credentials.google_maps_api_key.is_none() {
            missing.push("GOOGLE_MAPS_API_KEY");
        }
        if self.credentials.property_api_token.is_none() {
            missing.push("PROPERTY_API_TOKEN");
        }
        if self.endpoints.property_api_base_url.is_none() {
            missing.push("PROPERTY_API_BASE_URL");
        }
        missing
    }

    pub fn warn_missing_variables(&self) {
        for variable in self.missing_variables() {
            warn!(variable, "Environment variable not set, requests needing it will fail");
        }
    }
}

/// `temp/` next to the service binary, so the location does not depend on
/// the working directory the service was started from
fn default_temp_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(TEMP_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(TEMP_DIR_NAME))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = key, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}
