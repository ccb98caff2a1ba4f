use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Upper bound on `MAX_RETRIES`.
pub const MAX_RETRY_LIMIT: u32 = 10;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub freshness: FreshnessConfig,
}

/// Hosted backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub anon_key: String,
    pub functions_url: String,
}

/// Local snapshot cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub namespace: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// How long fetched data stays fresh per store
#[derive(Debug, Clone)]
pub struct FreshnessConfig {
    pub mood_secs: u64,
    pub therapy_secs: u64,
}

impl FreshnessConfig {
    pub fn mood(&self) -> Duration {
        Duration::from_secs(self.mood_secs)
    }

    pub fn therapy(&self) -> Duration {
        Duration::from_secs(self.therapy_secs)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = env::var("BACKEND_URL")
            .map_err(|_| AppError::Config {
                message: "BACKEND_URL is required".to_string(),
            })?
            .trim_end_matches('/')
            .to_string();

        let backend = BackendConfig {
            anon_key: env::var("BACKEND_ANON_KEY").map_err(|_| AppError::Config {
                message: "BACKEND_ANON_KEY is required".to_string(),
            })?,
            functions_url: env::var("FUNCTIONS_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("{}/functions/v1", base_url)),
            base_url,
        };

        let cache = CacheConfig {
            path: PathBuf::from(
                env::var("CACHE_PATH").unwrap_or_else(|_| "./data/cache.db".to_string()),
            ),
            max_connections: parse_var("CACHE_MAX_CONNECTIONS", 5),
            namespace: env::var("CACHE_NAMESPACE").unwrap_or_else(|_| "mindful".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS", 30000),
            max_retries: parse_var("MAX_RETRIES", 3).min(MAX_RETRY_LIMIT),
            retry_delay_ms: parse_var("RETRY_DELAY_MS", 1000),
        };

        let freshness = FreshnessConfig {
            mood_secs: parse_var("MOOD_FRESHNESS_SECS", 300),
            therapy_secs: parse_var("THERAPY_FRESHNESS_SECS", 3600),
        };

        Ok(Config {
            backend,
            cache,
            logging,
            request,
            freshness,
        })
    }
}

impl Config {
    /// Configuration for running without a backend.
    ///
    /// Tuning variables are still read from the environment; the backend
    /// section points nowhere and is never contacted.
    pub fn offline() -> Self {
        let _ = dotenvy::dotenv();

        Config {
            backend: BackendConfig {
                base_url: "http://localhost".to_string(),
                anon_key: String::new(),
                functions_url: "http://localhost/functions/v1".to_string(),
            },
            cache: CacheConfig {
                namespace: env::var("CACHE_NAMESPACE").unwrap_or_else(|_| "mindful".to_string()),
                ..CacheConfig::default()
            },
            logging: LoggingConfig {
                level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            freshness: FreshnessConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            mood_secs: 300,
            therapy_secs: 3600,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/cache.db"),
            max_connections: 5,
            namespace: "mindful".to_string(),
        }
    }
}
