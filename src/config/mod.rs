use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub weaviate: WeaviateConfig,
    pub zephyr: Option<ZephyrConfig>,
    pub request: RequestConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

/// Vector backend configuration
#[derive(Debug, Clone)]
pub struct WeaviateConfig {
    pub url: String,
    pub api_key: Option<String>,
    /// Key forwarded to the backend's text2vec module
    pub vectorizer_api_key: Option<String>,
    /// Vectorizer module declared on the record class
    pub vectorizer: String,
    pub class_name: String,
    pub metadata_class: String,
}

/// Ticketing mirror configuration. Absent when no API key is set.
#[derive(Debug, Clone)]
pub struct ZephyrConfig {
    pub api_key: String,
    pub project_key: String,
    pub base_url: String,
}

/// HTTP timeout and retry configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub connect_timeout_ms: u64,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

/// How the vector backend is queried
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// Pure semantic nearText query
    NearText,
    /// Keyword + vector fusion; `alpha` = 1.0 is pure vector
    Hybrid { alpha: f64 },
}

/// Search behaviour configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub mode: SearchMode,
    pub memory_capacity: usize,
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

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let weaviate = WeaviateConfig {
            url: non_empty("WEAVIATE_URL").ok_or_else(|| AppError::Config {
                message: "WEAVIATE_URL is required".to_string(),
            })?,
            api_key: non_empty("WEAVIATE_API_KEY"),
            vectorizer_api_key: non_empty("OPENAI_API_KEY"),
            vectorizer: env::var("WEAVIATE_VECTORIZER")
                .unwrap_or_else(|_| "text2vec-openai".to_string()),
            class_name: env::var("WEAVIATE_CLASS").unwrap_or_else(|_| "TestCase".to_string()),
            metadata_class: env::var("WEAVIATE_METADATA_CLASS")
                .unwrap_or_else(|_| "Metadata".to_string()),
        };

        let zephyr = non_empty("ZEPHYR_API_KEY").map(|api_key| ZephyrConfig {
            api_key,
            project_key: env::var("ZEPHYR_PROJECT_KEY").unwrap_or_else(|_| "QADEMO".to_string()),
            base_url: env::var("ZEPHYR_BASE_URL")
                .unwrap_or_else(|_| "https://api.zephyrscale.smartbear.com/v2".to_string()),
        });

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            connect_timeout_ms: parsed_or("CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            timeout_ms: parsed_or("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: parsed_or("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: parsed_or("RETRY_DELAY_MS", defaults.retry_delay_ms),
            max_retry_delay_ms: parsed_or("MAX_RETRY_DELAY_MS", defaults.max_retry_delay_ms),
        };

        let mode = match env::var("SEARCH_MODE")
            .unwrap_or_else(|_| "near_text".to_string())
            .to_lowercase()
            .as_str()
        {
            "hybrid" => SearchMode::Hybrid {
                alpha: parsed_or("HYBRID_ALPHA", 0.75_f64).clamp(0.0, 1.0),
            },
            _ => SearchMode::NearText,
        };

        let search = SearchConfig {
            mode,
            memory_capacity: parsed_or("MEMORY_INDEX_CAPACITY", 10_000),
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

        Ok(Config {
            weaviate,
            zephyr,
            request,
            search,
            logging,
        })
    }
}

impl RequestConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 500,
            max_retry_delay_ms: 30000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::NearText,
            memory_capacity: 10_000,
        }
    }
}
