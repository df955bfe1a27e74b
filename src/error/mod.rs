use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Ticketing error: {0}")]
    Ticketing(#[from] TicketingError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// A record was rejected before any backend was contacted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field} - {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Vector backend connection lifecycle errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Backend unreachable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("Connect cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("Connection attempt already in progress")]
    InProgress,

    #[error("Connection closed")]
    Closed,
}

/// Schema initialization and versioning errors
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("Cannot reach backend for schema setup: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Schema introspection failed: {message}")]
    Introspection { message: String },

    #[error("Failed to create class {class}: {message}")]
    Creation { class: String, message: String },

    #[error("Failed to add property {property} to {class}: {message}")]
    Upgrade {
        class: String,
        property: String,
        message: String,
    },

    #[error("Failed to write schema version marker: {message}")]
    VersionMarker { message: String },
}

/// A single backend's write failure. Never implies the sibling backend failed.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Schema unavailable: {0}")]
    Schema(#[from] SchemaError),

    #[error("Write rejected: {message}")]
    Backend { message: String },

    #[error("Mirror write rejected: {message}")]
    Ticketing { message: String },
}

/// Vector backend transport errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Query error: {message}")]
    Query { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Timeout { .. } => true,
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::Http(e) => e.is_connect() || e.is_timeout(),
            BackendError::InvalidResponse { .. } | BackendError::Query { .. } => false,
        }
    }
}

/// Ticketing mirror errors
#[derive(Debug, Error)]
pub enum TicketingError {
    #[error("Ticketing API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid ticketing response: {message}")]
    InvalidResponse { message: String },

    #[error("Ticketing request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TicketingError {
    /// Whether the request most likely never took effect and can be resent.
    pub fn is_retryable(&self) -> bool {
        match self {
            TicketingError::Api { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            TicketingError::Http(e) => e.is_connect(),
            TicketingError::Timeout { .. } | TicketingError::InvalidResponse { .. } => false,
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        StoreError::Backend {
            message: err.to_string(),
        }
    }
}

impl From<TicketingError> for StoreError {
    fn from(err: TicketingError) -> Self {
        StoreError::Ticketing {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for vector backend calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for ticketing mirror calls
pub type TicketingResult<T> = Result<T, TicketingError>;
