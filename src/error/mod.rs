use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Function error: {0}")]
    Function(#[from] FunctionError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Premium subscription required for {feature}")]
    PremiumRequired { feature: String },

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Remote collection errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Api { status, .. } => *status >= 500 || *status == 429,
            BackendError::Timeout { .. } | BackendError::Http(_) => true,
            BackendError::Unavailable { .. }
            | BackendError::InvalidRequest { .. }
            | BackendError::InvalidResponse { .. } => false,
        }
    }

    /// Whether the request failed before reaching the server.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, BackendError::Http(e) if e.is_connect())
    }
}

/// Local snapshot persistence errors
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Cache connection failed: {message}")]
    Connection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Unsupported snapshot version {found} (max {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Corrupt snapshot under {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serverless function errors
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Function {name} failed: {status} - {message}")]
    Failed {
        name: String,
        status: u16,
        message: String,
    },

    #[error("Invalid function response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Input validation errors, raised before any remote call
#[derive(Debug, Error)]
#[error("{field} - {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for a field
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for remote collection operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for persistence operations
pub type PersistResult<T> = Result<T, PersistError>;

/// Result type alias for serverless function calls
pub type FunctionResult<T> = Result<T, FunctionError>;
