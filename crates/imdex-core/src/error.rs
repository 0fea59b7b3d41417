//! Error types for imdex-core

use thiserror::Error;

/// Result type alias for imdex operations
pub type Result<T> = std::result::Result<T, DexError>;

/// Main error type for imdex operations
#[derive(Error, Debug)]
pub enum DexError {
    /// Remote API errors
    #[error("Api error: {0}")]
    Api(#[from] ApiError),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Field name rejected at the boundary
    #[error("Unknown flag field: {name}")]
    UnknownField { name: String },

    /// Mutation requires an identity and none is available
    #[error("No identity available for this operation")]
    IdentityRequired,

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

/// Remote API errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request exceeded its deadline
    #[error("Request timed out")]
    Timeout,

    /// Transport-level failure (DNS, connect, TLS, aborted body)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Non-2xx response
    #[error("Unexpected status: {code}")]
    Status { code: u16 },

    /// Response body failed shape validation
    #[error("Malformed response: {message}")]
    Malformed { message: String },
}

/// Persistence errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend I/O failure
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// JSON serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted blob carries a schema version this build does not know
    #[error("Unsupported persisted schema version: {version}")]
    UnsupportedVersion { version: u32 },
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend {
            message: message.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DexError {
    fn from(err: serde_json::Error) -> Self {
        DexError::Storage(StorageError::Serialization(err))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DexError {
    fn from(err: rusqlite::Error) -> Self {
        DexError::Storage(StorageError::from(err))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if let Some(status) = err.status() {
            ApiError::Status {
                code: status.as_u16(),
            }
        } else if err.is_decode() {
            ApiError::Malformed {
                message: err.to_string(),
            }
        } else {
            ApiError::Transport {
                message: err.to_string(),
            }
        }
    }
}
