//! Error types for the HTTP cache and cached client.

use thiserror::Error;

/// Failure of the backing cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of an outbound fetch. Never cached.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

impl FetchError {
    /// True for timeouts and connection failures that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
