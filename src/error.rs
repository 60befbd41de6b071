//! Error types for the module store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a bare reducer requires a namespace to be mounted")]
    UnscopedReducer,

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("stream disconnected")]
    Disconnected,

    #[error("timed out waiting for a snapshot")]
    Timeout,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
