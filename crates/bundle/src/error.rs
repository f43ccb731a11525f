//! Bundle assembly errors.

use thiserror::Error;

/// Errors raised while assembling or packaging a bundle.
#[derive(Debug, Error)]
pub enum Error {
    /// The adapter source could not deliver the adapter files.
    #[error("failed to retrieve adapter '{name}' from '{source_id}': {reason}")]
    Retrieval {
        /// Destination adapter name.
        name: String,
        /// Source identifier as given by the caller.
        source_id: String,
        /// Raw error reported by the source.
        reason: String,
    },

    /// An adapter with the same destination name is already in the bundle.
    #[error("adapter '{0}' already exists in the bundle")]
    NameCollision(String),

    /// The destination name cannot be used as an adapter directory.
    #[error("invalid adapter name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A required bundle component is missing or inconsistent.
    #[error("bundle is incomplete: {0}")]
    Assembly(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory walk failure while packaging.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// JSON decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for bundle operations.
pub type Result<T> = std::result::Result<T, Error>;
