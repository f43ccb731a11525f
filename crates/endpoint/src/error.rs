//! Lifecycle errors.

use crate::EndpointStatus;
use std::{fmt, path::PathBuf, time::Duration};
use thiserror::Error;

/// Lifecycle stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Registration,
    Provisioning,
    Polling,
    Invocation,
    Teardown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Registration => "registration",
            Self::Provisioning => "provisioning",
            Self::Polling => "polling",
            Self::Invocation => "invocation",
            Self::Teardown => "teardown",
        })
    }
}

/// Errors surfaced by the [`crate::Driver`].
///
/// `reason` fields carry the managed service's raw error text. Nothing is
/// retried and nothing created before the failure is rolled back.
#[derive(Debug, Error)]
pub enum Error {
    /// The archive could not be uploaded.
    #[error("upload of {} to {uri} failed: {reason}", .archive.display())]
    Upload {
        archive: PathBuf,
        uri: String,
        reason: String,
    },

    /// The model resource could not be created.
    #[error("registration of model '{model}' failed: {reason}")]
    Registration { model: String, reason: String },

    /// The endpoint could not be created or reached `Failed`.
    #[error("endpoint '{endpoint}' failed to provision: {reason}")]
    Provisioning { endpoint: String, reason: String },

    /// The endpoint was still provisioning when the poll deadline passed.
    #[error("endpoint '{endpoint}' still {last} after {waited:?}")]
    Timeout {
        endpoint: String,
        waited: Duration,
        last: EndpointStatus,
    },

    /// The runtime rejected or failed an inference request.
    #[error("invocation of endpoint '{endpoint}' failed (adapter {adapter:?}): {reason}")]
    Invocation {
        endpoint: String,
        adapter: Option<String>,
        reason: String,
    },

    /// A service call outside the named stages failed.
    #[error("{stage} failed: {reason}")]
    Service { stage: Stage, reason: String },
}

impl Error {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Upload { .. } => Stage::Upload,
            Self::Registration { .. } => Stage::Registration,
            Self::Provisioning { .. } => Stage::Provisioning,
            Self::Timeout { .. } => Stage::Polling,
            Self::Invocation { .. } => Stage::Invocation,
            Self::Service { stage, .. } => *stage,
        }
    }
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
