//! Error types for context capture, reactivation, discovery and transport.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a context manager or one of its contexts.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("{0}")]
    Failed(String),

    #[error("value type mismatch for manager '{manager}': expected {expected}")]
    ValueType {
        manager: String,
        expected: &'static str,
    },

    #[error("manager '{0}' does not support value transport")]
    NotSerializable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ManagerError {
    pub fn failed(message: impl Into<String>) -> Self {
        ManagerError::Failed(message.into())
    }
}

/// Discovery-related errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to construct '{name}': {reason}")]
    Construction { name: String, reason: String },

    #[error("Unknown plugin '{name}' referenced by {manifest:?}")]
    UnknownPlugin { name: String, manifest: PathBuf },

    #[error("Invalid manifest {path:?}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Discovery unavailable: {0}")]
    Unavailable(String),

    #[error("Discovery scope not supported by this mechanism: {0}")]
    UnsupportedScope(String),

    #[error("Discovery I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure of a timer observer. Never escapes the instrumented operation.
#[derive(Debug, Error)]
#[error("timer '{timer}' failed: {reason}")]
pub struct TimerError {
    pub timer: String,
    pub reason: String,
}

/// Cross-process snapshot transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Snapshot transport is corrupt: {names} manager names but {values} values")]
    LengthMismatch { names: usize, values: usize },

    #[error("Failed to decode value of '{manager}': {source}")]
    Decode {
        manager: String,
        #[source]
        source: ManagerError,
    },

    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by capture, reactivation, close and clear.
///
/// Per-manager variants carry the errors that happened after the primary one
/// (rollback closes, sibling closes) in `suppressed`.
#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("Activating context of '{manager}' failed: {source}")]
    Activate {
        manager: String,
        #[source]
        source: ManagerError,
        suppressed: Vec<PropagationError>,
    },

    #[error("Closing context of '{manager}' failed: {source}")]
    Close {
        manager: String,
        #[source]
        source: ManagerError,
        suppressed: Vec<PropagationError>,
    },

    #[error("Clearing contexts of '{manager}' failed: {source}")]
    Clear {
        manager: String,
        #[source]
        source: ManagerError,
        suppressed: Vec<PropagationError>,
    },

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl PropagationError {
    /// Secondary errors attached to this one.
    pub fn suppressed(&self) -> &[PropagationError] {
        match self {
            PropagationError::Activate { suppressed, .. }
            | PropagationError::Close { suppressed, .. }
            | PropagationError::Clear { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Attach a secondary error. Variants without a suppressed list drop it
    /// after logging.
    pub fn add_suppressed(&mut self, error: PropagationError) {
        match self {
            PropagationError::Activate { suppressed, .. }
            | PropagationError::Close { suppressed, .. }
            | PropagationError::Clear { suppressed, .. } => suppressed.push(error),
            _ => tracing::warn!(error = %error, "dropping secondary error"),
        }
    }

    /// Name of the manager the error originated from, if any.
    pub fn manager(&self) -> Option<&str> {
        match self {
            PropagationError::Activate { manager, .. }
            | PropagationError::Close { manager, .. }
            | PropagationError::Clear { manager, .. } => Some(manager),
            _ => None,
        }
    }
}

/// Errors of the setup surface: configuration loading, logging installation
/// and CLI rendering. Never produced by capture or reactivation.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Failed to render output: {0}")]
    Render(String),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

impl From<config::ConfigError> for SetupError {
    fn from(err: config::ConfigError) -> Self {
        SetupError::Config(err.to_string())
    }
}

/// Fold a sequence of errors into the first one, attaching the rest.
pub(crate) fn first_with_suppressed(
    errors: Vec<PropagationError>,
) -> Result<(), PropagationError> {
    let mut iter = errors.into_iter();
    match iter.next() {
        None => Ok(()),
        Some(mut first) => {
            for later in iter {
                first.add_suppressed(later);
            }
            Err(first)
        }
    }
}
