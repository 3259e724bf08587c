//! Error types for the counter configuration and evaluation pipeline.
//!
//! Backend primitives report failure through [`BackendError`]; the library
//! wraps those in [`Error::Backend`] tagged with the name of the failing
//! call so diagnostics can point at the exact primitive. No operation
//! retries; every failure is recoverable by the caller.

use thiserror::Error;

/// Failure reported by a backend primitive.
///
/// Modeled after a status-code C API: the backend owns the message, the
/// library never interprets it beyond propagation.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    /// Creates a backend error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The backend-provided failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors produced by pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A backend primitive reported non-success. The enclosing operation
    /// returns immediately after releasing owned resources.
    #[error("backend call {call} failed: {source}")]
    Backend {
        /// Name of the failing backend primitive.
        call: &'static str,
        #[source]
        source: BackendError,
    },

    /// Evaluation was attempted on an empty counter data image. Reported
    /// before any evaluator context is allocated.
    #[error("counter data image is empty")]
    EmptyCounterData,

    /// A requested metric name has no catalog entry. Only raised when
    /// strict resolution is enabled; the default is to drop the name.
    #[error("metric {name:?} has no catalog entry on chip {chip:?}")]
    UnresolvedMetric {
        /// The metric name as requested (modifiers included).
        name: String,
        /// Chip whose catalog was searched.
        chip: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Tags a backend failure with the name of the failing call.
pub(crate) trait BackendCall<T> {
    fn during(self, call: &'static str) -> Result<T>;
}

impl<T> BackendCall<T> for std::result::Result<T, BackendError> {
    fn during(self, call: &'static str) -> Result<T> {
        self.map_err(|source| Error::Backend { call, source })
    }
}
