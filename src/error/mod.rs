//! Error handling for the matching pipeline and the evaluation engine.

pub mod util;

use std::io;
use std::path::PathBuf;

/// Specialized error type for matching and evaluation
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// Invalid configuration (loading specs, parameter values, existing outputs)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input data violates an invariant (duplicate ids, orphan controls, missing columns)
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// An external collaborator (neighbour search, resolver, regression) failed
    #[error("{collaborator} failed during {phase}: {message}")]
    Collaborator {
        /// Which collaborator failed
        collaborator: &'static str,
        /// Stratum or statistic being computed
        phase: String,
        /// Underlying failure description
        message: String,
    },

    /// The resolver exhausted its recursion budget
    #[error(
        "Duplicate resolution for stratum '{stratum}' exceeded the recursion budget of {depth} frames; \
         increase the execution stack budget (--stack-size-mb) and rerun"
    )]
    StackExhausted {
        /// Stratum whose resolution failed
        stratum: String,
        /// Depth budget that was exceeded
        depth: usize,
    },

    /// A binary-only or continuous-only method was called on the wrong variable kind
    #[error("Type misuse: {0}")]
    TypeMisuse(String),

    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// IO error tied to a specific path
    #[error("{context} ({}): {source}", path.display())]
    IoAt {
        /// Path that was being accessed
        path: PathBuf,
        /// What the file was needed for
        context: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Error reading or writing a TSV file
    #[error("TSV error: {0}")]
    Tsv(#[from] csv::Error),

    /// Error serializing a JSON summary
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MatchError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a data integrity error
    pub fn data_integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    /// Create a type misuse error
    pub fn type_misuse(message: impl Into<String>) -> Self {
        Self::TypeMisuse(message.into())
    }

    /// Create a collaborator failure with phase context
    pub fn collaborator(
        collaborator: &'static str,
        phase: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Collaborator {
            collaborator,
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Wrap an IO error with the path and purpose of the access
    pub fn io_at(path: impl Into<PathBuf>, context: impl Into<String>, source: io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            context: context.into(),
            source,
        }
    }

    /// Whether the error was caused by invalid input data
    #[must_use]
    pub const fn is_data_integrity(&self) -> bool {
        matches!(self, Self::DataIntegrity(_))
    }
}

/// Result type for matching and evaluation operations
pub type Result<T> = std::result::Result<T, MatchError>;
