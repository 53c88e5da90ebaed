//! Error handling for GCodePost
//!
//! Provides the error types used at the edges of the post-processing passes:
//! - G-Code errors (reading and splitting job files)
//! - Processing errors (processor lookup and option validation)
//!
//! The passes themselves never fail on G-code content. Missing sentinels and
//! unparseable fields are treated as "unknown" and the affected output is
//! suppressed instead.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// G-Code error type
///
/// Represents errors related to reading G-code jobs.
#[derive(Error, Debug, Clone)]
pub enum GcodeError {
    /// The job contains no layer blocks at all
    #[error("Job is empty")]
    EmptyJob,

    /// File parsing error
    #[error("File error: {reason}")]
    FileError {
        /// The reason for the file error.
        reason: String,
    },
}

/// Processing error type
///
/// Represents errors raised while building or running a processor pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    /// An option value could not be interpreted
    #[error("Invalid option '{key}' for processor '{processor}': {reason}")]
    InvalidOption {
        /// The processor the option belongs to.
        processor: String,
        /// The option key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No processor is registered under the requested name
    #[error("Unknown processor: {name}")]
    UnknownProcessor {
        /// The requested processor name.
        name: String,
    },

    /// A processor rejected the job
    #[error("Processor '{processor}' failed: {reason}")]
    ProcessorFailed {
        /// The failing processor.
        processor: String,
        /// The failure reason.
        reason: String,
    },
}

impl ProcessingError {
    /// Shorthand for an [`ProcessingError::InvalidOption`]
    pub fn invalid_option(
        processor: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            processor: processor.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for GCodePost
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Processing error
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a processing error
    pub fn is_processing_error(&self) -> bool {
        matches!(self, Error::Processing(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
