//! Error types for texp-monitor.
//!
//! All errors are strongly typed using thiserror so callers can
//! pattern match on the specific failure. Oracle errors are carried
//! verbatim; the only oracle answer interpreted locally is the
//! contractiveness judgment, which becomes [`ExecutionError::NotContractive`].

use std::path::PathBuf;

use thiserror::Error;

/// Validation errors raised at the public boundary, before any oracle work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Element '{element}' appears in more than one block")]
    OverlappingBlocks {
        element: String,
    },

    #[error("Malformed partition wire text: {reason}")]
    MalformedWire {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised while serving a retrieval request.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Specification source not found: {}", path.display())]
    SourceNotFound {
        path: PathBuf,
    },

    #[error("Trace expression in {} is not contractive", path.display())]
    NotContractive {
        path: PathBuf,
    },

    #[error("No monitoring safe partition found")]
    NoSafePartitionFound,

    #[error("Specification load {generation} was superseded by load {live}")]
    SpecificationSuperseded {
        generation: u64,
        live: u64,
    },
}

/// Failures surfaced from the oracle round-trip.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle communication failed: {message}")]
    Communication {
        message: String,
    },

    #[error("Failed to consult {}: {message}", path.display())]
    Consult {
        path: PathBuf,
        message: String,
    },

    #[error("No specification is loaded in the oracle session")]
    NoSpecificationLoaded,

    #[error("Safe partition cursor is closed")]
    CursorClosed,

    #[error("Oracle session lock poisoned")]
    SessionPoisoned,

    #[error("Oracle session is already held by this thread")]
    SessionBusy,

    #[error("Oracle answered with an unusable partition: {0}")]
    Malformed(#[from] ValidationError),
}

/// Result type alias for oracle round-trips.
pub type OracleResult<T> = Result<T, OracleError>;

/// Top-level error type for texp-monitor.
#[derive(Debug, Error)]
pub enum TexpError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),
}

impl TexpError {
    /// Shorthand for a missing required argument.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Validation(ValidationError::MissingField {
            field: field.into(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this error came from the oracle.
    #[must_use]
    pub const fn is_oracle(&self) -> bool {
        matches!(self, Self::Oracle(_))
    }

    /// Returns true if no qualifying partition existed.
    #[must_use]
    pub const fn is_no_safe_partition(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::NoSafePartitionFound))
    }
}

/// Result type alias for texp-monitor operations.
pub type TexpResult<T> = Result<T, TexpError>;
