//! Public error types.
//!
//! Internal compile errors are converted to these types at the API
//! boundary. Each one becomes a [`Diagnostic`] carrying the (event, action)
//! coordinate it was raised at and a stable error code.

use tracing::error;

use crate::compiler::{CompileErrorKind, CompileFailure, Coordinate};
use crate::{String, Vec};

#[cfg(feature = "std")]
use std::fmt;

#[cfg(not(feature = "std"))]
use core::fmt;

/// Public error type for all compiler operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid API usage (e.g., registering a group under a GUID in use).
    Api(String),

    /// The trigger or action group is invalid.
    ///
    /// Contains one diagnostic per error, in the order they were found,
    /// followed by the warnings raised before compilation stopped.
    Compilation { diagnostics: Vec<Diagnostic> },

    /// The compiler broke one of its own invariants. No program is produced.
    Internal { diagnostic: Diagnostic },
}

impl Error {
    /// All diagnostics carried by the error.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Error::Api(_) => &[],
            Error::Compilation { diagnostics } => diagnostics,
            Error::Internal { diagnostic } => core::slice::from_ref(diagnostic),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Api(msg) => write!(f, "API error: {}", msg),
            Error::Compilation { diagnostics } => {
                let error_count = diagnostics
                    .iter()
                    .filter(|d| d.severity == Severity::Error)
                    .count();
                write!(f, "Compilation failed with {} error(s)", error_count)
            }
            Error::Internal { diagnostic } => write!(f, "Internal compiler error: {}", diagnostic.message),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// A diagnostic message (error or warning) with its trigger coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Severity level (error, warning, info).
    pub severity: Severity,

    /// Primary diagnostic message.
    pub message: String,

    /// Event and action the diagnostic refers to, when there is one.
    pub coordinate: Option<Coordinate>,

    /// Optional help text suggesting how to fix the issue.
    pub help: Option<String>,

    /// Optional error code (e.g., "E001") for documentation lookup.
    pub code: Option<String>,
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - compilation cannot succeed.
    Error,
    /// Warning - suspicious input that still compiles.
    Warning,
    /// Info - informational message.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

// ============================================================================
// Conversion from internal errors
// ============================================================================

impl From<CompileFailure> for Error {
    fn from(failure: CompileFailure) -> Self {
        let internal = failure
            .errors
            .iter()
            .find(|err| matches!(err.kind, CompileErrorKind::LoweringInvariant { .. }));
        if let Some(err) = internal {
            error!(error = %err, coordinate = ?err.coordinate, "internal compiler fault");
            return Error::Internal {
                diagnostic: err.to_diagnostic(),
            };
        }

        let diagnostics = failure
            .errors
            .iter()
            .map(|err| err.to_diagnostic())
            .chain(failure.warnings.iter().map(|w| w.to_diagnostic()))
            .collect();
        Error::Compilation { diagnostics }
    }
}
