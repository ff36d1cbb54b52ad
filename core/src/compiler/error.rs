//! Compilation errors.

use core::fmt;

use crate::api::{Diagnostic, Severity};
use crate::registry::Construct;
use crate::vm::VariableKind;
use crate::{String, ToString};

/// Where in the trigger a diagnostic originates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    /// Index of the event in the trigger (or of the action in an action group).
    pub event: usize,
    /// Index of the action in the event body; `None` for the event entry.
    pub action: Option<usize>,
    /// Identifier of the action or construct.
    pub construct: String,
}

impl Coordinate {
    pub fn event(event: usize, construct: impl Into<String>) -> Self {
        Self {
            event,
            action: None,
            construct: construct.into(),
        }
    }

    pub fn action(event: usize, action: usize, construct: impl Into<String>) -> Self {
        Self {
            event,
            action: Some(action),
            construct: construct.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Some(action) => write!(f, "event {}, action {} ({})", self.event, action, self.construct),
            None => write!(f, "event {} entry ({})", self.event, self.construct),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("misplaced block: {message}")]
    StructuralSequence { message: String },

    #[error("{construct} is not inside a loop")]
    NotInLoop { construct: Construct },

    #[error("undefined variable '{id}'")]
    UndefinedVariable { id: String },

    #[error("name '{name}' is already declared")]
    DuplicateName {
        name: String,
        existing: Option<VariableKind>,
    },

    #[error("unknown action '{id}'")]
    UnknownAction { id: String, group: Option<String> },

    #[error("no method named '{name}' to jump to")]
    MissingJumpLabel { name: String },

    #[error("internal compiler error: {message}")]
    LoweringInvariant { message: String },

    #[error("invalid loop parameter: {message}")]
    InvalidLoopParameter { message: String },

    #[error("parameter '{parameter}' is not bound")]
    MissingBinding { parameter: String },

    #[error("expected {expected} inputs, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("parameter '{parameter}' expects {expected}, found {found}")]
    TypeMismatch {
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("'{name}' collides with an existing name after merging")]
    NameCollision { name: String },
}

impl CompileErrorKind {
    /// Stable code for documentation lookup.
    pub fn code(&self) -> &'static str {
        match self {
            CompileErrorKind::StructuralSequence { .. } => "E001",
            CompileErrorKind::NotInLoop { .. } => "E002",
            CompileErrorKind::UndefinedVariable { .. } => "E003",
            CompileErrorKind::DuplicateName { .. } => "E004",
            CompileErrorKind::UnknownAction { .. } => "E005",
            CompileErrorKind::MissingJumpLabel { .. } => "E006",
            CompileErrorKind::LoweringInvariant { .. } => "E007",
            CompileErrorKind::InvalidLoopParameter { .. } => "E008",
            CompileErrorKind::MissingBinding { .. } => "E009",
            CompileErrorKind::ArityMismatch { .. } => "E010",
            CompileErrorKind::TypeMismatch { .. } => "E011",
            CompileErrorKind::NameCollision { .. } => "E012",
        }
    }

    /// Validation errors concern a single action's bindings; the rest mean
    /// the instruction stream can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CompileErrorKind::MissingBinding { .. }
                | CompileErrorKind::ArityMismatch { .. }
                | CompileErrorKind::TypeMismatch { .. }
                | CompileErrorKind::UndefinedVariable { .. }
        )
    }

    fn help(&self) -> Option<&'static str> {
        match self {
            CompileErrorKind::StructuralSequence { .. } => {
                Some("every block needs exactly one matching BlockEnd")
            }
            CompileErrorKind::NotInLoop { .. } => {
                Some("Break and Continue must be inside a While or For block")
            }
            CompileErrorKind::InvalidLoopParameter { .. } => {
                Some("bind the step to a non-zero value")
            }
            CompileErrorKind::LoweringInvariant { .. } => {
                Some("this is a bug in the compiler or in a custom action")
            }
            _ => None,
        }
    }

    pub(crate) fn at(self, coordinate: Coordinate) -> CompileError {
        CompileError {
            kind: self,
            coordinate: Some(coordinate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub coordinate: Option<Coordinate>,
}

impl CompileError {
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Convert to a Diagnostic for API boundary.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            message: self.kind.to_string(),
            coordinate: self.coordinate.clone(),
            help: self.kind.help().map(String::from),
            code: Some(String::from(self.kind.code())),
        }
    }
}

impl From<CompileErrorKind> for CompileError {
    fn from(kind: CompileErrorKind) -> Self {
        Self {
            kind,
            coordinate: None,
        }
    }
}

/// A problem that does not stop compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileWarning {
    pub message: String,
    pub coordinate: Option<Coordinate>,
}

impl CompileWarning {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            message: self.message.clone(),
            coordinate: self.coordinate.clone(),
            help: None,
            code: None,
        }
    }
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.coordinate {
            Some(coordinate) => write!(f, "{}: {}", coordinate, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
