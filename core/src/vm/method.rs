//! Methods: named, ordered instruction sequences.

use core::fmt;

use crate::String;
use crate::Vec;
use crate::vm::{InstrId, VarId};

/// Index of a method in its program, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub(crate) u32);

impl MethodId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a method can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Only reachable from inside the program, through a call.
    Synchronous,
    /// Exported: the host may start it directly, over the network or after a
    /// delay.
    Entry,
}

/// What runs when control falls off the end of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Epilogue {
    /// Stop execution.
    Halt,
    /// Return to the address stored in the slot (call/return protocol).
    Indirect(VarId),
}

/// One callable unit of a [`Program`](super::Program).
///
/// The body is a list of arena ids; the instructions themselves are owned by
/// the program. Labels appear in the body as the ids of `Nop`s.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub kind: MethodKind,
    pub epilogue: Epilogue,
    pub(crate) body: Vec<InstrId>,
    /// Shared end-of-method label, created on first `Return`.
    pub(crate) end_label: Option<InstrId>,
    /// Set when the method writes a synced variable.
    pub(crate) needs_serialization: bool,
}

impl Method {
    pub(crate) fn new(name: String, kind: MethodKind) -> Self {
        Self {
            name,
            kind,
            epilogue: Epilogue::Halt,
            body: Vec::new(),
            end_label: None,
            needs_serialization: false,
        }
    }

    pub fn body(&self) -> &[InstrId] {
        &self.body
    }

    pub fn is_exported(&self) -> bool {
        self.kind == MethodKind::Entry
    }

    pub fn needs_serialization(&self) -> bool {
        self.needs_serialization
    }

    pub(crate) fn mark_needs_serialization(&mut self) {
        self.needs_serialization = true;
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Synchronous => write!(f, "sync"),
            MethodKind::Entry => write!(f, "entry"),
        }
    }
}
