//! Stack of open blocks during lowering.
//!
//! Each block-opening construct (`If`, `While`, `For`, `Condition`, ...)
//! pushes a [`ScopeFrame`]; the matching `BlockEnd` pops it. The bottom frame
//! is the implicit event-level scope and has no opener.
//!
//! Frames carry the jump targets of their block. Both labels are created
//! lazily by the compile context, so a frame only ever allocates the labels
//! something actually jumps to.
//!
//! ```text
//! If                 <- frame 1 (end = after the branch)
//!   Condition        <- frame 2 (end = short-circuit target)
//!     FailIfFalse    <- resolves frame 2 via nearest_condition()
//!   BlockEnd
//!   ConditionBody    <- frame 2' (checks the previous sibling was Condition)
//!   BlockEnd
//! BlockEnd
//! ```

use alloc::sync::Arc;
use core::fmt;

use smallvec::SmallVec;

use crate::compiler::{ActionLowering, Coordinate};
use crate::registry::Construct;
use crate::vm::{InstrId, VarId};
use crate::{String, Vec};

/// What opened a frame.
#[derive(Clone)]
pub enum Opener {
    Builtin(Construct),
    Custom(Arc<dyn ActionLowering>),
}

impl Opener {
    pub fn construct(&self) -> Option<Construct> {
        match self {
            Opener::Builtin(construct) => Some(*construct),
            Opener::Custom(_) => None,
        }
    }
}

impl fmt::Debug for Opener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opener::Builtin(construct) => write!(f, "{}", construct),
            Opener::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Summary of the block most recently closed inside a frame, kept so the
/// next sibling (`Else`, `ConditionBody`) can hook onto it.
#[derive(Debug, Clone, Default)]
pub struct ClosedBlock {
    pub construct: Option<Construct>,
    pub end: Option<InstrId>,
    /// Jumps out of an `If`/`ElseIf` chain that still target the chain's
    /// current end.
    pub chain_jumps: SmallVec<[InstrId; 2]>,
    pub saw_condition_body: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeFrame {
    pub opener: Option<Opener>,
    pub start: Option<InstrId>,
    pub end: Option<InstrId>,
    pub is_loop: bool,
    /// Released back to the variable table when the frame is popped.
    pub owned: SmallVec<[VarId; 4]>,
    /// Ids of locals declared inside the frame.
    pub locals: SmallVec<[String; 2]>,
    /// Boolean result slot of a `Condition` frame.
    pub condition_result: Option<VarId>,
    /// Construct of the previous action lowered directly in this frame.
    /// `None` after a non-builtin action or at the start of the frame.
    pub prev_sibling: Option<Construct>,
    pub last_closed: Option<ClosedBlock>,
    /// See [`ClosedBlock::chain_jumps`].
    pub chain_jumps: SmallVec<[InstrId; 2]>,
    pub saw_condition: bool,
    pub saw_condition_body: bool,
    /// Where the frame was opened.
    pub coordinate: Option<Coordinate>,
}

impl ScopeFrame {
    /// The implicit event-level frame.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn opened_by(opener: Opener, coordinate: Coordinate) -> Self {
        let is_loop = opener.construct().is_some_and(Construct::is_loop);
        Self {
            opener: Some(opener),
            is_loop,
            coordinate: Some(coordinate),
            ..Self::default()
        }
    }

    pub fn construct(&self) -> Option<Construct> {
        self.opener.as_ref().and_then(Opener::construct)
    }

    pub fn own(&mut self, var: VarId) {
        self.owned.push(var);
    }

    /// The record left behind in the parent once this frame closes.
    pub fn closed(&self) -> ClosedBlock {
        ClosedBlock {
            construct: self.construct(),
            end: self.end,
            chain_jumps: self.chain_jumps.clone(),
            saw_condition_body: self.saw_condition_body,
        }
    }
}

/// A stack of open blocks, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    /// Create a new empty scope stack.
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: ScopeFrame) {
        self.frames.push(frame);
    }

    /// Pop the innermost frame.
    ///
    /// Returns an error if the stack is empty.
    pub fn pop(&mut self) -> Result<ScopeFrame, PopError> {
        self.frames.pop().ok_or(PopError::EmptyStack)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current(&self) -> Option<&ScopeFrame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut ScopeFrame> {
        self.frames.last_mut()
    }

    pub fn get(&self, index: usize) -> Option<&ScopeFrame> {
        self.frames.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ScopeFrame> {
        self.frames.get_mut(index)
    }

    /// Index of the parent of the innermost frame.
    pub fn parent_index(&self) -> Option<usize> {
        self.frames.len().checked_sub(2)
    }

    /// Innermost loop-bearing frame, searching outward.
    pub fn nearest_loop(&self) -> Option<usize> {
        self.frames.iter().rposition(|frame| frame.is_loop)
    }

    /// Innermost `Condition` frame, skipping any frames in between.
    pub fn nearest_condition(&self) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|frame| frame.construct() == Some(Construct::Condition))
    }

    /// Frames from innermost to outermost.
    pub fn iter(&self) -> impl Iterator<Item = &ScopeFrame> {
        self.frames.iter().rev()
    }
}

/// Error when trying to pop a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopError {
    /// The stack is empty.
    EmptyStack,
}

impl fmt::Display for PopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopError::EmptyStack => write!(f, "Cannot pop from empty scope stack"),
        }
    }
}
