//! Target VM instruction set.
//!
//! The target is a stack machine operating over a flat variable table. Operands
//! are variable slots pushed onto the stack; `Copy` and `Extern` consume them.
//!
//! # Labels
//!
//! Instructions live in an arena owned by the [`Program`](super::Program) and
//! are addressed by [`InstrId`]. A label is simply the id of a `Nop`: jumps
//! refer to the id, and the linker turns ids into final addresses. Two labels
//! are distinct exactly when their ids differ, so a label can be created before
//! the point it marks is known and placed later.
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [...]`

use core::fmt;

use crate::String;
use crate::vm::VarId;

/// Address the VM treats as "stop executing".
pub const HALT_ADDRESS: u32 = 0xFFFF_FFFC;

/// Stable index of an instruction in the program's instruction arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);
static_assertions::assert_eq_size!(InstrId, u32);

impl InstrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Shift an id from a merged subprogram into the host's arena.
    pub(crate) fn offset(self, by: u32) -> InstrId {
        InstrId(self.0 + by)
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Destination of an unconditional jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpTarget {
    /// A `Nop` label in the same program.
    Label(InstrId),
    /// Stop execution (the shared end-of-method return).
    Halt,
}

/// Something whose address is only known after linking, stored in a constant
/// slot (return addresses for call/return through `JumpIndirect`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressRef {
    Instruction(InstrId),
    Method(String),
}

impl fmt::Display for AddressRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressRef::Instruction(id) => write!(f, "{}", id),
            AddressRef::Method(name) => write!(f, "{}", name),
        }
    }
}

/// A single VM instruction.
#[derive(Clone, PartialEq, Eq)]
pub enum Instruction {
    /// No operation. Occupies no space; used as a jump label.
    Nop,

    /// Push a variable slot
    /// Stack: [...] -> [..., var]
    PushVariable(VarId),

    /// Copy the value of one slot into another
    /// Stack: [..., src, dst] -> [...]
    Copy,

    /// Call into the host through an extern signature. Arguments are the
    /// pushed slots, in signature order, outputs included.
    /// Stack: [..., args...] -> [...]
    Extern(String),

    /// Unconditional jump
    Jump(JumpTarget),

    /// Pop a boolean slot and jump if it holds false
    /// Stack: [..., cond] -> [...]
    JumpIfFalse(InstrId),

    /// Jump to the address stored in a `UInt32` slot
    JumpIndirect(VarId),

    /// Jump to the first instruction of a method, by name.
    /// Resolved at link time.
    JumpLabel(String),
}

impl Instruction {
    /// Encoded size in bytes.
    pub const fn size(&self) -> u32 {
        match self {
            Self::Nop => 0,
            Self::Copy => 4,
            Self::PushVariable(_)
            | Self::Extern(_)
            | Self::Jump(_)
            | Self::JumpIfFalse(_)
            | Self::JumpIndirect(_)
            | Self::JumpLabel(_) => 8,
        }
    }

    /// Check if this is a control flow instruction
    pub const fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Self::Jump(_) | Self::JumpIfFalse(_) | Self::JumpIndirect(_) | Self::JumpLabel(_)
        )
    }

    /// The label this instruction jumps to, if it jumps to one.
    pub fn label_target(&self) -> Option<InstrId> {
        match self {
            Self::Jump(JumpTarget::Label(id)) | Self::JumpIfFalse(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nop => write!(f, "Nop"),
            Self::PushVariable(var) => write!(f, "{:14} {}", "Push", var),
            Self::Copy => write!(f, "Copy"),
            Self::Extern(signature) => write!(f, "{:14} {:?}", "Extern", signature),
            Self::Jump(JumpTarget::Label(id)) => write!(f, "{:14} {}", "Jump", id),
            Self::Jump(JumpTarget::Halt) => write!(f, "{:14} {:#010X}", "Jump", HALT_ADDRESS),
            Self::JumpIfFalse(id) => write!(f, "{:14} {}", "JumpIfFalse", id),
            Self::JumpIndirect(var) => write!(f, "{:14} {}", "JumpIndirect", var),
            Self::JumpLabel(name) => write!(f, "{:14} {}", "JumpLabel", name),
        }
    }
}
