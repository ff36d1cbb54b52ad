//! Target program model: instructions, methods, variables.

mod code;
mod instruction_set;
mod method;
mod program;
mod variables;

pub use instruction_set::{AddressRef, HALT_ADDRESS, InstrId, Instruction, JumpTarget};
pub use method::{Epilogue, Method, MethodId, MethodKind};
pub use program::Program;
pub use variables::{SpecialVariable, SyncMode, VarId, Variable, VariableKind, VariableTable};
