//! Compiled triggers.

use crate::compiler::{CompileOutput, CompileWarning, SymbolReference};
use crate::vm::Program;
use crate::Vec;

/// A linked program together with what the compile reported about it.
///
/// # Example
///
/// ```ignore
/// let compiled = engine.compile(&trigger)?;
///
/// for warning in &compiled.warnings {
///     println!("{}", warning);
/// }
/// println!("{:?}", compiled.program);
/// ```
#[derive(Debug, Clone)]
pub struct CompiledTrigger {
    /// The linked program.
    pub program: Program,

    /// Warnings; none of them prevented compilation.
    pub warnings: Vec<CompileWarning>,

    /// For every constant input, the slot it was stored in and the position
    /// of the input it came from. Lets a host patch per-instance values
    /// without recompiling.
    pub symbol_references: Vec<SymbolReference>,
}

impl CompiledTrigger {
    /// References to one constant slot.
    pub fn references_to(&self, name: &str) -> impl Iterator<Item = &SymbolReference> {
        self.symbol_references
            .iter()
            .filter(move |reference| reference.name == name)
    }
}

impl From<CompileOutput> for CompiledTrigger {
    fn from(output: CompileOutput) -> Self {
        Self {
            program: output.program,
            warnings: output.warnings,
            symbol_references: output.symbol_references,
        }
    }
}
