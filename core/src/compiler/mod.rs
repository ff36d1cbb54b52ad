//! Trigger compiler.
//!
//! Compilation runs in three phases over one [`CompileContext`]:
//!
//! - event assembly declares the trigger's variables and builds the method
//!   chain of every event
//! - lowering turns each action into instructions, merging action groups
//!   on first use
//! - linking appends epilogues, assigns addresses and resolves references
//!
//! Validation errors are collected along the way and fail the compile at the
//! end; anything else aborts right away.

mod context;
mod error;
mod event;
mod group;
mod linker;
mod lowering;
mod merger;

use tracing::debug;

use crate::api::CompilationOptions;
use crate::registry::ActionRegistry;
use crate::trigger::{ActionGroupDefinition, TriggerDefinition};
use crate::vm::Program;
use crate::Vec;

pub use context::{CompileContext, ResolvedAction, SymbolReference, handler_name};
pub use error::{CompileError, CompileErrorKind, CompileWarning, Coordinate};
pub use group::{CompiledActionGroup, GroupEntry, GroupParameter};
pub use lowering::ActionLowering;
pub use merger::{TranslatedEntry, TranslationTable, merge};

/// Everything a successful compile produces.
#[derive(Debug)]
pub struct CompileOutput {
    pub program: Program,
    pub warnings: Vec<CompileWarning>,
    pub symbol_references: Vec<SymbolReference>,
}

/// Why a compile produced no program, in the order the errors were found.
#[derive(Debug)]
pub struct CompileFailure {
    pub errors: Vec<CompileError>,
    pub warnings: Vec<CompileWarning>,
}

impl CompileFailure {
    fn new(ctx: CompileContext<'_>, fatal: Option<CompileError>) -> Self {
        let mut errors = ctx.errors;
        errors.extend(fatal);
        Self {
            errors,
            warnings: ctx.warnings,
        }
    }
}

pub(crate) fn compile_trigger(
    registry: &ActionRegistry,
    options: &CompilationOptions,
    trigger: &TriggerDefinition,
) -> Result<CompileOutput, CompileFailure> {
    let mut ctx = CompileContext::new(registry, options);
    if let Err(fatal) = event::assemble(&mut ctx, trigger) {
        return Err(CompileFailure::new(ctx, Some(fatal)));
    }
    if !ctx.errors.is_empty() {
        return Err(CompileFailure::new(ctx, None));
    }
    if let Err(kind) = linker::link(&mut ctx.program, options) {
        return Err(CompileFailure::new(ctx, Some(kind.into())));
    }

    debug!(
        events = trigger.events.len(),
        methods = ctx.program.methods().count(),
        entry_points = ctx.program.exported_methods().count(),
        warnings = ctx.warnings.len(),
        "compiled trigger"
    );
    Ok(CompileOutput {
        program: ctx.program,
        warnings: ctx.warnings,
        symbol_references: ctx.symbol_references,
    })
}

pub(crate) fn compile_action_group(
    registry: &ActionRegistry,
    options: &CompilationOptions,
    group: &ActionGroupDefinition,
) -> Result<CompiledActionGroup, CompileFailure> {
    let mut ctx = CompileContext::new(registry, options);
    match group::compile_into(&mut ctx, group) {
        Ok(entries) if ctx.errors.is_empty() => {
            debug!(group = %group.name, actions = entries.len(), "compiled action group");
            Ok(CompiledActionGroup {
                guid: group.guid.clone(),
                name: group.name.clone(),
                program: ctx.program,
                entries,
                warnings: ctx.warnings,
            })
        }
        Ok(_) => Err(CompileFailure::new(ctx, None)),
        Err(fatal) => Err(CompileFailure::new(ctx, Some(fatal))),
    }
}
