//! Compiling action groups into mergeable subprograms.
//!
//! Each custom action of a group becomes one synchronous method:
//!
//! ```text
//! method {action}:                 parameters live in user slots {action}_{param}
//!   <body>
//!   JumpIndirect {action}__return  added by the host's linker
//! ```
//!
//! The subprogram is never linked on its own. Hosts merge an unlinked copy
//! and link everything together.

use crate::compiler::lowering::lower_body;
use crate::compiler::{CompileContext, CompileError, CompileErrorKind, CompileWarning, Coordinate};
use crate::registry::ParameterDef;
use crate::trigger::ActionGroupDefinition;
use crate::types::ValueType;
use crate::vm::{Epilogue, MethodKind, Program, VarId, VariableKind};
use crate::{String, Vec, format};

/// A parameter of a group action and the slot its value is passed in.
#[derive(Debug, Clone)]
pub struct GroupParameter {
    pub def: ParameterDef,
    pub variable: VarId,
}

/// One exposed action of a compiled group.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub name: String,
    pub method: String,
    pub parameters: Vec<GroupParameter>,
    /// Holds the caller's return address.
    pub return_var: VarId,
    pub event_type: Option<String>,
    /// Event inputs the action reads, with the slot each is copied into.
    pub event_vars: Vec<(String, VarId)>,
}

#[derive(Debug, Clone)]
pub struct CompiledActionGroup {
    pub guid: String,
    pub name: String,
    pub program: Program,
    pub entries: Vec<GroupEntry>,
    pub warnings: Vec<CompileWarning>,
}

impl CompiledActionGroup {
    pub fn entry(&self, name: &str) -> Option<&GroupEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

/// Compile every custom action of `group` into its own method.
pub(super) fn compile_into(
    ctx: &mut CompileContext<'_>,
    group: &ActionGroupDefinition,
) -> Result<Vec<GroupEntry>, CompileError> {
    for def in &group.variables {
        let mut def = def.clone();
        if def.change_callback {
            ctx.warn_at(
                format!(
                    "change callbacks are not supported on action group variable '{}'",
                    def.name
                ),
                None,
            );
            def.change_callback = false;
        }
        ctx.program
            .variables
            .declare_user(&def)
            .map_err(CompileError::from)?;
    }

    let mut entries = Vec::with_capacity(group.actions.len());
    for (index, action) in group.actions.iter().enumerate() {
        ctx.begin_event(index, &action.name);
        let at = Coordinate::event(index, action.name.as_str());

        let method = ctx
            .program
            .add_method(action.name.as_str(), MethodKind::Synchronous)
            .map_err(|kind| kind.at(at.clone()))?;
        let return_var = ctx
            .program
            .variables
            .declare(format!("{}__return", action.name), ValueType::UInt32, VariableKind::Reserved)
            .map_err(|kind| kind.at(at.clone()))?;
        ctx.program.set_epilogue(method, Epilogue::Indirect(return_var));

        let mut parameters = Vec::with_capacity(action.parameters.len());
        for param in &action.parameters {
            let Some(ty) = param.ty.clone() else {
                return Err(CompileErrorKind::TypeMismatch {
                    parameter: param.name.clone(),
                    expected: "a declared type".into(),
                    found: "any".into(),
                }
                .at(at));
            };
            let variable = ctx
                .program
                .variables
                .declare(format!("{}_{}", action.name, param.name), ty, VariableKind::UserDefined)
                .map_err(|kind| kind.at(at.clone()))?;
            ctx.add_local(param.name.as_str(), variable);
            parameters.push(GroupParameter {
                def: param.clone(),
                variable,
            });
        }

        let mut event_vars = Vec::new();
        if let Some(event_type) = &action.event_type {
            let event = ctx
                .registry
                .event(event_type)
                .map_err(|kind| kind.at(at.clone()))?;
            for input in &event.parameters {
                let slot = ctx
                    .program
                    .variables
                    .reserved(&input.variable, &input.ty)
                    .map_err(|kind| kind.at(at.clone()))?;
                ctx.event_inputs.insert(input.name.clone(), slot);
                event_vars.push((input.name.clone(), slot));
            }
        }

        ctx.enter_method(method);
        lower_body(ctx, &action.actions)?;

        entries.push(GroupEntry {
            name: action.name.clone(),
            method: action.name.clone(),
            parameters,
            return_var,
            event_type: action.event_type.clone(),
            event_vars,
        });
    }
    Ok(entries)
}
