//! Calls: externs into the host and action-group entry points.

use crate::compiler::merger;
use crate::compiler::{CompileContext, CompileError, ResolvedAction};
use crate::types::ValueType;
use crate::vm::VarId;
use crate::{Vec, format, vec};

/// Push every parameter in declaration order, then call. Multi-input actions
/// call once per target, the target pushed first.
pub(super) fn lower_extern(
    ctx: &mut CompileContext<'_>,
    signature: &str,
    instance: Option<&ValueType>,
    action: &ResolvedAction<'_>,
) {
    let targets: Vec<VarId> = match instance {
        Some(ty) if action.definition.multi_input => {
            if action.multi_inputs.is_empty() && !ty.is_value_type() {
                vec![ctx.this()]
            } else {
                action.multi_inputs.clone()
            }
        }
        _ => Vec::new(),
    };

    if targets.is_empty() {
        ctx.call_extern(signature, &action.inputs);
    } else {
        let mut args = Vec::with_capacity(action.inputs.len() + 1);
        for target in targets {
            args.clear();
            args.push(target);
            args.extend_from_slice(&action.inputs);
            ctx.call_extern(signature, &args);
        }
    }

    for (param, var) in action.parameters() {
        if param.direction.writes() {
            ctx.after_write(var);
        }
    }
}

/// Call into a merged action group: copy arguments and ambient event inputs
/// into the group's slots, call, then copy outputs back.
pub(super) fn lower_group_call(
    ctx: &mut CompileContext<'_>,
    group: &str,
    name: &str,
    action: &ResolvedAction<'_>,
) -> Result<(), CompileError> {
    let entry = merger::translated_entry(ctx, group, name)?;

    for ((param, slot), arg) in entry.parameters.iter().zip(&action.inputs) {
        if param.direction.reads() {
            ctx.copy(*arg, *slot);
        }
    }
    for (input, slot) in &entry.event_vars {
        match ctx.event_inputs.get(input).copied() {
            Some(source) => ctx.copy(source, *slot),
            None => ctx.warn(format!(
                "'{}' reads event input '{}', which this event does not provide",
                name, input
            )),
        }
    }

    ctx.call_method(&entry.method, entry.return_var);

    for ((param, slot), arg) in entry.parameters.iter().zip(&action.inputs) {
        if param.direction.writes() {
            ctx.copy(*slot, *arg);
            ctx.after_write(*arg);
        }
    }
    Ok(())
}
