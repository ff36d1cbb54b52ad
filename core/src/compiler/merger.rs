//! Merging compiled action groups into the host program.
//!
//! The group's program is cloned and appended under a fresh namespace prefix
//! (`{group_prefix}{n}_`). Every method and variable name is prefixed except
//! the shared special slots, which map onto the host's own. Instruction ids
//! shift by the size of the host's arena, so labels keep pointing at the
//! same instructions.
//!
//! Merges are memoized per group GUID: a group used by several actions of a
//! trigger is merged once and every call site uses the same translation.

use hashbrown::HashMap;
use tracing::debug;

use crate::compiler::{CompileContext, CompileError, CompileErrorKind, CompiledActionGroup};
use crate::registry::ParameterDef;
use crate::types::ConstValue;
use crate::vm::{AddressRef, Epilogue, Instruction, JumpTarget, MethodId, Program, VarId};
use crate::{String, Vec, format};

/// A group action's entry point, translated into host names and slots.
#[derive(Debug, Clone)]
pub struct TranslatedEntry {
    pub action: String,
    pub method: String,
    pub parameters: Vec<(ParameterDef, VarId)>,
    pub return_var: VarId,
    pub event_vars: Vec<(String, VarId)>,
}

/// Original to translated names of one merge.
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    pub prefix: String,
    pub methods: HashMap<String, String>,
    pub variables: HashMap<String, String>,
    pub entries: Vec<TranslatedEntry>,
}

impl TranslationTable {
    pub fn entry(&self, action: &str) -> Option<&TranslatedEntry> {
        self.entries.iter().find(|entry| entry.action == action)
    }
}

/// Translated entry point of `action` in group `guid`, merging the group
/// into the host on first use.
pub(crate) fn translated_entry(
    ctx: &mut CompileContext<'_>,
    guid: &str,
    action: &str,
) -> Result<TranslatedEntry, CompileError> {
    if !ctx.merges.contains_key(guid) {
        let registry = ctx.registry;
        let group = registry.group(guid).ok_or_else(|| {
            ctx.error(CompileErrorKind::UnknownAction {
                id: action.into(),
                group: Some(guid.into()),
            })
        })?;
        let prefix = format!("{}{}_", ctx.options.group_prefix, ctx.merge_count);
        ctx.merge_count += 1;
        let table = merge(&mut ctx.program, group, &prefix).map_err(|kind| ctx.error(kind))?;
        ctx.merges.insert(guid.into(), table);
    }

    ctx.merges
        .get(guid)
        .and_then(|table| table.entry(action))
        .cloned()
        .ok_or_else(|| {
            ctx.error(CompileErrorKind::UnknownAction {
                id: action.into(),
                group: Some(guid.into()),
            })
        })
}

/// Append a copy of `group`'s program to `host` under `prefix`.
pub fn merge(
    host: &mut Program,
    group: &CompiledActionGroup,
    prefix: &str,
) -> Result<TranslationTable, CompileErrorKind> {
    let sub = group.program.clone();
    let offset = host.instructions.len() as u32;
    let mut table = TranslationTable {
        prefix: prefix.into(),
        ..TranslationTable::default()
    };

    for (_, method) in sub.methods() {
        table
            .methods
            .insert(method.name.clone(), format!("{}{}", prefix, method.name));
    }

    // Variables
    let mut var_map: Vec<VarId> = Vec::with_capacity(sub.variables.len());
    for (_, variable) in sub.variables.iter() {
        if let Some(special) = variable.special {
            var_map.push(host.variables.special(special));
            continue;
        }
        let mut renamed = variable.clone();
        renamed.name = format!("{}{}", prefix, variable.name);
        if let Some(ConstValue::Address(address)) = &variable.value {
            renamed.value = Some(ConstValue::Address(match address {
                AddressRef::Instruction(id) => AddressRef::Instruction(id.offset(offset)),
                AddressRef::Method(name) => AddressRef::Method(
                    table.methods.get(name).cloned().unwrap_or_else(|| name.clone()),
                ),
            }));
        }
        table
            .variables
            .insert(variable.name.clone(), renamed.name.clone());
        let id = host
            .variables
            .insert(renamed)
            .map_err(|_| CompileErrorKind::NameCollision {
                name: format!("{}{}", prefix, variable.name),
            })?;
        var_map.push(id);
    }
    for id in var_map.iter().copied() {
        if let Some(previous) = host.variables.get(id).previous {
            // Specials are the host's own slots.
            if !host.variables.get(id).is_special() {
                host.variables.get_mut(id).previous = Some(var_map[previous.index()]);
            }
        }
    }

    // Instructions
    for instruction in &sub.instructions {
        let translated = match instruction {
            Instruction::PushVariable(var) => Instruction::PushVariable(var_map[var.index()]),
            Instruction::JumpIndirect(var) => Instruction::JumpIndirect(var_map[var.index()]),
            Instruction::Jump(JumpTarget::Label(id)) => {
                Instruction::Jump(JumpTarget::Label(id.offset(offset)))
            }
            Instruction::JumpIfFalse(id) => Instruction::JumpIfFalse(id.offset(offset)),
            Instruction::JumpLabel(name) => Instruction::JumpLabel(
                table.methods.get(name).cloned().unwrap_or_else(|| name.clone()),
            ),
            other => other.clone(),
        };
        host.instructions.push(translated);
    }

    // Methods
    for (_, method) in sub.methods() {
        let mut renamed = method.clone();
        renamed.name = format!("{}{}", prefix, method.name);
        if host.method_index.contains_key(&renamed.name) {
            return Err(CompileErrorKind::NameCollision { name: renamed.name });
        }
        renamed.body = method.body.iter().map(|id| id.offset(offset)).collect();
        renamed.end_label = method.end_label.map(|id| id.offset(offset));
        if let Epilogue::Indirect(var) = method.epilogue {
            renamed.epilogue = Epilogue::Indirect(var_map[var.index()]);
        }
        let id = MethodId(host.methods.len() as u32);
        host.method_index.insert(renamed.name.clone(), id);
        host.methods.push(renamed);
    }

    // Entry points
    for entry in &group.entries {
        table.entries.push(TranslatedEntry {
            action: entry.name.clone(),
            method: format!("{}{}", prefix, entry.method),
            parameters: entry
                .parameters
                .iter()
                .map(|p| (p.def.clone(), var_map[p.variable.index()]))
                .collect(),
            return_var: var_map[entry.return_var.index()],
            event_vars: entry
                .event_vars
                .iter()
                .map(|(name, var)| (name.clone(), var_map[var.index()]))
                .collect(),
        });
    }

    debug!(
        group = %group.name,
        %prefix,
        methods = table.methods.len(),
        variables = table.variables.len(),
        "merged action group"
    );
    Ok(table)
}
