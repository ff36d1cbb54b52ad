//! Finishing a program: epilogues, addresses and symbol checks.
//!
//! Linking runs once, after every event (and every merged group) has been
//! lowered. Per method it:
//!
//! 1. places the shared end label, if anything jumped to it
//! 2. appends `RequestSerialization` when a synced variable was written
//! 3. appends the epilogue (`Jump halt` or `JumpIndirect return`)
//!
//! then assigns addresses in method order and resolves what refers to them.

use tracing::debug;

use crate::api::CompilationOptions;
use crate::compiler::CompileErrorKind;
use crate::registry::externs;
use crate::types::ConstValue;
use crate::vm::{
    AddressRef, Epilogue, Instruction, JumpTarget, MethodId, Program, SpecialVariable,
};
use crate::{format, vec};

pub(crate) fn link(program: &mut Program, options: &CompilationOptions) -> Result<(), CompileErrorKind> {
    if program.linked {
        return Ok(());
    }

    for index in 0..program.methods.len() {
        finish_method(program, MethodId(index as u32), options);
    }
    assign_addresses(program)?;
    check_targets(program)?;
    resolve_address_constants(program)?;

    program.linked = true;
    debug!(
        methods = program.methods.len(),
        variables = program.variables.len(),
        size = program.code_size(),
        "linked program"
    );
    Ok(())
}

fn finish_method(program: &mut Program, method: MethodId, options: &CompilationOptions) {
    if let Some(end) = program.method(method).end_label {
        program.place_label(method, end);
    }

    if options.auto_request_serialization && program.method(method).needs_serialization() {
        let this = program.variables.special(SpecialVariable::This);
        program.emit(method, Instruction::PushVariable(this));
        program.emit(method, Instruction::Extern(externs::request_serialization()));
    }

    let epilogue = match program.method(method).epilogue {
        Epilogue::Halt => Instruction::Jump(JumpTarget::Halt),
        Epilogue::Indirect(var) => Instruction::JumpIndirect(var),
    };
    program.emit(method, epilogue);
}

fn assign_addresses(program: &mut Program) -> Result<(), CompileErrorKind> {
    let mut addresses = vec![None; program.instructions.len()];
    let mut next = 0u32;
    for method in &program.methods {
        for id in &method.body {
            let slot = &mut addresses[id.index()];
            if slot.is_some() {
                return Err(CompileErrorKind::LoweringInvariant {
                    message: format!("instruction {} is placed twice", id),
                });
            }
            *slot = Some(next);
            next += program.instructions[id.index()].size();
        }
    }
    program.addresses = addresses;
    Ok(())
}

/// Every jump lands on a placed label and every named call on a method.
fn check_targets(program: &Program) -> Result<(), CompileErrorKind> {
    for (method_id, method) in program.methods() {
        for (id, instruction) in program.body(method_id) {
            if let Some(target) = instruction.label_target() {
                if program.address_of(target).is_none() {
                    return Err(CompileErrorKind::LoweringInvariant {
                        message: format!(
                            "{} in method '{}' jumps to label {}, which was never placed",
                            id, method.name, target
                        ),
                    });
                }
            }
            if let Instruction::JumpLabel(name) = instruction {
                if program.method_by_name(name).is_none() {
                    return Err(CompileErrorKind::MissingJumpLabel { name: name.clone() });
                }
            }
        }
    }
    Ok(())
}

/// Replace link-time address placeholders with their final values.
fn resolve_address_constants(program: &mut Program) -> Result<(), CompileErrorKind> {
    let addresses = &program.addresses;
    let methods = &program.methods;
    let method_index = &program.method_index;
    program.variables.try_map_values(|value| {
        let ConstValue::Address(address) = value else {
            return Ok(None);
        };
        let resolved = match address {
            AddressRef::Instruction(id) => addresses.get(id.index()).copied().flatten().ok_or_else(|| {
                CompileErrorKind::LoweringInvariant {
                    message: format!("address of {} taken but never placed", id),
                }
            })?,
            AddressRef::Method(name) => method_index
                .get(name)
                .and_then(|m| methods[m.index()].body.first())
                .and_then(|id| addresses[id.index()])
                .ok_or_else(|| CompileErrorKind::MissingJumpLabel { name: name.clone() })?,
        };
        Ok(Some(ConstValue::UInt32(resolved)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::MethodKind;
    use pretty_assertions::assert_eq;

    fn options() -> CompilationOptions {
        CompilationOptions::default()
    }

    #[test]
    fn test_empty_method_is_only_its_epilogue() {
        let mut program = Program::new();
        let start = program.add_method("_start", MethodKind::Entry).unwrap();
        link(&mut program, &options()).unwrap();

        let body: Vec<_> = program.body(start).map(|(_, i)| i.clone()).collect();
        assert_eq!(body, vec![Instruction::Jump(JumpTarget::Halt)]);
        assert_eq!(program.method_address("_start"), Some(0));
    }

    #[test]
    fn test_addresses_follow_instruction_sizes() {
        let mut program = Program::new();
        let a = program.add_method("a", MethodKind::Entry).unwrap();
        let b = program.add_method("b", MethodKind::Entry).unwrap();
        let var = program.variables.special(SpecialVariable::This);
        program.emit(a, Instruction::PushVariable(var));
        program.emit(a, Instruction::PushVariable(var));
        program.emit(a, Instruction::Copy);
        let label = program.emit_label(a);
        program.emit(b, Instruction::JumpLabel("a".into()));
        link(&mut program, &options()).unwrap();

        // push 8 + push 8 + copy 4, then the label and the halt jump share 20.
        assert_eq!(program.address_of(label), Some(20));
        assert_eq!(program.method_address("b"), Some(28));
        assert_eq!(program.code_size(), 44);
    }

    #[test]
    fn test_missing_method_is_reported() {
        let mut program = Program::new();
        let start = program.add_method("_start", MethodKind::Entry).unwrap();
        program.emit(start, Instruction::JumpLabel("nowhere".into()));
        let err = link(&mut program, &options()).unwrap_err();
        assert_eq!(
            err,
            CompileErrorKind::MissingJumpLabel {
                name: "nowhere".into()
            }
        );
    }

    #[test]
    fn test_unplaced_label_is_an_internal_fault() {
        let mut program = Program::new();
        let start = program.add_method("_start", MethodKind::Entry).unwrap();
        let label = program.new_label();
        program.emit_jump(start, label);
        let err = link(&mut program, &options()).unwrap_err();
        assert!(matches!(err, CompileErrorKind::LoweringInvariant { .. }));
    }

    #[test]
    fn test_serialization_request_is_appended() {
        let mut program = Program::new();
        let start = program.add_method("_start", MethodKind::Entry).unwrap();
        program.method_mut(start).mark_needs_serialization();
        link(&mut program, &options()).unwrap();

        let tail: Vec<_> = program.tail(start, 2).cloned().collect();
        assert_eq!(
            tail,
            vec![
                Instruction::Extern(externs::request_serialization()),
                Instruction::Jump(JumpTarget::Halt),
            ]
        );

        let mut disabled = Program::new();
        let start = disabled.add_method("_start", MethodKind::Entry).unwrap();
        disabled.method_mut(start).mark_needs_serialization();
        let options = CompilationOptions {
            auto_request_serialization: false,
            ..CompilationOptions::default()
        };
        link(&mut disabled, &options).unwrap();
        assert_eq!(disabled.method(start).body().len(), 1);
    }

    #[test]
    fn test_address_constants_are_resolved() {
        let mut program = Program::new();
        let start = program.add_method("_start", MethodKind::Entry).unwrap();
        let ret = program.new_label();
        let address = program.variables.get_or_create_constant(
            &crate::types::ValueType::UInt32,
            ConstValue::Address(AddressRef::Instruction(ret)),
        );
        program.emit(start, Instruction::PushVariable(address));
        program.place_label(start, ret);
        link(&mut program, &options()).unwrap();

        assert_eq!(
            program.variables.get(address).value,
            Some(ConstValue::UInt32(8))
        );
    }
}
