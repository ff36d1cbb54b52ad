//! Human-readable program listing.

use hashbrown::HashMap;

use crate::vm::{InstrId, Instruction, Program, VariableKind};
use crate::{String, Vec, format};

impl core::fmt::Debug for Program {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Program {{")?;

        if !self.variables.is_empty() {
            writeln!(f, "  variables: [")?;
            for (id, var) in self.variables.iter() {
                let kind = match var.kind {
                    VariableKind::UserDefined => "user",
                    VariableKind::Constant => "const",
                    VariableKind::Temporary => "temp",
                    VariableKind::Reserved => "reserved",
                };
                write!(f, "    {:>5} {:8} {}: {}", id, kind, var.name, var.ty)?;
                if let Some(value) = &var.value {
                    write!(f, " = {}", value)?;
                }
                writeln!(f)?;
            }
            writeln!(f, "  ]")?;
        } else {
            writeln!(f, "  variables: []")?;
        }

        // First pass: collect all jump targets to determine which labels get names
        let mut targets: Vec<InstrId> = self
            .methods
            .iter()
            .flat_map(|m| m.body.iter())
            .filter_map(|id| self.instruction(*id).label_target())
            .collect();
        targets.sort();
        targets.dedup();
        let label_map: HashMap<InstrId, usize> = targets
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        // Second pass: print instructions with labels
        for method in &self.methods {
            writeln!(f, "  method {} ({}):", method.name, method.kind)?;
            for id in &method.body {
                let instr = self.instruction(*id);
                let label_prefix = label_map
                    .get(id)
                    .map(|l| format!("L{}:", l))
                    .unwrap_or_else(String::new);
                let address = match self.address_of(*id) {
                    Some(addr) => format!("{:#010x}", addr),
                    None => format!("{:>10}", id),
                };

                match instr.label_target() {
                    Some(target) => {
                        let target_label = label_map
                            .get(&target)
                            .map(|l| format!("L{}", l))
                            .unwrap_or_else(|| format!("{}", target));
                        let mnemonic = match instr {
                            Instruction::JumpIfFalse(_) => "JumpIfFalse",
                            _ => "Jump",
                        };
                        writeln!(
                            f,
                            "    {} {:>5}  {:14} {}",
                            address, label_prefix, mnemonic, target_label
                        )?;
                    }
                    None => writeln!(f, "    {} {:>5}  {:?}", address, label_prefix, instr)?,
                }
            }
        }

        write!(f, "}}")
    }
}
