//! The program under construction: variable table, instruction arena and
//! methods.
//!
//! Lowering appends to methods through [`Program::emit`]; labels are created
//! up front with [`Program::new_label`] and placed later with
//! [`Program::place_label`]. Nothing here knows final addresses until the
//! linker has run.

use hashbrown::HashMap;

use crate::compiler::CompileErrorKind;
use crate::vm::{Epilogue, InstrId, Instruction, JumpTarget, Method, MethodId, MethodKind};
use crate::vm::VariableTable;
use crate::{String, Vec, format};

#[derive(Clone, Default)]
pub struct Program {
    pub(crate) variables: VariableTable,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) methods: Vec<Method>,
    pub(crate) method_index: HashMap<String, MethodId>,
    /// Final address per arena slot, filled by the linker. Labels that were
    /// never placed stay `None`.
    pub(crate) addresses: Vec<Option<u32>>,
    pub(crate) linked: bool,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    // === Methods ===

    /// Create an empty method. Method names are unique within a program.
    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        kind: MethodKind,
    ) -> Result<MethodId, CompileErrorKind> {
        let name = name.into();
        if self.method_index.contains_key(&name) {
            return Err(CompileErrorKind::DuplicateName {
                name,
                existing: None,
            });
        }
        let id = MethodId(self.methods.len() as u32);
        self.method_index.insert(name.clone(), id);
        self.methods.push(Method::new(name, kind));
        Ok(id)
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.methods[id.index()]
    }

    pub fn method_id(&self, name: &str) -> Option<MethodId> {
        self.method_index.get(name).copied()
    }

    pub fn method_by_name(&self, name: &str) -> Option<&Method> {
        self.method_id(name).map(|id| self.method(id))
    }

    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId(i as u32), m))
    }

    /// Names of the methods the host may call directly.
    pub fn exported_methods(&self) -> impl Iterator<Item = &str> {
        self.methods
            .iter()
            .filter(|m| m.is_exported())
            .map(|m| m.name.as_str())
    }

    pub fn set_epilogue(&mut self, method: MethodId, epilogue: Epilogue) {
        self.method_mut(method).epilogue = epilogue;
    }

    // === Instructions ===

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Replace an already emitted instruction (used to retarget jumps).
    pub(crate) fn set_instruction(&mut self, id: InstrId, instruction: Instruction) {
        self.instructions[id.index()] = instruction;
    }

    /// The instructions of a method, in order.
    pub fn body(&self, method: MethodId) -> impl Iterator<Item = (InstrId, &Instruction)> {
        self.method(method)
            .body
            .iter()
            .map(move |id| (*id, self.instruction(*id)))
    }

    fn alloc(&mut self, instruction: Instruction) -> InstrId {
        let id = InstrId(self.instructions.len() as u32);
        self.instructions.push(instruction);
        id
    }

    /// Append an instruction to the end of a method.
    pub fn emit(&mut self, method: MethodId, instruction: Instruction) -> InstrId {
        let id = self.alloc(instruction);
        self.method_mut(method).body.push(id);
        id
    }

    /// Create a label that is not placed in any method yet.
    pub fn new_label(&mut self) -> InstrId {
        self.alloc(Instruction::Nop)
    }

    /// Place a label at the current end of a method.
    pub fn place_label(&mut self, method: MethodId, label: InstrId) {
        debug_assert!(matches!(self.instruction(label), Instruction::Nop));
        debug_assert!(!self.is_placed(label), "label {} placed twice", label);
        self.method_mut(method).body.push(label);
    }

    /// Create a label and place it right away.
    pub fn emit_label(&mut self, method: MethodId) -> InstrId {
        self.emit(method, Instruction::Nop)
    }

    fn is_placed(&self, label: InstrId) -> bool {
        self.methods.iter().any(|m| m.body.contains(&label))
    }

    /// The last `n` instructions of a method, oldest first.
    pub fn tail(&self, method: MethodId, n: usize) -> impl Iterator<Item = &Instruction> {
        let body = &self.method(method).body;
        body[body.len().saturating_sub(n)..]
            .iter()
            .map(|id| self.instruction(*id))
    }

    /// Insert an instruction right before the method's trailing label.
    ///
    /// When `label` is given the trailing instruction must be that exact
    /// label, otherwise any `Nop` will do. Anything else means the construct
    /// was lowered out of its expected context.
    pub fn insert_before_trailing_label(
        &mut self,
        method: MethodId,
        label: Option<InstrId>,
        instruction: Instruction,
    ) -> Result<InstrId, CompileErrorKind> {
        let last = self.method(method).body.last().copied();
        let ok = match (last, label) {
            (Some(last), Some(label)) => last == label,
            (Some(last), None) => matches!(self.instruction(last), Instruction::Nop),
            (None, _) => false,
        };
        if !ok {
            return Err(CompileErrorKind::LoweringInvariant {
                message: format!(
                    "expected method '{}' to end with a label",
                    self.method(method).name
                ),
            });
        }
        let id = self.alloc(instruction);
        let body = &mut self.method_mut(method).body;
        let at = body.len() - 1;
        body.insert(at, id);
        Ok(id)
    }

    /// The method's shared end-of-method label, created on first use.
    pub fn end_label(&mut self, method: MethodId) -> InstrId {
        if let Some(label) = self.method(method).end_label {
            return label;
        }
        let label = self.new_label();
        self.method_mut(method).end_label = Some(label);
        label
    }

    /// Emit `Jump(target)`.
    pub fn emit_jump(&mut self, method: MethodId, target: InstrId) -> InstrId {
        self.emit(method, Instruction::Jump(JumpTarget::Label(target)))
    }

    // === Linked state ===

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// Final address of an instruction, once linked.
    pub fn address_of(&self, id: InstrId) -> Option<u32> {
        self.addresses.get(id.index()).copied().flatten()
    }

    /// Final address of a method's first instruction, once linked.
    pub fn method_address(&self, name: &str) -> Option<u32> {
        let method = self.method_by_name(name)?;
        method.body.first().and_then(|id| self.address_of(*id))
    }

    /// Total encoded size of all methods.
    pub fn code_size(&self) -> u32 {
        self.methods
            .iter()
            .flat_map(|m| m.body.iter())
            .map(|id| self.instruction(*id).size())
            .sum()
    }
}
