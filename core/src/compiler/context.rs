//! State threaded through every lowering call.
//!
//! A [`CompileContext`] owns the program being built, the scope stack and the
//! diagnostics of one compile. Nothing about a compile lives anywhere else.
//!
//! Lowering code talks to the program through the context's emit helpers,
//! which always target the current method. Temporaries requested through
//! [`CompileContext::temporary`] must be handed back with
//! [`CompileContext::release`] before the lowering returns, or given to the
//! current frame with [`ScopeFrame::own`].

use hashbrown::{HashMap, HashSet};
use tracing::{trace, warn};

use crate::api::CompilationOptions;
use crate::compiler::merger::TranslationTable;
use crate::compiler::{CompileError, CompileErrorKind, CompileWarning, Coordinate};
use crate::registry::{
    ActionDefinition, ActionKind, ActionRegistry, Direction, MissingInputPolicy, ParameterDef,
    externs,
};
use crate::scope_stack::{ScopeFrame, ScopeStack};
use crate::trigger::{ActionInstance, InputBinding, VariableRef};
use crate::types::{ConstValue, ValueType};
use crate::vm::{AddressRef, InstrId, Instruction, MethodId, Program, SpecialVariable, VarId};
use crate::{String, ToString, Vec, format};

/// Records which (event, action, parameter) a constant slot was created for.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolReference {
    pub variable: VarId,
    pub name: String,
    pub event: usize,
    pub action: Option<usize>,
    pub parameter: String,
}

/// An action instance with its definition looked up and its inputs bound to
/// slots.
#[derive(Debug)]
pub struct ResolvedAction<'a> {
    pub definition: &'a ActionDefinition,
    pub instance: &'a ActionInstance,
    /// One slot per parameter, in declaration order.
    pub inputs: Vec<VarId>,
    pub multi_inputs: Vec<VarId>,
    pub coordinate: Coordinate,
}

impl ResolvedAction<'_> {
    pub fn input(&self, index: usize) -> Result<VarId, CompileError> {
        self.inputs.get(index).copied().ok_or_else(|| {
            CompileErrorKind::LoweringInvariant {
                message: format!("{} has no input {}", self.definition.id, index),
            }
            .at(self.coordinate.clone())
        })
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&ParameterDef, VarId)> {
        self.definition
            .parameters
            .iter()
            .zip(self.inputs.iter().copied())
    }
}

pub struct CompileContext<'a> {
    pub(crate) registry: &'a ActionRegistry,
    pub(crate) options: &'a CompilationOptions,
    pub(crate) program: Program,
    pub(crate) scopes: ScopeStack,
    /// Validation errors collected so far; any of them fails the compile.
    pub(crate) errors: Vec<CompileError>,
    pub(crate) warnings: Vec<CompileWarning>,
    pub(crate) symbol_references: Vec<SymbolReference>,
    pub(crate) used_variables: HashSet<VarId>,
    pub(crate) merges: HashMap<String, TranslationTable>,
    pub(crate) merge_count: usize,
    /// Inputs of the event being lowered, by name.
    pub(crate) event_inputs: HashMap<String, VarId>,
    locals: HashMap<String, VarId>,
    method: MethodId,
    event: usize,
    coordinate: Coordinate,
    /// Placeholder temporaries, released once the current action is lowered.
    pending_release: Vec<VarId>,
}

impl<'a> CompileContext<'a> {
    pub fn new(registry: &'a ActionRegistry, options: &'a CompilationOptions) -> Self {
        Self {
            registry,
            options,
            program: Program::new(),
            scopes: ScopeStack::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            symbol_references: Vec::new(),
            used_variables: HashSet::new(),
            merges: HashMap::new(),
            merge_count: 0,
            event_inputs: HashMap::new(),
            locals: HashMap::new(),
            method: MethodId(0),
            event: 0,
            coordinate: Coordinate::event(0, ""),
            pending_release: Vec::new(),
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ScopeStack {
        &mut self.scopes
    }

    pub fn options(&self) -> &CompilationOptions {
        self.options
    }

    // === Position ===

    pub fn method(&self) -> MethodId {
        self.method
    }

    /// Direct emission into another method from now on.
    pub fn enter_method(&mut self, method: MethodId) {
        self.method = method;
    }

    pub(crate) fn begin_event(&mut self, event: usize, entry: &str) {
        self.event = event;
        self.coordinate = Coordinate::event(event, entry);
        self.locals.clear();
        self.event_inputs.clear();
    }

    pub(crate) fn set_action(&mut self, action: usize, construct: &str) {
        self.coordinate = Coordinate::action(self.event, action, construct);
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    /// Attach the current coordinate to an error.
    pub fn error(&self, kind: CompileErrorKind) -> CompileError {
        kind.at(self.coordinate.clone())
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let warning = CompileWarning {
            message: message.into(),
            coordinate: Some(self.coordinate.clone()),
        };
        warn!(%warning, "compile warning");
        self.warnings.push(warning);
    }

    pub(crate) fn warn_at(&mut self, message: impl Into<String>, coordinate: Option<Coordinate>) {
        let warning = CompileWarning {
            message: message.into(),
            coordinate,
        };
        warn!(%warning, "compile warning");
        self.warnings.push(warning);
    }

    // === Emission ===

    pub fn emit(&mut self, instruction: Instruction) -> InstrId {
        self.program.emit(self.method, instruction)
    }

    pub fn new_label(&mut self) -> InstrId {
        self.program.new_label()
    }

    pub fn place_label(&mut self, label: InstrId) {
        self.program.place_label(self.method, label);
    }

    pub fn push(&mut self, var: VarId) -> InstrId {
        self.emit(Instruction::PushVariable(var))
    }

    /// `dst = src`
    pub fn copy(&mut self, src: VarId, dst: VarId) {
        self.push(src);
        self.push(dst);
        self.emit(Instruction::Copy);
    }

    pub fn jump(&mut self, target: InstrId) -> InstrId {
        self.program.emit_jump(self.method, target)
    }

    /// Pop `cond` and jump to `target` if it is false.
    pub fn jump_if_false(&mut self, cond: VarId, target: InstrId) {
        self.push(cond);
        self.emit(Instruction::JumpIfFalse(target));
    }

    pub fn call_extern(&mut self, signature: impl Into<String>, args: &[VarId]) {
        for arg in args {
            self.push(*arg);
        }
        self.emit(Instruction::Extern(signature.into()));
    }

    /// Call another method of the program and come back.
    ///
    /// The return address goes into `return_var`; the callee ends with
    /// `JumpIndirect(return_var)`.
    pub fn call_method(&mut self, name: &str, return_var: VarId) {
        let ret = self.new_label();
        let address = self.constant(
            &ValueType::UInt32,
            ConstValue::Address(AddressRef::Instruction(ret)),
        );
        self.copy(address, return_var);
        self.emit(Instruction::JumpLabel(name.into()));
        self.place_label(ret);
    }

    /// Run an exported method of this program through the host, by name.
    pub fn send_custom_event(&mut self, name: &str) {
        let this = self.this();
        let name = self.constant(&ValueType::String, ConstValue::String(name.into()));
        self.call_extern(externs::send_custom_event(), &[this, name]);
    }

    // === Labels of open frames ===

    fn lazy_label(program: &mut Program, slot: &mut Option<InstrId>) -> InstrId {
        *slot.get_or_insert_with(|| program.new_label())
    }

    /// Label for a popped frame's `end`, created if needed.
    pub fn end_of(&mut self, frame: &mut ScopeFrame) -> InstrId {
        Self::lazy_label(&mut self.program, &mut frame.end)
    }

    pub fn start_of(&mut self, frame: &mut ScopeFrame) -> InstrId {
        Self::lazy_label(&mut self.program, &mut frame.start)
    }

    /// `end` label of the frame at `index` on the stack.
    pub fn frame_end(&mut self, index: usize) -> Result<InstrId, CompileError> {
        let frame = self
            .scopes
            .get_mut(index)
            .ok_or_else(|| no_frame(index, &self.coordinate))?;
        Ok(Self::lazy_label(&mut self.program, &mut frame.end))
    }

    pub fn frame_start(&mut self, index: usize) -> Result<InstrId, CompileError> {
        let frame = self
            .scopes
            .get_mut(index)
            .ok_or_else(|| no_frame(index, &self.coordinate))?;
        Ok(Self::lazy_label(&mut self.program, &mut frame.start))
    }

    pub fn current_frame(&mut self) -> Result<&mut ScopeFrame, CompileError> {
        let depth = self.scopes.depth();
        self.scopes
            .current_mut()
            .ok_or_else(|| no_frame(depth, &self.coordinate))
    }

    pub fn parent_frame(&mut self) -> Result<&mut ScopeFrame, CompileError> {
        let index = self.scopes.parent_index().unwrap_or(usize::MAX);
        self.scopes
            .get_mut(index)
            .ok_or_else(|| no_frame(index, &self.coordinate))
    }

    // === Variables ===

    pub fn temporary(&mut self, ty: &ValueType) -> VarId {
        self.program.variables.request_temporary(ty)
    }

    pub fn release(&mut self, var: VarId) {
        self.program.variables.release(var);
    }

    pub fn constant(&mut self, ty: &ValueType, value: ConstValue) -> VarId {
        self.program.variables.get_or_create_constant(ty, value)
    }

    pub fn this(&mut self) -> VarId {
        self.program.variables.special(SpecialVariable::This)
    }

    pub fn var_type(&self, var: VarId) -> &ValueType {
        &self.program.variables.get(var).ty
    }

    pub(crate) fn add_local(&mut self, id: impl Into<String>, var: VarId) {
        self.locals.insert(id.into(), var);
    }

    /// Declare a local for a `NewLocal` binding, owned by the current frame.
    pub fn declare_local(&mut self, id: &str, ty: &ValueType) -> Result<VarId, CompileError> {
        if self.locals.contains_key(id) {
            return Err(self.error(CompileErrorKind::DuplicateName {
                name: id.into(),
                existing: None,
            }));
        }
        let var = self.temporary(ty);
        let frame = self.current_frame()?;
        frame.own(var);
        frame.locals.push(id.into());
        self.locals.insert(id.into(), var);
        trace!(local = id, %var, "declared local");
        Ok(var)
    }

    /// Move a placeholder temporary from the per-action pool into the
    /// current frame, so it lives until the block closes.
    pub fn keep_in_scope(&mut self, var: VarId) -> Result<(), CompileError> {
        if let Some(pos) = self.pending_release.iter().position(|v| *v == var) {
            self.pending_release.swap_remove(pos);
            self.current_frame()?.own(var);
        }
        Ok(())
    }

    pub(crate) fn release_pending(&mut self) {
        while let Some(var) = self.pending_release.pop() {
            self.release(var);
        }
    }

    /// Pop the innermost frame, releasing what it owns and recording it as
    /// the parent's last closed block.
    pub(crate) fn finish_frame(&mut self, frame: ScopeFrame) {
        for var in &frame.owned {
            self.release(*var);
        }
        for id in &frame.locals {
            self.locals.remove(id);
        }
        if let Some(parent) = self.scopes.current_mut() {
            parent.prev_sibling = frame.construct();
            parent.last_closed = Some(frame.closed());
        }
    }

    // === Binding ===

    pub fn resolve(&mut self, var: &VariableRef) -> Result<VarId, CompileError> {
        let id = match var {
            VariableRef::User(id) => self
                .program
                .variables
                .lookup_user_defined(id)
                .map_err(|kind| self.error(kind))?,
            VariableRef::Local(id) => self
                .locals
                .get(id)
                .copied()
                .ok_or_else(|| self.error(CompileErrorKind::UndefinedVariable { id: id.clone() }))?,
            VariableRef::EventInput(name) => {
                self.event_inputs.get(name).copied().ok_or_else(|| {
                    self.error(CompileErrorKind::UndefinedVariable { id: name.clone() })
                })?
            }
            VariableRef::ConditionResult => self
                .scopes
                .nearest_condition()
                .and_then(|index| self.scopes.get(index))
                .and_then(|frame| frame.condition_result)
                .ok_or_else(|| {
                    self.error(CompileErrorKind::UndefinedVariable {
                        id: "ConditionResult".into(),
                    })
                })?,
            VariableRef::This => self.this(),
        };
        self.used_variables.insert(id);
        Ok(id)
    }

    fn placeholder(&mut self, param: &ParameterDef) -> Result<VarId, CompileError> {
        match param.on_missing {
            MissingInputPolicy::Reject => Err(self.error(CompileErrorKind::MissingBinding {
                parameter: param.name.clone(),
            })),
            MissingInputPolicy::Placeholder => {
                let ty = param.ty.clone().unwrap_or(ValueType::Object);
                let var = self.temporary(&ty);
                self.pending_release.push(var);
                Ok(var)
            }
        }
    }

    fn mismatch(&self, param: &ParameterDef, expected: &ValueType, found: &ValueType) -> CompileError {
        self.error(CompileErrorKind::TypeMismatch {
            parameter: param.name.clone(),
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }

    /// Bind an input the action reads.
    pub fn bind_read(
        &mut self,
        binding: &InputBinding,
        param: &ParameterDef,
    ) -> Result<VarId, CompileError> {
        match binding {
            InputBinding::Unbound => self.placeholder(param),
            InputBinding::Constant(value) => {
                let ty = match &param.ty {
                    Some(ty) if !value.fits(ty) => {
                        let found = value.natural_type().unwrap_or(ValueType::Object);
                        return Err(self.mismatch(param, ty, &found));
                    }
                    Some(ty) => ty.clone(),
                    None => value.natural_type().unwrap_or(ValueType::Object),
                };
                let var = self.constant(&ty, value.clone());
                self.symbol_references.push(SymbolReference {
                    variable: var,
                    name: self.program.variables.get(var).name.clone(),
                    event: self.coordinate.event,
                    action: self.coordinate.action,
                    parameter: param.name.clone(),
                });
                Ok(var)
            }
            InputBinding::Variable(r) => {
                let var = self.resolve(r)?;
                if let Some(ty) = &param.ty {
                    let found = self.var_type(var);
                    let ok = if param.direction == Direction::InOut {
                        ty == found
                    } else {
                        ty.accepts(found)
                    };
                    if !ok {
                        return Err(self.mismatch(param, ty, &found.clone()));
                    }
                }
                Ok(var)
            }
            InputBinding::NewLocal { id, .. } => {
                Err(self.error(CompileErrorKind::UndefinedVariable { id: id.clone() }))
            }
        }
    }

    /// Bind an output the action writes. `inferred` types an untyped
    /// `NewLocal`.
    pub fn bind_write(
        &mut self,
        binding: &InputBinding,
        param: &ParameterDef,
        inferred: Option<&ValueType>,
    ) -> Result<VarId, CompileError> {
        match binding {
            InputBinding::Unbound => self.placeholder(param),
            InputBinding::Constant(value) => {
                let expected = param.ty.clone().unwrap_or(ValueType::Object);
                let found = value.natural_type().unwrap_or(ValueType::Object);
                Err(self.mismatch(param, &expected, &found))
            }
            InputBinding::Variable(VariableRef::This) => Err(self.error(
                CompileErrorKind::TypeMismatch {
                    parameter: param.name.clone(),
                    expected: "a writable variable".into(),
                    found: "this".into(),
                },
            )),
            InputBinding::Variable(r) => {
                let var = self.resolve(r)?;
                if let Some(ty) = &param.ty {
                    let target = self.var_type(var).clone();
                    if !target.accepts(ty) {
                        return Err(self.mismatch(param, &target, ty));
                    }
                }
                Ok(var)
            }
            InputBinding::NewLocal { id, .. } => {
                let ty = param
                    .ty
                    .clone()
                    .or_else(|| inferred.cloned())
                    .unwrap_or(ValueType::Object);
                self.declare_local(id, &ty)
            }
        }
    }

    /// Check arity and bind every input of an action, in parameter order.
    pub fn bind_action<'r>(
        &mut self,
        definition: &'r ActionDefinition,
        instance: &'r ActionInstance,
    ) -> Result<ResolvedAction<'r>, CompileError> {
        let expected = definition.parameters.len();
        if instance.inputs.len() != expected {
            return Err(self.error(CompileErrorKind::ArityMismatch {
                expected,
                found: instance.inputs.len(),
            }));
        }
        if !definition.multi_input && !instance.multi_inputs.is_empty() {
            return Err(self.error(CompileErrorKind::ArityMismatch {
                expected,
                found: expected + instance.multi_inputs.len(),
            }));
        }

        let mut inputs = Vec::with_capacity(expected);
        let mut inferred: Option<ValueType> = None;
        for (param, binding) in definition.parameters.iter().zip(&instance.inputs) {
            let var = if param.direction == Direction::Out {
                self.bind_write(binding, param, inferred.as_ref())?
            } else {
                self.bind_read(binding, param)?
            };
            if inferred.is_none() && param.direction.reads() {
                inferred = Some(self.var_type(var).clone());
            }
            inputs.push(var);
        }

        let mut multi_inputs = Vec::with_capacity(instance.multi_inputs.len());
        if let ActionKind::Extern {
            instance: Some(ty), ..
        } = &definition.kind
        {
            let target = ParameterDef::input("target", ty.clone());
            for binding in &instance.multi_inputs {
                multi_inputs.push(self.bind_read(binding, &target)?);
            }
        }

        Ok(ResolvedAction {
            definition,
            instance,
            inputs,
            multi_inputs,
            coordinate: self.coordinate.clone(),
        })
    }

    // === Writes ===

    /// Bookkeeping after `var` was written: request serialization for synced
    /// variables and run change detection for variables with a callback.
    pub fn after_write(&mut self, var: VarId) {
        let variable = self.program.variables.get(var);
        let synced = variable.is_synced();
        let shadow = if variable.change_callback {
            variable.previous
        } else {
            None
        };
        let ty = variable.ty.clone();
        let handler = handler_name(&variable.name);

        if synced {
            self.program.method_mut(self.method).mark_needs_serialization();
        }
        let Some(previous) = shadow else {
            return;
        };

        let changed = self.temporary(&ValueType::Boolean);
        if ty.is_value_type() {
            self.call_extern(externs::inequality(&ty), &[var, previous, changed]);
        } else {
            self.call_extern(externs::object_equals(), &[var, previous, changed]);
            self.call_extern(externs::boolean_negation(), &[changed, changed]);
        }
        let skip = self.new_label();
        self.jump_if_false(changed, skip);
        self.send_custom_event(&handler);
        self.copy(var, previous);
        self.place_label(skip);
        self.release(changed);
    }
}

/// Exported method run when a change-callback variable changes.
pub fn handler_name(variable: &str) -> String {
    format!("_onVarChange_{}", variable)
}

fn no_frame(index: usize, coordinate: &Coordinate) -> CompileError {
    CompileErrorKind::LoweringInvariant {
        message: format!("no scope frame at depth {}", index),
    }
    .at(coordinate.clone())
}
