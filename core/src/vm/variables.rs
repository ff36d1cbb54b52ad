//! The program's flat variable table.
//!
//! Every slot the program touches lives here: user variables declared by the
//! trigger, deduplicated constants, pooled temporaries and a few reserved
//! slots the compiler itself needs (`this`, change-detection shadows, return
//! addresses).
//!
//! # Temporaries
//!
//! Temporaries are drawn from a per-type free list by
//! [`VariableTable::request_temporary`] and handed back with
//! [`VariableTable::release`]. Lowering code must release every temporary it
//! requests before it returns, unless it hands the slot to a scope frame which
//! releases it when the scope closes. A temporary that is never released is
//! not an error; it just stays out of the pool for the rest of the compile.

use core::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::compiler::CompileErrorKind;
use crate::trigger::VariableDefinition;
use crate::types::{ConstValue, ValueType};
use crate::{String, Vec, format};

/// Stable index of a slot in the variable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Storage class of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    UserDefined,
    Constant,
    Temporary,
    Reserved,
}

/// Network synchronisation of a user variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncMode {
    #[default]
    None,
    Synced,
    Linear,
    Smooth,
}

/// Reserved slots with a fixed meaning, shared by every merged subprogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialVariable {
    /// The object running the program.
    This,
}

impl SpecialVariable {
    fn name(self) -> &'static str {
        match self {
            SpecialVariable::This => "__this",
        }
    }

    fn ty(self) -> ValueType {
        match self {
            SpecialVariable::This => ValueType::game_object(),
        }
    }
}

/// One slot of the variable table.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: ValueType,
    pub kind: VariableKind,
    pub sync: SyncMode,
    /// Visible to the host (user variables).
    pub exported: bool,
    /// Initial value. Always set for constants.
    pub value: Option<ConstValue>,
    /// Shadow slot holding the previous value, for change detection.
    pub previous: Option<VarId>,
    pub change_callback: bool,
    pub(crate) special: Option<SpecialVariable>,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: ValueType, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            ty,
            kind,
            sync: SyncMode::None,
            exported: false,
            value: None,
            previous: None,
            change_callback: false,
            special: None,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.sync != SyncMode::None
    }

    pub fn is_special(&self) -> bool {
        self.special.is_some()
    }
}

/// The variable table of one program.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: Vec<Variable>,
    by_name: HashMap<String, VarId>,
    /// Editor-assigned user variable ids -> slot
    user_ids: HashMap<String, VarId>,
    constants: HashMap<(ValueType, ConstValue), VarId>,
    free_temporaries: HashMap<ValueType, Vec<VarId>>,
    specials: HashMap<SpecialVariable, VarId>,
    temporary_count: usize,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, var)| (VarId(i as u32), var))
    }

    /// Look up any slot by its final name.
    pub fn lookup_name(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    /// Declare a named slot.
    ///
    /// Names are unique across the whole table; a collision is reported as
    /// `DuplicateName` whatever the kinds involved.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        ty: ValueType,
        kind: VariableKind,
    ) -> Result<VarId, CompileErrorKind> {
        self.insert(Variable::new(name, ty, kind))
    }

    /// Insert a fully built variable, keeping the name index up to date.
    pub(crate) fn insert(&mut self, variable: Variable) -> Result<VarId, CompileErrorKind> {
        if let Some(existing) = self.by_name.get(&variable.name) {
            return Err(CompileErrorKind::DuplicateName {
                name: variable.name.clone(),
                existing: Some(self.get(*existing).kind),
            });
        }
        let id = VarId(self.variables.len() as u32);
        self.by_name.insert(variable.name.clone(), id);
        if let Some(special) = variable.special {
            self.specials.insert(special, id);
        }
        self.variables.push(variable);
        Ok(id)
    }

    /// Declare a user variable from its trigger definition.
    ///
    /// Variables with a change callback get a shadow slot named
    /// `__prev_{name}` holding the last value the handler saw.
    pub fn declare_user(&mut self, def: &VariableDefinition) -> Result<VarId, CompileErrorKind> {
        if self.user_ids.contains_key(&def.id) {
            return Err(CompileErrorKind::DuplicateName {
                name: def.name.clone(),
                existing: Some(VariableKind::UserDefined),
            });
        }

        let mut variable = Variable::new(def.name.clone(), def.ty.clone(), VariableKind::UserDefined);
        variable.sync = def.sync;
        variable.exported = true;
        variable.value = def.default.clone();
        variable.change_callback = def.change_callback;
        let id = self.insert(variable)?;

        if def.change_callback {
            let mut shadow = Variable::new(
                format!("__prev_{}", def.name),
                def.ty.clone(),
                VariableKind::Reserved,
            );
            shadow.value = def.default.clone();
            let shadow = self.insert(shadow)?;
            self.get_mut(id).previous = Some(shadow);
        }

        self.user_ids.insert(def.id.clone(), id);
        Ok(id)
    }

    /// Resolve an editor-assigned user variable id.
    pub fn lookup_user_defined(&self, id: &str) -> Result<VarId, CompileErrorKind> {
        self.user_ids
            .get(id)
            .copied()
            .ok_or_else(|| CompileErrorKind::UndefinedVariable { id: id.into() })
    }

    /// Get a temporary of the given type, reusing a released one if possible.
    pub fn request_temporary(&mut self, ty: &ValueType) -> VarId {
        if let Some(id) = self.free_temporaries.get_mut(ty).and_then(|free| free.pop()) {
            return id;
        }
        let name = format!("__temp_{}_{}", self.temporary_count, ty.isa_name());
        self.temporary_count += 1;
        let variable = Variable::new(name, ty.clone(), VariableKind::Temporary);
        // Generated names carry a fresh counter, so they cannot collide with
        // each other; a user variable squatting on the name would.
        match self.insert(variable) {
            Ok(id) => id,
            Err(_) => self.request_temporary(ty),
        }
    }

    /// Return a temporary to its pool. Non-temporaries are ignored.
    pub fn release(&mut self, id: VarId) {
        let variable = self.get(id);
        if variable.kind != VariableKind::Temporary {
            return;
        }
        let ty = variable.ty.clone();
        let free = self.free_temporaries.entry(ty).or_default();
        debug_assert!(!free.contains(&id), "temporary {} released twice", id);
        free.push(id);
    }

    /// Get the constant slot holding `value`, creating it on first use.
    ///
    /// Identical values of the same type share one slot.
    pub fn get_or_create_constant(&mut self, ty: &ValueType, value: ConstValue) -> VarId {
        let key = (ty.clone(), value);
        if let Some(id) = self.constants.get(&key) {
            return *id;
        }
        let mut index = self.constants.len();
        let id = loop {
            let mut variable = Variable::new(
                format!("__const_{}_{}", index, ty.isa_name()),
                ty.clone(),
                VariableKind::Constant,
            );
            variable.value = Some(key.1.clone());
            match self.insert(variable) {
                Ok(id) => break id,
                Err(_) => index += 1,
            }
        };
        self.constants.insert(key, id);
        id
    }

    /// Get a reserved slot, creating it on first use.
    pub fn special(&mut self, special: SpecialVariable) -> VarId {
        if let Some(id) = self.specials.get(&special) {
            return *id;
        }
        // A user variable may already hold the plain name; the slot is
        // found through `specials`, so any free name will do.
        let mut suffix = 0;
        loop {
            let name = match suffix {
                0 => String::from(special.name()),
                n => format!("{}_{}", special.name(), n),
            };
            let mut variable = Variable::new(name, special.ty(), VariableKind::Reserved);
            variable.special = Some(special);
            match self.insert(variable) {
                Ok(id) => return id,
                Err(_) => suffix += 1,
            }
        }
    }

    /// Declare a reserved slot or return the existing one with that name.
    ///
    /// Used for ambient event inputs, whose names are fixed by the VM and
    /// shared by every event of the same type.
    pub fn reserved(&mut self, name: &str, ty: &ValueType) -> Result<VarId, CompileErrorKind> {
        match self.by_name.get(name) {
            Some(id) if self.get(*id).kind == VariableKind::Reserved && self.get(*id).ty == *ty => {
                Ok(*id)
            }
            Some(id) => Err(CompileErrorKind::DuplicateName {
                name: name.into(),
                existing: Some(self.get(*id).kind),
            }),
            None => self.declare(name, ty.clone(), VariableKind::Reserved),
        }
    }

    /// Number of temporaries ever created (pool high-water mark).
    pub fn temporary_count(&self) -> usize {
        self.temporary_count
    }

    /// Number of temporaries currently sitting in the free pools.
    pub fn free_temporary_count(&self) -> usize {
        self.free_temporaries.values().map(Vec::len).sum()
    }

    /// Rewrite the stored value of every slot the closure maps.
    ///
    /// Used by the linker to turn `Address` placeholders into numbers.
    pub(crate) fn try_map_values<E>(
        &mut self,
        mut f: impl FnMut(&ConstValue) -> Result<Option<ConstValue>, E>,
    ) -> Result<(), E> {
        for variable in self.variables.iter_mut() {
            if let Some(value) = &variable.value {
                if let Some(new_value) = f(value)? {
                    variable.value = Some(new_value);
                }
            }
        }
        Ok(())
    }
}
