//! Trigger definitions: the compiler's input.
//!
//! A trigger is plain data produced by an editor. Nothing here is validated on
//! construction; the compiler re-checks arity, bindings and types and reports
//! problems against the offending (event, action) coordinate.

use serde::{Deserialize, Serialize};

use crate::types::{ConstValue, ValueType};
use crate::vm::SyncMode;
use crate::{String, Vec};

/// A complete trigger: global variables and the events that use them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
    #[serde(default)]
    pub events: Vec<EventDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Editor-assigned id, referenced by [`VariableRef::User`].
    pub id: String,
    pub name: String,
    pub ty: ValueType,
    #[serde(default)]
    pub sync: SyncMode,
    #[serde(default)]
    pub default: Option<ConstValue>,
    /// Run the variable's change handler whenever a write changes its value.
    #[serde(default)]
    pub change_callback: bool,
}

impl VariableDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ty,
            sync: SyncMode::None,
            default: None,
            change_callback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub name: String,
    /// The action describing what triggers the event (`Start`, `Interact`...).
    pub entry: ActionInstance,
    #[serde(default)]
    pub actions: Vec<ActionInstance>,
    #[serde(default)]
    pub options: EventOptions,
}

/// Who may run an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    #[default]
    Anyone,
    Owner,
    Master,
}

/// Where an event's body runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Broadcast {
    #[default]
    Local,
    All,
    Owner,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOptions {
    #[serde(default)]
    pub gate: Gate,
    #[serde(default)]
    pub broadcast: Broadcast,
    #[serde(default)]
    pub delay_seconds: f32,
}

/// One invocation of an action with concrete input bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInstance {
    /// Registry identifier of the action.
    pub action: String,
    /// GUID of the action group the action comes from, if any.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
    #[serde(default)]
    pub multi_inputs: Vec<InputBinding>,
}

impl ActionInstance {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            group: None,
            inputs: Vec::new(),
            multi_inputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = InputBinding>) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    pub fn with_multi_inputs(mut self, inputs: impl IntoIterator<Item = InputBinding>) -> Self {
        self.multi_inputs = inputs.into_iter().collect();
        self
    }

    pub fn in_group(mut self, guid: impl Into<String>) -> Self {
        self.group = Some(guid.into());
        self
    }
}

/// What feeds one action input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputBinding {
    Unbound,
    Constant(ConstValue),
    Variable(VariableRef),
    /// Declare a new local variable for an output, visible until the
    /// enclosing block closes.
    NewLocal { id: String, name: String },
}

impl InputBinding {
    pub fn user(id: impl Into<String>) -> Self {
        InputBinding::Variable(VariableRef::User(id.into()))
    }

    pub fn local(id: impl Into<String>) -> Self {
        InputBinding::Variable(VariableRef::Local(id.into()))
    }

    pub fn event_input(name: impl Into<String>) -> Self {
        InputBinding::Variable(VariableRef::EventInput(name.into()))
    }
}

impl From<ConstValue> for InputBinding {
    fn from(value: ConstValue) -> Self {
        InputBinding::Constant(value)
    }
}

/// A variable an input can read or write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableRef {
    /// A trigger variable, by editor id.
    User(String),
    /// A local declared earlier by [`InputBinding::NewLocal`].
    Local(String),
    /// An input of the enclosing event (e.g. `player` for `OnPlayerJoined`).
    EventInput(String),
    /// The result of the nearest enclosing condition block.
    ConditionResult,
    /// The object running the program.
    This,
}

/// A reusable bundle of custom actions, compiled once and merged into every
/// trigger that uses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionGroupDefinition {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
    #[serde(default)]
    pub actions: Vec<CustomActionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomActionDefinition {
    pub name: String,
    /// Host event type whose inputs the action reads, if any.
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub parameters: Vec<crate::registry::ParameterDef>,
    #[serde(default)]
    pub actions: Vec<ActionInstance>,
}
