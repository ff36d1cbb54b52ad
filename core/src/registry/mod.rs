//! Action and event definitions the compiler looks actions up in.
//!
//! Every [`ActionInstance`](crate::trigger::ActionInstance) names an action by
//! identifier (and, for action-group actions, by group GUID). The registry
//! maps that to an [`ActionDefinition`] describing its parameters and how it
//! lowers. A miss is fatal.

pub mod externs;

use alloc::sync::Arc;
use core::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::compiler::{ActionLowering, CompileErrorKind, CompiledActionGroup};
use crate::types::ValueType;
use crate::{String, Vec, vec};

/// Closed set of constructs the compiler lowers itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Construct {
    If,
    ElseIf,
    Else,
    Condition,
    ConditionBody,
    PassIfTrue,
    FailIfFalse,
    While,
    For,
    Break,
    Continue,
    Return,
    Block,
    BlockEnd,
    SetVariable,
    LocalVariable,
}

impl Construct {
    pub const ALL: [Construct; 16] = [
        Construct::If,
        Construct::ElseIf,
        Construct::Else,
        Construct::Condition,
        Construct::ConditionBody,
        Construct::PassIfTrue,
        Construct::FailIfFalse,
        Construct::While,
        Construct::For,
        Construct::Break,
        Construct::Continue,
        Construct::Return,
        Construct::Block,
        Construct::BlockEnd,
        Construct::SetVariable,
        Construct::LocalVariable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Construct::If => "If",
            Construct::ElseIf => "ElseIf",
            Construct::Else => "Else",
            Construct::Condition => "Condition",
            Construct::ConditionBody => "ConditionBody",
            Construct::PassIfTrue => "PassIfTrue",
            Construct::FailIfFalse => "FailIfFalse",
            Construct::While => "While",
            Construct::For => "For",
            Construct::Break => "Break",
            Construct::Continue => "Continue",
            Construct::Return => "Return",
            Construct::Block => "Block",
            Construct::BlockEnd => "BlockEnd",
            Construct::SetVariable => "SetVariable",
            Construct::LocalVariable => "LocalVariable",
        }
    }

    /// Opens a block that a later `BlockEnd` closes.
    pub fn opens_scope(self) -> bool {
        matches!(
            self,
            Construct::If
                | Construct::ElseIf
                | Construct::Else
                | Construct::Condition
                | Construct::ConditionBody
                | Construct::While
                | Construct::For
                | Construct::Block
        )
    }

    /// Whether the construct changes the scope structure (opens or closes).
    pub fn affects_scope(self) -> bool {
        self.opens_scope() || self == Construct::BlockEnd
    }

    /// Loop constructs are the targets of `Break` and `Continue`.
    pub fn is_loop(self) -> bool {
        matches!(self, Construct::While | Construct::For)
    }

    fn parameters(self) -> Vec<ParameterDef> {
        match self {
            Construct::PassIfTrue | Construct::FailIfFalse => {
                vec![ParameterDef::input("value", ValueType::Boolean)]
            }
            Construct::For => vec![
                ParameterDef::input("start", ValueType::Int32),
                ParameterDef::input("end", ValueType::Int32),
                ParameterDef::input("step", ValueType::Int32),
                ParameterDef::output("index", ValueType::Int32).placeholder(),
            ],
            Construct::SetVariable => vec![
                ParameterDef::any_input("value"),
                ParameterDef::any_output("target"),
            ],
            Construct::LocalVariable => vec![
                ParameterDef::any_input("value"),
                ParameterDef::any_output("local"),
            ],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data flow of a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn reads(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub fn writes(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// What happens when a parameter is left unbound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissingInputPolicy {
    /// Report `MissingBinding` and skip the action.
    #[default]
    Reject,
    /// Silently bind a fresh temporary of the parameter's type.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    /// `None` accepts any type.
    #[serde(default)]
    pub ty: Option<ValueType>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub on_missing: MissingInputPolicy,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, ty: Option<ValueType>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            ty,
            direction,
            on_missing: MissingInputPolicy::Reject,
        }
    }

    pub fn input(name: impl Into<String>, ty: ValueType) -> Self {
        Self::new(name, Some(ty), Direction::In)
    }

    pub fn output(name: impl Into<String>, ty: ValueType) -> Self {
        Self::new(name, Some(ty), Direction::Out)
    }

    pub fn any_input(name: impl Into<String>) -> Self {
        Self::new(name, None, Direction::In)
    }

    pub fn any_output(name: impl Into<String>) -> Self {
        Self::new(name, None, Direction::Out)
    }

    pub fn placeholder(mut self) -> Self {
        self.on_missing = MissingInputPolicy::Placeholder;
        self
    }
}

/// How an action lowers.
#[derive(Clone)]
pub enum ActionKind {
    Builtin(Construct),
    /// A single call into the host.
    Extern {
        signature: String,
        /// Type of the object the call is made on. Multi-input targets are
        /// pushed first, one call per target.
        instance: Option<ValueType>,
    },
    Custom(Arc<dyn ActionLowering>),
    /// Entry point of a registered action group.
    GroupAction { group: String, action: String },
}

impl fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Builtin(construct) => write!(f, "Builtin({})", construct),
            ActionKind::Extern { signature, .. } => write!(f, "Extern({})", signature),
            ActionKind::Custom(_) => write!(f, "Custom(..)"),
            ActionKind::GroupAction { group, action } => {
                write!(f, "GroupAction({}::{})", group, action)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionDefinition {
    pub id: String,
    pub parameters: Vec<ParameterDef>,
    /// Accepts a variable-length list of targets.
    pub multi_input: bool,
    pub kind: ActionKind,
}

impl ActionDefinition {
    pub fn construct(&self) -> Option<Construct> {
        match self.kind {
            ActionKind::Builtin(construct) => Some(construct),
            _ => None,
        }
    }

    /// Custom lowerings decide for themselves; everything else is a builtin
    /// or a plain call.
    pub fn affects_scope(&self) -> bool {
        match &self.kind {
            ActionKind::Builtin(construct) => construct.affects_scope(),
            ActionKind::Custom(lowering) => lowering.opens_scope(),
            _ => false,
        }
    }

    pub fn extern_call(
        id: impl Into<String>,
        signature: impl Into<String>,
        parameters: Vec<ParameterDef>,
    ) -> Self {
        Self {
            id: id.into(),
            parameters,
            multi_input: false,
            kind: ActionKind::Extern {
                signature: signature.into(),
                instance: None,
            },
        }
    }

    /// An extern called on each of a list of targets.
    pub fn instance_call(
        id: impl Into<String>,
        signature: impl Into<String>,
        instance: ValueType,
        parameters: Vec<ParameterDef>,
    ) -> Self {
        Self {
            id: id.into(),
            parameters,
            multi_input: true,
            kind: ActionKind::Extern {
                signature: signature.into(),
                instance: Some(instance),
            },
        }
    }

    pub fn custom(
        id: impl Into<String>,
        parameters: Vec<ParameterDef>,
        lowering: Arc<dyn ActionLowering>,
    ) -> Self {
        Self {
            id: id.into(),
            parameters,
            multi_input: false,
            kind: ActionKind::Custom(lowering),
        }
    }
}

/// How the exported method of an event is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMethod {
    /// Fixed by the VM (`_start`, `_interact`...).
    Named(String),
    /// Taken from the entry's constant `name` input.
    FromInput,
    /// `_onVarChange_{name}` of the variable bound to the entry.
    VariableHandler,
}

/// An input the VM writes before starting the event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventParameter {
    pub name: String,
    /// Slot name the VM writes the value into.
    pub variable: String,
    pub ty: ValueType,
}

#[derive(Debug, Clone)]
pub struct EventType {
    pub id: String,
    pub method_name: EventMethod,
    /// Inputs of the entry action itself (e.g. the `name` of a custom event).
    pub entry_parameters: Vec<ParameterDef>,
    pub parameters: Vec<EventParameter>,
}

impl EventType {
    pub fn named(id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method_name: EventMethod::Named(method.into()),
            entry_parameters: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, variable: &str, ty: ValueType) -> Self {
        self.parameters.push(EventParameter {
            name: name.into(),
            variable: variable.into(),
            ty,
        });
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&EventParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

pub const CUSTOM_EVENT: &str = "Custom";
pub const VARIABLE_CHANGED_EVENT: &str = "OnVariableChanged";

/// Lookup table for actions, events and compiled action groups.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<(String, Option<String>), ActionDefinition>,
    events: HashMap<String, EventType>,
    groups: HashMap<String, Arc<CompiledActionGroup>>,
}

impl ActionRegistry {
    /// An empty registry. Most callers want [`ActionRegistry::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every construct, the standard events and a few common
    /// externs.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        for construct in Construct::ALL {
            registry.register_action(ActionDefinition {
                id: construct.name().into(),
                parameters: construct.parameters(),
                multi_input: false,
                kind: ActionKind::Builtin(construct),
            });
        }

        registry.register_event(EventType::named("Start", "_start"));
        registry.register_event(EventType::named("Interact", "_interact"));
        registry.register_event(EventType::named("Update", "_update"));
        registry.register_event(
            EventType::named("OnPlayerJoined", "_onPlayerJoined").with_parameter(
                "player",
                "onPlayerJoinedPlayer",
                ValueType::player(),
            ),
        );
        registry.register_event(
            EventType::named("OnPlayerLeft", "_onPlayerLeft").with_parameter(
                "player",
                "onPlayerLeftPlayer",
                ValueType::player(),
            ),
        );
        registry.register_event(EventType {
            id: CUSTOM_EVENT.into(),
            method_name: EventMethod::FromInput,
            entry_parameters: vec![ParameterDef::input("name", ValueType::String)],
            parameters: Vec::new(),
        });
        registry.register_event(EventType {
            id: VARIABLE_CHANGED_EVENT.into(),
            method_name: EventMethod::VariableHandler,
            entry_parameters: vec![ParameterDef::any_input("variable")],
            parameters: Vec::new(),
        });

        registry.register_action(ActionDefinition::extern_call(
            "Log",
            externs::debug_log(),
            vec![ParameterDef::any_input("message")],
        ));
        for (id, op) in [
            ("IntAdd", "Addition"),
            ("IntSubtract", "Subtraction"),
            ("IntMultiply", "Multiplication"),
        ] {
            registry.register_action(ActionDefinition::extern_call(
                id,
                externs::int_operator(op),
                vec![
                    ParameterDef::input("a", ValueType::Int32),
                    ParameterDef::input("b", ValueType::Int32),
                    ParameterDef::output("result", ValueType::Int32),
                ],
            ));
        }
        for (id, op) in [
            ("IntLessThan", "LessThan"),
            ("IntGreaterThan", "GreaterThan"),
            ("IntEquals", "Equality"),
        ] {
            registry.register_action(ActionDefinition::extern_call(
                id,
                externs::int_comparison(op),
                vec![
                    ParameterDef::input("a", ValueType::Int32),
                    ParameterDef::input("b", ValueType::Int32),
                    ParameterDef::output("result", ValueType::Boolean),
                ],
            ));
        }
        registry.register_action(ActionDefinition::extern_call(
            "Not",
            externs::boolean_negation(),
            vec![
                ParameterDef::input("value", ValueType::Boolean),
                ParameterDef::output("result", ValueType::Boolean),
            ],
        ));
        registry.register_action(ActionDefinition::instance_call(
            "SetActive",
            externs::signature(
                "UnityEngineGameObject",
                "SetActive",
                &["SystemBoolean"],
                externs::VOID,
            ),
            ValueType::game_object(),
            vec![ParameterDef::input("active", ValueType::Boolean)],
        ));

        registry
    }

    /// Register (or replace) an action outside of any group.
    pub fn register_action(&mut self, definition: ActionDefinition) {
        self.actions
            .insert((definition.id.clone(), None), definition);
    }

    pub fn register_event(&mut self, event: EventType) {
        self.events.insert(event.id.clone(), event);
    }

    /// Store a compiled action group and expose each of its actions under
    /// the group's GUID.
    pub fn register_group(&mut self, group: CompiledActionGroup) {
        let guid = group.guid.clone();
        for entry in &group.entries {
            let definition = ActionDefinition {
                id: entry.name.clone(),
                parameters: entry.parameters.iter().map(|p| p.def.clone()).collect(),
                multi_input: false,
                kind: ActionKind::GroupAction {
                    group: guid.clone(),
                    action: entry.name.clone(),
                },
            };
            self.actions
                .insert((entry.name.clone(), Some(guid.clone())), definition);
        }
        self.groups.insert(guid, Arc::new(group));
    }

    pub fn action(&self, id: &str, group: Option<&str>) -> Result<&ActionDefinition, CompileErrorKind> {
        self.actions
            .get(&(String::from(id), group.map(String::from)))
            .ok_or_else(|| CompileErrorKind::UnknownAction {
                id: id.into(),
                group: group.map(String::from),
            })
    }

    pub fn event(&self, id: &str) -> Result<&EventType, CompileErrorKind> {
        self.events
            .get(id)
            .ok_or_else(|| CompileErrorKind::UnknownAction {
                id: id.into(),
                group: None,
            })
    }

    pub fn group(&self, guid: &str) -> Option<&Arc<CompiledActionGroup>> {
        self.groups.get(guid)
    }
}
