//! trigc - compile visual-scripting triggers into stack-VM programs
//!
//! # Overview
//!
//! A trigger is a set of events, each a flat list of actions produced by an
//! editor. Block structure (If/Else chains, loops, condition blocks) is
//! expressed with opener actions and a closing `BlockEnd`. The compiler turns
//! a trigger into a [`Program`]: a variable table and a list of methods made
//! of push/copy/extern/jump instructions, with final addresses assigned.
//!
//! # Quick Start
//!
//! ```
//! use trigc::{ActionInstance, Engine, EngineOptions, EventDefinition, EventOptions};
//! use trigc::{InputBinding, TriggerDefinition, ConstValue};
//!
//! let engine = Engine::new(EngineOptions::default());
//!
//! let trigger = TriggerDefinition {
//!     variables: Vec::new(),
//!     events: vec![EventDefinition {
//!         name: "hello".into(),
//!         entry: ActionInstance::new("Interact"),
//!         actions: vec![ActionInstance::new("Log")
//!             .with_inputs([InputBinding::Constant(ConstValue::String("hi".into()))])],
//!         options: EventOptions::default(),
//!     }],
//! };
//!
//! let compiled = engine.compile(&trigger).unwrap();
//! println!("{:?}", compiled.program);
//! ```
//!
//! # Action groups
//!
//! Reusable custom actions are compiled once with
//! [`Engine::compile_action_group`], registered with
//! [`Engine::register_action_group`], and merged into every trigger that
//! calls them.

pub mod error_renderer;

// Re-export public API from trigc_core
pub use trigc_core::api::{
    CompilationOptions, CompiledTrigger, Diagnostic, Engine, EngineOptions, Error, Severity,
};

// Re-export the input model
pub use trigc_core::trigger::{
    ActionGroupDefinition, ActionInstance, Broadcast, CustomActionDefinition, EventDefinition,
    EventOptions, Gate, InputBinding, TriggerDefinition, VariableDefinition, VariableRef,
};
pub use trigc_core::types::{ConstValue, ValueType};

// Re-export the program model and extension points
pub use trigc_core::compiler::{
    ActionLowering, CompileContext, CompiledActionGroup, Coordinate, ResolvedAction,
    SymbolReference,
};
pub use trigc_core::registry::{self, ActionDefinition, ActionRegistry, EventType, ParameterDef};
pub use trigc_core::vm::{self, Instruction, Method, MethodKind, Program, SyncMode};

pub use error_renderer::{
    render_diagnostics_to_string, render_error, render_error_to_string,
    render_error_to_string_no_color,
};
