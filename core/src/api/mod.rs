//! Public API of the trigger compiler.
//!
//! The [`Engine`] owns an [`ActionRegistry`](crate::registry::ActionRegistry)
//! and turns trigger definitions into linked programs.
//!
//! # Example
//!
//! ```
//! use trigc_core::api::{Engine, EngineOptions};
//! use trigc_core::trigger::{ActionInstance, EventDefinition, EventOptions, TriggerDefinition};
//!
//! let engine = Engine::new(EngineOptions::default());
//!
//! let trigger = TriggerDefinition {
//!     variables: Vec::new(),
//!     events: vec![EventDefinition {
//!         name: "start".into(),
//!         entry: ActionInstance::new("Start"),
//!         actions: Vec::new(),
//!         options: EventOptions::default(),
//!     }],
//! };
//!
//! let compiled = engine.compile(&trigger).unwrap();
//! assert!(compiled.program.method_by_name("_start").is_some());
//! ```

pub mod compiled;
pub mod engine;
pub mod error;
pub mod options;

pub use compiled::CompiledTrigger;
pub use engine::Engine;
pub use error::{Diagnostic, Error, Severity};
pub use options::{CompilationOptions, EngineOptions};
