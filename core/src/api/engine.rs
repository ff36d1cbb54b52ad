//! The compilation engine.

use super::{CompilationOptions, CompiledTrigger, EngineOptions, Error};
use crate::compiler::{self, CompiledActionGroup};
use crate::format;
use crate::registry::ActionRegistry;
use crate::trigger::{ActionGroupDefinition, TriggerDefinition};

/// The trigger compiler.
///
/// The engine manages:
/// - the action registry (constructs, externs, events, action groups)
/// - default compilation options
///
/// Compiling never mutates the engine; registering action groups does.
///
/// # Example
///
/// ```ignore
/// use trigc_core::api::{Engine, EngineOptions};
///
/// let mut engine = Engine::new(EngineOptions::default());
///
/// // Compile a reusable group once and make its actions available.
/// let group = engine.compile_action_group(&group_definition)?;
/// engine.register_action_group(group)?;
///
/// // Triggers can now call `ActionInstance::new("Heal").in_group(guid)`.
/// let compiled = engine.compile(&trigger)?;
/// ```
pub struct Engine {
    registry: ActionRegistry,
    options: EngineOptions,
}

impl Engine {
    /// Create an engine with the builtin registry.
    pub fn new(options: EngineOptions) -> Self {
        Self::with_registry(ActionRegistry::with_builtins(), options)
    }

    /// Create an engine around a custom registry.
    pub fn with_registry(registry: ActionRegistry, options: EngineOptions) -> Self {
        Self { registry, options }
    }

    /// Access the action registry.
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Mutable access to the action registry, to add actions and events.
    pub fn registry_mut(&mut self) -> &mut ActionRegistry {
        &mut self.registry
    }

    /// Access the engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile a trigger with the engine's default options.
    pub fn compile(&self, trigger: &TriggerDefinition) -> Result<CompiledTrigger, Error> {
        self.compile_with(&self.options.compilation, trigger)
    }

    /// Compile a trigger with explicit options.
    ///
    /// # Returns
    ///
    /// The linked program with its warnings, or every error found. A compile
    /// with any error yields no program.
    pub fn compile_with(
        &self,
        options: &CompilationOptions,
        trigger: &TriggerDefinition,
    ) -> Result<CompiledTrigger, Error> {
        let output = compiler::compile_trigger(&self.registry, options, trigger)?;
        Ok(CompiledTrigger::from(output))
    }

    /// Compile an action group into an unlinked subprogram.
    ///
    /// The result is meant for [`Engine::register_action_group`]; triggers
    /// using the group get a namespaced copy merged in.
    pub fn compile_action_group(
        &self,
        group: &ActionGroupDefinition,
    ) -> Result<CompiledActionGroup, Error> {
        Ok(compiler::compile_action_group(
            &self.registry,
            &self.options.compilation,
            group,
        )?)
    }

    /// Make a compiled group's actions available under its GUID.
    pub fn register_action_group(&mut self, group: CompiledActionGroup) -> Result<(), Error> {
        if self.registry.group(&group.guid).is_some() {
            return Err(Error::Api(format!(
                "action group '{}' is already registered",
                group.guid
            )));
        }
        self.registry.register_group(group);
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}
