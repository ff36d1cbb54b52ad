//! Event assembly.
//!
//! Each event becomes a chain of methods ending in the one its body lowers
//! into:
//!
//! ```text
//! _interact            gate check, then hand off
//!   -> event0interact      network entry, when broadcast (SendCustomNetworkEvent)
//!     -> _event0interactDelayed   when delayed (SendCustomEventDelayedSeconds)
//!          <body>
//! ```
//!
//! Events sharing an exported name each get a private body method
//! `__event{i}{name}`; the exported method becomes a dispatcher calling them
//! in declaration order.

use hashbrown::HashMap;
use tracing::debug;

use crate::compiler::context::handler_name;
use crate::compiler::lowering::lower_body;
use crate::compiler::{CompileContext, CompileError, CompileErrorKind};
use crate::registry::{ActionRegistry, EventMethod, EventType, externs};
use crate::registry::externs::{EVENT_TIMING, NETWORK_EVENT_TARGET};
use crate::trigger::{
    Broadcast, EventDefinition, Gate, InputBinding, TriggerDefinition, VariableRef,
};
use crate::types::{ConstValue, ValueType};
use crate::vm::{Epilogue, MethodId, MethodKind, VarId, VariableKind};
use crate::{String, Vec, format};

/// An event whose entry resolved, ready to be assembled.
struct PlannedEvent<'r, 't> {
    index: usize,
    definition: &'t EventDefinition,
    event_type: &'r EventType,
    exported: String,
    /// Variable watched by an `OnVariableChanged` event.
    watched: Option<VarId>,
}

/// Declare the trigger's variables and assemble every event.
pub(crate) fn assemble(
    ctx: &mut CompileContext<'_>,
    trigger: &TriggerDefinition,
) -> Result<(), CompileError> {
    for variable in &trigger.variables {
        ctx.program
            .variables
            .declare_user(variable)
            .map_err(CompileError::from)?;
    }

    let mut planned = Vec::with_capacity(trigger.events.len());
    for (index, event) in trigger.events.iter().enumerate() {
        match plan_event(ctx, index, event) {
            Ok(plan) => planned.push(plan),
            Err(err) if !err.is_fatal() => ctx.errors.push(err),
            Err(err) => return Err(err),
        }
    }

    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for (i, plan) in planned.iter().enumerate() {
        let slot = by_name.entry(plan.exported.as_str()).or_insert_with(|| {
            order.push(plan.exported.as_str());
            Vec::new()
        });
        slot.push(i);
    }

    for name in order {
        let group = &by_name[name];
        let exported = ctx
            .program
            .add_method(name, MethodKind::Entry)
            .map_err(|kind| ctx.error(kind))?;

        if let [only] = group.as_slice() {
            assemble_event(ctx, &planned[*only], exported)?;
            continue;
        }

        // Shared name: one private body method per event plus a dispatcher.
        for &i in group {
            let plan = &planned[i];
            let private = format!("__event{}{}", plan.index, name);
            ctx.begin_event(plan.index, &plan.definition.entry.action);
            let method = ctx
                .program
                .add_method(private.as_str(), MethodKind::Synchronous)
                .map_err(|kind| ctx.error(kind))?;
            let return_var = ctx
                .program
                .variables
                .declare(format!("{}__return", private), ValueType::UInt32, VariableKind::Reserved)
                .map_err(|kind| ctx.error(kind))?;
            ctx.program.set_epilogue(method, Epilogue::Indirect(return_var));

            ctx.enter_method(exported);
            ctx.call_method(&private, return_var);
            assemble_event(ctx, plan, method)?;
        }
    }

    add_missing_handlers(ctx, trigger)?;
    if ctx.options.warn_on_unused_variables {
        warn_unused(ctx, trigger);
    }
    Ok(())
}

/// Resolve an event's type and exported name.
fn plan_event<'r, 't>(
    ctx: &mut CompileContext<'r>,
    index: usize,
    event: &'t EventDefinition,
) -> Result<PlannedEvent<'r, 't>, CompileError> {
    ctx.begin_event(index, &event.entry.action);
    let registry: &'r ActionRegistry = ctx.registry;
    let event_type = registry
        .event(&event.entry.action)
        .map_err(|kind| ctx.error(kind))?;

    let expected = event_type.entry_parameters.len();
    if event.entry.inputs.len() != expected {
        return Err(ctx.error(CompileErrorKind::ArityMismatch {
            expected,
            found: event.entry.inputs.len(),
        }));
    }

    let mut watched = None;
    let exported = match &event_type.method_name {
        EventMethod::Named(name) => name.clone(),
        EventMethod::FromInput => match event.entry.inputs.first() {
            Some(InputBinding::Constant(ConstValue::String(name))) if !name.is_empty() => {
                name.clone()
            }
            _ => {
                return Err(ctx.error(CompileErrorKind::MissingBinding {
                    parameter: "name".into(),
                }));
            }
        },
        EventMethod::VariableHandler => {
            let var = match event.entry.inputs.first() {
                Some(InputBinding::Variable(VariableRef::User(id))) => ctx
                    .program
                    .variables
                    .lookup_user_defined(id)
                    .map_err(|kind| ctx.error(kind))?,
                _ => {
                    return Err(ctx.error(CompileErrorKind::MissingBinding {
                        parameter: "variable".into(),
                    }));
                }
            };
            let variable = ctx.program.variables.get(var);
            if !variable.change_callback {
                return Err(ctx.error(CompileErrorKind::TypeMismatch {
                    parameter: "variable".into(),
                    expected: "a variable with a change callback".into(),
                    found: variable.name.clone(),
                }));
            }
            let handler = handler_name(&variable.name);
            ctx.used_variables.insert(var);
            watched = Some(var);
            handler
        }
    };

    Ok(PlannedEvent {
        index,
        definition: event,
        event_type,
        exported,
        watched,
    })
}

/// Wrap the event's body in its gate, broadcast and delay methods and lower
/// it into the last one.
fn assemble_event(
    ctx: &mut CompileContext<'_>,
    plan: &PlannedEvent<'_, '_>,
    method: MethodId,
) -> Result<(), CompileError> {
    let event = plan.definition;
    let options = &event.options;
    ctx.begin_event(plan.index, &event.entry.action);
    ctx.enter_method(method);

    match options.gate {
        Gate::Anyone => {}
        Gate::Owner | Gate::Master => {
            let allowed = ctx.temporary(&ValueType::Boolean);
            if options.gate == Gate::Owner {
                let this = ctx.this();
                ctx.call_extern(externs::is_owner(), &[this, allowed]);
            } else {
                ctx.call_extern(externs::is_master(), &[allowed]);
            }
            let end = ctx.program.end_label(method);
            ctx.jump_if_false(allowed, end);
            ctx.release(allowed);
        }
    }

    let name = ctx.program.method(method).name.clone();
    let crosses_boundary = options.broadcast != Broadcast::Local || options.delay_seconds > 0.0;
    if crosses_boundary && !plan.event_type.parameters.is_empty() {
        ctx.warn(format!(
            "event '{}' forwards its body to another method; its event inputs are not carried over",
            event.name
        ));
    }

    if options.broadcast != Broadcast::Local {
        let target = match options.broadcast {
            Broadcast::Owner => 1,
            _ => 0,
        };
        let network_name = format!(
            "event{}{}",
            plan.index,
            plan.exported.trim_start_matches('_')
        );
        let network = ctx
            .program
            .add_method(network_name.as_str(), MethodKind::Entry)
            .map_err(|kind| ctx.error(kind))?;
        let this = ctx.this();
        let target = ctx.constant(
            &ValueType::Reference(NETWORK_EVENT_TARGET.into()),
            ConstValue::Int32(target),
        );
        let callee = ctx.constant(&ValueType::String, ConstValue::String(network_name));
        ctx.call_extern(externs::send_custom_network_event(), &[this, target, callee]);
        ctx.enter_method(network);
    }

    if options.delay_seconds > 0.0 {
        let delayed_name = format!(
            "_event{}{}Delayed",
            plan.index,
            plan.exported.trim_start_matches('_')
        );
        let delayed = ctx
            .program
            .add_method(delayed_name.as_str(), MethodKind::Entry)
            .map_err(|kind| ctx.error(kind))?;
        let this = ctx.this();
        let callee = ctx.constant(&ValueType::String, ConstValue::String(delayed_name));
        let delay = ctx.constant(&ValueType::Single, ConstValue::Single(options.delay_seconds));
        let timing = ctx.constant(
            &ValueType::Reference(EVENT_TIMING.into()),
            ConstValue::Int32(0),
        );
        ctx.call_extern(
            externs::send_custom_event_delayed_seconds(),
            &[this, callee, delay, timing],
        );
        ctx.enter_method(delayed);
    }

    for input in &plan.event_type.parameters {
        let slot = ctx
            .program
            .variables
            .reserved(&input.variable, &input.ty)
            .map_err(|kind| ctx.error(kind))?;
        ctx.event_inputs.insert(input.name.clone(), slot);
    }
    if let Some(previous) = plan
        .watched
        .and_then(|var| ctx.program.variables.get(var).previous)
    {
        ctx.event_inputs.insert("previous".into(), previous);
    }

    lower_body(ctx, &event.actions)?;
    debug!(
        event = %event.name,
        method = %name,
        actions = event.actions.len(),
        "assembled event"
    );
    Ok(())
}

/// Give every change-callback variable without a handler event an empty one.
fn add_missing_handlers(
    ctx: &mut CompileContext<'_>,
    trigger: &TriggerDefinition,
) -> Result<(), CompileError> {
    for variable in trigger.variables.iter().filter(|v| v.change_callback) {
        let handler = handler_name(&variable.name);
        if ctx.program.method_id(&handler).is_some() {
            continue;
        }
        ctx.program
            .add_method(handler.as_str(), MethodKind::Entry)
            .map_err(CompileError::from)?;
        ctx.warn_at(
            format!(
                "variable '{}' has a change callback but no handler event; generated an empty '{}'",
                variable.name, handler
            ),
            None,
        );
    }
    Ok(())
}

fn warn_unused(ctx: &mut CompileContext<'_>, trigger: &TriggerDefinition) {
    for variable in &trigger.variables {
        let Ok(id) = ctx.program.variables.lookup_user_defined(&variable.id) else {
            continue;
        };
        if !ctx.used_variables.contains(&id) {
            ctx.warn_at(format!("variable '{}' is never used", variable.name), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CompilationOptions;
    use crate::trigger::{ActionInstance, EventOptions, VariableDefinition};
    use crate::vm::Instruction;

    fn event(name: &str, entry: ActionInstance, actions: Vec<ActionInstance>) -> EventDefinition {
        EventDefinition {
            name: name.into(),
            entry,
            actions,
            options: EventOptions::default(),
        }
    }

    fn assembled(trigger: &TriggerDefinition) -> (Vec<String>, Vec<String>) {
        crate::test_utils::init_test_logging();
        let registry = ActionRegistry::with_builtins();
        let options = CompilationOptions::default();
        let mut ctx = CompileContext::new(&registry, &options);
        assemble(&mut ctx, trigger).unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", ctx.errors);
        let methods = ctx
            .program
            .methods()
            .map(|(_, m)| m.name.clone())
            .collect();
        let warnings = ctx.warnings.iter().map(|w| w.message.clone()).collect();
        (methods, warnings)
    }

    #[test]
    fn test_shared_entry_gets_dispatcher() {
        let trigger = TriggerDefinition {
            variables: Vec::new(),
            events: vec![
                event("a", ActionInstance::new("Interact"), Vec::new()),
                event("b", ActionInstance::new("Interact"), Vec::new()),
            ],
        };
        let (methods, _) = assembled(&trigger);
        assert_eq!(methods, ["_interact", "__event0_interact", "__event1_interact"]);
    }

    #[test]
    fn test_broadcast_and_delay_chain() {
        let mut interact = event("e", ActionInstance::new("Interact"), Vec::new());
        interact.options = EventOptions {
            gate: Gate::Owner,
            broadcast: Broadcast::All,
            delay_seconds: 1.5,
        };
        let trigger = TriggerDefinition {
            variables: Vec::new(),
            events: vec![interact],
        };
        let (methods, _) = assembled(&trigger);
        assert_eq!(methods, ["_interact", "event0interact", "_event0interactDelayed"]);
    }

    #[test]
    fn test_forwarded_names_come_from_the_entry_point() {
        let mut second = event("b", ActionInstance::new("Interact"), Vec::new());
        second.options = EventOptions {
            gate: Gate::Anyone,
            broadcast: Broadcast::All,
            delay_seconds: 2.0,
        };
        let trigger = TriggerDefinition {
            variables: Vec::new(),
            events: vec![event("a", ActionInstance::new("Interact"), Vec::new()), second],
        };
        let (methods, _) = assembled(&trigger);
        assert_eq!(
            methods,
            [
                "_interact",
                "__event0_interact",
                "__event1_interact",
                "event1interact",
                "_event1interactDelayed",
            ]
        );
    }

    #[test]
    fn test_custom_event_takes_name_from_input() {
        let entry = ActionInstance::new("Custom")
            .with_inputs([ConstValue::String("Ring".into()).into()]);
        let trigger = TriggerDefinition {
            variables: Vec::new(),
            events: vec![event("ring", entry, Vec::new())],
        };
        let (methods, _) = assembled(&trigger);
        assert_eq!(methods, ["Ring"]);
    }

    #[test]
    fn test_change_callback_without_handler_gets_empty_one() {
        let mut score = VariableDefinition::new("v1", "score", ValueType::Int32);
        score.change_callback = true;
        let trigger = TriggerDefinition {
            variables: vec![score],
            events: Vec::new(),
        };
        let (methods, warnings) = assembled(&trigger);
        assert_eq!(methods, ["_onVarChange_score"]);
        assert!(warnings.iter().any(|w| w.contains("no handler event")));
        assert!(warnings.iter().any(|w| w.contains("never used")));
    }

    #[test]
    fn test_variable_handler_reads_previous_value() {
        let mut score = VariableDefinition::new("v1", "score", ValueType::Int32);
        score.change_callback = true;
        let entry = ActionInstance::new("OnVariableChanged")
            .with_inputs([InputBinding::user("v1")]);
        let log = ActionInstance::new("Log").with_inputs([InputBinding::event_input("previous")]);
        let trigger = TriggerDefinition {
            variables: vec![score],
            events: vec![event("changed", entry, vec![log])],
        };

        let registry = ActionRegistry::with_builtins();
        let options = CompilationOptions::default();
        let mut ctx = CompileContext::new(&registry, &options);
        assemble(&mut ctx, &trigger).unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", ctx.errors);

        let handler = ctx.program.method_id("_onVarChange_score").unwrap();
        let shadow = ctx.program.variables.lookup_name("__prev_score").unwrap();
        let body: Vec<_> = ctx.program.body(handler).map(|(_, i)| i.clone()).collect();
        assert_eq!(body[0], Instruction::PushVariable(shadow));
        assert!(ctx.warnings.is_empty(), "{:?}", ctx.warnings);
    }
}
