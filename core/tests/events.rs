//! Event assembly, change detection and linking, end to end.

mod harness;

use std::sync::Arc;

use harness::*;
use pretty_assertions::assert_eq;
use trigc_core::api::{CompilationOptions, Error};
use trigc_core::compiler::{ActionLowering, CompileContext, CompileError, ResolvedAction};
use trigc_core::registry::ActionDefinition;
use trigc_core::trigger::{
    Broadcast, EventDefinition, EventOptions, Gate, InputBinding, TriggerDefinition,
};
use trigc_core::types::ConstValue;
use trigc_core::vm::{Instruction, JumpTarget, SyncMode};

fn event(name: &str, entry: &str, actions: Vec<trigc_core::trigger::ActionInstance>) -> EventDefinition {
    EventDefinition {
        name: name.into(),
        entry: bare(entry),
        actions,
        options: EventOptions::default(),
    }
}

#[test]
fn test_empty_event_is_only_the_halt_jump() {
    let compiled = engine().compile(&on_start(Vec::new(), Vec::new())).unwrap();
    let program = &compiled.program;
    let start = program.method_id("_start").unwrap();
    let body: Vec<_> = program.body(start).map(|(_, i)| i.clone()).collect();
    assert_eq!(body, vec![Instruction::Jump(JumpTarget::Halt)]);
}

struct CallGhost;

impl ActionLowering for CallGhost {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        ctx.emit(Instruction::JumpLabel("ghost".into()));
        Ok(())
    }
}

#[test]
fn test_jump_to_missing_method_fails() {
    let mut engine = engine();
    engine
        .registry_mut()
        .register_action(ActionDefinition::custom("CallGhost", Vec::new(), Arc::new(CallGhost)));

    let err = engine
        .compile(&on_start(Vec::new(), vec![bare("CallGhost")]))
        .unwrap_err();
    let Error::Compilation { diagnostics } = &err else {
        panic!("expected a compilation error, got {:?}", err);
    };
    assert_eq!(diagnostics[0].code.as_deref(), Some("E006"));
    assert!(diagnostics[0].message.contains("ghost"));
}

#[test]
fn test_every_jump_target_is_placed() {
    let actions = vec![
        action("For", [int(0), int(3), int(1), new_local("i")]),
        bare("If"),
        bare("Condition"),
        action("PassIfTrue", [boolean(true)]),
        bare("BlockEnd"),
        bare("ConditionBody"),
        bare("Continue"),
        bare("BlockEnd"),
        bare("BlockEnd"),
        bare("Else"),
        bare("Break"),
        bare("BlockEnd"),
        bare("BlockEnd"),
    ];
    let compiled = engine().compile(&on_start(Vec::new(), actions)).unwrap();
    let program = &compiled.program;
    for (method, _) in program.methods() {
        for (id, instruction) in program.body(method) {
            assert!(program.address_of(id).is_some());
            if let Some(target) = instruction.label_target() {
                assert!(program.address_of(target).is_some(), "{} -> {}", id, target);
            }
        }
    }
    run_start(program);
}

#[test]
fn test_synced_write_requests_serialization() {
    let mut score = int_var("s", "score", 0);
    score.sync = SyncMode::Synced;
    let actions = vec![action("SetVariable", [int(5), InputBinding::user("s")])];
    let trigger = on_start(vec![score], actions);

    let compiled = engine().compile(&trigger).unwrap();
    let machine = run_start(&compiled.program);
    assert_eq!(machine.serialization_requests, 1);
    assert_eq!(machine.get("score"), &ConstValue::Int32(5));

    let options = CompilationOptions {
        auto_request_serialization: false,
        ..CompilationOptions::default()
    };
    let compiled = engine().compile_with(&options, &trigger).unwrap();
    assert_eq!(run_start(&compiled.program).serialization_requests, 0);
}

#[test]
fn test_change_callback_fires_once_per_change() {
    let mut score = int_var("s", "score", 0);
    score.change_callback = true;
    let trigger = TriggerDefinition {
        variables: vec![score],
        events: vec![
            event(
                "start",
                "Start",
                vec![
                    action("SetVariable", [int(5), InputBinding::user("s")]),
                    action("SetVariable", [int(5), InputBinding::user("s")]),
                ],
            ),
            EventDefinition {
                name: "changed".into(),
                entry: action("OnVariableChanged", [InputBinding::user("s")]),
                actions: vec![log(InputBinding::event_input("previous"))],
                options: EventOptions::default(),
            },
        ],
    };
    let compiled = engine().compile(&trigger).unwrap();
    assert!(compiled.warnings.is_empty(), "{:?}", compiled.warnings);

    let machine = run_start(&compiled.program);
    assert_eq!(machine.custom_events, ["_onVarChange_score"]);
    assert_eq!(machine.get("__prev_score"), &ConstValue::Int32(5));
}

#[test]
fn test_gate_broadcast_and_delay() {
    let mut interact = event("press", "Interact", vec![log(text("pressed"))]);
    interact.options = EventOptions {
        gate: Gate::Owner,
        broadcast: Broadcast::All,
        delay_seconds: 2.0,
    };
    let trigger = TriggerDefinition {
        variables: Vec::new(),
        events: vec![interact],
    };
    let compiled = engine().compile(&trigger).unwrap();
    let program = &compiled.program;

    let mut machine = Machine::new(program);
    machine.run("_interact");
    assert_eq!(machine.network_events, [(0, "event0interact".to_string())]);

    let mut stranger = Machine::new(program);
    stranger.is_owner = false;
    stranger.run("_interact");
    assert!(stranger.network_events.is_empty());

    machine.run("event0interact");
    assert_eq!(
        machine.delayed_events,
        [("_event0interactDelayed".to_string(), 2.0_f32)]
    );
    assert!(machine.log.is_empty());

    machine.run("_event0interactDelayed");
    assert_eq!(machine.log, vec![ConstValue::String("pressed".into())]);
}

#[test]
fn test_events_sharing_an_entry_run_in_order() {
    let trigger = TriggerDefinition {
        variables: Vec::new(),
        events: vec![
            event("first", "Interact", vec![log(int(1))]),
            event("second", "Interact", vec![log(int(2))]),
        ],
    };
    let compiled = engine().compile(&trigger).unwrap();
    let mut machine = Machine::new(&compiled.program);
    machine.run("_interact");
    assert_eq!(ints(&machine.log), [1, 2]);
}

#[test]
fn test_event_inputs_are_readable() {
    let trigger = TriggerDefinition {
        variables: Vec::new(),
        events: vec![event(
            "joined",
            "OnPlayerJoined",
            vec![log(InputBinding::event_input("player"))],
        )],
    };
    let compiled = engine().compile(&trigger).unwrap();
    let mut machine = Machine::new(&compiled.program);
    machine.set("onPlayerJoinedPlayer", ConstValue::String("ana".into()));
    machine.run("_onPlayerJoined");
    assert_eq!(machine.log, vec![ConstValue::String("ana".into())]);
}

#[test]
fn test_validation_errors_are_all_reported() {
    let actions = vec![
        log(InputBinding::user("missing")),
        action("IntAdd", [int(1), int(2)]),
        log(int(3)),
    ];
    let err = engine().compile(&on_start(Vec::new(), actions)).unwrap_err();
    let codes: Vec<_> = err
        .diagnostics()
        .iter()
        .filter_map(|d| d.code.as_deref())
        .collect();
    assert_eq!(codes, ["E003", "E010"]);
}

#[test]
fn test_unused_variable_warning() {
    let trigger = on_start(vec![int_var("n", "n", 0)], Vec::new());
    let compiled = engine().compile(&trigger).unwrap();
    assert_eq!(compiled.warnings.len(), 1);
    assert!(compiled.warnings[0].message.contains("never used"));

    let options = CompilationOptions {
        warn_on_unused_variables: false,
        ..CompilationOptions::default()
    };
    let compiled = engine().compile_with(&options, &trigger).unwrap();
    assert!(compiled.warnings.is_empty());
}

#[test]
fn test_constant_inputs_are_recorded() {
    let compiled = engine()
        .compile(&on_start(Vec::new(), vec![log(text("hi"))]))
        .unwrap();
    let reference = &compiled.symbol_references[0];
    assert_eq!(reference.event, 0);
    assert_eq!(reference.action, Some(0));
    assert_eq!(reference.parameter, "message");
    assert_eq!(compiled.references_to(&reference.name).count(), 1);
}

#[test]
fn test_listing_shows_methods_and_labels() {
    let actions = vec![
        action("For", [int(0), int(2), int(1), new_local("i")]),
        bare("BlockEnd"),
    ];
    let compiled = engine().compile(&on_start(Vec::new(), actions)).unwrap();
    let listing = format!("{:?}", compiled.program);
    assert!(listing.contains("method _start (entry):"), "{}", listing);
    assert!(listing.contains("L0:"), "{}", listing);
}

#[test]
fn test_user_variable_cannot_stand_in_for_this() {
    let trigger = on_start(
        vec![int_var("t", "__this", 7)],
        vec![
            action("SetActive", [boolean(false)]),
            log(InputBinding::user("t")),
        ],
    );
    let compiled = engine().compile(&trigger).unwrap();
    let program = &compiled.program;
    let start = program.method_id("_start").unwrap();
    let body: Vec<_> = program.body(start).map(|(_, i)| i.clone()).collect();
    let call = body
        .iter()
        .position(|i| matches!(i, Instruction::Extern(sig) if sig.contains("SetActive")))
        .unwrap();
    let Instruction::PushVariable(instance) = &body[call - 2] else {
        panic!("expected the instance push, got {:?}", body[call - 2]);
    };
    let instance = program.variables().get(*instance);
    assert!(instance.is_special());
    assert_ne!(instance.name, "__this");
}
