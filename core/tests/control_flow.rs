//! Runtime behavior of lowered control flow, checked by executing the
//! linked programs.

mod harness;

use harness::*;
use pretty_assertions::assert_eq;
use trigc_core::api::Error;
use trigc_core::trigger::{ActionInstance, InputBinding};
use trigc_core::types::ConstValue;

fn for_loop(start: i32, end: i32, step: i32, body: Vec<ActionInstance>) -> Vec<ActionInstance> {
    let mut actions = vec![action("For", [int(start), int(end), int(step), new_local("i")])];
    actions.extend(body);
    actions.push(bare("BlockEnd"));
    actions
}

/// `If` with a single `FailIfFalse` test on `cond`.
fn if_block(keyword: &str, cond: InputBinding, body: Vec<ActionInstance>) -> Vec<ActionInstance> {
    let mut actions = vec![
        bare(keyword),
        bare("Condition"),
        action("FailIfFalse", [cond]),
        bare("BlockEnd"),
        bare("ConditionBody"),
    ];
    actions.extend(body);
    actions.push(bare("BlockEnd"));
    actions.push(bare("BlockEnd"));
    actions
}

/// `While n < limit` around `body`, with the body inside the ConditionBody.
fn while_below(limit: i32, body: Vec<ActionInstance>) -> Vec<ActionInstance> {
    let mut actions = vec![
        bare("While"),
        bare("Condition"),
        action("IntLessThan", [InputBinding::user("n"), int(limit), new_local("more")]),
        action("FailIfFalse", [InputBinding::local("more")]),
        bare("BlockEnd"),
        bare("ConditionBody"),
    ];
    actions.extend(body);
    actions.push(bare("BlockEnd"));
    actions.push(bare("BlockEnd"));
    actions
}

fn increment_n() -> ActionInstance {
    action("IntAdd", [InputBinding::user("n"), int(1), InputBinding::user("n")])
}

fn code_of(err: &Error) -> Option<&str> {
    err.diagnostics().first().and_then(|d| d.code.as_deref())
}

#[test]
fn test_for_counts_up() {
    init_logging();
    let trigger = on_start(Vec::new(), for_loop(0, 5, 1, vec![log(InputBinding::local("i"))]));
    let compiled = engine().compile(&trigger).unwrap();
    let machine = run_start(&compiled.program);
    assert_eq!(ints(&machine.log), [0, 1, 2, 3, 4]);
}

#[test]
fn test_for_counts_down() {
    let trigger = on_start(Vec::new(), for_loop(5, 0, -1, vec![log(InputBinding::local("i"))]));
    let compiled = engine().compile(&trigger).unwrap();
    let machine = run_start(&compiled.program);
    assert_eq!(ints(&machine.log), [5, 4, 3, 2, 1]);
}

#[test]
fn test_for_with_empty_range_skips_body() {
    let trigger = on_start(Vec::new(), for_loop(3, 3, 1, vec![log(InputBinding::local("i"))]));
    let compiled = engine().compile(&trigger).unwrap();
    assert!(run_start(&compiled.program).log.is_empty());
}

#[test]
fn test_for_step_zero_fails() {
    let trigger = on_start(Vec::new(), for_loop(0, 5, 0, Vec::new()));
    let err = engine().compile(&trigger).unwrap_err();
    assert!(matches!(err, Error::Compilation { .. }));
    assert_eq!(code_of(&err), Some("E008"));
}

#[test]
fn test_for_unbound_step_fails() {
    let actions = vec![
        action("For", [int(0), int(5), InputBinding::Unbound, new_local("i")]),
        bare("BlockEnd"),
    ];
    let err = engine().compile(&on_start(Vec::new(), actions)).unwrap_err();
    assert_eq!(code_of(&err), Some("E008"));
}

#[test]
fn test_break_leaves_innermost_loop() {
    let mut body = vec![action("IntEquals", [InputBinding::local("i"), int(3), new_local("hit")])];
    body.extend(if_block("If", InputBinding::local("hit"), vec![bare("Break")]));
    body.push(log(InputBinding::local("i")));

    let trigger = on_start(Vec::new(), for_loop(0, 10, 1, body));
    let compiled = engine().compile(&trigger).unwrap();
    assert_eq!(ints(&run_start(&compiled.program).log), [0, 1, 2]);
}

#[test]
fn test_continue_skips_to_next_iteration() {
    let mut body = vec![action("IntEquals", [InputBinding::local("i"), int(2), new_local("hit")])];
    body.extend(if_block("If", InputBinding::local("hit"), vec![bare("Continue")]));
    body.push(log(InputBinding::local("i")));

    let trigger = on_start(Vec::new(), for_loop(0, 5, 1, body));
    let compiled = engine().compile(&trigger).unwrap();
    assert_eq!(ints(&run_start(&compiled.program).log), [0, 1, 3, 4]);
}

#[test]
fn test_while_reevaluates_condition() {
    let actions = vec![
        bare("While"),
        bare("Condition"),
        action("IntLessThan", [InputBinding::user("n"), int(3), new_local("more")]),
        action("FailIfFalse", [InputBinding::local("more")]),
        bare("BlockEnd"),
        bare("ConditionBody"),
        log(InputBinding::user("n")),
        action("IntAdd", [InputBinding::user("n"), int(1), InputBinding::user("n")]),
        bare("BlockEnd"),
        bare("BlockEnd"),
    ];
    let trigger = on_start(vec![int_var("n", "n", 0)], actions);
    let compiled = engine().compile(&trigger).unwrap();
    let machine = run_start(&compiled.program);
    assert_eq!(ints(&machine.log), [0, 1, 2]);
    assert_eq!(machine.get("n"), &ConstValue::Int32(3));
}

#[test]
fn test_while_body_may_end_with_a_block() {
    let mut body = vec![increment_n()];
    body.extend(if_block("If", boolean(false), vec![log(text("never"))]));
    let trigger = on_start(vec![int_var("n", "n", 0)], while_below(3, body));
    let compiled = engine().compile(&trigger).unwrap();
    let machine = run_start(&compiled.program);
    assert!(machine.log.is_empty());
    assert_eq!(machine.get("n"), &ConstValue::Int32(3));
}

#[test]
fn test_while_rejects_actions_after_condition_body() {
    let mut actions = while_below(3, vec![increment_n()]);
    // Move the loop's closing BlockEnd after a trailing If.
    actions.pop();
    actions.extend(if_block("If", boolean(false), vec![log(text("never"))]));
    actions.push(bare("BlockEnd"));
    let err = engine()
        .compile(&on_start(vec![int_var("n", "n", 0)], actions))
        .unwrap_err();
    assert_eq!(code_of(&err), Some("E001"));
}

#[test]
fn test_continue_in_while_reevaluates_condition() {
    let mut body = vec![
        increment_n(),
        action("IntEquals", [InputBinding::user("n"), int(2), new_local("skip")]),
    ];
    body.extend(if_block("If", InputBinding::local("skip"), vec![bare("Continue")]));
    body.push(log(InputBinding::user("n")));

    let trigger = on_start(vec![int_var("n", "n", 0)], while_below(4, body));
    let compiled = engine().compile(&trigger).unwrap();
    let machine = run_start(&compiled.program);
    assert_eq!(ints(&machine.log), [1, 3, 4]);
}

#[test]
fn test_break_and_continue_target_innermost_loop() {
    let mut inner = vec![
        action("IntEquals", [InputBinding::local("i"), int(1), new_local("is_one")]),
        action("IntEquals", [InputBinding::local("i"), int(3), new_local("is_three")]),
    ];
    inner.extend(if_block("If", InputBinding::local("is_one"), vec![bare("Continue")]));
    inner.extend(if_block("If", InputBinding::local("is_three"), vec![bare("Break")]));
    inner.push(log(InputBinding::local("i")));

    let mut body = vec![increment_n()];
    body.extend(for_loop(0, 10, 1, inner));
    let trigger = on_start(vec![int_var("n", "n", 0)], while_below(3, body));
    let compiled = engine().compile(&trigger).unwrap();
    let machine = run_start(&compiled.program);

    // The outer loop runs all three times; each inner run logs 0 and 2.
    assert_eq!(ints(&machine.log), [0, 2, 0, 2, 0, 2]);
    assert_eq!(machine.get("n"), &ConstValue::Int32(3));
}

#[test]
fn test_if_chain_runs_exactly_one_branch() {
    let mut actions = vec![
        action("IntEquals", [InputBinding::user("x"), int(1), new_local("is1")]),
        action("IntEquals", [InputBinding::user("x"), int(2), new_local("is2")]),
    ];
    actions.extend(if_block("If", InputBinding::local("is1"), vec![log(text("one"))]));
    actions.extend(if_block("ElseIf", InputBinding::local("is2"), vec![log(text("two"))]));
    actions.extend([bare("Else"), log(text("other")), bare("BlockEnd")]);
    actions.push(log(text("after")));

    let trigger = on_start(vec![int_var("x", "x", 0)], actions);
    let compiled = engine().compile(&trigger).unwrap();

    for (x, branch) in [(1, "one"), (2, "two"), (3, "other")] {
        let mut machine = harness::Machine::new(&compiled.program);
        machine.set("x", ConstValue::Int32(x));
        machine.run("_start");
        assert_eq!(
            machine.log,
            vec![
                ConstValue::String(branch.into()),
                ConstValue::String("after".into())
            ]
        );
    }
}

#[test]
fn test_fail_if_false_decides_condition() {
    let actions = vec![
        bare("If"),
        bare("Condition"),
        action("FailIfFalse", [boolean(false)]),
        log(text("checked")),
        action("FailIfFalse", [boolean(true)]),
        bare("BlockEnd"),
        bare("ConditionBody"),
        log(text("taken")),
        bare("BlockEnd"),
        bare("BlockEnd"),
    ];
    let compiled = engine().compile(&on_start(Vec::new(), actions)).unwrap();
    assert!(run_start(&compiled.program).log.is_empty());
}

#[test]
fn test_pass_if_true_short_circuits() {
    let actions = vec![
        bare("If"),
        bare("Condition"),
        action("PassIfTrue", [boolean(true)]),
        log(text("checked")),
        action("FailIfFalse", [boolean(false)]),
        bare("BlockEnd"),
        bare("ConditionBody"),
        log(text("taken")),
        bare("BlockEnd"),
        bare("BlockEnd"),
    ];
    let compiled = engine().compile(&on_start(Vec::new(), actions)).unwrap();
    assert_eq!(
        run_start(&compiled.program).log,
        vec![ConstValue::String("taken".into())]
    );
}

#[test]
fn test_return_skips_rest_of_event() {
    let actions = vec![log(int(1)), bare("Return"), log(int(2))];
    let compiled = engine().compile(&on_start(Vec::new(), actions)).unwrap();
    assert_eq!(ints(&run_start(&compiled.program).log), [1]);
}

#[test]
fn test_break_outside_loop_fails() {
    let err = engine()
        .compile(&on_start(Vec::new(), vec![bare("Break")]))
        .unwrap_err();
    assert_eq!(code_of(&err), Some("E002"));

    let err = engine()
        .compile(&on_start(
            Vec::new(),
            vec![bare("Block"), bare("Continue"), bare("BlockEnd")],
        ))
        .unwrap_err();
    assert_eq!(code_of(&err), Some("E002"));
}

#[test]
fn test_structural_errors() {
    let cases: Vec<Vec<ActionInstance>> = vec![
        vec![bare("BlockEnd")],
        vec![bare("Block")],
        vec![bare("Else"), bare("BlockEnd")],
        vec![bare("ConditionBody"), bare("BlockEnd")],
        // If without its condition.
        vec![bare("If"), log(int(1)), bare("BlockEnd")],
        // Conditions whose result no ConditionBody would consume.
        vec![
            bare("Condition"),
            action("FailIfFalse", [boolean(true)]),
            bare("BlockEnd"),
            log(text("after")),
        ],
        vec![bare("Block"), bare("Condition"), bare("BlockEnd"), bare("BlockEnd")],
        vec![
            bare("If"),
            bare("Condition"),
            action("FailIfFalse", [boolean(true)]),
            bare("BlockEnd"),
            bare("Condition"),
            bare("BlockEnd"),
            bare("ConditionBody"),
            bare("BlockEnd"),
            bare("BlockEnd"),
        ],
    ];
    for actions in cases {
        let err = engine()
            .compile(&on_start(Vec::new(), actions.clone()))
            .unwrap_err();
        assert_eq!(code_of(&err), Some("E001"), "{:?}", actions);
    }
}

#[test]
fn test_temporaries_are_all_released() {
    let mut body = vec![action("IntEquals", [InputBinding::local("i"), int(3), new_local("hit")])];
    body.extend(if_block("If", InputBinding::local("hit"), vec![bare("Break")]));
    let trigger = on_start(Vec::new(), for_loop(0, 10, 1, body));
    let compiled = engine().compile(&trigger).unwrap();

    let variables = compiled.program.variables();
    assert!(variables.temporary_count() > 0);
    assert_eq!(variables.free_temporary_count(), variables.temporary_count());
}
