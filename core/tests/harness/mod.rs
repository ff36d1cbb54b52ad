//! A reference interpreter for linked programs.
//!
//! Executes one exported method to completion the way the target VM would:
//! `Push` pushes slots, `Copy` pops destination then source, `JumpIfFalse`
//! pops its condition and externs pop their arguments. Only the externs the
//! compiler and the builtin registry emit are modelled; the rest panic.

#![allow(dead_code)]

use trigc_core::api::{Engine, EngineOptions};
use trigc_core::registry::externs;
use trigc_core::trigger::{
    ActionInstance, EventDefinition, EventOptions, InputBinding, TriggerDefinition,
    VariableDefinition,
};
use trigc_core::types::{ConstValue, ValueType};
use trigc_core::vm::{HALT_ADDRESS, InstrId, Instruction, JumpTarget, Program, VarId};

const STEP_LIMIT: usize = 100_000;

pub struct Machine<'p> {
    program: &'p Program,
    code: Vec<(u32, InstrId)>,
    heap: Vec<ConstValue>,
    stack: Vec<VarId>,
    /// Values passed to `Log`, in order.
    pub log: Vec<ConstValue>,
    /// Names passed to `SendCustomEvent`.
    pub custom_events: Vec<String>,
    /// `(target, name)` of every network event sent.
    pub network_events: Vec<(i32, String)>,
    /// `(name, delay)` of every delayed event scheduled.
    pub delayed_events: Vec<(String, f32)>,
    pub serialization_requests: usize,
    pub is_owner: bool,
    pub is_master: bool,
}

impl<'p> Machine<'p> {
    pub fn new(program: &'p Program) -> Self {
        assert!(program.is_linked(), "program must be linked");
        let code = program
            .methods()
            .flat_map(|(_, method)| method.body().iter().copied())
            .map(|id| (program.address_of(id).expect("placed instruction"), id))
            .collect();
        let heap = program
            .variables()
            .iter()
            .map(|(_, var)| var.value.clone().unwrap_or(ConstValue::Null))
            .collect();
        Self {
            program,
            code,
            heap,
            stack: Vec::new(),
            log: Vec::new(),
            custom_events: Vec::new(),
            network_events: Vec::new(),
            delayed_events: Vec::new(),
            serialization_requests: 0,
            is_owner: true,
            is_master: true,
        }
    }

    pub fn get(&self, name: &str) -> &ConstValue {
        let id = self
            .program
            .variables()
            .lookup_name(name)
            .unwrap_or_else(|| panic!("no variable '{}'", name));
        &self.heap[id.index()]
    }

    pub fn set(&mut self, name: &str, value: ConstValue) {
        let id = self
            .program
            .variables()
            .lookup_name(name)
            .unwrap_or_else(|| panic!("no variable '{}'", name));
        self.heap[id.index()] = value;
    }

    /// Run an exported method until it halts.
    pub fn run(&mut self, method: &str) {
        let address = self
            .program
            .method_address(method)
            .unwrap_or_else(|| panic!("no method '{}'", method));
        let mut pc = self.locate(address);

        for _ in 0..STEP_LIMIT {
            let (_, id) = self.code[pc];
            match self.program.instruction(id) {
                Instruction::Nop => pc += 1,
                Instruction::PushVariable(var) => {
                    self.stack.push(*var);
                    pc += 1;
                }
                Instruction::Copy => {
                    let dst = self.pop();
                    let src = self.pop();
                    self.heap[dst.index()] = self.heap[src.index()].clone();
                    pc += 1;
                }
                Instruction::Extern(signature) => {
                    self.call(signature);
                    pc += 1;
                }
                Instruction::Jump(JumpTarget::Halt) => return,
                Instruction::Jump(JumpTarget::Label(target)) => {
                    pc = self.locate(self.program.address_of(*target).expect("placed label"));
                }
                Instruction::JumpIfFalse(target) => {
                    let cond = self.pop();
                    match &self.heap[cond.index()] {
                        ConstValue::Boolean(false) => {
                            pc = self
                                .locate(self.program.address_of(*target).expect("placed label"));
                        }
                        ConstValue::Boolean(true) => pc += 1,
                        other => panic!("JumpIfFalse on {:?}", other),
                    }
                }
                Instruction::JumpIndirect(var) => match &self.heap[var.index()] {
                    ConstValue::UInt32(HALT_ADDRESS) => return,
                    ConstValue::UInt32(address) => pc = self.locate(*address),
                    other => panic!("JumpIndirect through {:?}", other),
                },
                Instruction::JumpLabel(name) => {
                    let address = self.program.method_address(name).expect("linked method");
                    pc = self.locate(address);
                }
            }
        }
        panic!("'{}' did not halt within {} steps", method, STEP_LIMIT);
    }

    fn locate(&self, address: u32) -> usize {
        let pc = self.code.partition_point(|(a, _)| *a < address);
        assert!(pc < self.code.len(), "address {:#x} is past the code", address);
        pc
    }

    fn pop(&mut self) -> VarId {
        self.stack.pop().expect("stack underflow")
    }

    fn args(&mut self, n: usize) -> Vec<VarId> {
        assert!(self.stack.len() >= n, "extern needs {} arguments", n);
        self.stack.split_off(self.stack.len() - n)
    }

    fn int(&self, var: VarId) -> i32 {
        match &self.heap[var.index()] {
            ConstValue::Int32(v) => *v,
            other => panic!("expected an Int32, found {:?}", other),
        }
    }

    fn string(&self, var: VarId) -> String {
        match &self.heap[var.index()] {
            ConstValue::String(s) => s.clone(),
            other => panic!("expected a String, found {:?}", other),
        }
    }

    fn call(&mut self, signature: &str) {
        let int_ops: [(&str, fn(i32, i32) -> i32); 3] = [
            ("Addition", |a, b| a + b),
            ("Subtraction", |a, b| a - b),
            ("Multiplication", |a, b| a * b),
        ];
        for (op, f) in int_ops {
            if signature == externs::int_operator(op) {
                let a = self.args(3);
                self.heap[a[2].index()] = ConstValue::Int32(f(self.int(a[0]), self.int(a[1])));
                return;
            }
        }
        let comparisons: [(&str, fn(i32, i32) -> bool); 5] = [
            ("LessThan", |a, b| a < b),
            ("GreaterThan", |a, b| a > b),
            ("GreaterThanOrEqual", |a, b| a >= b),
            ("Equality", |a, b| a == b),
            ("Inequality", |a, b| a != b),
        ];
        for (op, f) in comparisons {
            if signature == externs::int_comparison(op) {
                let a = self.args(3);
                self.heap[a[2].index()] = ConstValue::Boolean(f(self.int(a[0]), self.int(a[1])));
                return;
            }
        }

        if signature == externs::boolean_negation() {
            let a = self.args(2);
            let value = matches!(self.heap[a[0].index()], ConstValue::Boolean(true));
            self.heap[a[1].index()] = ConstValue::Boolean(!value);
        } else if signature == externs::object_equals() {
            let a = self.args(3);
            let equal = self.heap[a[0].index()] == self.heap[a[1].index()];
            self.heap[a[2].index()] = ConstValue::Boolean(equal);
        } else if signature.contains(".__op_Inequality__") {
            let a = self.args(3);
            let differ = self.heap[a[0].index()] != self.heap[a[1].index()];
            self.heap[a[2].index()] = ConstValue::Boolean(differ);
        } else if signature == externs::debug_log() {
            let a = self.args(1);
            self.log.push(self.heap[a[0].index()].clone());
        } else if signature == externs::send_custom_event() {
            let a = self.args(2);
            self.custom_events.push(self.string(a[1]));
        } else if signature == externs::send_custom_network_event() {
            let a = self.args(3);
            self.network_events.push((self.int(a[1]), self.string(a[2])));
        } else if signature == externs::send_custom_event_delayed_seconds() {
            let a = self.args(4);
            let delay = match self.heap[a[2].index()] {
                ConstValue::Single(d) => d,
                ref other => panic!("expected a Single delay, found {:?}", other),
            };
            self.delayed_events.push((self.string(a[1]), delay));
        } else if signature == externs::request_serialization() {
            self.args(1);
            self.serialization_requests += 1;
        } else if signature == externs::is_owner() {
            let a = self.args(2);
            self.heap[a[1].index()] = ConstValue::Boolean(self.is_owner);
        } else if signature == externs::is_master() {
            let a = self.args(1);
            self.heap[a[0].index()] = ConstValue::Boolean(self.is_master);
        } else {
            panic!("extern '{}' is not modelled", signature);
        }
    }
}

/// Opt into log output with `RUST_LOG`.
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

// === Trigger builders ===

pub fn engine() -> Engine {
    Engine::new(EngineOptions::default())
}

pub fn action(id: &str, inputs: impl IntoIterator<Item = InputBinding>) -> ActionInstance {
    ActionInstance::new(id).with_inputs(inputs)
}

pub fn bare(id: &str) -> ActionInstance {
    ActionInstance::new(id)
}

pub fn int(v: i32) -> InputBinding {
    InputBinding::Constant(ConstValue::Int32(v))
}

pub fn boolean(v: bool) -> InputBinding {
    InputBinding::Constant(ConstValue::Boolean(v))
}

pub fn text(v: &str) -> InputBinding {
    InputBinding::Constant(ConstValue::String(v.into()))
}

pub fn new_local(id: &str) -> InputBinding {
    InputBinding::NewLocal {
        id: id.into(),
        name: id.into(),
    }
}

pub fn log(binding: InputBinding) -> ActionInstance {
    action("Log", [binding])
}

pub fn int_var(id: &str, name: &str, value: i32) -> VariableDefinition {
    let mut def = VariableDefinition::new(id, name, ValueType::Int32);
    def.default = Some(ConstValue::Int32(value));
    def
}

pub fn bool_var(id: &str, name: &str, value: bool) -> VariableDefinition {
    let mut def = VariableDefinition::new(id, name, ValueType::Boolean);
    def.default = Some(ConstValue::Boolean(value));
    def
}

/// A trigger with a single `Start` event.
pub fn on_start(variables: Vec<VariableDefinition>, actions: Vec<ActionInstance>) -> TriggerDefinition {
    TriggerDefinition {
        variables,
        events: vec![EventDefinition {
            name: "start".into(),
            entry: bare("Start"),
            actions,
            options: EventOptions::default(),
        }],
    }
}

/// Compile and run `_start`, returning the machine for inspection.
pub fn run_start(program: &Program) -> Machine<'_> {
    let mut machine = Machine::new(program);
    machine.run("_start");
    machine
}

pub fn ints(log: &[ConstValue]) -> Vec<i32> {
    log.iter()
        .map(|v| match v {
            ConstValue::Int32(i) => *i,
            other => panic!("logged {:?}", other),
        })
        .collect()
}
