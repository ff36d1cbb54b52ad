//! Branches, loops and jumps.
//!
//! ```text
//! If/ElseIf/Else chain            While                  For
//!
//!   <cond>                        start:                   index = start
//!   JumpIfFalse end_if              <cond>                 end' = end; step' = step
//!   <then>                          JumpIfFalse end        positive = step' >= 0
//!   Jump end_else    <- by Else     <body>                 Jump check
//! end_if:                           Jump start           start:
//!   <else>                        end:                     index += step'
//! end_else:                                              check:
//!                                                          cond = positive ? index < end'
//!                                                                          : index > end'
//!                                                          JumpIfFalse end
//!                                                          <body>
//!                                                          Jump start
//!                                                        end:
//! ```

use crate::compiler::lowering::{ActionLowering, out_of_sequence};
use crate::compiler::{CompileContext, CompileError, CompileErrorKind, ResolvedAction};
use crate::registry::{ActionDefinition, Construct, externs};
use crate::scope_stack::ScopeFrame;
use crate::trigger::{ActionInstance, InputBinding};
use crate::types::{ConstValue, ValueType};
use crate::vm::{Instruction, JumpTarget};
use crate::format;

pub(super) struct If;
pub(super) struct ElseIf;
pub(super) struct Else;
pub(super) struct While;
pub(super) struct For;
pub(super) struct Break;
pub(super) struct Continue;
pub(super) struct Return;
pub(super) struct Block;

fn require_condition_body(
    ctx: &CompileContext<'_>,
    frame: &ScopeFrame,
    construct: Construct,
) -> Result<(), CompileError> {
    if frame.saw_condition_body {
        return Ok(());
    }
    Err(CompileError {
        kind: CompileErrorKind::StructuralSequence {
            message: format!("{} needs a Condition followed by a ConditionBody", construct),
        },
        coordinate: frame
            .coordinate
            .clone()
            .or_else(|| Some(ctx.coordinate().clone())),
    })
}

/// Place the frame's end label at the current position.
fn place_end(ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) {
    let end = ctx.end_of(frame);
    ctx.place_label(end);
}

impl ActionLowering for If {
    fn lower(&self, _: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        // The nested Condition/ConditionBody pair emits the test.
        Ok(())
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        require_condition_body(ctx, frame, Construct::If)?;
        place_end(ctx, frame);
        Ok(())
    }
}

/// Hook an `ElseIf`/`Else` onto the branch that closed just before it.
///
/// The previous branch gets a jump to this branch's end inserted right
/// before its own end label, and every earlier jump out of the chain is
/// retargeted to the same place.
fn continue_chain(ctx: &mut CompileContext<'_>, construct: Construct) -> Result<(), CompileError> {
    let parent = ctx.parent_frame()?;
    let previous = match (parent.prev_sibling, parent.last_closed.clone()) {
        (Some(Construct::If | Construct::ElseIf), Some(closed)) => closed,
        _ => return Err(out_of_sequence(ctx, construct, "If or ElseIf")),
    };
    let Some(previous_end) = previous.end else {
        return Err(ctx.error(CompileErrorKind::LoweringInvariant {
            message: format!("{} branch closed without an end label", construct),
        }));
    };

    let depth = ctx.scopes().depth() - 1;
    let end = ctx.frame_end(depth)?;

    for jump in &previous.chain_jumps {
        ctx.program_mut()
            .set_instruction(*jump, Instruction::Jump(JumpTarget::Label(end)));
    }
    let method = ctx.method();
    let skip = ctx
        .program_mut()
        .insert_before_trailing_label(
            method,
            Some(previous_end),
            Instruction::Jump(JumpTarget::Label(end)),
        )
        .map_err(|kind| ctx.error(kind))?;

    let frame = ctx.current_frame()?;
    frame.chain_jumps = previous.chain_jumps;
    frame.chain_jumps.push(skip);
    Ok(())
}

impl ActionLowering for ElseIf {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        continue_chain(ctx, Construct::ElseIf)
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        require_condition_body(ctx, frame, Construct::ElseIf)?;
        place_end(ctx, frame);
        Ok(())
    }
}

impl ActionLowering for Else {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        continue_chain(ctx, Construct::Else)
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        place_end(ctx, frame);
        Ok(())
    }
}

impl ActionLowering for While {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let depth = ctx.scopes().depth() - 1;
        let start = ctx.frame_start(depth)?;
        ctx.place_label(start);
        Ok(())
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        require_condition_body(ctx, frame, Construct::While)?;
        // The jump back goes right before the ConditionBody's end label, so
        // the body must be the last thing in the loop.
        let body_end = match (frame.prev_sibling, frame.last_closed.as_ref()) {
            (Some(Construct::ConditionBody), Some(closed)) => closed.end,
            _ => None,
        };
        let Some(body_end) = body_end else {
            return Err(CompileError {
                kind: CompileErrorKind::StructuralSequence {
                    message: "While must end with its ConditionBody".into(),
                },
                coordinate: frame
                    .coordinate
                    .clone()
                    .or_else(|| Some(ctx.coordinate().clone())),
            });
        };
        let start = ctx.start_of(frame);
        let method = ctx.method();
        ctx.program_mut()
            .insert_before_trailing_label(
                method,
                Some(body_end),
                Instruction::Jump(JumpTarget::Label(start)),
            )
            .map_err(|kind| ctx.error(kind))?;
        place_end(ctx, frame);
        Ok(())
    }
}

/// A `For` step that is unbound or a literal zero can never terminate.
pub(super) fn check_loop_parameters(
    ctx: &CompileContext<'_>,
    definition: &ActionDefinition,
    instance: &ActionInstance,
) -> Result<(), CompileError> {
    if instance.inputs.len() != definition.parameters.len() {
        // Reported as an arity mismatch when binding.
        return Ok(());
    }
    let message = match instance.inputs.get(2) {
        Some(InputBinding::Unbound) => "step is not bound",
        Some(InputBinding::Constant(ConstValue::Int32(0))) => "step is zero",
        _ => return Ok(()),
    };
    Err(ctx.error(CompileErrorKind::InvalidLoopParameter {
        message: message.into(),
    }))
}

impl ActionLowering for For {
    fn lower(&self, ctx: &mut CompileContext<'_>, action: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let start = action.input(0)?;
        let end = action.input(1)?;
        let step = action.input(2)?;
        let index = action.input(3)?;
        let depth = ctx.scopes().depth() - 1;

        ctx.keep_in_scope(index)?;
        let step_value = ctx.temporary(&ValueType::Int32);
        let end_value = ctx.temporary(&ValueType::Int32);
        let positive = ctx.temporary(&ValueType::Boolean);
        {
            let frame = ctx.current_frame()?;
            frame.own(step_value);
            frame.own(end_value);
            frame.own(positive);
        }

        ctx.copy(start, index);
        ctx.after_write(index);
        ctx.copy(end, end_value);
        ctx.copy(step, step_value);
        let zero = ctx.constant(&ValueType::Int32, ConstValue::Int32(0));
        ctx.call_extern(
            externs::int_comparison("GreaterThanOrEqual"),
            &[step_value, zero, positive],
        );
        let check = ctx.new_label();
        ctx.jump(check);

        let loop_start = ctx.frame_start(depth)?;
        ctx.place_label(loop_start);
        ctx.call_extern(externs::int_operator("Addition"), &[index, step_value, index]);
        ctx.after_write(index);

        ctx.place_label(check);
        let cond = ctx.temporary(&ValueType::Boolean);
        let descending = ctx.new_label();
        let test = ctx.new_label();
        ctx.jump_if_false(positive, descending);
        ctx.call_extern(externs::int_comparison("LessThan"), &[index, end_value, cond]);
        ctx.jump(test);
        ctx.place_label(descending);
        ctx.call_extern(externs::int_comparison("GreaterThan"), &[index, end_value, cond]);
        ctx.place_label(test);
        let loop_end = ctx.frame_end(depth)?;
        ctx.jump_if_false(cond, loop_end);
        ctx.release(cond);
        Ok(())
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        let start = ctx.start_of(frame);
        ctx.jump(start);
        place_end(ctx, frame);
        Ok(())
    }
}

impl ActionLowering for Break {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let Some(index) = ctx.scopes().nearest_loop() else {
            return Err(ctx.error(CompileErrorKind::NotInLoop {
                construct: Construct::Break,
            }));
        };
        let end = ctx.frame_end(index)?;
        ctx.jump(end);
        Ok(())
    }
}

impl ActionLowering for Continue {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let Some(index) = ctx.scopes().nearest_loop() else {
            return Err(ctx.error(CompileErrorKind::NotInLoop {
                construct: Construct::Continue,
            }));
        };
        let start = ctx.frame_start(index)?;
        ctx.jump(start);
        Ok(())
    }
}

impl ActionLowering for Return {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let method = ctx.method();
        let end = ctx.program_mut().end_label(method);
        ctx.jump(end);
        Ok(())
    }
}

impl ActionLowering for Block {
    fn lower(&self, _: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        Ok(())
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        if frame.end.is_some() {
            place_end(ctx, frame);
        }
        Ok(())
    }
}
