//! Condition blocks.
//!
//! A `Condition` evaluates a sequence of checks into one boolean. The result
//! starts out `false`; every check stores its tested value into it, and a
//! check that decides the outcome jumps straight to the block's end.
//!
//! ```text
//!   result = false
//!   result = a; Push a; JumpIfFalse end          FailIfFalse(a)
//!   result = b; t = !b; Push t; JumpIfFalse end  PassIfTrue(b)
//! end:
//!   Push result                                  consumed by ConditionBody
//! ```

use crate::compiler::lowering::{ActionLowering, out_of_sequence};
use crate::compiler::{CompileContext, CompileError, CompileErrorKind, ResolvedAction};
use crate::registry::{Construct, externs};
use crate::scope_stack::ScopeFrame;
use crate::types::{ConstValue, ValueType};
use crate::vm::{Instruction, VarId};
use crate::{String, format};

pub(super) struct Condition;
pub(super) struct ConditionBody;
pub(super) struct PassIfTrue;
pub(super) struct FailIfFalse;

impl ActionLowering for Condition {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        // The pushed result is only ever consumed by one ConditionBody.
        let parent = ctx.parent_frame()?;
        let placement = if !matches!(
            parent.construct(),
            Some(Construct::If | Construct::ElseIf | Construct::While)
        ) {
            Some("Condition must be inside If, ElseIf or While")
        } else if parent.saw_condition {
            Some("a block takes exactly one Condition")
        } else {
            None
        };
        parent.saw_condition = true;
        if let Some(message) = placement {
            return Err(ctx.error(CompileErrorKind::StructuralSequence {
                message: message.into(),
            }));
        }

        let result = ctx.temporary(&ValueType::Boolean);
        let end = ctx.new_label();
        {
            let frame = ctx.current_frame()?;
            frame.own(result);
            frame.condition_result = Some(result);
            frame.end = Some(end);
        }
        let no = ctx.constant(&ValueType::Boolean, ConstValue::Boolean(false));
        ctx.copy(no, result);
        Ok(())
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        let end = ctx.end_of(frame);
        ctx.place_label(end);
        if let Some(result) = frame.condition_result {
            ctx.push(result);
        }
        Ok(())
    }
}

/// The `end` label and result slot of the nearest enclosing condition.
fn nearest_condition(
    ctx: &mut CompileContext<'_>,
    construct: Construct,
) -> Result<(usize, VarId), CompileError> {
    let found = ctx.scopes().nearest_condition().and_then(|index| {
        ctx.scopes()
            .get(index)
            .and_then(|frame| frame.condition_result)
            .map(|result| (index, result))
    });
    found.ok_or_else(|| {
        ctx.error(CompileErrorKind::StructuralSequence {
            message: format!("{} must be inside a Condition", construct),
        })
    })
}

impl ActionLowering for FailIfFalse {
    fn lower(&self, ctx: &mut CompileContext<'_>, action: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let value = action.input(0)?;
        let (index, result) = nearest_condition(ctx, Construct::FailIfFalse)?;
        let end = ctx.frame_end(index)?;
        ctx.copy(value, result);
        ctx.jump_if_false(value, end);
        Ok(())
    }
}

impl ActionLowering for PassIfTrue {
    fn lower(&self, ctx: &mut CompileContext<'_>, action: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let value = action.input(0)?;
        let (index, result) = nearest_condition(ctx, Construct::PassIfTrue)?;
        let end = ctx.frame_end(index)?;
        ctx.copy(value, result);
        let negated = ctx.temporary(&ValueType::Boolean);
        ctx.call_extern(externs::boolean_negation(), &[value, negated]);
        ctx.jump_if_false(negated, end);
        ctx.release(negated);
        Ok(())
    }
}

impl ActionLowering for ConditionBody {
    fn lower(&self, ctx: &mut CompileContext<'_>, _: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let parent_index = ctx.scopes().parent_index();
        let parent = ctx.parent_frame()?;
        let parent_construct = parent.construct();
        if parent.prev_sibling != Some(Construct::Condition) {
            return Err(out_of_sequence(ctx, Construct::ConditionBody, "Condition"));
        }
        if !matches!(
            parent_construct,
            Some(Construct::If | Construct::ElseIf | Construct::While)
        ) {
            return Err(ctx.error(CompileErrorKind::StructuralSequence {
                message: String::from("ConditionBody must be inside If, ElseIf or While"),
            }));
        }

        let method = ctx.method();
        let tail: [Option<&Instruction>; 2] = {
            let mut tail = ctx.program().tail(method, 2);
            [tail.next(), tail.next()]
        };
        if !matches!(
            tail,
            [Some(Instruction::Nop), Some(Instruction::PushVariable(_))]
        ) {
            return Err(ctx.error(CompileErrorKind::LoweringInvariant {
                message: format!(
                    "ConditionBody expects the condition's end label and result push, found {:?}",
                    tail
                ),
            }));
        }

        let parent_index = parent_index.unwrap_or_default();
        let end = ctx.frame_end(parent_index)?;
        ctx.emit(Instruction::JumpIfFalse(end));
        ctx.parent_frame()?.saw_condition_body = true;
        Ok(())
    }

    fn opens_scope(&self) -> bool {
        true
    }

    fn close(&self, ctx: &mut CompileContext<'_>, frame: &mut ScopeFrame) -> Result<(), CompileError> {
        let end = ctx.end_of(frame);
        ctx.place_label(end);
        Ok(())
    }
}
