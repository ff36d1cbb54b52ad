//! Per-action lowering.
//!
//! Every action goes through the same steps: look the definition up, bind
//! its inputs to slots, then hand it to the lowering for its kind. Builtin
//! constructs are a closed enum dispatched to one [`ActionLowering`] each;
//! hosts can add their own through
//! [`ActionKind::Custom`](crate::registry::ActionKind::Custom).
//!
//! Block-opening lowerings get a fresh [`ScopeFrame`] pushed before `lower`
//! runs, and `close` is called with that frame when the matching `BlockEnd`
//! pops it.

mod call;
mod condition;
mod control_flow;
mod variables;

use tracing::{trace, warn};

use crate::compiler::{CompileContext, CompileError, CompileErrorKind, ResolvedAction};
use crate::registry::{ActionDefinition, ActionKind, Construct};
use crate::scope_stack::{Opener, ScopeFrame};
use crate::trigger::ActionInstance;
use crate::{ToString, format};

/// Lowering of one kind of action into instructions.
pub trait ActionLowering: Send + Sync {
    /// Emit the instructions for `action` into the current method.
    fn lower(
        &self,
        ctx: &mut CompileContext<'_>,
        action: &ResolvedAction<'_>,
    ) -> Result<(), CompileError>;

    /// Whether the action opens a block closed by a later `BlockEnd`.
    fn opens_scope(&self) -> bool {
        false
    }

    /// Emit the block epilogue. `frame` has already been popped; the
    /// variables it owns are released after this returns.
    fn close(
        &self,
        ctx: &mut CompileContext<'_>,
        frame: &mut ScopeFrame,
    ) -> Result<(), CompileError> {
        let _ = (ctx, frame);
        Ok(())
    }
}

impl Construct {
    pub(crate) fn lowering(self) -> &'static dyn ActionLowering {
        match self {
            Construct::If => &control_flow::If,
            Construct::ElseIf => &control_flow::ElseIf,
            Construct::Else => &control_flow::Else,
            Construct::While => &control_flow::While,
            Construct::For => &control_flow::For,
            Construct::Break => &control_flow::Break,
            Construct::Continue => &control_flow::Continue,
            Construct::Return => &control_flow::Return,
            Construct::Block | Construct::BlockEnd => &control_flow::Block,
            Construct::Condition => &condition::Condition,
            Construct::ConditionBody => &condition::ConditionBody,
            Construct::PassIfTrue => &condition::PassIfTrue,
            Construct::FailIfFalse => &condition::FailIfFalse,
            Construct::SetVariable => &variables::SetVariable,
            Construct::LocalVariable => &variables::LocalVariable,
        }
    }
}

/// Lower a list of actions as the body of the current method, inside a
/// fresh event-level scope.
pub(crate) fn lower_body(
    ctx: &mut CompileContext<'_>,
    actions: &[ActionInstance],
) -> Result<(), CompileError> {
    ctx.scopes.push(ScopeFrame::root());
    for (index, action) in actions.iter().enumerate() {
        lower_action(ctx, index, action)?;
    }

    if ctx.scopes.depth() > 1 {
        let (construct, coordinate) = ctx
            .scopes
            .current()
            .map(|frame| (frame.opener.clone(), frame.coordinate.clone()))
            .unwrap_or((None, None));
        let construct = construct.map(|o| format!("{:?}", o)).unwrap_or_default();
        return Err(CompileError {
            kind: CompileErrorKind::StructuralSequence {
                message: format!("{} is never closed by a BlockEnd", construct),
            },
            coordinate: coordinate.or_else(|| Some(ctx.coordinate().clone())),
        });
    }

    let root = ctx
        .scopes
        .pop()
        .map_err(|e| ctx.error(CompileErrorKind::LoweringInvariant { message: e.to_string() }))?;
    ctx.finish_frame(root);
    Ok(())
}

/// Lower one action at position `index` of the current body.
///
/// Validation errors on an action that neither opens nor closes a block are
/// collected and the action is skipped; every other error aborts.
pub(crate) fn lower_action(
    ctx: &mut CompileContext<'_>,
    index: usize,
    instance: &ActionInstance,
) -> Result<(), CompileError> {
    ctx.set_action(index, &instance.action);
    let registry = ctx.registry;
    let definition = registry
        .action(&instance.action, instance.group.as_deref())
        .map_err(|kind| ctx.error(kind))?;
    trace!(action = %instance.action, index, depth = ctx.scopes.depth(), "lowering action");

    let result = lower_definition(ctx, definition, instance);
    ctx.release_pending();

    match result {
        Ok(()) => {}
        Err(err) if !err.is_fatal() && !definition.affects_scope() => {
            warn!(error = %err, action = %instance.action, "skipping action");
            ctx.errors.push(err);
        }
        Err(err) => return Err(err),
    }

    if !definition.affects_scope() {
        if let Some(frame) = ctx.scopes.current_mut() {
            frame.prev_sibling = definition.construct();
        }
    }
    Ok(())
}

fn lower_definition(
    ctx: &mut CompileContext<'_>,
    definition: &ActionDefinition,
    instance: &ActionInstance,
) -> Result<(), CompileError> {
    match definition.construct() {
        Some(Construct::BlockEnd) => return close_block(ctx),
        Some(Construct::For) => control_flow::check_loop_parameters(ctx, definition, instance)?,
        _ => {}
    }

    let action = ctx.bind_action(definition, instance)?;
    match &definition.kind {
        ActionKind::Builtin(construct) => run(
            ctx,
            Opener::Builtin(*construct),
            construct.lowering(),
            &action,
        ),
        ActionKind::Custom(lowering) => run(
            ctx,
            Opener::Custom(lowering.clone()),
            lowering.as_ref(),
            &action,
        ),
        ActionKind::Extern {
            signature,
            instance,
        } => {
            call::lower_extern(ctx, signature, instance.as_ref(), &action);
            Ok(())
        }
        ActionKind::GroupAction { group, action: name } => {
            call::lower_group_call(ctx, group, name, &action)
        }
    }
}

fn run(
    ctx: &mut CompileContext<'_>,
    opener: Opener,
    lowering: &dyn ActionLowering,
    action: &ResolvedAction<'_>,
) -> Result<(), CompileError> {
    if lowering.opens_scope() {
        trace!(?opener, depth = ctx.scopes.depth(), "push scope");
        ctx.scopes
            .push(ScopeFrame::opened_by(opener, action.coordinate.clone()));
    }
    lowering.lower(ctx, action)
}

/// Pop the innermost block and run its opener's epilogue.
pub(crate) fn close_block(ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
    if ctx.scopes.depth() <= 1 {
        return Err(ctx.error(CompileErrorKind::StructuralSequence {
            message: "BlockEnd without an open block".into(),
        }));
    }
    let mut frame = ctx
        .scopes
        .pop()
        .map_err(|e| ctx.error(CompileErrorKind::LoweringInvariant { message: e.to_string() }))?;
    trace!(opener = ?frame.opener, depth = ctx.scopes.depth(), "pop scope");

    let result = match frame.opener.clone() {
        Some(Opener::Builtin(construct)) => construct.lowering().close(ctx, &mut frame),
        Some(Opener::Custom(lowering)) => lowering.close(ctx, &mut frame),
        None => Ok(()),
    };
    ctx.finish_frame(frame);
    result
}

/// Error for a construct whose previous sibling is not the one it needs.
pub(crate) fn out_of_sequence(
    ctx: &CompileContext<'_>,
    construct: Construct,
    expected: &str,
) -> CompileError {
    ctx.error(CompileErrorKind::StructuralSequence {
        message: format!("{} must follow {}", construct, expected),
    })
}
