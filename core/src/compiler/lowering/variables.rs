use crate::compiler::lowering::ActionLowering;
use crate::compiler::{CompileContext, CompileError, CompileErrorKind, ResolvedAction};
use crate::ToString;

pub(super) struct SetVariable;
pub(super) struct LocalVariable;

impl ActionLowering for SetVariable {
    fn lower(&self, ctx: &mut CompileContext<'_>, action: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let value = action.input(0)?;
        let target = action.input(1)?;
        let value_ty = ctx.var_type(value);
        let target_ty = ctx.var_type(target);
        if !target_ty.accepts(value_ty) {
            return Err(ctx.error(CompileErrorKind::TypeMismatch {
                parameter: "value".into(),
                expected: target_ty.to_string(),
                found: value_ty.to_string(),
            }));
        }
        ctx.copy(value, target);
        ctx.after_write(target);
        Ok(())
    }
}

/// Declares its output as a new local initialised from `value`.
impl ActionLowering for LocalVariable {
    fn lower(&self, ctx: &mut CompileContext<'_>, action: &ResolvedAction<'_>) -> Result<(), CompileError> {
        let value = action.input(0)?;
        let local = action.input(1)?;
        ctx.copy(value, local);
        ctx.after_write(local);
        Ok(())
    }
}
