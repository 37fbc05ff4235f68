//! Code to validate the IR in a [`Context`].
//!
//! The front end should verify the IR it produces before handing it to the analyses, which
//! assume (and never re-check) the invariants verified here.

use rustc_hash::FxHashSet;

use crate::{
    block::Block,
    cfg::{Cfg, CfgKind},
    context::Context,
    error::IrError,
    instruction::{Argument, Position, Statement},
    register::Register,
    unit::Unit,
};

impl Context {
    /// Verify the contents of this [`Context`] is valid.
    pub fn verify(self) -> Result<Self, IrError> {
        for unit in self.unit_iter() {
            unit.verify(&self)?;
        }
        Ok(self)
    }
}

impl Unit {
    /// Verify every CFG of this unit.
    pub fn verify(&self, context: &Context) -> Result<(), IrError> {
        let mut defined = FxHashSet::default();
        for cfg in self.cfg_iter(context) {
            CfgVerifier {
                context,
                unit: *self,
                cfg,
                defined: &mut defined,
            }
            .verify()?;
        }
        Ok(())
    }
}

struct CfgVerifier<'a> {
    context: &'a Context,
    unit: Unit,
    cfg: Cfg,
    defined: &'a mut FxHashSet<Register>,
}

impl CfgVerifier<'_> {
    fn verify(&mut self) -> Result<(), IrError> {
        let entry = self.cfg.get_entry_block(self.context);
        if entry.num_predecessors(self.context) > 0 {
            return Err(IrError::VerifyEntryBlockHasPredecessors(
                entry
                    .pred_iter(self.context)
                    .map(|pred| pred.get_label(self.context))
                    .collect(),
            ));
        }
        for block in self.cfg.block_iter(self.context) {
            self.verify_block(block)?;
        }
        Ok(())
    }

    fn verify_block(&mut self, block: Block) -> Result<(), IrError> {
        let context = self.context;
        if block.get_cfg(context) != self.cfg {
            return Err(IrError::VerifyBlockParentMismatch(block.get_label(context)));
        }
        for param in block.params(context) {
            self.verify_definition(*param, Position::new(block, 0))?;
        }
        for (index, stmt) in block.statement_iter(context).enumerate() {
            self.verify_statement(stmt, Position::new(block, index))?;
        }

        let Some(jump) = block.get_jump(context) else {
            return Err(IrError::VerifyMissingJump(block.get_label(context)));
        };
        let jump_pos = block.jump_position(context);
        for arg in jump.arguments() {
            self.verify_argument(arg, jump_pos)?;
        }
        for target in jump.targets() {
            if target.block.get_cfg(context) != self.cfg {
                return Err(IrError::VerifyJumpToForeignBlock(
                    block.get_label(context),
                    target.block.get_label(context),
                ));
            }
            let expected = target.block.num_params(context);
            if target.args.len() != expected {
                return Err(IrError::VerifyBranchParamsMismatch {
                    from: block.get_label(context),
                    to: target.block.get_label(context),
                    expected,
                    found: target.args.len(),
                });
            }
        }
        Ok(())
    }

    fn verify_statement(&mut self, stmt: &Statement, pos: Position) -> Result<(), IrError> {
        for arg in stmt.expr.arguments() {
            self.verify_argument(arg, pos)?;
        }
        if let Some(body) = stmt.get_promise_body() {
            self.verify_promise(body, pos)?;
        }
        if let Some(assignee) = stmt.assignee {
            self.verify_definition(assignee, pos)?;
        }
        Ok(())
    }

    fn verify_definition(&mut self, reg: Register, pos: Position) -> Result<(), IrError> {
        if reg.get_cfg(self.context) != self.cfg {
            return Err(IrError::VerifyRegisterDefinedInForeignCfg(
                reg.get_name(self.context).to_owned(),
                pos.describe(self.context),
            ));
        }
        if !self.defined.insert(reg) {
            return Err(IrError::VerifyRegisterRedefined(
                reg.get_name(self.context).to_owned(),
            ));
        }
        Ok(())
    }

    fn verify_argument(&self, arg: &Argument, pos: Position) -> Result<(), IrError> {
        match arg {
            Argument::Constant(_) => Ok(()),
            Argument::Read(reg) | Argument::Use(reg) => {
                if reg.is_visible_in(self.context, self.cfg) {
                    Ok(())
                } else {
                    Err(IrError::VerifyRegisterNotVisible(
                        reg.get_name(self.context).to_owned(),
                        pos.describe(self.context),
                    ))
                }
            }
        }
    }

    fn verify_promise(&self, body: Cfg, pos: Position) -> Result<(), IrError> {
        if !self.unit.contains_cfg(self.context, body) {
            return Err(IrError::VerifyPromiseInForeignUnit(
                pos.describe(self.context),
            ));
        }
        match body.get_kind(self.context) {
            CfgKind::Promise { parent } if parent == self.cfg => Ok(()),
            _ => Err(IrError::VerifyPromiseParentMismatch(
                pos.describe(self.context),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Argument, Constant, Context, IrError, Register, Unit, ValueType};

    #[test]
    fn well_formed_unit() {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "f");
        let body = unit.get_body(&context);
        let entry = body.get_entry_block(&context);
        let exit = body.create_block(&mut context, Some("exit".into()));
        let param = exit.new_param(&mut context, ValueType::INTEGER);
        entry
            .append(&mut context)
            .goto(exit, vec![Argument::Constant(Constant::Integer(1))]);
        exit.append(&mut context).ret(Argument::Read(param));

        assert!(context.verify().is_ok());
    }

    #[test]
    fn missing_jump() {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "f");
        let entry = unit.get_body(&context).get_entry_block(&context);
        entry
            .append(&mut context)
            .copy(Argument::Constant(Constant::Nil));

        assert!(matches!(
            unit.verify(&context),
            Err(IrError::VerifyMissingJump(label)) if label == "entry"
        ));
    }

    #[test]
    fn branch_args_must_match_params() {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "f");
        let body = unit.get_body(&context);
        let entry = body.get_entry_block(&context);
        let exit = body.create_block(&mut context, None);
        exit.new_param(&mut context, ValueType::INTEGER);
        entry.append(&mut context).goto(exit, vec![]);
        exit.append(&mut context)
            .ret(Argument::Constant(Constant::Nil));

        assert!(matches!(
            unit.verify(&context),
            Err(IrError::VerifyBranchParamsMismatch {
                expected: 1,
                found: 0,
                ..
            })
        ));
    }

    #[test]
    fn promise_registers_are_not_visible_outside() {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "f");
        let body = unit.get_body(&context);
        let promise = body.new_promise(&mut context);
        let prom_entry = promise.get_entry_block(&context);
        let inner = prom_entry
            .append(&mut context)
            .copy(Argument::Constant(Constant::Integer(1)));
        prom_entry.append(&mut context).ret(Argument::Read(inner));

        let entry = body.get_entry_block(&context);
        entry.append(&mut context).mk_promise(promise);
        entry.append(&mut context).ret(Argument::Read(inner));

        assert!(matches!(
            unit.verify(&context),
            Err(IrError::VerifyRegisterNotVisible(..))
        ));
    }

    #[test]
    fn registers_are_defined_once() {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "f");
        let body = unit.get_body(&context);
        let entry = body.get_entry_block(&context);
        let reg = Register::new(&mut context, body, ValueType::INTEGER);
        for _ in 0..2 {
            entry.append_statement(
                &mut context,
                crate::Statement::new(
                    Some(reg),
                    crate::Expression::Copy(Argument::Constant(Constant::Integer(1))),
                ),
            );
        }
        entry.append(&mut context).ret(Argument::Read(reg));

        assert!(matches!(
            unit.verify(&context),
            Err(IrError::VerifyRegisterRedefined(..))
        ));
    }

    #[test]
    fn entry_has_no_predecessors() {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "f");
        let entry = unit.get_body(&context).get_entry_block(&context);
        entry.append(&mut context).goto(entry, vec![]);

        assert!(matches!(
            unit.verify(&context),
            Err(IrError::VerifyEntryBlockHasPredecessors(..))
        ));
    }
}
