//! Registers: single-assignment virtual value slots.
//!
//! A [`Register`] is defined exactly once, either as a statement's assignee or as a block param,
//! and always within the CFG it was created for.  Promise bodies may read the registers of the
//! CFGs enclosing them; that is how a promise captures its free values.
//!
//! Like most IR data structures they are `Copy` and cheap to pass around by value.

use slotmap::DefaultKey;

use crate::{cfg::Cfg, context::Context, irtype::ValueType};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Register(pub DefaultKey);

#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct RegisterContent {
    pub cfg: Cfg,
    pub name: String,
    /// Statically inferred type, supplied by the type inference.
    pub ty: ValueType,
}

impl Register {
    /// Return a new register scoped to `cfg`.
    pub fn new(context: &mut Context, cfg: Cfg, ty: ValueType) -> Register {
        let idx = cfg.get_next_register_idx(context);
        let content = RegisterContent {
            cfg,
            name: format!("%{idx}"),
            ty,
        };
        Register(context.registers.insert(content))
    }

    /// Get the CFG this register is scoped to.
    pub fn get_cfg(&self, context: &Context) -> Cfg {
        context.registers[self.0].cfg
    }

    /// Get the printable name of this register, e.g. `%3`.
    pub fn get_name<'a>(&self, context: &'a Context) -> &'a str {
        &context.registers[self.0].name
    }

    /// Get the statically inferred type of this register.
    pub fn get_type(&self, context: &Context) -> ValueType {
        context.registers[self.0].ty
    }

    /// Replace the inferred type, as refined by an external type inference.
    pub fn set_type(&self, context: &mut Context, ty: ValueType) {
        context.registers[self.0].ty = ty;
    }

    /// Can this register be referenced from within `cfg`?  That is the case when `cfg` is the
    /// register's own CFG or nested within it.
    pub fn is_visible_in(&self, context: &Context, cfg: Cfg) -> bool {
        cfg.is_within(context, self.get_cfg(context))
    }
}
