//! A control-flow graph: either the body of a unit or the body of a promise.
//!
//! A [`Cfg`] owns an ordered list of [`Block`]s, the first of which is the entry block.  Promise
//! bodies are fully independent CFGs which are only reachable through the
//! [`Expression::MkPromise`](crate::Expression::MkPromise) statement creating them.

use slotmap::DefaultKey;

use crate::{
    block::{Block, Label},
    context::Context,
    instruction::{Expression, Position},
    unit::Unit,
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Cfg(pub DefaultKey);

/// Which scope a CFG represents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CfgKind {
    /// The body of the unit itself.
    Body,
    /// A promise body created from within `parent`.
    Promise { parent: Cfg },
}

#[doc(hidden)]
pub struct CfgContent {
    pub unit: Unit,
    pub kind: CfgKind,
    pub blocks: Vec<Block>,
    next_label_idx: u64,
    next_register_idx: u64,
}

impl Cfg {
    /// Return a new CFG of `kind` within `unit`, with an entry block already created.
    pub(crate) fn new(context: &mut Context, unit: Unit, kind: CfgKind) -> Cfg {
        let content = CfgContent {
            unit,
            kind,
            blocks: Vec::new(),
            next_label_idx: 0,
            next_register_idx: 0,
        };
        let cfg = Cfg(context.cfgs.insert(content));
        context.units[unit.0].cfgs.push(cfg);

        let entry_block = Block::new(context, cfg, Some("entry".to_owned()));
        context.cfgs[cfg.0].blocks.push(entry_block);

        cfg
    }

    /// Create a new promise body nested in this CFG.
    ///
    /// The returned CFG is only reachable by a `MkPromise` statement placed in this CFG.
    pub fn new_promise(&self, context: &mut Context) -> Cfg {
        let unit = self.get_unit(context);
        Cfg::new(context, unit, CfgKind::Promise { parent: *self })
    }

    /// Create and append a new block to this CFG.
    pub fn create_block(&self, context: &mut Context, label: Option<Label>) -> Block {
        let block = Block::new(context, *self, label);
        context.cfgs[self.0].blocks.push(block);
        block
    }

    pub fn get_unique_label(&self, context: &mut Context, hint: Option<String>) -> String {
        match hint {
            Some(hint) => {
                if context.cfgs[self.0]
                    .blocks
                    .iter()
                    .any(|block| context.blocks[block.0].label == hint)
                {
                    let idx = self.get_next_label_idx(context);
                    self.get_unique_label(context, Some(format!("{hint}{idx}")))
                } else {
                    hint
                }
            }
            None => {
                let idx = self.get_next_label_idx(context);
                self.get_unique_label(context, Some(format!("block{idx}")))
            }
        }
    }

    fn get_next_label_idx(&self, context: &mut Context) -> u64 {
        let cfg = &mut context.cfgs[self.0];
        let idx = cfg.next_label_idx;
        cfg.next_label_idx += 1;
        idx
    }

    pub(crate) fn get_next_register_idx(&self, context: &mut Context) -> u64 {
        let cfg = &mut context.cfgs[self.0];
        let idx = cfg.next_register_idx;
        cfg.next_register_idx += 1;
        idx
    }

    /// Get the unit this CFG belongs to.
    pub fn get_unit(&self, context: &Context) -> Unit {
        context.cfgs[self.0].unit
    }

    /// Get the kind of this CFG.
    pub fn get_kind(&self, context: &Context) -> CfgKind {
        context.cfgs[self.0].kind
    }

    /// Get a name for this CFG, unique within its unit: `body` for the unit body and
    /// `promise<N>` for the `N`th CFG created in the unit.
    pub fn get_name(&self, context: &Context) -> String {
        let unit = self.get_unit(context);
        match self.get_kind(context) {
            CfgKind::Body => "body".to_owned(),
            CfgKind::Promise { .. } => {
                let idx = context.units[unit.0]
                    .cfgs
                    .iter()
                    .position(|cfg| cfg == self)
                    .unwrap_or_default();
                format!("promise{idx}")
            }
        }
    }

    /// Get the CFG this promise body is nested in, `None` for a unit body.
    pub fn get_parent(&self, context: &Context) -> Option<Cfg> {
        match context.cfgs[self.0].kind {
            CfgKind::Body => None,
            CfgKind::Promise { parent } => Some(parent),
        }
    }

    pub fn is_promise(&self, context: &Context) -> bool {
        matches!(context.cfgs[self.0].kind, CfgKind::Promise { .. })
    }

    /// Is `self` equal to `other` or nested (transitively) within it?
    pub fn is_within(&self, context: &Context, other: Cfg) -> bool {
        self.ancestors(context).any(|cfg| cfg == other)
    }

    /// Iterate from this CFG outwards through its enclosing CFGs, `self` first.
    pub fn ancestors<'a>(&self, context: &'a Context) -> impl Iterator<Item = Cfg> + 'a {
        std::iter::successors(Some(*self), |cfg| cfg.get_parent(context))
    }

    pub fn get_entry_block(&self, context: &Context) -> Block {
        context.cfgs[self.0].blocks[0]
    }

    pub fn num_blocks(&self, context: &Context) -> usize {
        context.cfgs[self.0].blocks.len()
    }

    pub fn block_iter<'a>(&self, context: &'a Context) -> impl Iterator<Item = Block> + 'a {
        context.cfgs[self.0].blocks.iter().copied()
    }

    /// Iterate over the promise bodies created directly in this CFG, with the position of the
    /// creating statement.
    pub fn promise_iter<'a>(
        &self,
        context: &'a Context,
    ) -> impl Iterator<Item = (Position, Cfg)> + 'a {
        self.block_iter(context).flat_map(move |block| {
            block
                .statement_iter(context)
                .enumerate()
                .filter_map(move |(index, stmt)| match &stmt.expr {
                    Expression::MkPromise { body, .. } => {
                        Some((Position { block, index }, *body))
                    }
                    _ => None,
                })
        })
    }
}
