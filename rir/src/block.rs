//! Represents a 'basic block' of [`Statement`]s in a control flow graph.
//!
//! [`Block`]s contain zero or more statements and exactly one [`Jump`], the terminator.  Jumps
//! target blocks of the same CFG and carry, per target, the arguments satisfying the target's
//! params.  Block params are another form of SSA PHIs.
//!
//! Every [`Cfg`] has at least one block, the first of which is labeled `entry`.

use indexmap::IndexSet;
use slotmap::DefaultKey;

use crate::{
    cfg::Cfg,
    context::Context,
    instruction::{BranchToWithArgs, Jump, Position, Statement, StatementInserter},
    irtype::{Effects, ValueType},
    register::Register,
    FxIndexSet,
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the
/// [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Block(pub DefaultKey);

#[doc(hidden)]
pub struct BlockContent {
    /// Block label, useful for printing.
    pub label: Label,
    /// The CFG containing this block.
    pub cfg: Cfg,
    /// Block params: registers defined on entry from the jump arguments.
    pub params: Vec<Register>,
    pub statements: Vec<Statement>,
    pub jump: Option<Jump>,
    /// CFG predecessors, in the order the edges were added.
    pub preds: FxIndexSet<Block>,
}

/// Each block may be explicitly named.  A [`Label`] is a simple `String` synonym.
pub type Label = String;

impl Block {
    /// Return a new block handle.
    ///
    /// Creates a new Block belonging to `cfg` in the context and returns its handle.  `label`
    /// is optional and is used only when printing.
    pub(crate) fn new(context: &mut Context, cfg: Cfg, label: Option<String>) -> Block {
        let label = cfg.get_unique_label(context, label);
        let content = BlockContent {
            label,
            cfg,
            params: Vec::new(),
            statements: Vec::new(),
            jump: None,
            preds: IndexSet::default(),
        };
        Block(context.blocks.insert(content))
    }

    /// Get the CFG this block belongs to.
    pub fn get_cfg(&self, context: &Context) -> Cfg {
        context.blocks[self.0].cfg
    }

    /// Create a new [`StatementInserter`] to more easily append statements to this block.
    pub fn append<'a>(&self, context: &'a mut Context) -> StatementInserter<'a> {
        StatementInserter::new(context, *self)
    }

    /// Get the label of this block.  If it wasn't given one upon creation it will be a generated
    /// label.
    pub fn get_label(&self, context: &Context) -> String {
        context.blocks[self.0].label.clone()
    }

    /// Add a new param of type `ty`, returning the register it defines.
    pub fn new_param(&self, context: &mut Context, ty: ValueType) -> Register {
        let cfg = self.get_cfg(context);
        let reg = Register::new(context, cfg, ty);
        context.blocks[self.0].params.push(reg);
        reg
    }

    /// Get the i'th block param.
    pub fn get_param(&self, context: &Context, index: usize) -> Option<Register> {
        context.blocks[self.0].params.get(index).copied()
    }

    pub fn params<'a>(&self, context: &'a Context) -> &'a [Register] {
        &context.blocks[self.0].params
    }

    pub fn num_params(&self, context: &Context) -> usize {
        context.blocks[self.0].params.len()
    }

    /// Append `stmt`, returning its index in the block.
    pub fn append_statement(&self, context: &mut Context, stmt: Statement) -> usize {
        let statements = &mut context.blocks[self.0].statements;
        statements.push(stmt);
        statements.len() - 1
    }

    /// Override the inferred effects of the statement at `index`.
    pub fn set_statement_effects(&self, context: &mut Context, index: usize, effects: Effects) {
        context.blocks[self.0].statements[index].effects = effects;
    }

    pub fn get_statement<'a>(&self, context: &'a Context, index: usize) -> Option<&'a Statement> {
        context.blocks[self.0].statements.get(index)
    }

    pub fn statements<'a>(&self, context: &'a Context) -> &'a [Statement] {
        &context.blocks[self.0].statements
    }

    pub fn statement_iter<'a>(&self, context: &'a Context) -> impl Iterator<Item = &'a Statement> {
        context.blocks[self.0].statements.iter()
    }

    pub fn num_statements(&self, context: &Context) -> usize {
        context.blocks[self.0].statements.len()
    }

    /// The position of this block's jump.
    pub fn jump_position(&self, context: &Context) -> Position {
        Position {
            block: *self,
            index: self.num_statements(context),
        }
    }

    /// Terminate this block with `jump`.
    ///
    /// Predecessor sets of the old and new targets are kept up to date.
    pub fn set_jump(&self, context: &mut Context, jump: Jump) {
        if let Some(old) = context.blocks[self.0].jump.take() {
            for target in old.targets() {
                context.blocks[target.block.0].preds.shift_remove(self);
            }
        }
        for target in jump.targets() {
            context.blocks[target.block.0].preds.insert(*self);
        }
        context.blocks[self.0].jump = Some(jump);
    }

    /// Get a reference to the block terminator.
    ///
    /// Returns `None` if the block hasn't been terminated yet.
    pub fn get_jump<'a>(&self, context: &'a Context) -> Option<&'a Jump> {
        context.blocks[self.0].jump.as_ref()
    }

    /// Return whether this block is already terminated.
    pub fn is_terminated(&self, context: &Context) -> bool {
        context.blocks[self.0].jump.is_some()
    }

    /// Return whether this block is terminated by a `Return`.
    pub fn is_terminated_by_return(&self, context: &Context) -> bool {
        matches!(self.get_jump(context), Some(Jump::Return(_)))
    }

    /// Get the CFG successors (and the arguments passed to them) of this block.
    pub fn successors<'a>(&self, context: &'a Context) -> &'a [BranchToWithArgs] {
        self.get_jump(context).map(Jump::targets).unwrap_or_default()
    }

    /// Get an iterator over the successor blocks.  A block may appear more than once.
    pub fn succ_iter<'a>(&self, context: &'a Context) -> impl Iterator<Item = Block> + 'a {
        self.successors(context).iter().map(|target| target.block)
    }

    /// Get an iterator over this block's predecessor blocks.
    pub fn pred_iter<'a>(&self, context: &'a Context) -> impl Iterator<Item = &'a Block> {
        context.blocks[self.0].preds.iter()
    }

    /// Get the number of predecessor blocks, i.e., blocks which jump to this one.
    pub fn num_predecessors(&self, context: &Context) -> usize {
        context.blocks[self.0].preds.len()
    }
}
