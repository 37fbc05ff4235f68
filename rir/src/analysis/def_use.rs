//! Definition and operand-occurrence index of the registers of one CFG.
//!
//! The index is built by a single sweep over every block, reachable or not.  It is strictly per
//! CFG: a promise body's references to registers of the enclosing CFG are recorded in the promise
//! body's own index, never merged into the parent's.

use crate::{
    block::Block, Analyses, Analysis, AnalysisResult, AnalysisResultT, Cfg, Context, Expression,
    FxIndexMap, IrError, Position, Register, Statement,
};

/// Where a register gets its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefSite {
    /// The `index`th param of `block`.
    Param { block: Block, index: usize },
    /// The assignee of the statement at the position.
    Statement(Position),
}

pub struct DefUse {
    cfg: Cfg,
    defs: FxIndexMap<Register, Vec<DefSite>>,
    uses: FxIndexMap<Register, Vec<Position>>,
    promises: Vec<(Position, Cfg)>,
}
impl AnalysisResultT for DefUse {}

pub const DEF_USE_NAME: &str = "def-use";

pub fn create_def_use_analysis() -> Analysis {
    Analysis::cfg::<DefUse>(
        DEF_USE_NAME,
        "Definitions and uses of every register",
        vec![],
        compute_def_use_analysis,
    )
}

fn compute_def_use_analysis(
    context: &Context,
    cfg: Cfg,
    _: &Analyses,
) -> Result<AnalysisResult, IrError> {
    Ok(Box::new(compute_def_use(context, cfg)))
}

pub fn compute_def_use(context: &Context, cfg: Cfg) -> DefUse {
    let mut def_use = DefUse {
        cfg,
        defs: FxIndexMap::default(),
        uses: FxIndexMap::default(),
        promises: Vec::new(),
    };

    for block in cfg.block_iter(context) {
        for (index, param) in block.params(context).iter().enumerate() {
            def_use.add_def(*param, DefSite::Param { block, index });
        }
        for (index, stmt) in block.statement_iter(context).enumerate() {
            let pos = Position::new(block, index);
            for reg in stmt.expr.get_registers() {
                def_use.add_use(reg, pos);
            }
            if let Some(assignee) = stmt.assignee {
                def_use.add_def(assignee, DefSite::Statement(pos));
            }
            if let Some(body) = stmt.get_promise_body() {
                def_use.promises.push((pos, body));
            }
        }
        if let Some(jump) = block.get_jump(context) {
            let pos = block.jump_position(context);
            for reg in jump.arguments().into_iter().filter_map(|arg| arg.get_register()) {
                def_use.add_use(reg, pos);
            }
        }
    }

    def_use
}

impl DefUse {
    fn add_def(&mut self, reg: Register, site: DefSite) {
        self.defs.entry(reg).or_default().push(site);
    }

    fn add_use(&mut self, reg: Register, pos: Position) {
        self.uses.entry(reg).or_default().push(pos);
    }

    pub fn get_cfg(&self) -> Cfg {
        self.cfg
    }

    /// Every place `reg` is defined in this CFG.  Verified IR has at most one.
    pub fn definitions(&self, reg: Register) -> &[DefSite] {
        self.defs.get(&reg).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every operand occurrence of `reg` in this CFG, once per occurrence.
    pub fn uses(&self, reg: Register) -> &[Position] {
        self.uses.get(&reg).map(Vec::as_slice).unwrap_or_default()
    }

    /// Registers defined in this CFG, in definition order.
    pub fn defined_registers(&self) -> impl Iterator<Item = Register> + '_ {
        self.defs.keys().copied()
    }

    /// The statement defining `reg`, if it is defined by exactly one statement.
    pub fn definition_statement<'a>(
        &self,
        context: &'a Context,
        reg: Register,
    ) -> Option<&'a Statement> {
        match self.definitions(reg) {
            [DefSite::Statement(pos)] => pos.block.get_statement(context, pos.index),
            _ => None,
        }
    }

    /// The promise body of `reg`, if `reg` is defined by exactly one `MkPromise`.
    pub fn promise_body(&self, context: &Context, reg: Register) -> Option<Cfg> {
        self.definition_statement(context, reg)
            .and_then(|stmt| match &stmt.expr {
                Expression::MkPromise { body, .. } => Some(*body),
                _ => None,
            })
    }

    /// Every promise created in this CFG with the position of its `MkPromise`.
    pub fn promises(&self) -> &[(Position, Cfg)] {
        &self.promises
    }
}
