//! Origin (copy propagation) analysis.
//!
//! The origin of a register is the earliest constant or register it is provably equal to, so
//! after `a = 5; b = a; c = b` the origin of `c` is the constant `5`.  Registers are immutable and
//! so are their origins; a register without a better origin is its own origin.
//!
//! Named variables are location dependent.  Their origins are tracked through the fixpoint state
//! and are only kept across a merge when every incoming path agrees.  Anything which may run
//! arbitrary code against the environment forgets them.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{
    compute_def_use, solve, AbstractState, Analyses, Analysis, AnalysisResult, AnalysisResultT,
    Argument, Assumption, BranchToWithArgs, Cfg, CfgTree, Constant, Context, DefUse, Effects,
    Evaluator, Expression, Fixpoint, IrError, Jump, Position, Register, Statement, Transfer,
    ValueType, Variable, CFG_TREE_NAME, DEF_USE_NAME,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    Constant(Constant),
    Register(Register),
}

impl Origin {
    pub fn get_type(&self, context: &Context) -> ValueType {
        match self {
            Origin::Constant(c) => c.get_type(),
            Origin::Register(reg) => reg.get_type(context),
        }
    }

    /// Can this origin be referred to from within `cfg`?
    pub fn is_visible_in(&self, context: &Context, cfg: Cfg) -> bool {
        match self {
            Origin::Constant(_) => true,
            Origin::Register(reg) => reg.is_visible_in(context, cfg),
        }
    }

    pub fn get_constant(&self) -> Option<&Constant> {
        match self {
            Origin::Constant(c) => Some(c),
            Origin::Register(_) => None,
        }
    }
}

/// A flat lattice: nothing seen yet, one value, or conflicting values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Flat<T> {
    #[default]
    Unset,
    Known(T),
    Conflict,
}

impl<T: Clone + PartialEq> Flat<T> {
    /// Join `other` into `self`, returning whether `self` changed.
    pub fn join(&mut self, other: &Flat<T>) -> bool {
        let joined = match (&*self, other) {
            (_, Flat::Unset) | (Flat::Conflict, _) => return false,
            (Flat::Unset, _) => other.clone(),
            (Flat::Known(a), Flat::Known(b)) if a == b => return false,
            _ => Flat::Conflict,
        };
        *self = joined;
        true
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Flat::Known(value) => Some(value),
            Flat::Unset | Flat::Conflict => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OriginState {
    registers: FxHashMap<Register, Origin>,
    variables: FxHashMap<Variable, Origin>,
    returned: Flat<Origin>,
}

impl OriginState {
    /// The origin of `reg` in this state, `reg` itself if unknown.
    pub fn register_origin(&self, reg: Register) -> Origin {
        self.registers
            .get(&reg)
            .cloned()
            .unwrap_or(Origin::Register(reg))
    }

    pub fn resolve(&self, arg: &Argument) -> Origin {
        match arg {
            Argument::Constant(c) => Origin::Constant(c.clone()),
            Argument::Read(reg) | Argument::Use(reg) => self.register_origin(*reg),
        }
    }

    pub fn variable_origin(&self, var: Variable) -> Option<&Origin> {
        self.variables.get(&var)
    }

    fn set_register(&mut self, reg: Register, origin: Origin) {
        self.registers.insert(reg, origin);
    }
}

/// Join a register origin: two different origins mean the register is only its own origin.
fn join_register(
    registers: &mut FxHashMap<Register, Origin>,
    reg: Register,
    origin: &Origin,
) -> bool {
    match registers.get_mut(&reg) {
        None => {
            registers.insert(reg, origin.clone());
            true
        }
        Some(current) if current == origin || *current == Origin::Register(reg) => false,
        Some(current) => {
            *current = Origin::Register(reg);
            true
        }
    }
}

impl AbstractState for OriginState {
    fn merge(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (reg, origin) in &other.registers {
            changed |= join_register(&mut self.registers, *reg, origin);
        }
        let before = self.variables.len();
        self.variables
            .retain(|var, origin| other.variables.get(var) == Some(origin));
        changed |= self.variables.len() != before;
        changed |= self.returned.join(&other.returned);
        changed
    }
}

/// Transfer functions of the origin analysis.
pub struct OriginTransfer {
    def_uses: FxHashMap<Cfg, Rc<DefUse>>,
}

impl OriginTransfer {
    /// Create the transfer functions given the def/use index of every CFG which may define a
    /// forced promise.
    pub fn new(def_uses: FxHashMap<Cfg, Rc<DefUse>>) -> OriginTransfer {
        OriginTransfer { def_uses }
    }

    /// Index every CFG of the unit of `cfg` directly.
    pub fn for_unit_of(context: &Context, cfg: Cfg) -> OriginTransfer {
        let unit = cfg.get_unit(context);
        OriginTransfer::new(
            unit.cfg_iter(context)
                .map(|cfg| (cfg, Rc::new(compute_def_use(context, cfg))))
                .collect(),
        )
    }

    fn promise_body(&self, context: &Context, reg: Register) -> Option<Cfg> {
        self.def_uses
            .get(&reg.get_cfg(context))
            .and_then(|def_use| def_use.promise_body(context, reg))
    }

    fn force(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut OriginState,
        pos: Position,
        value: &Argument,
    ) -> Option<Origin> {
        let context = eval.context();
        let origin = state.resolve(value);

        let body = match &origin {
            Origin::Register(reg) => self.promise_body(context, *reg),
            Origin::Constant(_) => None,
        };
        if let Some(body) = body {
            let entry = self.nested_entry(state);
            let nested = eval.run_nested(self, pos, body, entry);
            state.variables = nested.variables;
            let forcing_cfg = pos.block.get_cfg(context);
            return nested
                .returned
                .known()
                .filter(|origin| origin.is_visible_in(context, forcing_cfg))
                .cloned();
        }

        if value.get_type(context).maybe_lazy() && origin.get_type(context).maybe_lazy() {
            state.variables.clear();
            None
        } else {
            Some(origin)
        }
    }
}

impl Transfer for OriginTransfer {
    type State = OriginState;
    type Acc = FxHashMap<Register, Origin>;

    fn apply(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut OriginState,
        pos: Position,
        stmt: &Statement,
    ) {
        let context = eval.context();
        let result = match &stmt.expr {
            Expression::Copy(value) => Some(state.resolve(value)),
            Expression::Store { var, value } => {
                let origin = state.resolve(value);
                state.variables.insert(*var, origin.clone());
                Some(origin)
            }
            Expression::Load(var) => state.variables.get(var).cloned(),
            Expression::LoadFun(var) => state
                .variables
                .get(var)
                .filter(|origin| origin.get_type(context).is_closure())
                .cloned(),
            Expression::Force(value) => self.force(eval, state, pos, value),
            Expression::Cast { value, to } => {
                let origin = state.resolve(value);
                (value.get_type(context).is_a(*to) || origin.get_type(context).is_a(*to))
                    .then_some(origin)
            }
            Expression::Assume { value, assumption } => {
                let origin = state.resolve(value);
                let holds = match assumption {
                    Assumption::Type(ty) => {
                        value.get_type(context).is_a(*ty) || origin.get_type(context).is_a(*ty)
                    }
                    Assumption::Value(c) => origin.get_constant() == Some(c),
                    Assumption::Function(name) => {
                        matches!(origin.get_constant(), Some(Constant::Closure(f)) if f == name)
                    }
                };
                holds.then_some(origin)
            }
            Expression::MkPromise { .. }
            | Expression::Call { .. }
            | Expression::CallBuiltin { .. }
            | Expression::MkVector(_)
            | Expression::PushEnv(_)
            | Expression::PopEnv
            | Expression::Subscript { .. }
            | Expression::Reflect { .. } => None,
        };

        if stmt
            .effects
            .intersects(Effects::REFLECTION | Effects::CHANGES_ENV)
        {
            state.variables.clear();
        }

        if let Some(assignee) = stmt.assignee {
            let origin = result.unwrap_or(Origin::Register(assignee));
            if let Some(acc) = eval.acc() {
                join_register(acc, assignee, &origin);
            }
            state.set_register(assignee, origin);
        }
    }

    fn apply_jump(
        &self,
        _: &mut Evaluator<'_, Self>,
        state: &mut OriginState,
        _: Position,
        jump: &Jump,
    ) {
        if let Jump::Return(value) = jump {
            state.returned = Flat::Known(state.resolve(value));
        }
    }

    fn enter_block(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut OriginState,
        _: Position,
        target: &BranchToWithArgs,
    ) {
        let params = target.block.params(eval.context());
        for (param, arg) in params.iter().zip(&target.args) {
            let origin = state.resolve(arg);
            if let Some(acc) = eval.acc() {
                join_register(acc, *param, &origin);
            }
            state.set_register(*param, origin);
        }
    }

    fn nested_entry(&self, state: &OriginState) -> OriginState {
        OriginState {
            registers: state.registers.clone(),
            variables: state.variables.clone(),
            returned: Flat::Unset,
        }
    }
}

/// Origins of the registers of one CFG and of the promise bodies it creates or forces.
pub struct Origins {
    transfer: OriginTransfer,
    fixpoint: Fixpoint<OriginState>,
    registers: FxHashMap<Register, Origin>,
}
impl AnalysisResultT for Origins {}

pub const ORIGINS_NAME: &str = "origins";

pub fn create_origins_analysis() -> Analysis {
    Analysis::cfg::<Origins>(
        ORIGINS_NAME,
        "Origins of registers and named variables (copy propagation)",
        vec![DEF_USE_NAME, CFG_TREE_NAME],
        compute_origins_analysis,
    )
}

fn compute_origins_analysis(
    context: &Context,
    cfg: Cfg,
    analyses: &Analyses,
) -> Result<AnalysisResult, IrError> {
    let cfg_tree = analyses.get::<CfgTree>()?;
    let def_uses = cfg_tree
        .cfg_iter()
        .map(|cfg| Ok((cfg, analyses.get_cfg::<DefUse>(cfg)?)))
        .collect::<Result<_, IrError>>()?;
    Ok(Box::new(compute_origins(
        context,
        cfg,
        OriginTransfer::new(def_uses),
    )))
}

pub fn compute_origins(context: &Context, cfg: Cfg, transfer: OriginTransfer) -> Origins {
    let mut registers = FxHashMap::default();
    let fixpoint = solve(
        context,
        &transfer,
        cfg,
        OriginState::default(),
        Some(&mut registers),
    );
    tracing::debug!(
        cfg = ?cfg,
        registers = registers.len(),
        constants = registers
            .values()
            .filter(|origin| matches!(origin, Origin::Constant(_)))
            .count(),
        "computed origins"
    );
    Origins {
        transfer,
        fixpoint,
        registers,
    }
}

impl Origins {
    /// The origin of `reg`, `reg` itself when nothing better is known.
    pub fn origin(&self, reg: Register) -> Origin {
        self.registers
            .get(&reg)
            .cloned()
            .unwrap_or(Origin::Register(reg))
    }

    pub fn resolve(&self, arg: &Argument) -> Origin {
        match arg {
            Argument::Constant(c) => Origin::Constant(c.clone()),
            Argument::Read(reg) | Argument::Use(reg) => self.origin(*reg),
        }
    }

    /// The origin of `var` right before `pos`, `None` if unknown or unreached.
    pub fn variable_origin_at(
        &self,
        context: &Context,
        pos: Position,
        var: Variable,
    ) -> Option<Origin> {
        self.fixpoint
            .state_at(context, &self.transfer, pos)
            .variables
            .remove(&var)
    }

    /// The origin shared by every `Return` of the analyzed CFG.
    pub fn return_origin(&self) -> Option<Origin> {
        self.return_origin_of(self.fixpoint.root())
    }

    /// The origin shared by every `Return` of `cfg`, which is the analyzed CFG or a promise
    /// body solved along the way.
    pub fn return_origin_of(&self, cfg: Cfg) -> Option<Origin> {
        self.fixpoint
            .return_state(cfg)
            .and_then(|state| state.returned.known().cloned())
    }

    pub fn fixpoint(&self) -> &Fixpoint<OriginState> {
        &self.fixpoint
    }
}
