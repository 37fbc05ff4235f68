//! Register provenance checking: a linear "consume once" discipline over registers.
//!
//! A `Use` argument consumes its register.  After a use the register must not be read or used
//! again on any path before it is written afresh, and a register captured by a promise must not
//! be consumed at all, since the promise may still read it whenever it is forced.
//!
//! Per program point the state tracks the registers
//! - `written` on every path reaching the point (a guarantee, intersected on merge),
//! - `read`, `used` and `captured` on some path (requirements, unioned on merge),
//! - `touched` in any way by the current CFG frame, which is what a promise captures.
//!
//! Violations are reported, never raised, and the state is computed regardless.

use std::fmt;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    solve, AbstractState, Analyses, Analysis, AnalysisResult, AnalysisResultT, Argument,
    BranchToWithArgs, Cfg, Context, Evaluator, Fixpoint, FxIndexMap, IrError, Jump, Position,
    Register, Statement, Transfer, Unit,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    ReadBeforeWrite,
    ReadAfterUse,
    UseAfterUse,
    UseAfterCapture,
    WriteAfterUse,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descr = match self {
            ViolationKind::ReadBeforeWrite => "read before write",
            ViolationKind::ReadAfterUse => "read after use",
            ViolationKind::UseAfterUse => "use after use",
            ViolationKind::UseAfterCapture => "use after capture",
            ViolationKind::WriteAfterUse => "write after use",
        };
        write!(f, "{descr}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub register: String,
    /// Where it happened, as `label:index`.
    pub position: String,
    /// The CFG containing `position`, as named by [`Cfg::get_name`].
    pub cfg: String,
}

impl Violation {
    /// The message violations are deduplicated by.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} at {} in {}",
            self.kind, self.register, self.position, self.cfg
        )
    }
}

/// Receives provenance violations.
pub trait ProvenanceReporter {
    fn report(&mut self, violation: &Violation);
}

impl ProvenanceReporter for Vec<Violation> {
    fn report(&mut self, violation: &Violation) {
        self.push(violation.clone());
    }
}

impl<R: ProvenanceReporter + ?Sized> ProvenanceReporter for Box<R> {
    fn report(&mut self, violation: &Violation) {
        (**self).report(violation)
    }
}

/// Forwards every distinct violation message to the wrapped reporter once.
pub struct Deduplicated<R> {
    inner: R,
    seen: FxHashSet<String>,
}

impl<R: ProvenanceReporter> Deduplicated<R> {
    pub fn new(inner: R) -> Deduplicated<R> {
        Deduplicated {
            inner,
            seen: FxHashSet::default(),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: ProvenanceReporter> ProvenanceReporter for Deduplicated<R> {
    fn report(&mut self, violation: &Violation) {
        if self.seen.insert(violation.message()) {
            self.inner.report(violation);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProvenanceState {
    written: FxHashSet<Register>,
    read: FxHashSet<Register>,
    used: FxHashSet<Register>,
    captured: FxHashSet<Register>,
    touched: FxHashSet<Register>,
}

impl ProvenanceState {
    pub fn is_written(&self, reg: Register) -> bool {
        self.written.contains(&reg)
    }

    pub fn is_read(&self, reg: Register) -> bool {
        self.read.contains(&reg)
    }

    pub fn is_used(&self, reg: Register) -> bool {
        self.used.contains(&reg)
    }

    pub fn is_captured(&self, reg: Register) -> bool {
        self.captured.contains(&reg)
    }

    /// Registers the current frame read, wrote, used or captured.
    pub fn touched(&self) -> &FxHashSet<Register> {
        &self.touched
    }

    fn write(&mut self, reg: Register) {
        self.written.insert(reg);
        self.used.remove(&reg);
        self.captured.remove(&reg);
        self.touched.insert(reg);
    }
}

fn union_into(set: &mut FxHashSet<Register>, other: &FxHashSet<Register>) -> bool {
    let before = set.len();
    set.extend(other.iter().copied());
    set.len() != before
}

impl AbstractState for ProvenanceState {
    fn merge(&mut self, other: &Self) -> bool {
        let before = self.written.len();
        self.written.retain(|reg| other.written.contains(reg));
        let mut changed = self.written.len() != before;
        changed |= union_into(&mut self.read, &other.read);
        changed |= union_into(&mut self.used, &other.used);
        changed |= union_into(&mut self.captured, &other.captured);
        changed |= union_into(&mut self.touched, &other.touched);
        changed
    }
}

/// Violations found while solving, keyed by message.
pub type ViolationLog = FxIndexMap<String, Violation>;

pub struct ProvenanceTransfer;

impl ProvenanceTransfer {
    fn violation(
        &self,
        eval: &mut Evaluator<'_, Self>,
        kind: ViolationKind,
        reg: Register,
        pos: Position,
    ) {
        let context = eval.context();
        let Some(log) = eval.acc() else {
            return;
        };
        let violation = Violation {
            kind,
            register: reg.get_name(context).to_owned(),
            position: pos.describe(context),
            cfg: pos.block.get_cfg(context).get_name(context),
        };
        let message = violation.message();
        if !log.contains_key(&message) {
            tracing::debug!(%violation, "provenance violation");
            log.insert(message, violation);
        }
    }

    fn check_argument(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut ProvenanceState,
        pos: Position,
        arg: &Argument,
    ) {
        let Some(reg) = arg.get_register() else {
            return;
        };
        if !state.written.contains(&reg) {
            self.violation(eval, ViolationKind::ReadBeforeWrite, reg, pos);
        }
        if arg.is_use() {
            if state.used.contains(&reg) {
                self.violation(eval, ViolationKind::UseAfterUse, reg, pos);
            }
            if state.captured.contains(&reg) {
                self.violation(eval, ViolationKind::UseAfterCapture, reg, pos);
            }
            state.used.insert(reg);
        } else {
            if state.used.contains(&reg) {
                self.violation(eval, ViolationKind::ReadAfterUse, reg, pos);
            }
            state.read.insert(reg);
        }
        state.touched.insert(reg);
    }
}

impl Transfer for ProvenanceTransfer {
    type State = ProvenanceState;
    type Acc = ViolationLog;

    fn apply(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut ProvenanceState,
        pos: Position,
        stmt: &Statement,
    ) {
        for arg in stmt.expr.arguments() {
            self.check_argument(eval, state, pos, arg);
        }
        if let Some(assignee) = stmt.assignee {
            if state.used.contains(&assignee) {
                self.violation(eval, ViolationKind::WriteAfterUse, assignee, pos);
            }
            state.write(assignee);
        }
    }

    fn apply_jump(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut ProvenanceState,
        pos: Position,
        jump: &Jump,
    ) {
        for arg in jump.arguments() {
            self.check_argument(eval, state, pos, arg);
        }
    }

    fn enter_block(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut ProvenanceState,
        _: Position,
        target: &BranchToWithArgs,
    ) {
        // Params are rebound on every edge.
        for param in target.block.params(eval.context()) {
            state.write(*param);
        }
    }

    fn nested_entry(&self, state: &ProvenanceState) -> ProvenanceState {
        ProvenanceState {
            touched: FxHashSet::default(),
            ..state.clone()
        }
    }

    fn promise_created(
        &self,
        _: &mut Evaluator<'_, Self>,
        state: &mut ProvenanceState,
        _: Position,
        _: Cfg,
        nested_return: &ProvenanceState,
    ) {
        union_into(&mut state.captured, &nested_return.touched);
        union_into(&mut state.touched, &nested_return.touched);
    }
}

/// The provenance states of a CFG and the violations found in it and in the promises it creates.
pub struct Provenance {
    fixpoint: Fixpoint<ProvenanceState>,
    violations: Vec<Violation>,
}
impl AnalysisResultT for Provenance {}

pub const PROVENANCE_NAME: &str = "provenance";

pub fn create_provenance_analysis() -> Analysis {
    Analysis::cfg::<Provenance>(
        PROVENANCE_NAME,
        "Register provenance (consume once) checking",
        vec![],
        compute_provenance_analysis,
    )
}

fn compute_provenance_analysis(
    context: &Context,
    cfg: Cfg,
    analyses: &Analyses,
) -> Result<AnalysisResult, IrError> {
    let provenance = compute_provenance(context, cfg);
    report(analyses, provenance.violations());
    Ok(Box::new(provenance))
}

fn report(analyses: &Analyses, violations: &[Violation]) {
    analyses.with_reporter_mut(|reporter| {
        if let Some(reporter) = reporter {
            for violation in violations {
                reporter.report(violation);
            }
        }
    });
}

/// Registers which are written before `cfg` can run: the entry block params and, for a promise
/// body, everything defined by the CFGs enclosing it.
fn initially_written(context: &Context, cfg: Cfg) -> FxHashSet<Register> {
    let mut written: FxHashSet<Register> = cfg
        .get_entry_block(context)
        .params(context)
        .iter()
        .copied()
        .collect();
    for outer in cfg.ancestors(context).skip(1) {
        for block in outer.block_iter(context) {
            written.extend(block.params(context).iter().copied());
            written.extend(block.statement_iter(context).filter_map(|stmt| stmt.assignee));
        }
    }
    written
}

pub fn compute_provenance(context: &Context, cfg: Cfg) -> Provenance {
    let entry = ProvenanceState {
        written: initially_written(context, cfg),
        ..ProvenanceState::default()
    };
    let mut log = ViolationLog::default();
    let fixpoint = solve(context, &ProvenanceTransfer, cfg, entry, Some(&mut log));
    tracing::debug!(cfg = ?cfg, violations = log.len(), "checked provenance");
    Provenance {
        fixpoint,
        violations: log.into_values().collect(),
    }
}

impl Provenance {
    /// Every distinct violation, in discovery order.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// The provenance state right before `pos`.
    pub fn state_at(&self, context: &Context, pos: Position) -> ProvenanceState {
        self.fixpoint.state_at(context, &ProvenanceTransfer, pos)
    }

    pub fn fixpoint(&self) -> &Fixpoint<ProvenanceState> {
        &self.fixpoint
    }
}

/// The provenance violations of a whole unit.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProvenanceReport {
    pub unit: String,
    pub violations: Vec<Violation>,
}
impl AnalysisResultT for ProvenanceReport {}

pub const PROVENANCE_REPORT_NAME: &str = "provenance-report";

pub fn create_provenance_report_analysis() -> Analysis {
    Analysis::unit::<ProvenanceReport>(
        PROVENANCE_REPORT_NAME,
        "Provenance violations of the whole unit",
        vec![],
        compute_provenance_report_analysis,
    )
}

fn compute_provenance_report_analysis(
    context: &Context,
    unit: Unit,
    analyses: &Analyses,
) -> Result<AnalysisResult, IrError> {
    // The body's provenance covers every promise reachable from it.
    let provenance = analyses.get_cfg::<Provenance>(unit.get_body(context))?;
    Ok(Box::new(ProvenanceReport {
        unit: unit.get_name(context).to_owned(),
        violations: provenance.violations().to_vec(),
    }))
}
