use std::{cell::RefCell, rc::Rc};

use itertools::Itertools;
use pretty_assertions::assert_eq;
use rir::{
    compute_origins, register_known_analyses, Analyses, AnalysesConfig, AnalysisRegistry,
    AnalysisResultT, Argument, Block, Cfg, Constant, Context, DomTree, Expression, IrError, Loops,
    Origin, OriginTransfer, Origins, Position, Provenance, ProvenanceReport, ProvenanceReporter,
    Statement, Unit, ValueType, Variable, Violation, ViolationKind, DOMINATORS_NAME, LOOPS_NAME,
    ORIGINS_NAME, PROVENANCE_NAME, PROVENANCE_REPORT_NAME,
};

// -------------------------------------------------------------------------------------------------
// Helpers.

fn registry() -> AnalysisRegistry {
    let mut registry = AnalysisRegistry::default();
    register_known_analyses(&mut registry);
    registry
}

fn config(registry: &AnalysisRegistry, names: &[&str]) -> AnalysesConfig {
    AnalysesConfig::with_dependencies(registry, names).unwrap()
}

fn int(i: i64) -> Argument {
    Argument::Constant(Constant::Integer(i))
}

fn unknown_cond() -> Argument {
    Argument::Constant(Constant::Logical(None))
}

/// Collects reported violations where the test can still see them.
#[derive(Clone, Default)]
struct SharedReporter(Rc<RefCell<Vec<Violation>>>);

impl ProvenanceReporter for SharedReporter {
    fn report(&mut self, violation: &Violation) {
        self.0.borrow_mut().push(violation.clone());
    }
}

fn kinds(violations: &[Violation]) -> Vec<ViolationKind> {
    violations.iter().map(|violation| violation.kind).collect()
}

fn provenance_of(context: &Context, unit: Unit) -> Vec<Violation> {
    let registry = registry();
    let analyses = Analyses::new(
        context,
        &registry,
        unit,
        &config(&registry, &[PROVENANCE_NAME]),
    )
    .unwrap();
    analyses
        .get_cfg::<Provenance>(unit.get_body(context))
        .unwrap()
        .violations()
        .to_vec()
}

/// Can `to` be reached from the entry of `cfg` without passing through `avoid`?
fn reachable_avoiding(context: &Context, cfg: Cfg, avoid: Block, to: Block) -> bool {
    let entry = cfg.get_entry_block(context);
    if entry == avoid {
        return false;
    }
    let mut seen = vec![entry];
    let mut worklist = vec![entry];
    while let Some(block) = worklist.pop() {
        if block == to {
            return true;
        }
        for succ in block.succ_iter(context) {
            if succ != avoid && !seen.contains(&succ) {
                seen.push(succ);
                worklist.push(succ);
            }
        }
    }
    false
}

// -------------------------------------------------------------------------------------------------
// Dominators and loops.

/// entry -> a -> {b, c} -> d -> {a, exit}, plus an unreachable block.
fn looping_diamond(context: &mut Context) -> (Unit, Vec<Block>) {
    let unit = Unit::new(context, "looping_diamond");
    let body = unit.get_body(context);
    let entry = body.get_entry_block(context);
    let a = body.create_block(context, Some("a".into()));
    let b = body.create_block(context, Some("b".into()));
    let c = body.create_block(context, Some("c".into()));
    let d = body.create_block(context, Some("d".into()));
    let exit = body.create_block(context, Some("exit".into()));
    let dead = body.create_block(context, Some("dead".into()));

    entry.append(context).goto(a, vec![]);
    a.append(context)
        .branch(unknown_cond(), b, vec![], c, vec![]);
    b.append(context).goto(d, vec![]);
    c.append(context).goto(d, vec![]);
    d.append(context)
        .branch(unknown_cond(), a, vec![], exit, vec![]);
    exit.append(context).ret(int(0));
    dead.append(context).goto(exit, vec![]);

    (unit, vec![entry, a, b, c, d, exit, dead])
}

#[test]
fn dominance_is_path_dominance() {
    let mut context = Context::default();
    let (unit, blocks) = looping_diamond(&mut context);
    let body = unit.get_body(&context);
    let registry = registry();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &config(&registry, &[DOMINATORS_NAME]),
    )
    .unwrap();
    let dom_tree = analyses.get_cfg::<DomTree>(body).unwrap();

    let entry = blocks[0];
    assert_eq!(
        dom_tree.dominators(entry).unwrap().iter().collect_vec(),
        vec![&entry]
    );

    let reachable = &blocks[..6];
    for (&dominator, &dominatee) in reachable.iter().cartesian_product(reachable) {
        let expected =
            dominator == dominatee || !reachable_avoiding(&context, body, dominator, dominatee);
        assert_eq!(
            dom_tree.dominates(dominator, dominatee),
            expected,
            "{} dom {}",
            dominator.get_label(&context),
            dominatee.get_label(&context)
        );
    }
}

#[test]
fn single_back_edge_makes_a_single_loop() {
    let mut context = Context::default();
    let (unit, blocks) = looping_diamond(&mut context);
    let body = unit.get_body(&context);
    let [_, a, b, c, d, exit, dead] = blocks[..] else {
        unreachable!()
    };
    let registry = registry();
    let analyses = Analyses::new(&context, &registry, unit, &config(&registry, &[LOOPS_NAME]))
        .unwrap();
    let loops = analyses.get_cfg::<Loops>(body).unwrap();

    assert_eq!(loops.back_edges(), &[(d, a)]);
    assert_eq!(loops.num_loops(), 1);
    let natural_loop = loops.get_loop(a).unwrap();
    assert_eq!(
        natural_loop.blocks.iter().copied().sorted().collect_vec(),
        [a, b, c, d].into_iter().sorted().collect_vec()
    );
    assert!(!natural_loop.contains(exit));
    assert!(!natural_loop.contains(dead));
}

#[test]
fn loop_free_code_has_no_loops() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "straight");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let next = body.create_block(&mut context, None);
    entry.append(&mut context).goto(next, vec![]);
    next.append(&mut context).ret(int(1));

    let registry = registry();
    let analyses = Analyses::new(&context, &registry, unit, &config(&registry, &[LOOPS_NAME]))
        .unwrap();
    let loops = analyses.get_cfg::<Loops>(body).unwrap();
    assert_eq!(loops.num_loops(), 0);
    assert!(loops.back_edges().is_empty());
}

// -------------------------------------------------------------------------------------------------
// Origins.

#[test]
fn copy_chains_resolve_to_the_constant() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "chain");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let a = entry.append(&mut context).copy(int(5));
    let b = entry.append(&mut context).copy(Argument::Read(a));
    let c = entry.append(&mut context).copy(Argument::Read(b));
    entry.append(&mut context).ret(Argument::Read(c));

    let origins = compute_origins(&context, body, OriginTransfer::for_unit_of(&context, body));
    assert_eq!(origins.origin(c), Origin::Constant(Constant::Integer(5)));
    assert_eq!(
        origins.return_origin(),
        Some(Origin::Constant(Constant::Integer(5)))
    );
}

#[test]
fn branch_assignments_are_unknown_after_the_merge() {
    // if (cond) x = 1 else x = 2; y = x
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "diamond");
    let body = unit.get_body(&context);
    let x = Variable::get_or_create(&mut context, "x");
    let entry = body.get_entry_block(&context);
    let left = body.create_block(&mut context, Some("left".into()));
    let right = body.create_block(&mut context, Some("right".into()));
    let join = body.create_block(&mut context, Some("join".into()));
    let cond = entry.append(&mut context).call_builtin("runif", vec![]);
    entry
        .append(&mut context)
        .branch(Argument::Read(cond), left, vec![], right, vec![]);
    left.append(&mut context).store(x, int(1));
    left.append(&mut context).goto(join, vec![]);
    right.append(&mut context).store(x, int(2));
    right.append(&mut context).goto(join, vec![]);
    let y = join.append(&mut context).load(x);
    join.append(&mut context).ret(Argument::Read(y));

    let registry = registry();
    let analyses = Analyses::new(&context, &registry, unit, &config(&registry, &[ORIGINS_NAME]))
        .unwrap();
    let origins = analyses.get_cfg::<Origins>(body).unwrap();

    assert_eq!(origins.origin(y), Origin::Register(y));
    assert_eq!(
        origins.variable_origin_at(&context, Position::new(join, 0), x),
        None
    );
    assert_eq!(
        origins.variable_origin_at(&context, left.jump_position(&context), x),
        Some(Origin::Constant(Constant::Integer(1)))
    );
    assert_eq!(
        origins.variable_origin_at(&context, right.jump_position(&context), x),
        Some(Origin::Constant(Constant::Integer(2)))
    );
}

#[test]
fn conflicting_params_are_their_own_origin() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "phi");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let left = body.create_block(&mut context, None);
    let right = body.create_block(&mut context, None);
    let join = body.create_block(&mut context, None);
    let x = join.new_param(&mut context, ValueType::INTEGER);
    entry
        .append(&mut context)
        .branch(unknown_cond(), left, vec![], right, vec![]);
    left.append(&mut context).goto(join, vec![int(1)]);
    right.append(&mut context).goto(join, vec![int(2)]);
    let y = join.append(&mut context).copy(Argument::Read(x));
    join.append(&mut context).ret(Argument::Read(y));

    let origins = compute_origins(&context, body, OriginTransfer::for_unit_of(&context, body));
    assert_eq!(origins.origin(x), Origin::Register(x));
    assert_eq!(origins.origin(y), Origin::Register(x));
}

// -------------------------------------------------------------------------------------------------
// Provenance.

#[test]
fn written_once_read_twice_is_clean() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "clean");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let r = entry.append(&mut context).copy(int(1));
    entry
        .append(&mut context)
        .call_builtin("print", vec![Argument::Read(r)]);
    entry
        .append(&mut context)
        .call_builtin("print", vec![Argument::Read(r)]);
    entry.append(&mut context).ret(int(0));

    assert!(provenance_of(&context, unit).is_empty());
}

#[test]
fn read_after_use_is_reported_once() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "read_after_use");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let r = entry.append(&mut context).copy(int(1));
    entry
        .append(&mut context)
        .call_builtin("consume", vec![Argument::Use(r)]);
    entry
        .append(&mut context)
        .call_builtin("print", vec![Argument::Read(r)]);
    entry.append(&mut context).ret(int(0));

    assert_eq!(
        kinds(&provenance_of(&context, unit)),
        vec![ViolationKind::ReadAfterUse]
    );
}

#[test]
fn use_after_capture_is_reported_once() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "use_after_capture");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let r = entry.append(&mut context).copy(int(1));

    let promise = body.new_promise(&mut context);
    let prom_entry = promise.get_entry_block(&context);
    let inner = prom_entry
        .append(&mut context)
        .call_builtin("+", vec![Argument::Read(r), int(1)]);
    prom_entry.append(&mut context).ret(Argument::Use(inner));

    let p = entry.append(&mut context).mk_promise(promise);
    entry
        .append(&mut context)
        .call_builtin("consume", vec![Argument::Use(r)]);
    entry.append(&mut context).ret(Argument::Use(p));

    assert_eq!(
        kinds(&provenance_of(&context, unit)),
        vec![ViolationKind::UseAfterCapture]
    );
}

#[test]
fn redefinition_in_a_loop_after_a_use_is_write_after_use() {
    // entry -> header { r = 1; consume(use r) } -> {header, exit}
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "write_after_use");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let header = body.create_block(&mut context, Some("header".into()));
    let exit = body.create_block(&mut context, Some("exit".into()));
    entry.append(&mut context).goto(header, vec![]);
    let r = header.append(&mut context).copy(int(1));
    header
        .append(&mut context)
        .call_builtin("consume", vec![Argument::Use(r)]);
    header
        .append(&mut context)
        .branch(unknown_cond(), header, vec![], exit, vec![]);
    exit.append(&mut context).ret(int(0));

    let violations = provenance_of(&context, unit);
    assert_eq!(kinds(&violations), vec![ViolationKind::WriteAfterUse]);
    assert_eq!(violations[0].position, "header:0");
}

#[test]
fn loop_free_blocks_are_visited_once() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "diamond");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let left = body.create_block(&mut context, None);
    let right = body.create_block(&mut context, None);
    let join = body.create_block(&mut context, None);
    entry
        .append(&mut context)
        .branch(unknown_cond(), left, vec![], right, vec![]);
    left.append(&mut context).goto(join, vec![]);
    right.append(&mut context).goto(join, vec![]);
    join.append(&mut context).ret(int(0));

    let registry = registry();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &config(&registry, &[PROVENANCE_NAME]),
    )
    .unwrap();
    let provenance = analyses.get_cfg::<Provenance>(body).unwrap();
    for block in [entry, left, right, join] {
        assert_eq!(provenance.fixpoint().visits(block), 1);
    }
}

#[test]
fn extra_predecessors_only_weaken_facts() {
    fn build(extra_edge: bool) -> (Context, Unit, Block, [rir::Register; 2]) {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "weaken");
        let body = unit.get_body(&context);
        let entry = body.get_entry_block(&context);
        let middle = body.create_block(&mut context, Some("middle".into()));
        let join = body.create_block(&mut context, Some("join".into()));
        let r = entry.append(&mut context).copy(int(1));
        if extra_edge {
            entry
                .append(&mut context)
                .branch(unknown_cond(), middle, vec![], join, vec![]);
        } else {
            entry.append(&mut context).goto(middle, vec![]);
        }
        let w = middle.append(&mut context).copy(int(2));
        middle
            .append(&mut context)
            .call_builtin("consume", vec![Argument::Use(r)]);
        middle.append(&mut context).goto(join, vec![]);
        join.append(&mut context).ret(int(0));
        (context, unit, join, [r, w])
    }

    let states = [false, true].map(|extra_edge| {
        let (context, unit, join, [r, w]) = build(extra_edge);
        let registry = registry();
        let analyses = Analyses::new(
            &context,
            &registry,
            unit,
            &config(&registry, &[PROVENANCE_NAME]),
        )
        .unwrap();
        let provenance = analyses
            .get_cfg::<Provenance>(unit.get_body(&context))
            .unwrap();
        let state = provenance.state_at(&context, Position::new(join, 0));
        (state.is_written(r), state.is_written(w), state.is_used(r))
    });

    // Guarantees shrink, possibilities stay.
    assert_eq!(states[0], (true, true, true));
    assert_eq!(states[1], (true, false, true));
}

#[test]
fn reporter_sees_each_violation_once() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "dedup");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let r = entry.append(&mut context).copy(int(1));
    entry
        .append(&mut context)
        .call_builtin("consume", vec![Argument::Use(r)]);
    entry
        .append(&mut context)
        .call_builtin("consume", vec![Argument::Use(r)]);
    entry.append(&mut context).ret(int(0));

    let registry = registry();
    let reporter = SharedReporter::default();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &config(&registry, &[PROVENANCE_NAME, PROVENANCE_REPORT_NAME]),
    )
    .unwrap()
    .with_reporter(Box::new(reporter.clone()));

    let per_cfg = analyses.get_cfg::<Provenance>(body).unwrap();
    let report = analyses.get::<ProvenanceReport>().unwrap();
    assert_eq!(per_cfg.violations(), report.violations.as_slice());
    assert_eq!(report.unit, "dedup");

    let reported = reporter.0.borrow();
    assert_eq!(kinds(&reported), vec![ViolationKind::UseAfterUse]);
    assert_eq!(
        reported[0].to_string(),
        "use after use of %0 at entry:2 in body"
    );
}

/// `r = 1; f(use r); g(read r)` at the top of the entry block of `cfg`.
fn read_after_use_in(context: &mut Context, cfg: Cfg) {
    let entry = cfg.get_entry_block(context);
    let r = entry.append(context).copy(int(1));
    entry
        .append(context)
        .call_builtin("consume", vec![Argument::Use(r)]);
    entry
        .append(context)
        .call_builtin("print", vec![Argument::Read(r)]);
}

#[test]
fn equal_violations_in_different_cfgs_are_all_reported() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "twice");
    let body = unit.get_body(&context);
    let promise = body.new_promise(&mut context);
    read_after_use_in(&mut context, body);
    read_after_use_in(&mut context, promise);
    promise
        .get_entry_block(&context)
        .append(&mut context)
        .ret(int(0));
    let entry = body.get_entry_block(&context);
    let p = entry.append(&mut context).mk_promise(promise);
    entry.append(&mut context).ret(Argument::Use(p));

    let registry = registry();
    let reporter = SharedReporter::default();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &config(&registry, &[PROVENANCE_NAME, PROVENANCE_REPORT_NAME]),
    )
    .unwrap()
    .with_reporter(Box::new(reporter.clone()));

    let report = analyses.get::<ProvenanceReport>().unwrap();
    // Solving the promise on its own finds its violation again, reported only once.
    let nested = analyses.get_cfg::<Provenance>(promise).unwrap();
    assert_eq!(nested.violations().len(), 1);
    assert_eq!(nested.violations()[0].cfg, "promise1");

    let reported = reporter.0.borrow();
    assert_eq!(
        reported.iter().map(|violation| violation.to_string()).collect_vec(),
        vec![
            "read after use of %0 at entry:2 in body",
            "read after use of %0 at entry:2 in promise1",
        ]
    );
    assert_eq!(report.violations, *reported);
}

#[test]
fn the_report_reuses_the_body_provenance() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "f");
    let body = unit.get_body(&context);
    read_after_use_in(&mut context, body);
    unit.get_body(&context)
        .get_entry_block(&context)
        .append(&mut context)
        .ret(int(0));

    let registry = registry();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &AnalysesConfig::new(&[PROVENANCE_REPORT_NAME]),
    )
    .unwrap();
    assert!(matches!(
        analyses.get::<ProvenanceReport>(),
        Err(IrError::AnalysisNotRegistered(_))
    ));
}

#[test]
fn promises_created_in_a_loop_capture_on_every_iteration() {
    // entry { r = 1 } -> header { p = promise { r + 1 }; print(p) } -> {header, exit}
    // exit { consume(use r) }
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "loop_promise");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let header = body.create_block(&mut context, Some("header".into()));
    let exit = body.create_block(&mut context, Some("exit".into()));
    let r = entry.append(&mut context).copy(int(1));
    entry.append(&mut context).goto(header, vec![]);

    let promise = body.new_promise(&mut context);
    let prom_entry = promise.get_entry_block(&context);
    let t = prom_entry
        .append(&mut context)
        .call_builtin("+", vec![Argument::Read(r), int(1)]);
    prom_entry.append(&mut context).ret(Argument::Read(t));

    let p = header.append(&mut context).mk_promise(promise);
    header
        .append(&mut context)
        .call_builtin("print", vec![Argument::Read(p)]);
    header
        .append(&mut context)
        .branch(unknown_cond(), header, vec![], exit, vec![]);
    exit.append(&mut context)
        .call_builtin("consume", vec![Argument::Use(r)]);
    exit.append(&mut context).ret(int(0));

    let registry = registry();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &config(&registry, &[PROVENANCE_NAME]),
    )
    .unwrap();
    let provenance = analyses.get_cfg::<Provenance>(body).unwrap();
    assert_eq!(
        provenance
            .violations()
            .iter()
            .map(|violation| violation.to_string())
            .collect_vec(),
        vec!["use after capture of %0 at exit:0 in body"]
    );

    let fixpoint = provenance.fixpoint();
    assert_eq!(fixpoint.visits(header), 2);
    assert_eq!(fixpoint.visits(prom_entry), fixpoint.visits(header));
    let created = fixpoint
        .nested_return_state(Position::new(header, 0), promise)
        .unwrap();
    assert!(created.touched().contains(&r));
    assert!(created.is_written(t));

    let state = provenance.state_at(&context, Position::new(header, 1));
    assert!(state.is_captured(r));
    assert!(state.is_written(p));
}

#[test]
fn nested_promises_are_analyzed_through_the_registry() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "nested");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let r = entry.append(&mut context).copy(int(5));

    let promise = body.new_promise(&mut context);
    let prom_entry = promise.get_entry_block(&context);
    let a = prom_entry.append(&mut context).copy(int(7));
    let b = prom_entry.append(&mut context).copy(Argument::Read(a));
    prom_entry
        .append(&mut context)
        .call_builtin("print", vec![Argument::Read(r)]);
    prom_entry.append(&mut context).ret(Argument::Use(b));

    let p = entry.append(&mut context).mk_promise(promise);
    entry.append(&mut context).ret(Argument::Use(p));

    let registry = registry();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &config(&registry, &[ORIGINS_NAME, PROVENANCE_NAME]),
    )
    .unwrap();

    let origins = analyses.get_cfg::<Origins>(promise).unwrap();
    assert_eq!(origins.fixpoint().root(), promise);
    assert_eq!(origins.origin(b), Origin::Constant(Constant::Integer(7)));
    assert_eq!(
        origins.return_origin(),
        Some(Origin::Constant(Constant::Integer(7)))
    );
    let body_origins = analyses.get_cfg::<Origins>(body).unwrap();
    assert!(!Rc::ptr_eq(&origins, &body_origins));
    assert!(Rc::ptr_eq(
        &origins,
        &analyses.get_cfg::<Origins>(promise).unwrap()
    ));

    // Registers of the enclosing body count as written.
    let provenance = analyses.get_cfg::<Provenance>(promise).unwrap();
    assert!(provenance.is_clean());
    let at_return = provenance.state_at(&context, prom_entry.jump_position(&context));
    assert!(at_return.is_written(r));
    assert!(at_return.is_read(r));
    assert!(at_return.is_read(a));
}

// -------------------------------------------------------------------------------------------------
// Registry.

struct NeverRegistered;
impl AnalysisResultT for NeverRegistered {}

#[test]
fn unregistered_results_are_errors() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "f");
    let body = unit.get_body(&context);
    body.get_entry_block(&context)
        .append(&mut context)
        .ret(int(0));

    let registry = registry();
    let analyses = Analyses::new(
        &context,
        &registry,
        unit,
        &config(&registry, &[DOMINATORS_NAME]),
    )
    .unwrap();
    assert!(matches!(
        analyses.get::<NeverRegistered>(),
        Err(IrError::AnalysisNotRegistered(_))
    ));
    // Registered, but not active.
    assert!(matches!(
        analyses.get_cfg::<Loops>(body),
        Err(IrError::AnalysisNotRegistered(_))
    ));
    // CFG-scoped, requested unit-wide.
    assert!(matches!(
        analyses.get::<DomTree>(),
        Err(IrError::AnalysisScopeMismatch { .. })
    ));
}

#[test]
fn results_are_cached_per_cfg() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "f");
    let body = unit.get_body(&context);
    let promise = body.new_promise(&mut context);
    promise
        .get_entry_block(&context)
        .append(&mut context)
        .ret(int(1));
    let entry = body.get_entry_block(&context);
    let p = entry.append(&mut context).mk_promise(promise);
    entry.append(&mut context).ret(Argument::Read(p));

    let registry = registry();
    let analyses =
        Analyses::new(&context, &registry, unit, &AnalysesConfig::all(&registry)).unwrap();
    let first = analyses.get_cfg::<DomTree>(body).unwrap();
    let second = analyses.get_cfg::<DomTree>(body).unwrap();
    let nested = analyses.get_cfg::<DomTree>(promise).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert!(!Rc::ptr_eq(&first, &nested));
}

#[test]
fn foreign_cfgs_are_rejected() {
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "mine");
    let other = Unit::new(&mut context, "theirs");
    for u in [unit, other] {
        let body = u.get_body(&context);
        body.get_entry_block(&context)
            .append(&mut context)
            .ret(int(0));
    }

    let registry = registry();
    let analyses =
        Analyses::new(&context, &registry, unit, &AnalysesConfig::all(&registry)).unwrap();
    match analyses.get_cfg::<DomTree>(other.get_body(&context)) {
        Err(IrError::ForeignCfg(name)) => assert_eq!(name, "mine"),
        res => panic!("expected a foreign CFG error, got {:?}", res.err()),
    }
}

#[test]
fn configs_are_checked_and_serializable() {
    let registry = registry();
    assert!(matches!(
        AnalysesConfig::with_dependencies(&registry, &["no-such-analysis"]),
        Err(IrError::UnknownAnalysis(_))
    ));

    let mut context = Context::default();
    let unit = Unit::new(&mut context, "f");
    assert!(matches!(
        Analyses::new(
            &context,
            &registry,
            unit,
            &AnalysesConfig::new(&[LOOPS_NAME])
        ),
        Err(IrError::MissingAnalysisDependency { .. })
    ));

    let config = config(&registry, &[ORIGINS_NAME]);
    let json = serde_json::to_string(&config).unwrap();
    let parsed: AnalysesConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
    assert!(parsed.active.iter().any(|name| name == "def-use"));
}

#[test]
fn violations_serialize_as_json() {
    let violation = Violation {
        kind: ViolationKind::ReadAfterUse,
        register: "%3".to_owned(),
        position: "entry:1".to_owned(),
        cfg: "promise2".to_owned(),
    };
    let json = serde_json::to_value(&violation).unwrap();
    assert_eq!(json["kind"], "ReadAfterUse");
    assert_eq!(json["position"], "entry:1");
    assert_eq!(json["cfg"], "promise2");
    let back: Violation = serde_json::from_value(json).unwrap();
    assert_eq!(back, violation);
}

#[test]
fn analyses_log_through_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("rir=trace"))
        .with_test_writer()
        .try_init();

    let mut context = Context::default();
    let (unit, _) = looping_diamond(&mut context);
    let registry = registry();
    let analyses =
        Analyses::new(&context, &registry, unit, &AnalysesConfig::all(&registry)).unwrap();
    for name in registry.names() {
        assert!(analyses.is_active(name));
    }
    let body = unit.get_body(&context);
    assert!(analyses.get_cfg::<Origins>(body).is_ok());
    assert!(analyses.get_cfg::<Provenance>(body).unwrap().is_clean());
}

// -------------------------------------------------------------------------------------------------
// Verifier.

#[test]
fn well_formed_ir_verifies() {
    let mut context = Context::default();
    let (_, _) = looping_diamond(&mut context);
    assert!(context.verify().is_ok());
}

#[test]
fn verifier_rejects_malformed_ir() {
    // A block without a jump.
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "f");
    let body = unit.get_body(&context);
    body.get_entry_block(&context)
        .append(&mut context)
        .copy(int(1));
    assert!(matches!(
        context.verify(),
        Err(IrError::VerifyMissingJump(_))
    ));

    // A register defined twice.
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "f");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let r = entry.append(&mut context).copy(int(1));
    entry.append_statement(
        &mut context,
        Statement::new(Some(r), Expression::Copy(int(2))),
    );
    entry.append(&mut context).ret(Argument::Read(r));
    assert!(matches!(
        context.verify(),
        Err(IrError::VerifyRegisterRedefined(_))
    ));

    // Wrong number of block arguments.
    let mut context = Context::default();
    let unit = Unit::new(&mut context, "f");
    let body = unit.get_body(&context);
    let entry = body.get_entry_block(&context);
    let exit = body.create_block(&mut context, None);
    exit.new_param(&mut context, ValueType::INTEGER);
    entry.append(&mut context).goto(exit, vec![]);
    exit.append(&mut context).ret(int(0));
    assert!(matches!(
        context.verify(),
        Err(IrError::VerifyBranchParamsMismatch { .. })
    ));
}
