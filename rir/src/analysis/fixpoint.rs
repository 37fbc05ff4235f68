//! A generic forward abstract interpreter over CFGs.
//!
//! An analysis defines its lattice by implementing [`AbstractState`] and its transfer functions by
//! implementing [`Transfer`].  [`solve`] computes, for every reachable block, an entry state which
//! is a fixpoint of the transfer functions and the merge, plus the merged state at every `Return`.
//!
//! Nested CFGs (promise bodies) never enter the outer worklist.  When a `MkPromise` statement is
//! evaluated the nested CFG is solved to completion on the spot, and an analysis may do the same
//! for a forced promise through [`Evaluator::run_nested`].
//!
//! States are stored per block only; [`Fixpoint::state_at`] replays the block prefix to answer a
//! query at an arbitrary position.  The return state of every nested evaluation is kept per
//! evaluating position, so a replay sees exactly what the solve saw there.

use std::collections::{btree_map, hash_map, BTreeMap};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    block::Block, compute_post_order, BranchToWithArgs, Cfg, Context, Jump, Position, Statement,
};

/// The lattice of an analysis.
///
/// `Default` is the "no information" value returned for unreached program points.  The engine
/// assumes that the lattice has a finite height and that the transfer functions are monotone; it
/// does not check either.
pub trait AbstractState: Clone + Default {
    /// Merge `other` into `self`, returning whether `self` changed.
    ///
    /// Must be commutative, associative and idempotent.
    fn merge(&mut self, other: &Self) -> bool;
}

/// Transfer functions of a forward analysis.
pub trait Transfer: Sized {
    type State: AbstractState;
    /// Accumulated side results, only available while solving (never during replay).
    type Acc;

    /// Evaluate `stmt` at `pos`.
    fn apply(
        &self,
        eval: &mut Evaluator<'_, Self>,
        state: &mut Self::State,
        pos: Position,
        stmt: &Statement,
    );

    /// Evaluate the block terminator.  The resulting state flows into every edge (and into the
    /// return state for `Return`).
    fn apply_jump(
        &self,
        _eval: &mut Evaluator<'_, Self>,
        _state: &mut Self::State,
        _pos: Position,
        _jump: &Jump,
    ) {
    }

    /// Adjust the state flowing along the edge leaving the jump at `pos` into `target`, e.g. to
    /// bind the target's params to the edge arguments.
    fn enter_block(
        &self,
        _eval: &mut Evaluator<'_, Self>,
        _state: &mut Self::State,
        _pos: Position,
        _target: &BranchToWithArgs,
    ) {
    }

    /// The entry state of a promise body created or forced in `state`.
    fn nested_entry(&self, state: &Self::State) -> Self::State {
        state.clone()
    }

    /// Fold the return state of the promise `body`, created at `pos`, into `state`.  Called
    /// before [`Transfer::apply`] for the creating statement.
    fn promise_created(
        &self,
        _eval: &mut Evaluator<'_, Self>,
        _state: &mut Self::State,
        _pos: Position,
        _body: Cfg,
        _nested_return: &Self::State,
    ) {
    }
}

/// The solution of an analysis for one root CFG and every promise body reached from it.
pub struct Fixpoint<S> {
    root: Cfg,
    entry_states: FxHashMap<Block, S>,
    return_states: FxHashMap<Cfg, S>,
    /// Return states of nested CFGs by the position evaluating them.
    nested_returns: FxHashMap<(Position, Cfg), S>,
    solved: FxHashSet<Cfg>,
    visits: FxHashMap<Block, usize>,
}

impl<S: AbstractState> Fixpoint<S> {
    fn new(root: Cfg) -> Fixpoint<S> {
        Fixpoint {
            root,
            entry_states: FxHashMap::default(),
            return_states: FxHashMap::default(),
            nested_returns: FxHashMap::default(),
            solved: FxHashSet::default(),
            visits: FxHashMap::default(),
        }
    }

    pub fn root(&self) -> Cfg {
        self.root
    }

    /// The fixpoint entry state of `block`, `None` if it was never reached.
    ///
    /// The entry states of a promise body solved several times (once per creating or forcing
    /// evaluation) are merged over all of them.
    pub fn entry_state(&self, block: Block) -> Option<&S> {
        self.entry_states.get(&block)
    }

    /// Merged state over every `Return` of `cfg`, `None` if `cfg` never returns or was never
    /// solved.
    pub fn return_state(&self, cfg: Cfg) -> Option<&S> {
        self.return_states.get(&cfg)
    }

    /// Return state of the nested CFG `cfg` as evaluated at `pos`, merged over every time the
    /// solve evaluated `pos`.
    pub fn nested_return_state(&self, pos: Position, cfg: Cfg) -> Option<&S> {
        self.nested_returns.get(&(pos, cfg))
    }

    /// Was `cfg` solved, i.e. is it the root or a promise body reached from it?
    pub fn is_solved(&self, cfg: Cfg) -> bool {
        self.solved.contains(&cfg)
    }

    /// How many times the transfer functions of `block` ran while solving.
    pub fn visits(&self, block: Block) -> usize {
        self.visits.get(&block).copied().unwrap_or(0)
    }

    /// The state right before `pos`, i.e. before the statement (or jump) it addresses.
    ///
    /// An unreached position yields `S::default()`.
    pub fn state_at<T: Transfer<State = S>>(
        &self,
        context: &Context,
        transfer: &T,
        pos: Position,
    ) -> S {
        let Some(entry) = self.entry_states.get(&pos.block) else {
            return S::default();
        };
        let mut state = entry.clone();
        let mut eval = Evaluator {
            context,
            results: Results::Replaying(self),
            acc: None,
            in_progress: Vec::new(),
        };
        for (index, stmt) in pos
            .block
            .statement_iter(context)
            .enumerate()
            .take(pos.index)
        {
            eval.step(transfer, &mut state, Position::new(pos.block, index), stmt);
        }
        state
    }

    /// The state right after the jump of `block`, before any edge adjustment.
    pub fn exit_state<T: Transfer<State = S>>(
        &self,
        context: &Context,
        transfer: &T,
        block: Block,
    ) -> S {
        let pos = block.jump_position(context);
        let mut state = self.state_at(context, transfer, pos);
        if !self.entry_states.contains_key(&block) {
            return state;
        }
        if let Some(jump) = block.get_jump(context) {
            let mut eval = Evaluator {
                context,
                results: Results::Replaying(self),
                acc: None,
                in_progress: Vec::new(),
            };
            transfer.apply_jump(&mut eval, &mut state, pos, jump);
        }
        state
    }
}

/// Solve `transfer` over `cfg`, starting with `entry` as the state of the entry block.
pub fn solve<T: Transfer>(
    context: &Context,
    transfer: &T,
    cfg: Cfg,
    entry: T::State,
    acc: Option<&mut T::Acc>,
) -> Fixpoint<T::State> {
    let mut fixpoint = Fixpoint::new(cfg);
    let mut eval = Evaluator {
        context,
        results: Results::Solving(&mut fixpoint),
        acc,
        in_progress: Vec::new(),
    };
    eval.solve_cfg(transfer, cfg, entry);
    fixpoint
}

enum Results<'a, S> {
    Solving(&'a mut Fixpoint<S>),
    Replaying(&'a Fixpoint<S>),
}

/// The evaluation context handed to the transfer functions.
pub struct Evaluator<'a, T: Transfer> {
    context: &'a Context,
    results: Results<'a, T::State>,
    acc: Option<&'a mut T::Acc>,
    /// CFGs currently being solved, innermost last.
    in_progress: Vec<Cfg>,
}

impl<'a, T: Transfer> Evaluator<'a, T> {
    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// Is this a replay for a point query rather than the solve itself?
    pub fn is_replay(&self) -> bool {
        matches!(self.results, Results::Replaying(_))
    }

    /// The accumulator, only while solving.
    pub fn acc(&mut self) -> Option<&mut T::Acc> {
        self.acc.as_deref_mut()
    }

    /// Solve the nested CFG `cfg`, evaluated by the statement at `pos`, to completion from
    /// `entry` and return its return state.
    ///
    /// During a replay nothing is solved again; the return state stored for `pos` is returned
    /// instead.  A body which never returns, or which is forced from within itself, yields
    /// `T::State::default()`.
    pub fn run_nested(
        &mut self,
        transfer: &T,
        pos: Position,
        cfg: Cfg,
        entry: T::State,
    ) -> T::State {
        match &self.results {
            Results::Replaying(fixpoint) => fixpoint
                .nested_returns
                .get(&(pos, cfg))
                .cloned()
                .unwrap_or_default(),
            Results::Solving(_) if self.in_progress.contains(&cfg) => {
                tracing::trace!(cfg = ?cfg, "recursive promise evaluation");
                T::State::default()
            }
            Results::Solving(_) => {
                let returned = self.solve_cfg(transfer, cfg, entry);
                if let Results::Solving(fixpoint) = &mut self.results {
                    merge_into(&mut fixpoint.nested_returns, (pos, cfg), returned.clone());
                }
                returned
            }
        }
    }

    fn step(&mut self, transfer: &T, state: &mut T::State, pos: Position, stmt: &Statement) {
        if let Some(body) = stmt.get_promise_body() {
            let nested_entry = transfer.nested_entry(state);
            let nested_return = self.run_nested(transfer, pos, body, nested_entry);
            transfer.promise_created(self, state, pos, body, &nested_return);
        }
        transfer.apply(self, state, pos, stmt);
    }

    fn solve_cfg(&mut self, transfer: &T, cfg: Cfg, entry: T::State) -> T::State {
        let context = self.context;
        let po = compute_post_order(context, cfg);
        self.in_progress.push(cfg);

        let mut entry_states = FxHashMap::<Block, T::State>::default();
        let mut visits = FxHashMap::<Block, usize>::default();
        let mut returned: Option<T::State> = None;

        // Pending states keyed by reverse post order index, coalesced per block.
        let mut pending = BTreeMap::<usize, T::State>::new();
        pending.insert(0, entry);

        while let Some((rpo_idx, incoming)) = pending.pop_first() {
            let block = po.po_to_block[po.len() - 1 - rpo_idx];
            let mut state = match entry_states.entry(block) {
                hash_map::Entry::Occupied(mut current) => {
                    if !current.get_mut().merge(&incoming) {
                        continue;
                    }
                    current.get().clone()
                }
                hash_map::Entry::Vacant(slot) => slot.insert(incoming).clone(),
            };
            *visits.entry(block).or_default() += 1;

            for (index, stmt) in block.statement_iter(context).enumerate() {
                self.step(transfer, &mut state, Position::new(block, index), stmt);
            }

            let Some(jump) = block.get_jump(context) else {
                continue;
            };
            let jump_pos = block.jump_position(context);
            transfer.apply_jump(self, &mut state, jump_pos, jump);

            if let Jump::Return(_) = jump {
                match &mut returned {
                    Some(returned) => {
                        returned.merge(&state);
                    }
                    None => returned = Some(state.clone()),
                }
            }
            for target in jump.targets() {
                let mut edge_state = state.clone();
                transfer.enter_block(self, &mut edge_state, jump_pos, target);
                let Some(target_idx) = po.rpo_index(target.block) else {
                    continue;
                };
                match pending.entry(target_idx) {
                    btree_map::Entry::Occupied(mut queued) => {
                        queued.get_mut().merge(&edge_state);
                    }
                    btree_map::Entry::Vacant(slot) => {
                        slot.insert(edge_state);
                    }
                }
            }
        }

        self.in_progress.pop();
        tracing::trace!(
            cfg = ?cfg,
            blocks = entry_states.len(),
            visits = visits.values().sum::<usize>(),
            returns = returned.is_some(),
            "solved CFG"
        );

        if let Results::Solving(fixpoint) = &mut self.results {
            fixpoint.solved.insert(cfg);
            for (block, state) in entry_states {
                merge_into(&mut fixpoint.entry_states, block, state);
            }
            for (block, count) in visits {
                *fixpoint.visits.entry(block).or_default() += count;
            }
            if let Some(returned) = &returned {
                merge_into(&mut fixpoint.return_states, cfg, returned.clone());
            }
        }

        returned.unwrap_or_default()
    }
}

fn merge_into<K: std::hash::Hash + Eq, S: AbstractState>(
    map: &mut FxHashMap<K, S>,
    key: K,
    state: S,
) {
    match map.entry(key) {
        hash_map::Entry::Occupied(mut current) => {
            current.get_mut().merge(&state);
        }
        hash_map::Entry::Vacant(slot) => {
            slot.insert(state);
        }
    }
}
