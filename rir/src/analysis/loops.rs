//! Natural loop detection.
//!
//! An edge `tail -> header` is a back edge when `header` is on the DFS stack while `tail` is
//! visited and `header` dominates `tail`.  The loop of a back edge is the header plus every block
//! reaching the tail without passing through the header.  Loops sharing a header are one loop.

use rustc_hash::FxHashSet;

use crate::{
    block::Block, Analyses, Analysis, AnalysisResult, AnalysisResultT, Cfg, Context, DomTree,
    FxIndexMap, FxIndexSet, IrError, DOMINATORS_NAME,
};

#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: Block,
    /// Every block of the loop, the header first.
    pub blocks: FxIndexSet<Block>,
    /// Sources of the back edges into the header.
    pub tails: Vec<Block>,
}

impl NaturalLoop {
    pub fn contains(&self, block: Block) -> bool {
        self.blocks.contains(&block)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// The natural loops of a CFG, in discovery order.
#[derive(Default)]
pub struct Loops {
    loops: FxIndexMap<Block, NaturalLoop>,
    back_edges: Vec<(Block, Block)>,
}
impl AnalysisResultT for Loops {}

pub const LOOPS_NAME: &str = "loops";

pub fn create_loops_analysis() -> Analysis {
    Analysis::cfg::<Loops>(
        LOOPS_NAME,
        "Natural loops of the control-flow graph",
        vec![DOMINATORS_NAME],
        compute_loops_analysis,
    )
}

fn compute_loops_analysis(
    context: &Context,
    cfg: Cfg,
    analyses: &Analyses,
) -> Result<AnalysisResult, IrError> {
    let dom_tree = analyses.get_cfg::<DomTree>(cfg)?;
    Ok(Box::new(compute_loops(context, cfg, &dom_tree)))
}

pub fn compute_loops(context: &Context, cfg: Cfg, dom_tree: &DomTree) -> Loops {
    fn find_back_edges(
        context: &Context,
        dom_tree: &DomTree,
        block: Block,
        visited: &mut FxHashSet<Block>,
        on_stack: &mut FxHashSet<Block>,
        back_edges: &mut Vec<(Block, Block)>,
    ) {
        visited.insert(block);
        on_stack.insert(block);
        for succ in block.succ_iter(context) {
            if on_stack.contains(&succ) {
                if dom_tree.dominates(succ, block) && !back_edges.contains(&(block, succ)) {
                    back_edges.push((block, succ));
                }
            } else if !visited.contains(&succ) {
                find_back_edges(context, dom_tree, succ, visited, on_stack, back_edges);
            }
        }
        on_stack.remove(&block);
    }

    let mut back_edges = Vec::new();
    find_back_edges(
        context,
        dom_tree,
        cfg.get_entry_block(context),
        &mut FxHashSet::default(),
        &mut FxHashSet::default(),
        &mut back_edges,
    );

    let mut loops = FxIndexMap::<Block, NaturalLoop>::default();
    for (tail, header) in &back_edges {
        let natural_loop = loops.entry(*header).or_insert_with(|| NaturalLoop {
            header: *header,
            blocks: FxIndexSet::from_iter([*header]),
            tails: Vec::new(),
        });
        natural_loop.tails.push(*tail);

        let mut worklist = vec![*tail];
        while let Some(block) = worklist.pop() {
            if natural_loop.blocks.insert(block) {
                worklist.extend(block.pred_iter(context).copied());
            }
        }
    }

    Loops { loops, back_edges }
}

impl Loops {
    pub fn loops(&self) -> impl Iterator<Item = &NaturalLoop> {
        self.loops.values()
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    /// Every back edge as `(tail, header)`.
    pub fn back_edges(&self) -> &[(Block, Block)] {
        &self.back_edges
    }

    /// Is `block` the header of a loop?
    pub fn is_header(&self, block: Block) -> bool {
        self.loops.contains_key(&block)
    }

    /// The loop headed by `header`.
    pub fn get_loop(&self, header: Block) -> Option<&NaturalLoop> {
        self.loops.get(&header)
    }

    /// The loops `block` belongs to, outermost and innermost alike.
    pub fn loops_containing(&self, block: Block) -> impl Iterator<Item = &NaturalLoop> {
        self.loops
            .values()
            .filter(move |natural_loop| natural_loop.contains(block))
    }

    /// The smallest loop `block` belongs to.
    pub fn innermost_loop(&self, block: Block) -> Option<&NaturalLoop> {
        self.loops_containing(block)
            .min_by_key(|natural_loop| natural_loop.num_blocks())
    }
}
