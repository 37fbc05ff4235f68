//! Dominator sets, dominator tree and related queries.
//!
//! Dominator sets are computed by the classic iterative data-flow formulation:
//! `dom(entry) = {entry}` and `dom(b) = {b} ∪ ⋂ dom(p)` over the predecessors `p` of `b`, every
//! other block starting out dominated by all blocks.

use std::fmt::Write;

use rustc_hash::FxHashSet;

use crate::{
    block::Block, Analyses, Analysis, AnalysisResult, AnalysisResultT, Cfg, Context,
    FxIndexMap, IrError, Position, PostOrder, POSTORDER_NAME,
};

/// Represents a node in the dominator tree.
pub struct DomTreeNode {
    /// The immediate dominator of self.
    pub parent: Option<Block>,
    /// The blocks that self immediately dominates.
    pub children: Vec<Block>,
    /// Every block dominating self, self included.
    pub dominators: FxHashSet<Block>,
}

impl DomTreeNode {
    pub fn new(parent: Option<Block>, dominators: FxHashSet<Block>) -> DomTreeNode {
        DomTreeNode {
            parent,
            children: vec![],
            dominators,
        }
    }
}

// The dominator tree is represented by mapping each Block to its DomTreeNode.
#[derive(Default)]
pub struct DomTree(FxIndexMap<Block, DomTreeNode>);
impl AnalysisResultT for DomTree {}

pub const DOMINATORS_NAME: &str = "dominators";

pub fn create_dominators_analysis() -> Analysis {
    Analysis::cfg::<DomTree>(
        DOMINATORS_NAME,
        "Dominator tree computation",
        vec![POSTORDER_NAME],
        compute_dom_tree_analysis,
    )
}

fn compute_dom_tree_analysis(
    context: &Context,
    cfg: Cfg,
    analyses: &Analyses,
) -> Result<AnalysisResult, IrError> {
    let po = analyses.get_cfg::<PostOrder>(cfg)?;
    let dom_tree = compute_dom_tree(context, cfg, &po);
    tracing::trace!(dot = %dom_tree.to_dot(context), "dominator tree");
    Ok(Box::new(dom_tree))
}

/// Compute the dominator tree for the CFG.
///
/// Blocks unreachable from the entry are kept in the tree.  Those without predecessors keep
/// the initial "dominated by every block" set, and none of them has an immediate dominator.
pub fn compute_dom_tree(context: &Context, cfg: Cfg, po: &PostOrder) -> DomTree {
    let entry = cfg.get_entry_block(context);
    let all_blocks: FxHashSet<Block> = cfg.block_iter(context).collect();

    let mut dom_sets: FxIndexMap<Block, FxHashSet<Block>> = cfg
        .block_iter(context)
        .map(|b| {
            if b == entry {
                (b, FxHashSet::from_iter([entry]))
            } else {
                (b, all_blocks.clone())
            }
        })
        .collect();

    // Reverse post order converges fastest; unreachable blocks go last.
    let order: Vec<Block> = po
        .rpo()
        .chain(cfg.block_iter(context).filter(|b| !po.contains(*b)))
        .filter(|b| *b != entry)
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for b in &order {
            let mut preds = b.pred_iter(context);
            let Some(first) = preds.next() else {
                continue;
            };
            let mut new_set = dom_sets[first].clone();
            for p in preds {
                let p_set = &dom_sets[p];
                new_set.retain(|d| p_set.contains(d));
            }
            new_set.insert(*b);
            if new_set != dom_sets[b] {
                dom_sets[b] = new_set;
                changed = true;
            }
        }
    }

    // The immediate dominator is the strict dominator which every other strict dominator
    // dominates, i.e. the one with the largest dominator set.
    let mut dom_tree = DomTree(
        dom_sets
            .iter()
            .map(|(b, set)| {
                let parent = if po.contains(*b) && *b != entry {
                    set.iter()
                        .filter(|d| *d != b)
                        .max_by_key(|d| dom_sets[*d].len())
                        .copied()
                } else {
                    None
                };
                (*b, DomTreeNode::new(parent, set.clone()))
            })
            .collect(),
    );

    // Build the children.
    let child_parent: Vec<_> = dom_tree
        .0
        .iter()
        .filter_map(|(n, n_node)| n_node.parent.map(|n_parent| (*n, n_parent)))
        .collect();
    for (child, parent) in child_parent {
        if let Some(parent_node) = dom_tree.0.get_mut(&parent) {
            parent_node.children.push(child);
        }
    }

    dom_tree
}

impl DomTree {
    /// Does `dominator` dominate `dominatee`?
    pub fn dominates(&self, dominator: Block, dominatee: Block) -> bool {
        self.0
            .get(&dominatee)
            .is_some_and(|node| node.dominators.contains(&dominator))
    }

    /// The full dominator set of `block`, `block` included.
    pub fn dominators(&self, block: Block) -> Option<&FxHashSet<Block>> {
        self.0.get(&block).map(|node| &node.dominators)
    }

    /// The closest strict dominator of `block`.  `None` for the entry and unreachable blocks.
    pub fn immediate_dominator(&self, block: Block) -> Option<Block> {
        self.0.get(&block).and_then(|node| node.parent)
    }

    /// Get an iterator over the children nodes
    pub fn children(&self, node: Block) -> impl Iterator<Item = Block> + '_ {
        self.0
            .get(&node)
            .into_iter()
            .flat_map(|node| node.children.iter().cloned())
    }

    /// Get i'th child of a given node
    pub fn child(&self, node: Block, i: usize) -> Option<Block> {
        self.0.get(&node).and_then(|node| node.children.get(i).cloned())
    }

    /// Does the program point `dominator` dominate `dominatee`?
    pub fn dominates_position(&self, dominator: Position, dominatee: Position) -> bool {
        if dominator.block == dominatee.block {
            dominator.index <= dominatee.index
        } else {
            self.dominates(dominator.block, dominatee.block)
        }
    }

    /// Render the tree in graphviz dot format, as a graph named `unit.cfg` with the entry block
    /// boxed.  Unreachable blocks are left out.
    pub fn to_dot(&self, context: &Context) -> String {
        let Some(entry) = self.0.keys().next() else {
            return String::new();
        };
        let cfg = entry.get_cfg(context);
        let mut res = format!(
            "digraph \"{}.{}\" {{\n",
            cfg.get_unit(context).get_name(context),
            cfg.get_name(context)
        );
        let _ = writeln!(res, "\t\"{}\" [shape=box];", entry.get_label(context));
        for (b, node) in self.0.iter() {
            if let Some(idom) = node.parent {
                let _ = writeln!(
                    res,
                    "\t\"{}\" -> \"{}\";",
                    idom.get_label(context),
                    b.get_label(context)
                );
            }
        }
        res += "}\n";
        res
    }
}
