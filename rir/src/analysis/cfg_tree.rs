//! The nesting tree of the CFGs of a unit: the body at the root, every promise body below the CFG
//! creating it.

use crate::{
    Analyses, Analysis, AnalysisResult, AnalysisResultT, Cfg, Context, FxIndexMap, IrError,
    Position, Unit,
};

pub struct CfgTreeNode {
    pub parent: Option<Cfg>,
    /// The `MkPromise` statements creating this CFG.  Empty for the body.
    pub created_at: Vec<Position>,
    pub children: Vec<Cfg>,
}

pub struct CfgTree {
    root: Cfg,
    nodes: FxIndexMap<Cfg, CfgTreeNode>,
}
impl AnalysisResultT for CfgTree {}

pub const CFG_TREE_NAME: &str = "cfg-tree";

pub fn create_cfg_tree_analysis() -> Analysis {
    Analysis::unit::<CfgTree>(
        CFG_TREE_NAME,
        "Nesting of promise bodies within the unit",
        vec![],
        compute_cfg_tree_analysis,
    )
}

fn compute_cfg_tree_analysis(
    context: &Context,
    unit: Unit,
    _: &Analyses,
) -> Result<AnalysisResult, IrError> {
    Ok(Box::new(compute_cfg_tree(context, unit)))
}

pub fn compute_cfg_tree(context: &Context, unit: Unit) -> CfgTree {
    let mut nodes: FxIndexMap<Cfg, CfgTreeNode> = unit
        .cfg_iter(context)
        .map(|cfg| {
            (
                cfg,
                CfgTreeNode {
                    parent: cfg.get_parent(context),
                    created_at: Vec::new(),
                    children: Vec::new(),
                },
            )
        })
        .collect();

    for cfg in unit.cfg_iter(context) {
        for (pos, body) in cfg.promise_iter(context) {
            if let Some(node) = nodes.get_mut(&body) {
                node.created_at.push(pos);
            }
            if let Some(node) = nodes.get_mut(&cfg) {
                if !node.children.contains(&body) {
                    node.children.push(body);
                }
            }
        }
    }

    CfgTree {
        root: unit.get_body(context),
        nodes,
    }
}

impl CfgTree {
    pub fn root(&self) -> Cfg {
        self.root
    }

    pub fn parent(&self, cfg: Cfg) -> Option<Cfg> {
        self.nodes.get(&cfg).and_then(|node| node.parent)
    }

    /// The promise bodies created directly within `cfg`.
    pub fn children(&self, cfg: Cfg) -> &[Cfg] {
        self.nodes
            .get(&cfg)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn created_at(&self, cfg: Cfg) -> &[Position] {
        self.nodes
            .get(&cfg)
            .map(|node| node.created_at.as_slice())
            .unwrap_or_default()
    }

    /// Iterate from `cfg` up to the root, `cfg` first.
    pub fn ancestors(&self, cfg: Cfg) -> impl Iterator<Item = Cfg> + '_ {
        std::iter::successors(
            self.nodes.contains_key(&cfg).then_some(cfg),
            move |cfg| self.parent(*cfg),
        )
    }

    /// Every CFG nested (transitively) within `cfg`, pre-order, excluding `cfg` itself.
    pub fn descendants(&self, cfg: Cfg) -> Vec<Cfg> {
        let mut res = Vec::new();
        let mut stack: Vec<Cfg> = self.children(cfg).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            res.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        res
    }

    /// Nesting depth of `cfg`, the root being 0.
    pub fn depth(&self, cfg: Cfg) -> usize {
        self.ancestors(cfg).count().saturating_sub(1)
    }

    pub fn cfg_iter(&self) -> impl Iterator<Item = Cfg> + '_ {
        self.nodes.keys().copied()
    }
}
