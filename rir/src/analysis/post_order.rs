use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    block::Block, Analyses, Analysis, AnalysisResult, AnalysisResultT, Cfg, Context, IrError,
};

/// Post ordering of blocks in the CFG.
pub struct PostOrder {
    pub block_to_po: FxHashMap<Block, usize>,
    pub po_to_block: Vec<Block>,
}
impl AnalysisResultT for PostOrder {}

impl PostOrder {
    /// Is `block` reachable from the entry?
    pub fn contains(&self, block: Block) -> bool {
        self.block_to_po.contains_key(&block)
    }

    /// The reverse post order index of `block`, the entry being 0.
    pub fn rpo_index(&self, block: Block) -> Option<usize> {
        self.block_to_po
            .get(&block)
            .map(|po| self.po_to_block.len() - 1 - po)
    }

    /// Reachable blocks in reverse post order, the entry first.
    pub fn rpo(&self) -> impl DoubleEndedIterator<Item = Block> + '_ {
        self.po_to_block.iter().rev().copied()
    }

    pub fn len(&self) -> usize {
        self.po_to_block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.po_to_block.is_empty()
    }
}

pub const POSTORDER_NAME: &str = "postorder";

pub fn create_postorder_analysis() -> Analysis {
    Analysis::cfg::<PostOrder>(
        POSTORDER_NAME,
        "Postorder traversal of the control-flow graph",
        vec![],
        compute_post_order_analysis,
    )
}

pub fn compute_post_order_analysis(
    context: &Context,
    cfg: Cfg,
    _: &Analyses,
) -> Result<AnalysisResult, IrError> {
    Ok(Box::new(compute_post_order(context, cfg)))
}

/// Compute the post-order traversal of the CFG.
/// Beware: Unreachable blocks aren't part of the result.
pub fn compute_post_order(context: &Context, cfg: Cfg) -> PostOrder {
    let mut res = PostOrder {
        block_to_po: FxHashMap::default(),
        po_to_block: Vec::default(),
    };
    let entry = cfg.get_entry_block(context);

    let mut counter = 0;
    let mut visited = FxHashSet::<Block>::default();
    fn post_order(
        context: &Context,
        n: Block,
        res: &mut PostOrder,
        visited: &mut FxHashSet<Block>,
        counter: &mut usize,
    ) {
        if !visited.insert(n) {
            return;
        }
        for n_succ in n.succ_iter(context) {
            post_order(context, n_succ, res, visited, counter);
        }
        res.block_to_po.insert(n, *counter);
        res.po_to_block.push(n);
        *counter += 1;
    }
    post_order(context, entry, &mut res, &mut visited, &mut counter);

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Argument, Constant, Unit};

    #[test]
    fn unreachable_blocks_are_skipped() {
        let mut context = Context::default();
        let unit = Unit::new(&mut context, "f");
        let body = unit.get_body(&context);
        let entry = body.get_entry_block(&context);
        let then_block = body.create_block(&mut context, None);
        let else_block = body.create_block(&mut context, None);
        let dead = body.create_block(&mut context, Some("dead".into()));
        let exit = body.create_block(&mut context, None);
        entry.append(&mut context).branch(
            Argument::Constant(Constant::Logical(Some(true))),
            then_block,
            vec![],
            else_block,
            vec![],
        );
        then_block.append(&mut context).goto(exit, vec![]);
        else_block.append(&mut context).goto(exit, vec![]);
        dead.append(&mut context).goto(exit, vec![]);
        exit.append(&mut context).ret(Argument::Constant(Constant::Nil));

        let po = compute_post_order(&context, body);
        assert_eq!(po.len(), 4);
        assert!(!po.contains(dead));
        assert_eq!(po.rpo().next(), Some(entry));
        assert_eq!(po.rpo_index(entry), Some(0));
        assert_eq!(po.rpo_index(exit), Some(3));
        assert!(po.rpo_index(then_block) < po.rpo_index(exit));
    }
}
