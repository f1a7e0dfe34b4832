//! CFG surgery shared by the rewrites.
//!
//! Each helper edits the function and then reports the edit to the dominator
//! tree, the loop forest and scalar evolution held in [`FunctionAnalyses`].

use log::trace;

use crate::{
    analysis::{ssa::SsaOp, SsaFunction},
    compiler::analyses::FunctionAnalyses,
    utils::graph::{algorithms::DomTreeUpdate, NodeId},
    Result,
};

/// Deletes the loop headed by `header`.
///
/// The preheader is redirected to the loop's unique exit block, exit phis take the
/// value they received from the first exiting block from the preheader instead,
/// and every block of the loop is removed. Values computed in the loop must not
/// be used outside of it.
///
/// # Errors
///
/// Returns [`Error::Malformed`](crate::Error::Malformed) if the loop does not
/// exist, has no preheader or has no unique exit block.
pub fn delete_dead_loop(
    ssa: &mut SsaFunction,
    analyses: &mut FunctionAnalyses,
    header: NodeId,
) -> Result<()> {
    let info = analyses
        .loops
        .loop_for_header(header)
        .ok_or_else(|| malformed_error!("no loop headed by {}", header))?;
    let preheader = info
        .preheader(ssa)
        .ok_or_else(|| malformed_error!("loop {} has no preheader", header))?;
    let exit = info
        .unique_exit_block(ssa)
        .ok_or_else(|| malformed_error!("loop {} has no unique exit block", header))?;
    let blocks = info.blocks();
    let exit_edges = info.exit_edges(ssa);

    // Exit phis keep one incoming value, now flowing in from the preheader.
    if let Some(&(first_exiting, _)) = exit_edges.first() {
        let phis: Vec<_> = ssa
            .block(exit.index())
            .map(|b| b.phi_nodes().iter().map(|p| p.result()).collect())
            .unwrap_or_default();
        for phi in phis {
            if let Some(node) = ssa.phi_mut(exit.index(), phi) {
                for &block in &blocks {
                    if block != first_exiting {
                        node.remove_operand(block.index());
                    }
                }
                node.rename_predecessor(first_exiting.index(), preheader.index());
            }
        }
    }

    let mut updates = vec![
        DomTreeUpdate::insert(preheader, exit),
        DomTreeUpdate::delete(preheader, header),
    ];
    ssa.redirect_edge(preheader.index(), header.index(), exit.index());

    for &block in &blocks {
        for succ in ssa.block_successors(block.index()) {
            updates.push(DomTreeUpdate::delete(block.index(), succ));
        }
    }
    for &block in &blocks {
        ssa.remove_block(block.index());
    }
    analyses.dom.apply_updates(&*ssa, &updates)?;

    analyses.loops.remove_loop(header);
    for &block in &blocks {
        analyses.loops.remove_block(block);
    }
    analyses.se.forget_loop(header);

    trace!("deleted loop {} ({} blocks)", header, blocks.len());
    Ok(())
}

/// Merges the single predecessor of `block` into `block`.
///
/// The predecessor must end in an unconditional jump to `block`. Phis of `block`
/// are folded, the predecessor's phis and instructions move to the front of
/// `block`, the predecessor's own predecessors branch to `block` directly and the
/// predecessor is removed. If the predecessor was the entry block, `block`
/// becomes the entry.
///
/// # Errors
///
/// Returns [`Error::Malformed`](crate::Error::Malformed) if `block` does not have
/// exactly one predecessor or that predecessor has another successor.
pub fn merge_block_into_only_pred(
    ssa: &mut SsaFunction,
    analyses: &mut FunctionAnalyses,
    block: usize,
) -> Result<()> {
    let pred = single_predecessor_jump(ssa, block)?;

    fold_single_entry_phis(ssa, block, pred);

    let pred_preds = ssa.block_predecessors(pred);
    let mut updates = vec![DomTreeUpdate::delete(pred, block)];
    for &p in &pred_preds {
        ssa.redirect_edge(p, pred, block);
        updates.push(DomTreeUpdate::delete(p, pred));
        updates.push(DomTreeUpdate::insert(p, block));
    }

    ssa.move_phis(pred, block);
    ssa.splice_to_front(pred, block);
    ssa.remove_block(pred);

    if ssa.entry_block() == pred {
        ssa.set_entry_block(block);
        analyses.dom.recompute_with_entry(&*ssa, NodeId::new(block));
    } else {
        analyses.dom.apply_updates(&*ssa, &updates)?;
    }
    analyses.loops.remove_block(NodeId::new(pred));

    trace!("merged b{} into its successor b{}", pred, block);
    Ok(())
}

/// Returns the single predecessor of `block` if it jumps unconditionally to it.
fn single_predecessor_jump(ssa: &SsaFunction, block: usize) -> Result<usize> {
    let preds = ssa.block_predecessors(block);
    let [pred] = preds.as_slice() else {
        return Err(malformed_error!(
            "b{} has {} predecessors, expected one",
            block,
            preds.len()
        ));
    };
    match ssa.terminator(*pred) {
        Some(SsaOp::Jump { target }) if *target == block && *pred != block => Ok(*pred),
        _ => Err(malformed_error!(
            "predecessor b{} of b{} does not jump unconditionally to it",
            pred,
            block
        )),
    }
}

/// Replaces every phi of `block` by the value it receives from `pred`.
fn fold_single_entry_phis(ssa: &mut SsaFunction, block: usize, pred: usize) {
    let phis: Vec<_> = ssa
        .block(block)
        .map(|b| {
            b.phi_nodes()
                .iter()
                .map(|p| (p.result(), p.value_from(pred)))
                .collect()
        })
        .unwrap_or_default();
    for (result, value) in phis {
        ssa.remove_phi(block, result);
        if let Some(value) = value {
            ssa.replace_all_uses(result, value);
        }
    }
}
