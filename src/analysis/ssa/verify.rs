//! Structural verification of SSA functions.
//!
//! The verifier checks the invariants every transformation in this crate relies on:
//!
//! - the entry block exists and every live block ends in exactly one terminator
//! - branch targets are live blocks
//! - every phi has exactly one operand per distinct predecessor of its block
//! - every variable's recorded definition site points back at its definition
//! - no operand refers to an unplaced variable
//! - in reachable code, definitions dominate their uses; a phi operand counts as a
//!   use at the end of its predecessor
//!
//! Verification stops at the first violation and reports it as
//! [`Error::Verification`].

use std::collections::{HashMap, HashSet};

use crate::{
    analysis::ssa::{DefSite, InstId, SsaFunction, SsaOp, SsaType, SsaVarId},
    utils::graph::{
        algorithms::{compute_dominators, DominatorTree},
        NodeId,
    },
    Error, Result,
};

fn fail<T>(message: String) -> Result<T> {
    Err(Error::Verification(message))
}

/// Verifies `ssa`.
///
/// # Errors
///
/// Returns [`Error::Verification`] describing the first violated rule.
pub fn verify(ssa: &SsaFunction) -> Result<()> {
    let entry = ssa.entry_block();
    if !ssa.is_live_block(entry) {
        return fail(format!("{}: entry block b{} does not exist", ssa.name(), entry));
    }

    check_terminators(ssa)?;
    check_phis(ssa)?;
    let positions = check_definitions(ssa)?;
    let dom = compute_dominators(ssa, NodeId::new(entry));
    check_dominance(ssa, &dom, &positions)
}

fn check_terminators(ssa: &SsaFunction) -> Result<()> {
    for block in ssa.live_blocks() {
        let ops: Vec<_> = ssa.block_ops(block).collect();
        let Some((_, last)) = ops.last() else {
            return fail(format!("b{} is empty", block));
        };
        if !last.is_terminator() {
            return fail(format!("b{} does not end in a terminator", block));
        }
        if ops[..ops.len() - 1].iter().any(|(_, op)| op.is_terminator()) {
            return fail(format!("b{} has a terminator before its end", block));
        }
        for target in last.successors() {
            if !ssa.is_live_block(target) {
                return fail(format!("b{} branches to missing block b{}", block, target));
            }
        }
        if let Some(SsaOp::Branch { condition, .. }) = ssa.terminator(block) {
            if ssa.var_type(*condition) != SsaType::Bool {
                return fail(format!("b{} branches on non-boolean {}", block, condition));
            }
        }
    }
    Ok(())
}

fn check_phis(ssa: &SsaFunction) -> Result<()> {
    for block in ssa.live_blocks() {
        let preds: HashSet<usize> = ssa.block_predecessors(block).into_iter().collect();
        let Some(b) = ssa.block(block) else {
            continue;
        };
        for phi in b.phi_nodes() {
            let mut seen = HashSet::new();
            for operand in phi.operands() {
                if !preds.contains(&operand.predecessor()) {
                    return fail(format!(
                        "phi {} in b{} has an operand for non-predecessor b{}",
                        phi.result(),
                        block,
                        operand.predecessor()
                    ));
                }
                if !seen.insert(operand.predecessor()) {
                    return fail(format!(
                        "phi {} in b{} has two operands for b{}",
                        phi.result(),
                        block,
                        operand.predecessor()
                    ));
                }
            }
            if seen.len() != preds.len() {
                return fail(format!(
                    "phi {} in b{} has {} operands for {} predecessors",
                    phi.result(),
                    block,
                    seen.len(),
                    preds.len()
                ));
            }
        }
    }
    Ok(())
}

/// Checks def sites and returns the position of every instruction within its block.
fn check_definitions(ssa: &SsaFunction) -> Result<HashMap<InstId, usize>> {
    let mut positions = HashMap::new();
    for block in ssa.live_blocks() {
        let Some(b) = ssa.block(block) else {
            continue;
        };
        for phi in b.phi_nodes() {
            if ssa.def_site(phi.result()) != DefSite::Phi(block) {
                return fail(format!("phi {} in b{} is not its recorded definition", phi.result(), block));
            }
        }
        for (position, (id, op)) in ssa.block_ops(block).enumerate() {
            positions.insert(id, position);
            if ssa.inst(id).map(|i| i.block) != Some(block) {
                return fail(format!("instruction {} is listed in b{} but placed elsewhere", id, block));
            }
            if let Some(dest) = op.dest() {
                if ssa.def_site(dest) != DefSite::Instruction(id) {
                    return fail(format!("{} is defined by {} but recorded elsewhere", dest, id));
                }
            }
        }
    }
    Ok(positions)
}

fn check_dominance(
    ssa: &SsaFunction,
    dom: &DominatorTree,
    positions: &HashMap<InstId, usize>,
) -> Result<()> {
    let dominates_end_of = |var: SsaVarId, block: usize| -> Result<bool> {
        Ok(match ssa.def_site(var) {
            DefSite::Param(_) => true,
            DefSite::Phi(def_block) => dom.dominates(NodeId::new(def_block), NodeId::new(block)),
            DefSite::Instruction(id) => match ssa.inst(id) {
                Some(inst) => dom.dominates(NodeId::new(inst.block), NodeId::new(block)),
                None => return fail(format!("{} refers to an erased definition", var)),
            },
            DefSite::Unplaced => return fail(format!("use of unplaced variable {}", var)),
        })
    };

    for block in ssa.live_blocks() {
        let reachable = dom.is_reachable(NodeId::new(block));
        let Some(b) = ssa.block(block) else {
            continue;
        };

        for phi in b.phi_nodes() {
            for operand in phi.operands() {
                let value = operand.value();
                if ssa.variable(value).is_none() {
                    return fail(format!("phi {} reads unknown variable {}", phi.result(), value));
                }
                let pred = operand.predecessor();
                let ok = dominates_end_of(value, pred)?;
                if reachable && dom.is_reachable(NodeId::new(pred)) && !ok {
                    return fail(format!(
                        "{} does not dominate the end of b{} feeding phi {}",
                        value,
                        pred,
                        phi.result()
                    ));
                }
            }
        }

        for (position, (id, op)) in ssa.block_ops(block).enumerate() {
            for var in op.uses() {
                if ssa.variable(var).is_none() {
                    return fail(format!("{} reads unknown variable {}", id, var));
                }
                let ok = match ssa.def_site(var) {
                    DefSite::Instruction(def) if ssa.inst(def).is_some_and(|i| i.block == block) => {
                        positions.get(&def).is_some_and(|&p| p < position)
                    }
                    _ => dominates_end_of(var, block)?,
                };
                if reachable && !ok {
                    return fail(format!("{} in b{} is not dominated by the definition of {}", op, block, var));
                }
            }
        }
    }
    Ok(())
}
