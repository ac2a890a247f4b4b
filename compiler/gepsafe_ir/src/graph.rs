//! CFG operations on [`Function`].
//!
//! Generic graph queries and the one structural mutation passes need:
//! splitting a block in front of an instruction. Passes build on these
//! rather than patching edges by hand, so every block keeps exactly one
//! terminator with valid successors at every step.

use smallvec::{smallvec, SmallVec};

use crate::ir::{Block, BlockId, Function, InstrLocation, Terminator};

/// Extract successor block IDs from a terminator.
///
/// Returns `SmallVec<[BlockId; 2]>` since no terminator has more than
/// two successors.
pub fn successors(terminator: &Terminator) -> SmallVec<[BlockId; 2]> {
    match terminator {
        Terminator::Return { .. } | Terminator::Trap | Terminator::Unreachable => SmallVec::new(),
        Terminator::Jump { target, .. } => smallvec![*target],
        Terminator::Branch {
            then_block,
            else_block,
            ..
        } => smallvec![*then_block, *else_block],
    }
}

/// Compute the predecessor list for each block (deduplicated).
///
/// Returns a vector indexed by block index.
pub fn predecessors(func: &Function) -> Vec<Vec<BlockId>> {
    let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); func.blocks.len()];
    for block in &func.blocks {
        for succ in successors(&block.terminator) {
            if let Some(list) = preds.get_mut(succ.index()) {
                if !list.contains(&block.id) {
                    list.push(block.id);
                }
            }
        }
    }
    preds
}

/// Split the block at `at.block` immediately before the instruction at
/// `at.index`.
///
/// The head keeps its ID, parameters and every instruction before the
/// split point, so its predecessors are untouched. A new continuation
/// block receives the instruction at the split point, everything after
/// it, and the original terminator. The head ends with a `Jump` to the
/// continuation until the caller replaces it.
///
/// Returns the continuation block's ID.
///
/// # Panics
///
/// Panics if `at.index` is past the end of the block body.
pub fn split_block_before(func: &mut Function, at: InstrLocation) -> BlockId {
    let continuation = func.next_block_id();
    let head = func.block_mut(at.block);
    let tail = head.body.split_off(at.index);
    let terminator = std::mem::replace(
        &mut head.terminator,
        Terminator::Jump {
            target: continuation,
            args: Vec::new(),
        },
    );
    func.push_block(Block {
        id: continuation,
        params: Vec::new(),
        body: tail,
        terminator,
    });

    tracing::trace!(
        function = %func.name,
        head = at.block.raw(),
        continuation = continuation.raw(),
        split_index = at.index,
        "split block"
    );
    continuation
}

/// Append an empty block ending in [`Terminator::Trap`] and return its ID.
pub fn push_trap_block(func: &mut Function) -> BlockId {
    let id = func.next_block_id();
    func.push_block(Block {
        id,
        params: Vec::new(),
        body: Vec::new(),
        terminator: Terminator::Trap,
    });
    id
}

#[cfg(test)]
mod tests;
