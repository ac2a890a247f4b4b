//! Guard insertion.
//!
//! Turns a [`Condition`] into IR in front of an address computation and
//! reroutes control flow so the computation only runs when the condition
//! holds:
//!
//! ```text
//! head:                            head:
//!   ...                              ...
//!   %p = getelementptr ...    =>     <range checks>
//!   rest                             %bad = xor %ok, true
//!   <terminator>                     br %bad, trap, cont
//!                                  cont:
//!                                    %p = getelementptr ..., !guarded
//!                                    rest
//!                                    <terminator>
//!                                  trap:
//!                                    trap
//! ```

use gepsafe_ir::graph::{push_trap_block, split_block_before};
use gepsafe_ir::{
    BlockId, CastOp, Constant, Function, GepFlags, Instr, InstrInserter, InstrLocation, Operand,
    Terminator, TypeId, TypePool, ValueId,
};

use crate::alloc_size::ElementCount;
use crate::bounds::{Condition, RangeCheck, UpperBound};

/// Blocks and values created for one guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Guard {
    /// The original block, now ending in the conditional branch.
    pub head: BlockId,
    /// Holds the guarded computation and everything after it.
    pub continuation: BlockId,
    /// Reached when the condition fails.
    pub trap: BlockId,
    /// `i1` that is true when some index is out of range.
    pub violated: ValueId,
    /// Instructions inserted into the head.
    pub instrs_inserted: usize,
}

/// Guard the address computation at `at` with `condition`.
///
/// `at` must point at the address computation itself. Cannot fail: the
/// condition was validated when it was synthesized.
pub fn insert_guard(
    func: &mut Function,
    pool: &TypePool,
    at: InstrLocation,
    condition: &Condition,
) -> Guard {
    let mut ins = InstrInserter::before(func, at);

    let mut safe: Option<ValueId> = None;
    for check in condition.checks() {
        let ok = materialize_check(&mut ins, pool, check);
        safe = Some(match safe {
            None => ok,
            Some(acc) => ins.and(Operand::Value(acc), Operand::Value(ok)),
        });
    }
    let safe = safe.map_or(Operand::bool(true), Operand::Value);
    let violated = ins.not(safe);
    let gep_at = ins.position();
    let instrs_inserted = ins.inserted();

    let continuation = split_block_before(func, gep_at);
    let trap = push_trap_block(func);
    func.block_mut(at.block).terminator = Terminator::Branch {
        cond: Operand::Value(violated),
        then_block: trap,
        else_block: continuation,
    };

    let moved = InstrLocation {
        block: continuation,
        index: 0,
    };
    if let Some(Instr::Gep { flags, .. }) = func.instr_mut(moved) {
        flags.insert(GepFlags::GUARDED);
    }

    Guard {
        head: at.block,
        continuation,
        trap,
        violated,
        instrs_inserted,
    }
}

/// Emit `(idx < upper) & (idx >= 0)` with signed comparisons in `i64`.
///
/// Narrow indices are sign-extended and counts zero-extended, so an upper
/// bound that does not fit the index type still compares correctly.
fn materialize_check(ins: &mut InstrInserter<'_>, pool: &TypePool, check: &RangeCheck) -> ValueId {
    let index = widen_index(ins, pool, check.index);
    let upper = match &check.upper {
        UpperBound::Static(len) => Operand::i64(saturating_i64(*len)),
        UpperBound::Allocation(count) => materialize_count(ins, pool, count),
    };

    let lt = ins.icmp_slt(index, upper);
    let ge = ins.icmp_sge(index, Operand::i64(0));
    ins.and(Operand::Value(lt), Operand::Value(ge))
}

/// Sign-extend an index to `i64`. Constants are extended in place.
fn widen_index(ins: &mut InstrInserter<'_>, pool: &TypePool, index: Operand) -> Operand {
    if let Operand::Const(Constant::Int { ty, value }) = index {
        let bits = pool.int_bits(ty).unwrap_or(64).clamp(1, 64);
        let shift = 64 - bits;
        return Operand::i64((value << shift) >> shift);
    }
    widen_to_i64(ins, pool, index, CastOp::SExt)
}

/// Emit `count` as an `i64`, folding fully constant counts.
fn materialize_count(ins: &mut InstrInserter<'_>, pool: &TypePool, count: &ElementCount) -> Operand {
    if let Some(folded) = count.fold(pool) {
        return Operand::i64(saturating_i64(folded));
    }
    match count {
        ElementCount::Value(op) => widen_to_i64(ins, pool, *op, CastOp::ZExt),
        ElementCount::Rescaled {
            source,
            from_bits,
            to_bits,
        } => {
            let source = materialize_count(ins, pool, source);
            let scaled = ins.mul(source, Operand::i64(saturating_i64(*from_bits)));
            let units = ins.udiv(Operand::Value(scaled), Operand::i64(saturating_i64(*to_bits)));
            Operand::Value(units)
        }
    }
}

/// Extend an integer narrower than 64 bits to `i64` with `op`.
fn widen_to_i64(ins: &mut InstrInserter<'_>, pool: &TypePool, value: Operand, op: CastOp) -> Operand {
    let ty = ins.func().operand_type(&value);
    match pool.int_bits(ty) {
        Some(bits) if bits < 64 => Operand::Value(ins.cast(op, value, TypeId::I64)),
        _ => value,
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
