//! Bounds condition synthesis.
//!
//! Walks the index chain of one address computation against the static
//! type structure and decides, step by step, whether the index needs a
//! runtime range check and against which upper bound.
//!
//! | Type reached | Action |
//! |---|---|
//! | array `[N x T]` | check `0 <= idx < N`, continue into `T` |
//! | struct | index must be a constant field number, no check |
//! | pointer (step 0 only) | check against the allocation size if tracked, else skip |
//! | vector, scalar | contract violation |

use gepsafe_ir::{
    Function, GepFlags, Instr, InstrLocation, Operand, TypeKind, TypePool, ValueId,
};

use crate::alloc_size::{AllocationMap, ElementCount};
use crate::error::ContractViolation;

/// Exclusive upper bound of one range check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpperBound {
    /// Array length known from the type.
    Static(u64),
    /// Element count of the allocation the base pointer refers to.
    Allocation(ElementCount),
}

/// `0 <= index < upper` for the index at position `step` of the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeCheck {
    pub step: usize,
    pub index: Operand,
    pub upper: UpperBound,
}

/// Conjunction of range checks, in index-chain order. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    checks: Vec<RangeCheck>,
}

impl Condition {
    /// Build a condition from checks in chain order. `None` if empty.
    pub fn from_checks(checks: Vec<RangeCheck>) -> Option<Self> {
        (!checks.is_empty()).then_some(Condition { checks })
    }

    pub fn checks(&self) -> &[RangeCheck] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

/// An indexed address computation found in the function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressComputation {
    /// The computed pointer. Identifies the instruction across rewrites.
    pub dst: ValueId,
    /// Position at collection time, before any guard was inserted.
    pub location: InstrLocation,
    pub base: Operand,
    pub indices: Vec<Operand>,
}

/// What the pass should do for one address computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundsPlan {
    /// `None` when no step needs a runtime check.
    pub condition: Option<Condition>,
    /// Steps that produced a range check.
    pub checked: usize,
    /// Pointer steps left unchecked because the allocation size is unknown.
    pub skipped: usize,
}

/// Result of scanning a function for address computations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectedSites {
    /// Computations still to be examined, in layout order.
    pub pending: Vec<AddressComputation>,
    /// Computations already protected by an earlier run.
    pub already_guarded: usize,
}

/// Collect every address computation of `func` in one full scan.
///
/// Runs before any rewriting so that instructions inserted by the pass
/// are never mistaken for computations to protect.
pub fn collect_address_computations(func: &Function) -> CollectedSites {
    let mut sites = CollectedSites::default();
    for block in &func.blocks {
        for (index, instr) in block.body.iter().enumerate() {
            let Instr::Gep {
                dst,
                base,
                indices,
                flags,
            } = instr
            else {
                continue;
            };
            if flags.contains(GepFlags::GUARDED) {
                sites.already_guarded += 1;
            } else {
                sites.pending.push(AddressComputation {
                    dst: *dst,
                    location: InstrLocation {
                        block: block.id,
                        index,
                    },
                    base: *base,
                    indices: indices.clone(),
                });
            }
        }
    }
    sites
}

/// Decide the runtime checks needed for `site`.
///
/// Does not modify the function. Fails if the index chain walks through
/// a type that cannot be indexed the way the chain claims.
pub fn synthesize(
    func: &Function,
    pool: &TypePool,
    site: &AddressComputation,
    allocs: &AllocationMap,
) -> Result<BoundsPlan, ContractViolation> {
    let mut checks = Vec::new();
    let mut skipped = 0;
    let mut cursor = func.operand_type(&site.base);

    for (step, index) in site.indices.iter().enumerate() {
        cursor = match pool.kind(cursor) {
            TypeKind::Array { elem, len } => {
                checks.push(RangeCheck {
                    step,
                    index: *index,
                    upper: UpperBound::Static(*len),
                });
                *elem
            }
            TypeKind::Struct(st) => {
                let Some(field) = index.as_const_int() else {
                    return Err(ContractViolation::NonConstantFieldIndex {
                        gep: site.dst,
                        step,
                    });
                };
                let field_ty = usize::try_from(field)
                    .ok()
                    .and_then(|i| st.fields.get(i).copied());
                let Some(field_ty) = field_ty else {
                    return Err(ContractViolation::FieldIndexOutOfRange {
                        gep: site.dst,
                        step,
                        field,
                        field_count: st.fields.len(),
                    });
                };
                field_ty
            }
            TypeKind::Pointer { pointee } => {
                if step != 0 {
                    return Err(ContractViolation::PointerAfterFirstIndex {
                        gep: site.dst,
                        step,
                    });
                }
                if let Some(record) = allocs.get_operand(&site.base) {
                    checks.push(RangeCheck {
                        step,
                        index: *index,
                        upper: UpperBound::Allocation(record.count.clone()),
                    });
                } else {
                    skipped += 1;
                }
                *pointee
            }
            TypeKind::Vector { .. } => {
                return Err(ContractViolation::VectorIndex {
                    gep: site.dst,
                    step,
                });
            }
            TypeKind::Int { .. } | TypeKind::Float { .. } | TypeKind::Void => {
                return Err(ContractViolation::UnindexableType {
                    gep: site.dst,
                    step,
                    ty: pool.display(cursor).to_string(),
                });
            }
        };
    }

    let checked = checks.len();
    let condition = Condition::from_checks(checks);
    Ok(BoundsPlan {
        condition,
        checked,
        skipped,
    })
}

#[cfg(test)]
mod tests;
