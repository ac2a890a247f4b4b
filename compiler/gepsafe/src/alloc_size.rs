//! Allocation size tracking.
//!
//! Discovers, for each pointer-producing value, how many elements of its
//! pointee type the underlying allocation holds. Three sources feed the
//! map:
//!
//! - `alloca`: the declared element count (constant 1 for scalars, a
//!   runtime value for variable-length arrays).
//! - Calls to configured allocation routines: the size argument, in bytes
//!   or elements depending on [`HeapSizeUnits`].
//! - Pointer reinterpretation (`bitcast`) of an already tracked value:
//!   the count is rescaled from the old element width to the new one.
//!
//! Counts are kept symbolic ([`ElementCount`]). Nothing is emitted here;
//! the guard inserter materializes a count at the point where a check
//! needs it. This keeps the tracker free of IR mutation and means a
//! reinterpretation whose count is never checked costs nothing.

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use gepsafe_ir::{CastOp, Constant, Function, Instr, Operand, TypeId, TypePool, ValueId};

use crate::config::{GepSafeConfig, HeapSizeUnits};

/// Number of elements an allocation holds, as a runtime expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementCount {
    /// The value of an operand (zero-extended to 64 bits).
    Value(Operand),
    /// `floor(source * from_bits / to_bits)` in unsigned 64-bit arithmetic.
    Rescaled {
        source: Box<ElementCount>,
        from_bits: u64,
        to_bits: u64,
    },
}

impl ElementCount {
    /// Re-express this count in elements of `to_bits` width, given that it
    /// currently counts elements of `from_bits` width.
    ///
    /// Equal widths leave the count unchanged.
    #[must_use]
    pub fn rescale(self, from_bits: u64, to_bits: u64) -> Self {
        if from_bits == to_bits {
            return self;
        }
        ElementCount::Rescaled {
            source: Box::new(self),
            from_bits,
            to_bits,
        }
    }

    /// Evaluate a count whose leaves are all integer constants.
    ///
    /// Returns `None` if any leaf is a runtime value or a rescale divides
    /// by zero. Multiplication wraps, matching the emitted `mul`.
    pub fn fold(&self, pool: &TypePool) -> Option<u64> {
        match self {
            ElementCount::Value(Operand::Const(Constant::Int { ty, value })) => {
                Some(zero_extend(*value, pool.int_bits(*ty)?))
            }
            ElementCount::Value(_) => None,
            ElementCount::Rescaled {
                source,
                from_bits,
                to_bits,
            } => source
                .fold(pool)?
                .wrapping_mul(*from_bits)
                .checked_div(*to_bits),
        }
    }

    /// The operand at the root of the expression.
    pub fn root(&self) -> &Operand {
        match self {
            ElementCount::Value(op) => op,
            ElementCount::Rescaled { source, .. } => source.root(),
        }
    }
}

/// Reinterpret the low `bits` of a sign-extended payload as unsigned.
pub(crate) fn zero_extend(value: i64, bits: u32) -> u64 {
    let raw = u64::from_ne_bytes(value.to_ne_bytes());
    if bits >= 64 {
        raw
    } else {
        raw & ((1u64 << bits) - 1)
    }
}

/// Where a tracked allocation came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocationOrigin {
    /// Stack `alloca`.
    Stack,
    /// Call to a configured allocation routine.
    Heap { routine: String },
    /// Pointer reinterpretation of another tracked value.
    Reinterpret { source: ValueId },
}

/// Element count known for one pointer value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub owner: ValueId,
    pub count: ElementCount,
    pub origin: AllocationOrigin,
}

/// Allocation records of one function, keyed by the pointer they describe.
///
/// Built fresh for each function and discarded afterwards.
#[derive(Clone, Debug, Default)]
pub struct AllocationMap {
    records: FxHashMap<ValueId, AllocationRecord>,
}

impl AllocationMap {
    /// Record for a value, if it has one.
    pub fn get(&self, value: ValueId) -> Option<&AllocationRecord> {
        self.records.get(&value)
    }

    /// Record for an operand. Constants never have one.
    pub fn get_operand(&self, operand: &Operand) -> Option<&AllocationRecord> {
        operand.as_value().and_then(|v| self.get(v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn insert(&mut self, record: AllocationRecord) {
        debug_assert!(
            !self.records.contains_key(&record.owner),
            "second allocation record for {:?}",
            record.owner
        );
        self.records.insert(record.owner, record);
    }
}

/// Scan `func` once, in layout order, and record every allocation size
/// that can be determined.
pub fn track_allocations(
    func: &Function,
    pool: &TypePool,
    config: &GepSafeConfig,
) -> AllocationMap {
    let mut map = AllocationMap::default();

    for instr in func.instrs() {
        let record = match instr {
            Instr::Alloca { dst, count, .. } => Some(AllocationRecord {
                owner: *dst,
                count: ElementCount::Value(*count),
                origin: AllocationOrigin::Stack,
            }),
            Instr::Call {
                dst: Some(dst),
                callee,
                args,
            } => track_heap_call(func, pool, config, *dst, callee, args),
            Instr::Cast {
                dst,
                op: CastOp::BitCast,
                value: Operand::Value(src),
                to,
            } => track_reinterpret(func, pool, &map, *dst, *src, *to),
            _ => None,
        };

        if let Some(record) = record {
            trace!(
                function = %func.name,
                value = record.owner.raw(),
                origin = ?record.origin,
                "tracked allocation"
            );
            map.insert(record);
        }
    }

    debug!(
        function = %func.name,
        records = map.len(),
        "allocation tracking complete"
    );
    map
}

fn track_heap_call(
    func: &Function,
    pool: &TypePool,
    config: &GepSafeConfig,
    dst: ValueId,
    callee: &str,
    args: &[Operand],
) -> Option<AllocationRecord> {
    let routine = config.alloc_routine(callee)?;
    let Some(size) = args.get(routine.size_arg) else {
        warn!(
            function = %func.name,
            callee,
            size_arg = routine.size_arg,
            args = args.len(),
            "allocation call has no size argument; size unknown"
        );
        return None;
    };

    let count = match config.heap_size_units {
        HeapSizeUnits::Elements => ElementCount::Value(*size),
        HeapSizeUnits::Bytes => {
            let Some(elem_bits) = pointee_bits(pool, func.value_type(dst)) else {
                debug!(
                    function = %func.name,
                    callee,
                    "allocation returns a pointer without a fixed element width; size unknown"
                );
                return None;
            };
            ElementCount::Value(*size).rescale(8, elem_bits)
        }
    };

    Some(AllocationRecord {
        owner: dst,
        count,
        origin: AllocationOrigin::Heap {
            routine: routine.name.clone(),
        },
    })
}

fn track_reinterpret(
    func: &Function,
    pool: &TypePool,
    map: &AllocationMap,
    dst: ValueId,
    src: ValueId,
    to: TypeId,
) -> Option<AllocationRecord> {
    let source = map.get(src)?;
    let from_bits = pointee_bits(pool, func.value_type(src));
    let to_bits = pointee_bits(pool, to);
    let (Some(from_bits), Some(to_bits)) = (from_bits, to_bits) else {
        debug!(
            function = %func.name,
            value = dst.raw(),
            from = %pool.display(func.value_type(src)),
            to = %pool.display(to),
            "reinterpretation between non-primitive element types; size dropped"
        );
        return None;
    };

    Some(AllocationRecord {
        owner: dst,
        count: source.count.clone().rescale(from_bits, to_bits),
        origin: AllocationOrigin::Reinterpret { source: src },
    })
}

/// Bit width of a pointer type's element, if it has a fixed one.
fn pointee_bits(pool: &TypePool, ptr_ty: TypeId) -> Option<u64> {
    let pointee = pool.pointee(ptr_ty)?;
    pool.primitive_bits(pointee).filter(|&bits| bits > 0)
}
