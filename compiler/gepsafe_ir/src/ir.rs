//! Basic-block IR for instrumentation.
//!
//! The IR has the same shape as LLVM IR with typed pointers:
//!
//! - **[`Module`]**: a type pool and a list of functions
//! - **[`Function`]**: parameters, blocks, and the type of every value
//! - **[`Block`]**: a basic block: parameters, body instructions, terminator
//! - **[`Instr`]**: a single instruction (alloca, load, store, GEP, ...)
//! - **[`Terminator`]**: block exit (return, jump, branch, trap)
//!
//! Values are named via [`ValueId`] (SSA). Each value is defined exactly
//! once, either as a function parameter, a block parameter, or as the
//! destination of an instruction. Control flow uses [`BlockId`]
//! references between blocks.

use bitflags::bitflags;

use crate::types::{TypeId, TypePool};

// ── ID newtypes ─────────────────────────────────────────────────────

/// SSA value ID within a [`Function`].
///
/// IDs are allocated sequentially starting from 0 and double as indices
/// into [`Function::value_types`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within a [`Function`].
///
/// `blocks[id.index()]` is always the block with that ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Operands ────────────────────────────────────────────────────────

/// A compile-time constant operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    /// An integer constant. `value` holds the sign-extended bit pattern;
    /// consumers truncate it to the width of `ty`.
    Int { ty: TypeId, value: i64 },
    /// The null pointer of a pointer type.
    Null { ty: TypeId },
}

impl Constant {
    pub fn ty(&self) -> TypeId {
        match self {
            Constant::Int { ty, .. } | Constant::Null { ty } => *ty,
        }
    }
}

/// An instruction operand: an SSA value or a constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

impl Operand {
    /// Integer constant of type `ty`.
    pub fn int(ty: TypeId, value: i64) -> Self {
        Operand::Const(Constant::Int { ty, value })
    }

    /// `i1` constant.
    pub fn bool(value: bool) -> Self {
        Operand::int(TypeId::I1, i64::from(value))
    }

    /// `i64` constant.
    pub fn i64(value: i64) -> Self {
        Operand::int(TypeId::I64, value)
    }

    /// `i32` constant.
    pub fn i32(value: i32) -> Self {
        Operand::int(TypeId::I32, i64::from(value))
    }

    /// The value this operand refers to, if it is not a constant.
    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(v) => Some(*v),
            Operand::Const(_) => None,
        }
    }

    /// The integer payload, if this operand is an integer constant.
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Operand::Const(Constant::Int { value, .. }) => Some(*value),
            Operand::Value(_) | Operand::Const(Constant::Null { .. }) => None,
        }
    }
}

impl From<ValueId> for Operand {
    fn from(v: ValueId) -> Self {
        Operand::Value(v)
    }
}

// ── Operators ───────────────────────────────────────────────────────

/// Integer binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

/// Integer comparison predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntPredicate {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// Conversion operators.
///
/// `BitCast` is the type-reinterpretation instruction: it changes the
/// static type of a pointer without changing its address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    BitCast,
    PtrToInt,
    IntToPtr,
}

bitflags! {
    /// Flags carried by an address computation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(
        feature = "serde",
        derive(serde::Serialize, serde::Deserialize),
        serde(transparent)
    )]
    pub struct GepFlags: u8 {
        /// The computation is asserted to stay inside its allocation.
        const INBOUNDS = 1 << 0;
        /// A bounds guard has already been inserted in front of it.
        const GUARDED = 1 << 1;
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// A single instruction in a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instr {
    /// Stack allocation of `count` elements of `allocated`:
    /// `dst: allocated* = alloca allocated, count`.
    Alloca {
        dst: ValueId,
        allocated: TypeId,
        count: Operand,
    },

    /// `dst: ty = load ptr`.
    Load {
        dst: ValueId,
        ty: TypeId,
        ptr: Operand,
    },

    /// `store value, ptr`.
    Store { value: Operand, ptr: Operand },

    /// Indexed address computation:
    /// `dst = getelementptr base, indices...`.
    ///
    /// The first index steps over the base pointer; each following index
    /// selects inside the type reached so far.
    Gep {
        dst: ValueId,
        base: Operand,
        indices: Vec<Operand>,
        flags: GepFlags,
    },

    /// `dst = op lhs, rhs`.
    Binary {
        dst: ValueId,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },

    /// `dst: i1 = icmp pred lhs, rhs`.
    ICmp {
        dst: ValueId,
        pred: IntPredicate,
        lhs: Operand,
        rhs: Operand,
    },

    /// `dst: to = op value`.
    Cast {
        dst: ValueId,
        op: CastOp,
        value: Operand,
        to: TypeId,
    },

    /// Direct call by symbol name. `dst` is `None` for `void` calls.
    Call {
        dst: Option<ValueId>,
        callee: String,
        args: Vec<Operand>,
    },
}

impl Instr {
    /// Returns the value defined by this instruction, if any.
    pub fn defined_value(&self) -> Option<ValueId> {
        match self {
            Instr::Alloca { dst, .. }
            | Instr::Load { dst, .. }
            | Instr::Gep { dst, .. }
            | Instr::Binary { dst, .. }
            | Instr::ICmp { dst, .. }
            | Instr::Cast { dst, .. } => Some(*dst),
            Instr::Call { dst, .. } => *dst,
            Instr::Store { .. } => None,
        }
    }

    /// Returns all operands read by this instruction, in order.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instr::Alloca { count, .. } => vec![count],
            Instr::Load { ptr, .. } => vec![ptr],
            Instr::Store { value, ptr } => vec![value, ptr],
            Instr::Gep { base, indices, .. } => {
                let mut ops = Vec::with_capacity(1 + indices.len());
                ops.push(base);
                ops.extend(indices.iter());
                ops
            }
            Instr::Binary { lhs, rhs, .. } | Instr::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Cast { value, .. } => vec![value],
            Instr::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Returns all SSA values read by this instruction (constants excluded).
    pub fn used_values(&self) -> Vec<ValueId> {
        self.operands()
            .into_iter()
            .filter_map(Operand::as_value)
            .collect()
    }

    /// Check if this is an indexed address computation.
    pub fn is_address_computation(&self) -> bool {
        matches!(self, Instr::Gep { .. })
    }
}

// ── Terminators ─────────────────────────────────────────────────────

/// Block terminator: how control leaves a basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Terminator {
    /// Return from the function, with a value unless it returns `void`.
    Return { value: Option<Operand> },

    /// Unconditional jump, passing arguments to the target's parameters.
    Jump { target: BlockId, args: Vec<Operand> },

    /// Conditional branch on an `i1`.
    Branch {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Abnormal program termination. Never returns, has no successors.
    Trap,

    /// Marks a block as unreachable.
    Unreachable,
}

impl Terminator {
    /// Returns all SSA values read by this terminator.
    pub fn used_values(&self) -> Vec<ValueId> {
        match self {
            Terminator::Return { value } => value.iter().filter_map(Operand::as_value).collect(),
            Terminator::Jump { args, .. } => args.iter().filter_map(Operand::as_value).collect(),
            Terminator::Branch { cond, .. } => cond.as_value().into_iter().collect(),
            Terminator::Trap | Terminator::Unreachable => vec![],
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

/// A basic block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// This block's identifier.
    pub id: BlockId,
    /// Block parameters: values passed from predecessors via `Jump`.
    pub params: Vec<(ValueId, TypeId)>,
    /// Sequential instructions executed in order.
    pub body: Vec<Instr>,
    /// How control leaves this block.
    pub terminator: Terminator,
}

// ── Functions ───────────────────────────────────────────────────────

/// A function parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Param {
    pub value: ValueId,
    pub ty: TypeId,
}

/// Position of an instruction inside a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstrLocation {
    pub block: BlockId,
    pub index: usize,
}

/// A function body.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    /// The function's symbol name.
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeId,
    /// Basic blocks in layout order. `blocks[entry.index()]` is the entry.
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    /// Type of each value, indexed by `ValueId::index()`.
    pub value_types: Vec<TypeId>,
}

impl Function {
    /// Look up the type of a value.
    ///
    /// # Panics
    ///
    /// Debug-panics if `value` is out of bounds.
    #[inline]
    pub fn value_type(&self, value: ValueId) -> TypeId {
        debug_assert!(
            value.index() < self.value_types.len(),
            "ValueId {} out of bounds (have {} values)",
            value.raw(),
            self.value_types.len(),
        );
        self.value_types[value.index()]
    }

    /// Static type of an operand.
    pub fn operand_type(&self, operand: &Operand) -> TypeId {
        match operand {
            Operand::Value(v) => self.value_type(*v),
            Operand::Const(c) => c.ty(),
        }
    }

    /// Allocate a fresh value with the given type.
    pub fn fresh_value(&mut self, ty: TypeId) -> ValueId {
        let id = u32::try_from(self.value_types.len())
            .unwrap_or_else(|_| panic!("value count exceeds u32::MAX"));
        self.value_types.push(ty);
        ValueId::new(id)
    }

    /// Return the [`BlockId`] that the next [`push_block`](Self::push_block)
    /// call will use.
    pub fn next_block_id(&self) -> BlockId {
        BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        )
    }

    /// Append a new basic block.
    ///
    /// # Panics
    ///
    /// Debug-panics if `block.id` does not match the next sequential index.
    pub fn push_block(&mut self, block: Block) {
        debug_assert_eq!(
            block.id,
            self.next_block_id(),
            "block ID {} does not match expected index {}",
            block.id.raw(),
            self.next_block_id().raw(),
        );
        self.blocks.push(block);
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// Find the instruction that defines `value`.
    ///
    /// Instructions move between blocks when a block is split, so passes
    /// that hold on to an instruction across a rewrite re-locate it by the
    /// identity of its result.
    pub fn locate_def(&self, value: ValueId) -> Option<InstrLocation> {
        self.blocks.iter().find_map(|block| {
            block
                .body
                .iter()
                .position(|instr| instr.defined_value() == Some(value))
                .map(|index| InstrLocation {
                    block: block.id,
                    index,
                })
        })
    }

    /// Look up the instruction at a location.
    pub fn instr(&self, loc: InstrLocation) -> Option<&Instr> {
        self.blocks.get(loc.block.index())?.body.get(loc.index)
    }

    pub fn instr_mut(&mut self, loc: InstrLocation) -> Option<&mut Instr> {
        self.blocks.get_mut(loc.block.index())?.body.get_mut(loc.index)
    }

    /// Total number of body instructions across all blocks.
    pub fn instr_count(&self) -> usize {
        self.blocks.iter().map(|b| b.body.len()).sum()
    }

    /// Iterate over every body instruction in layout order.
    pub fn instrs(&self) -> impl Iterator<Item = &Instr> {
        self.blocks.iter().flat_map(|b| b.body.iter())
    }
}

// ── Modules ─────────────────────────────────────────────────────────

/// A compilation unit: the type pool shared by all functions, plus the
/// functions themselves.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Module {
    pub types: TypePool,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }
}
