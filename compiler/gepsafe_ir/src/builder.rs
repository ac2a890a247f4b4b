//! Builders for IR functions.
//!
//! - [`FunctionBuilder`] constructs a new [`Function`] block by block
//!   ("position at a block, emit instructions, terminate", like LLVM's
//!   `IRBuilder`).
//! - [`InstrInserter`] inserts instructions into an existing function in
//!   front of a given position, which is how passes materialize new
//!   computations right before the instruction they protect.

use crate::ir::{
    BinOp, Block, BlockId, CastOp, Function, GepFlags, Instr, InstrLocation, IntPredicate,
    Operand, Param, Terminator, ValueId,
};
use crate::types::{TypeId, TypePool};

// ── FunctionBuilder ─────────────────────────────────────────────────

/// In-progress basic block.
struct BlockBuilder {
    id: BlockId,
    params: Vec<(ValueId, TypeId)>,
    body: Vec<Instr>,
    terminator: Option<Terminator>,
}

impl BlockBuilder {
    fn new(id: BlockId) -> Self {
        Self {
            id,
            params: Vec::new(),
            body: Vec::new(),
            terminator: None,
        }
    }
}

/// Builder for a new function.
///
/// Owns block and value state while the function is being built and is
/// consumed by [`finish`](FunctionBuilder::finish).
pub struct FunctionBuilder<'p> {
    pool: &'p mut TypePool,
    name: String,
    params: Vec<Param>,
    return_type: TypeId,
    blocks: Vec<BlockBuilder>,
    current_block: BlockId,
    value_types: Vec<TypeId>,
}

impl<'p> FunctionBuilder<'p> {
    /// Create a builder with one value per parameter and an entry block
    /// already allocated.
    pub fn new(pool: &'p mut TypePool, name: &str, params: &[TypeId], return_type: TypeId) -> Self {
        let mut builder = FunctionBuilder {
            pool,
            name: name.to_owned(),
            params: Vec::with_capacity(params.len()),
            return_type,
            blocks: vec![BlockBuilder::new(BlockId::new(0))],
            current_block: BlockId::new(0),
            value_types: Vec::new(),
        };
        for &ty in params {
            let value = builder.fresh_value(ty);
            builder.params.push(Param { value, ty });
        }
        builder
    }

    /// The type pool, for creating types while building.
    pub fn pool(&mut self) -> &mut TypePool {
        &mut *self.pool
    }

    /// The value bound to parameter `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn param(&self, index: usize) -> ValueId {
        self.params[index].value
    }

    // Block management

    /// Get the entry block (always block 0).
    #[inline]
    pub fn entry_block(&self) -> BlockId {
        BlockId::new(0)
    }

    /// Allocate a new empty block and return its ID.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        );
        self.blocks.push(BlockBuilder::new(id));
        id
    }

    /// Set the current insertion point to the end of `block`.
    pub fn position_at(&mut self, block: BlockId) {
        debug_assert!(
            block.index() < self.blocks.len(),
            "BlockId {} out of bounds (have {} blocks)",
            block.raw(),
            self.blocks.len(),
        );
        self.current_block = block;
    }

    #[inline]
    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Check whether the current block already has a terminator.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current_block.index()].terminator.is_some()
    }

    /// Add a block parameter and return the value bound to it.
    pub fn add_block_param(&mut self, block: BlockId, ty: TypeId) -> ValueId {
        let value = self.fresh_value(ty);
        self.blocks[block.index()].params.push((value, ty));
        value
    }

    // Values

    fn fresh_value(&mut self, ty: TypeId) -> ValueId {
        let id = u32::try_from(self.value_types.len())
            .unwrap_or_else(|_| panic!("value count exceeds u32::MAX"));
        self.value_types.push(ty);
        ValueId::new(id)
    }

    /// Static type of an operand built so far.
    pub fn operand_type(&self, operand: &Operand) -> TypeId {
        match operand {
            Operand::Value(v) => self.value_types[v.index()],
            Operand::Const(c) => c.ty(),
        }
    }

    fn emit(&mut self, instr: Instr) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "emitting into terminated block {}",
            self.current_block.raw()
        );
        block.body.push(instr);
    }

    // Instruction emission

    /// `alloca allocated, count`: returns a pointer to `allocated`.
    pub fn alloca(&mut self, allocated: TypeId, count: Operand) -> ValueId {
        let ptr_ty = self.pool.pointer(allocated);
        let dst = self.fresh_value(ptr_ty);
        self.emit(Instr::Alloca {
            dst,
            allocated,
            count,
        });
        dst
    }

    /// Scalar `alloca allocated, i32 1`.
    pub fn alloca_one(&mut self, allocated: TypeId) -> ValueId {
        self.alloca(allocated, Operand::i32(1))
    }

    pub fn load(&mut self, ty: TypeId, ptr: impl Into<Operand>) -> ValueId {
        let dst = self.fresh_value(ty);
        self.emit(Instr::Load {
            dst,
            ty,
            ptr: ptr.into(),
        });
        dst
    }

    pub fn store(&mut self, value: impl Into<Operand>, ptr: impl Into<Operand>) {
        self.emit(Instr::Store {
            value: value.into(),
            ptr: ptr.into(),
        });
    }

    /// `getelementptr base, indices...` producing a pointer to `elem`.
    ///
    /// `elem` is the type the index chain resolves to; the builder does
    /// not re-derive it, so malformed chains can be built on purpose.
    pub fn gep(&mut self, base: impl Into<Operand>, indices: &[Operand], elem: TypeId) -> ValueId {
        self.gep_with_flags(base, indices, elem, GepFlags::empty())
    }

    /// `getelementptr inbounds base, indices...`.
    pub fn inbounds_gep(
        &mut self,
        base: impl Into<Operand>,
        indices: &[Operand],
        elem: TypeId,
    ) -> ValueId {
        self.gep_with_flags(base, indices, elem, GepFlags::INBOUNDS)
    }

    fn gep_with_flags(
        &mut self,
        base: impl Into<Operand>,
        indices: &[Operand],
        elem: TypeId,
        flags: GepFlags,
    ) -> ValueId {
        let ptr_ty = self.pool.pointer(elem);
        let dst = self.fresh_value(ptr_ty);
        self.emit(Instr::Gep {
            dst,
            base: base.into(),
            indices: indices.to_vec(),
            flags,
        });
        dst
    }

    /// Binary operation; the result has the type of `lhs`.
    pub fn binary(&mut self, op: BinOp, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        let lhs = lhs.into();
        let ty = self.operand_type(&lhs);
        let dst = self.fresh_value(ty);
        self.emit(Instr::Binary {
            dst,
            op,
            lhs,
            rhs: rhs.into(),
        });
        dst
    }

    pub fn icmp(
        &mut self,
        pred: IntPredicate,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> ValueId {
        let dst = self.fresh_value(TypeId::I1);
        self.emit(Instr::ICmp {
            dst,
            pred,
            lhs: lhs.into(),
            rhs: rhs.into(),
        });
        dst
    }

    pub fn cast(&mut self, op: CastOp, value: impl Into<Operand>, to: TypeId) -> ValueId {
        let dst = self.fresh_value(to);
        self.emit(Instr::Cast {
            dst,
            op,
            value: value.into(),
            to,
        });
        dst
    }

    /// Direct call. Returns `None` when `ret` is `void`.
    pub fn call(&mut self, callee: &str, args: &[Operand], ret: TypeId) -> Option<ValueId> {
        let dst = (ret != TypeId::VOID).then(|| self.fresh_value(ret));
        self.emit(Instr::Call {
            dst,
            callee: callee.to_owned(),
            args: args.to_vec(),
        });
        dst
    }

    // Terminators

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current_block.index()];
        debug_assert!(
            block.terminator.is_none(),
            "block {} already terminated",
            self.current_block.raw()
        );
        block.terminator = Some(terminator);
    }

    pub fn ret(&mut self, value: Option<Operand>) {
        self.terminate(Terminator::Return { value });
    }

    pub fn jump(&mut self, target: BlockId, args: &[Operand]) {
        self.terminate(Terminator::Jump {
            target,
            args: args.to_vec(),
        });
    }

    pub fn branch(&mut self, cond: impl Into<Operand>, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::Branch {
            cond: cond.into(),
            then_block,
            else_block,
        });
    }

    pub fn trap(&mut self) {
        self.terminate(Terminator::Trap);
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    // Finalization

    /// Consume the builder and produce the finished [`Function`].
    ///
    /// Unterminated blocks get `Unreachable` as a fallback (with a tracing
    /// warning).
    pub fn finish(self) -> Function {
        let blocks = self
            .blocks
            .into_iter()
            .map(|bb| {
                let terminator = bb.terminator.unwrap_or_else(|| {
                    tracing::warn!(
                        function = %self.name,
                        block = bb.id.raw(),
                        "unterminated block, adding Unreachable"
                    );
                    Terminator::Unreachable
                });
                Block {
                    id: bb.id,
                    params: bb.params,
                    body: bb.body,
                    terminator,
                }
            })
            .collect();

        Function {
            name: self.name,
            params: self.params,
            return_type: self.return_type,
            blocks,
            entry: BlockId::new(0),
            value_types: self.value_types,
        }
    }
}

// ── InstrInserter ───────────────────────────────────────────────────

/// Inserts instructions into an existing function in front of a position.
///
/// Every emitted instruction lands at the cursor and the cursor advances
/// past it, so a sequence of emissions appears in program order right
/// before the instruction that originally sat at the cursor.
pub struct InstrInserter<'f> {
    func: &'f mut Function,
    block: BlockId,
    index: usize,
    inserted: usize,
}

impl<'f> InstrInserter<'f> {
    /// Position in front of the instruction at `loc`.
    pub fn before(func: &'f mut Function, loc: InstrLocation) -> Self {
        debug_assert!(
            loc.index <= func.block(loc.block).body.len(),
            "insertion index {} past end of block {}",
            loc.index,
            loc.block.raw()
        );
        Self {
            func,
            block: loc.block,
            index: loc.index,
            inserted: 0,
        }
    }

    /// Current cursor: the position of the instruction the inserter emits
    /// in front of.
    pub fn position(&self) -> InstrLocation {
        InstrLocation {
            block: self.block,
            index: self.index,
        }
    }

    /// Number of instructions emitted so far.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// The function being edited.
    pub fn func(&self) -> &Function {
        &*self.func
    }

    fn insert(&mut self, instr: Instr) {
        self.func.blocks[self.block.index()]
            .body
            .insert(self.index, instr);
        self.index += 1;
        self.inserted += 1;
    }

    pub fn binary(&mut self, op: BinOp, lhs: Operand, rhs: Operand) -> ValueId {
        let ty = self.func.operand_type(&lhs);
        let dst = self.func.fresh_value(ty);
        self.insert(Instr::Binary { dst, op, lhs, rhs });
        dst
    }

    pub fn and(&mut self, lhs: Operand, rhs: Operand) -> ValueId {
        self.binary(BinOp::And, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: Operand, rhs: Operand) -> ValueId {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    pub fn udiv(&mut self, lhs: Operand, rhs: Operand) -> ValueId {
        self.binary(BinOp::UDiv, lhs, rhs)
    }

    /// Logical negation of an `i1`: `xor value, true`.
    pub fn not(&mut self, value: Operand) -> ValueId {
        self.binary(BinOp::Xor, value, Operand::bool(true))
    }

    pub fn icmp(&mut self, pred: IntPredicate, lhs: Operand, rhs: Operand) -> ValueId {
        let dst = self.func.fresh_value(TypeId::I1);
        self.insert(Instr::ICmp {
            dst,
            pred,
            lhs,
            rhs,
        });
        dst
    }

    /// Signed less than.
    pub fn icmp_slt(&mut self, lhs: Operand, rhs: Operand) -> ValueId {
        self.icmp(IntPredicate::Slt, lhs, rhs)
    }

    /// Signed greater than or equal.
    pub fn icmp_sge(&mut self, lhs: Operand, rhs: Operand) -> ValueId {
        self.icmp(IntPredicate::Sge, lhs, rhs)
    }

    pub fn cast(&mut self, op: CastOp, value: Operand, to: TypeId) -> ValueId {
        let dst = self.func.fresh_value(to);
        self.insert(Instr::Cast { dst, op, value, to });
        dst
    }
}
