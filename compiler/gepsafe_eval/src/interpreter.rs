//! Tree-walking interpreter over basic blocks.
//!
//! Executes a function of a [`Module`] instruction by instruction with
//! region-checked memory. Calls to `malloc`, `free`, `exit` and `abort`
//! are built in; any other callee must be a function of the module.

use rustc_hash::FxHashMap;
use tracing::trace;

use gepsafe_ir::{
    BinOp, BlockId, CastOp, Constant, Function, Instr, IntPredicate, Module, Operand, Terminator,
    TypeId, TypeKind, ValueId,
};

use crate::error::EvalError;
use crate::layout::DataLayout;
use crate::memory::{Memory, Pointer, RegionKind};
use crate::value::{mask, RuntimeValue};

/// Evaluation limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum instructions and terminators executed before aborting.
    pub max_steps: u64,
    /// Maximum nesting of calls.
    pub max_call_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 256,
        }
    }
}

/// How a program run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The entry function returned.
    Returned(Option<RuntimeValue>),
    /// A `trap` terminator was executed.
    Trapped { function: String, block: BlockId },
    /// `exit(code)` was called.
    Exited(i32),
    /// `abort()` was called.
    Aborted,
}

/// How a single call ended.
enum Flow {
    Return(Option<RuntimeValue>),
    Halt(Outcome),
}

/// Register file and stack allocations of one active call.
struct Frame<'f> {
    func: &'f Function,
    values: Vec<Option<RuntimeValue>>,
    stack_regions: Vec<u32>,
}

impl Frame<'_> {
    fn get(&self, value: ValueId) -> Result<RuntimeValue, EvalError> {
        self.values
            .get(value.index())
            .copied()
            .flatten()
            .ok_or_else(|| EvalError::UndefinedValue {
                function: self.func.name.clone(),
                value,
            })
    }

    fn set(&mut self, value: ValueId, v: RuntimeValue) -> Result<(), EvalError> {
        let slot = self
            .values
            .get_mut(value.index())
            .ok_or_else(|| EvalError::malformed(format!("value {value} has no slot")))?;
        *slot = Some(v);
        Ok(())
    }
}

/// Evaluator for one module.
pub struct Interpreter<'m> {
    module: &'m Module,
    functions: FxHashMap<&'m str, &'m Function>,
    layout: DataLayout<'m>,
    memory: Memory,
    config: EvalConfig,
    steps: u64,
    depth: usize,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self::with_config(module, EvalConfig::default())
    }

    pub fn with_config(module: &'m Module, config: EvalConfig) -> Self {
        let functions = module
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();
        Self {
            module,
            functions,
            layout: DataLayout::new(&module.types),
            memory: Memory::new(),
            config,
            steps: 0,
            depth: 0,
        }
    }

    /// Memory state, for inspecting allocations after a run.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable memory, for setting up pointer arguments before a run.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Number of steps executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run function `name` with `args`.
    pub fn run(&mut self, name: &str, args: &[RuntimeValue]) -> Result<Outcome, EvalError> {
        let func = self.lookup(name)?;
        match self.call_function(func, args)? {
            Flow::Return(value) => Ok(Outcome::Returned(value)),
            Flow::Halt(outcome) => Ok(outcome),
        }
    }

    fn lookup(&self, name: &str) -> Result<&'m Function, EvalError> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| EvalError::UnknownFunction {
                name: name.to_owned(),
            })
    }

    fn call_function(
        &mut self,
        func: &'m Function,
        args: &[RuntimeValue],
    ) -> Result<Flow, EvalError> {
        if args.len() != func.params.len() {
            return Err(EvalError::ArityMismatch {
                function: func.name.clone(),
                expected: func.params.len(),
                got: args.len(),
            });
        }
        if self.depth >= self.config.max_call_depth {
            return Err(EvalError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }

        trace!(function = %func.name, depth = self.depth, "call");
        let mut frame = Frame {
            func,
            values: vec![None; func.value_types.len()],
            stack_regions: Vec::new(),
        };
        for (param, arg) in func.params.iter().zip(args) {
            frame.set(param.value, *arg)?;
        }

        self.depth += 1;
        let result = self.execute(&mut frame);
        self.depth -= 1;
        self.memory.release_stack(&frame.stack_regions);
        result
    }

    fn execute(&mut self, frame: &mut Frame<'m>) -> Result<Flow, EvalError> {
        let func = frame.func;
        let mut block_id = func.entry;
        loop {
            let block = func
                .blocks
                .get(block_id.index())
                .ok_or_else(|| EvalError::malformed(format!("missing block {block_id}")))?;

            for instr in &block.body {
                self.step()?;
                if let Some(halt) = self.exec_instr(frame, instr)? {
                    return Ok(Flow::Halt(halt));
                }
            }

            self.step()?;
            match &block.terminator {
                Terminator::Return { value } => {
                    let value = value.as_ref().map(|v| self.operand(frame, v)).transpose()?;
                    return Ok(Flow::Return(value));
                }
                Terminator::Jump { target, args } => {
                    let values = args
                        .iter()
                        .map(|a| self.operand(frame, a))
                        .collect::<Result<Vec<_>, _>>()?;
                    let target_block = func.blocks.get(target.index()).ok_or_else(|| {
                        EvalError::malformed(format!("jump to missing block {target}"))
                    })?;
                    if target_block.params.len() != values.len() {
                        return Err(EvalError::malformed(format!(
                            "jump to {target} passes {} arguments for {} parameters",
                            values.len(),
                            target_block.params.len()
                        )));
                    }
                    for (&(param, _), value) in target_block.params.iter().zip(values) {
                        frame.set(param, value)?;
                    }
                    block_id = *target;
                }
                Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let cond = self.int_operand(frame, cond)?;
                    block_id = if cond != 0 { *then_block } else { *else_block };
                }
                Terminator::Trap => {
                    trace!(function = %func.name, block = block_id.raw(), "trap");
                    return Ok(Flow::Halt(Outcome::Trapped {
                        function: func.name.clone(),
                        block: block_id,
                    }));
                }
                Terminator::Unreachable => {
                    return Err(EvalError::Unreachable {
                        function: func.name.clone(),
                        block: block_id,
                    });
                }
            }
        }
    }

    fn step(&mut self) -> Result<(), EvalError> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(EvalError::StepLimitExceeded {
                limit: self.config.max_steps,
            });
        }
        Ok(())
    }

    // Operands

    fn operand(&self, frame: &Frame<'_>, op: &Operand) -> Result<RuntimeValue, EvalError> {
        match op {
            Operand::Value(v) => frame.get(*v),
            Operand::Const(Constant::Int { ty, value }) => {
                let bits = self.module.types.int_bits(*ty).ok_or_else(|| {
                    EvalError::TypeMismatch {
                        expected: "integer constant type",
                        found: self.module.types.display(*ty).to_string(),
                    }
                })?;
                Ok(RuntimeValue::int(bits, *value))
            }
            Operand::Const(Constant::Null { .. }) => Ok(RuntimeValue::Ptr(None)),
        }
    }

    /// Unsigned payload of an integer operand.
    fn int_operand(&self, frame: &Frame<'_>, op: &Operand) -> Result<u64, EvalError> {
        let value = self.operand(frame, op)?;
        value.as_unsigned().ok_or_else(|| mismatch("integer", value))
    }

    fn signed_operand(&self, frame: &Frame<'_>, op: &Operand) -> Result<i64, EvalError> {
        let value = self.operand(frame, op)?;
        value.as_signed().ok_or_else(|| mismatch("integer", value))
    }

    fn pointer_operand(&self, frame: &Frame<'_>, op: &Operand) -> Result<Pointer, EvalError> {
        let value = self.operand(frame, op)?;
        value
            .as_pointer()
            .ok_or_else(|| mismatch("pointer", value))?
            .ok_or(EvalError::NullDereference)
    }

    // Instructions

    /// Execute one body instruction. Returns an outcome if the program
    /// ended inside it (`exit`, `abort`, or a trap in a callee).
    fn exec_instr(
        &mut self,
        frame: &mut Frame<'m>,
        instr: &Instr,
    ) -> Result<Option<Outcome>, EvalError> {
        match instr {
            Instr::Alloca {
                dst,
                allocated,
                count,
            } => {
                let count = self.int_operand(frame, count)?;
                let size = self.layout.size_of(*allocated).saturating_mul(count);
                let ptr = self.memory.allocate(size, RegionKind::Stack)?;
                frame.stack_regions.push(ptr.region);
                frame.set(*dst, RuntimeValue::Ptr(Some(ptr)))?;
            }
            Instr::Load { dst, ty, ptr } => {
                let ptr = self.pointer_operand(frame, ptr)?;
                let value = self.load(*ty, ptr)?;
                frame.set(*dst, value)?;
            }
            Instr::Store { value, ptr } => {
                let ty = frame.func.operand_type(value);
                let value = self.operand(frame, value)?;
                let ptr = self.pointer_operand(frame, ptr)?;
                self.store(ty, value, ptr)?;
            }
            Instr::Gep {
                dst, base, indices, ..
            } => {
                let base_ty = frame.func.operand_type(base);
                let ptr = self.pointer_operand(frame, base)?;
                let offset = self.gep_offset(frame, base_ty, indices)?;
                frame.set(*dst, RuntimeValue::Ptr(Some(ptr.offset_by(offset))))?;
            }
            Instr::Binary { dst, op, lhs, rhs } => {
                let value = self.binary(frame, *op, lhs, rhs)?;
                frame.set(*dst, value)?;
            }
            Instr::ICmp {
                dst,
                pred,
                lhs,
                rhs,
            } => {
                let result = self.icmp(frame, *pred, lhs, rhs)?;
                frame.set(*dst, RuntimeValue::bool(result))?;
            }
            Instr::Cast { dst, op, value, to } => {
                let value = self.cast(frame, *op, value, *to)?;
                frame.set(*dst, value)?;
            }
            Instr::Call { dst, callee, args } => {
                let args = args
                    .iter()
                    .map(|a| self.operand(frame, a))
                    .collect::<Result<Vec<_>, _>>()?;
                match self.call(frame.func, *dst, callee, &args)? {
                    Flow::Return(value) => {
                        if let (Some(dst), Some(value)) = (dst, value) {
                            frame.set(*dst, value)?;
                        }
                    }
                    Flow::Halt(outcome) => return Ok(Some(outcome)),
                }
            }
        }
        Ok(None)
    }

    fn call(
        &mut self,
        caller: &Function,
        dst: Option<ValueId>,
        callee: &str,
        args: &[RuntimeValue],
    ) -> Result<Flow, EvalError> {
        let int_arg = |i: usize| -> Result<RuntimeValue, EvalError> {
            args.get(i).copied().ok_or_else(|| EvalError::ArityMismatch {
                function: callee.to_owned(),
                expected: i + 1,
                got: args.len(),
            })
        };
        match callee {
            "malloc" => {
                let size = int_arg(0)?;
                let size = size.as_unsigned().ok_or_else(|| mismatch("integer", size))?;
                let ptr = self.memory.allocate(size, RegionKind::Heap)?;
                trace!(caller = %caller.name, region = ptr.region, size, "malloc");
                Ok(Flow::Return(dst.map(|_| RuntimeValue::Ptr(Some(ptr)))))
            }
            "free" => {
                match int_arg(0)?.as_pointer() {
                    Some(Some(ptr)) => self.memory.free(ptr)?,
                    Some(None) => {}
                    None => return Err(EvalError::InvalidFree),
                }
                Ok(Flow::Return(None))
            }
            "exit" => {
                let code = int_arg(0)?;
                let code = code.as_signed().ok_or_else(|| mismatch("integer", code))?;
                Ok(Flow::Halt(Outcome::Exited(
                    i32::try_from(code).unwrap_or(i32::MIN),
                )))
            }
            "abort" => Ok(Flow::Halt(Outcome::Aborted)),
            _ => {
                let func = self.lookup(callee)?;
                self.call_function(func, args)
            }
        }
    }

    fn load(&self, ty: TypeId, ptr: Pointer) -> Result<RuntimeValue, EvalError> {
        let size = self.layout.size_of(ty);
        let bytes = self.memory.read(ptr, size)?;
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        let raw = u64::from_le_bytes(buf);
        match self.module.types.kind(ty) {
            TypeKind::Int { bits } if *bits <= 64 => Ok(RuntimeValue::Int {
                bits: *bits,
                value: mask(raw, *bits),
            }),
            TypeKind::Pointer { .. } => Ok(RuntimeValue::Ptr(Pointer::decode(raw))),
            _ => Err(EvalError::TypeMismatch {
                expected: "loadable type",
                found: self.module.types.display(ty).to_string(),
            }),
        }
    }

    fn store(&mut self, ty: TypeId, value: RuntimeValue, ptr: Pointer) -> Result<(), EvalError> {
        let size = usize::try_from(self.layout.size_of(ty))
            .map_err(|_| EvalError::malformed("store size"))?;
        if size > 8 {
            return Err(EvalError::TypeMismatch {
                expected: "scalar store",
                found: self.module.types.display(ty).to_string(),
            });
        }
        let raw = match value {
            RuntimeValue::Int { value, .. } => value,
            RuntimeValue::Ptr(p) => Pointer::encode(p),
        };
        let bytes = raw.to_le_bytes();
        self.memory.write(ptr, &bytes[..size])
    }

    /// Byte offset of an index chain, starting at pointer type `base_ty`.
    fn gep_offset(
        &self,
        frame: &Frame<'_>,
        base_ty: TypeId,
        indices: &[Operand],
    ) -> Result<i64, EvalError> {
        let pool = &self.module.types;
        let mut cursor = base_ty;
        let mut offset: i64 = 0;
        for (step, index) in indices.iter().enumerate() {
            let idx = self.signed_operand(frame, index)?;
            cursor = match pool.kind(cursor) {
                TypeKind::Pointer { pointee } if step == 0 => {
                    offset = offset.wrapping_add(idx.wrapping_mul(self.stride(*pointee)));
                    *pointee
                }
                TypeKind::Array { elem, .. } | TypeKind::Vector { elem, .. } => {
                    offset = offset.wrapping_add(idx.wrapping_mul(self.stride(*elem)));
                    *elem
                }
                TypeKind::Struct(st) => {
                    let field = usize::try_from(idx)
                        .ok()
                        .filter(|&i| i < st.fields.len())
                        .ok_or_else(|| {
                            EvalError::malformed(format!("field index {idx} out of range"))
                        })?;
                    let field_offset = self
                        .layout
                        .field_offset(cursor, field)
                        .ok_or_else(|| EvalError::malformed("field offset"))?;
                    offset = offset.wrapping_add(i64::try_from(field_offset).unwrap_or(i64::MAX));
                    st.fields[field]
                }
                _ => {
                    return Err(EvalError::TypeMismatch {
                        expected: "indexable type",
                        found: pool.display(cursor).to_string(),
                    });
                }
            };
        }
        Ok(offset)
    }

    fn stride(&self, ty: TypeId) -> i64 {
        i64::try_from(self.layout.size_of(ty)).unwrap_or(i64::MAX)
    }

    fn binary(
        &self,
        frame: &Frame<'_>,
        op: BinOp,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<RuntimeValue, EvalError> {
        let left = self.operand(frame, lhs)?;
        let RuntimeValue::Int { bits, value: a } = left else {
            return Err(mismatch("integer", left));
        };
        let b = self.int_operand(frame, rhs)?;
        let sa = left.as_signed().unwrap_or(0);
        let sb = crate::value::sign_extend(b, bits);
        let shift = u32::try_from(b).unwrap_or(u32::MAX);

        let raw = match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::UDiv => a.checked_div(b).ok_or(EvalError::DivisionByZero)?,
            BinOp::URem => a.checked_rem(b).ok_or(EvalError::DivisionByZero)?,
            BinOp::SDiv => {
                if sb == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                u64::from_ne_bytes(sa.wrapping_div(sb).to_ne_bytes())
            }
            BinOp::SRem => {
                if sb == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                u64::from_ne_bytes(sa.wrapping_rem(sb).to_ne_bytes())
            }
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::Shl => a.checked_shl(shift).unwrap_or(0),
            BinOp::LShr => a.checked_shr(shift).unwrap_or(0),
            BinOp::AShr => {
                u64::from_ne_bytes(sa.checked_shr(shift).unwrap_or(sa >> 63).to_ne_bytes())
            }
        };
        Ok(RuntimeValue::Int {
            bits,
            value: mask(raw, bits),
        })
    }

    fn icmp(
        &self,
        frame: &Frame<'_>,
        pred: IntPredicate,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<bool, EvalError> {
        let left = self.operand(frame, lhs)?;
        let right = self.operand(frame, rhs)?;
        if let (RuntimeValue::Ptr(a), RuntimeValue::Ptr(b)) = (left, right) {
            return match pred {
                IntPredicate::Eq => Ok(a == b),
                IntPredicate::Ne => Ok(a != b),
                _ => Err(mismatch("integer", left)),
            };
        }
        let (Some(ua), Some(ub)) = (left.as_unsigned(), right.as_unsigned()) else {
            return Err(mismatch("integer", left));
        };
        let (Some(sa), Some(sb)) = (left.as_signed(), right.as_signed()) else {
            return Err(mismatch("integer", right));
        };
        Ok(match pred {
            IntPredicate::Eq => ua == ub,
            IntPredicate::Ne => ua != ub,
            IntPredicate::Ult => ua < ub,
            IntPredicate::Ule => ua <= ub,
            IntPredicate::Ugt => ua > ub,
            IntPredicate::Uge => ua >= ub,
            IntPredicate::Slt => sa < sb,
            IntPredicate::Sle => sa <= sb,
            IntPredicate::Sgt => sa > sb,
            IntPredicate::Sge => sa >= sb,
        })
    }

    fn cast(
        &self,
        frame: &Frame<'_>,
        op: CastOp,
        value: &Operand,
        to: TypeId,
    ) -> Result<RuntimeValue, EvalError> {
        let pool = &self.module.types;
        let v = self.operand(frame, value)?;
        let to_bits = || {
            pool.int_bits(to).ok_or_else(|| EvalError::TypeMismatch {
                expected: "integer type",
                found: pool.display(to).to_string(),
            })
        };
        match op {
            CastOp::Trunc | CastOp::ZExt => {
                let raw = v.as_unsigned().ok_or_else(|| mismatch("integer", v))?;
                let bits = to_bits()?;
                Ok(RuntimeValue::Int {
                    bits,
                    value: mask(raw, bits),
                })
            }
            CastOp::SExt => {
                let raw = v.as_signed().ok_or_else(|| mismatch("integer", v))?;
                Ok(RuntimeValue::int(to_bits()?, raw))
            }
            CastOp::BitCast => Ok(v),
            CastOp::PtrToInt => {
                let ptr = v.as_pointer().ok_or_else(|| mismatch("pointer", v))?;
                let bits = to_bits()?;
                Ok(RuntimeValue::Int {
                    bits,
                    value: mask(Pointer::encode(ptr), bits),
                })
            }
            CastOp::IntToPtr => {
                let raw = v.as_unsigned().ok_or_else(|| mismatch("integer", v))?;
                Ok(RuntimeValue::Ptr(Pointer::decode(raw)))
            }
        }
    }
}

fn mismatch(expected: &'static str, found: RuntimeValue) -> EvalError {
    EvalError::TypeMismatch {
        expected,
        found: found.to_string(),
    }
}
