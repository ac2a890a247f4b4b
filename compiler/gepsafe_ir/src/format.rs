//! Textual rendering of types and functions.
//!
//! The syntax follows LLVM's typed-pointer assembly closely enough that a
//! printed function reads like `opt -S` output: `%N` for values, `bbN`
//! for blocks. There is no parser; the output is for logs and tests.

use std::fmt::{self, Write};

use crate::ir::{
    BinOp, Block, CastOp, Constant, Function, Instr, IntPredicate, Operand, Terminator, ValueId,
};
use crate::types::{TypeId, TypeKind, TypePool};

/// Display adapter for a type.
pub struct TypeDisplay<'a> {
    pool: &'a TypePool,
    ty: TypeId,
}

impl TypePool {
    /// Render a type, e.g. `[10 x i32]*`.
    pub fn display(&self, ty: TypeId) -> TypeDisplay<'_> {
        TypeDisplay { pool: self, ty }
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = self.pool;
        match pool.kind(self.ty) {
            TypeKind::Void => f.write_str("void"),
            TypeKind::Int { bits } => write!(f, "i{bits}"),
            TypeKind::Float { bits: 16 } => f.write_str("half"),
            TypeKind::Float { bits: 32 } => f.write_str("float"),
            TypeKind::Float { bits: 64 } => f.write_str("double"),
            TypeKind::Float { bits } => write!(f, "f{bits}"),
            TypeKind::Pointer { pointee } => write!(f, "{}*", pool.display(*pointee)),
            TypeKind::Array { elem, len } => write!(f, "[{len} x {}]", pool.display(*elem)),
            TypeKind::Vector { elem, len } => write!(f, "<{len} x {}>", pool.display(*elem)),
            TypeKind::Struct(st) => {
                if let Some(name) = &st.name {
                    return write!(f, "%{name}");
                }
                f.write_str("{ ")?;
                for (i, field) in st.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", pool.display(*field))?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.raw())
    }
}

impl fmt::Display for crate::ir::BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.raw())
    }
}

fn bin_op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::UDiv => "udiv",
        BinOp::SDiv => "sdiv",
        BinOp::URem => "urem",
        BinOp::SRem => "srem",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::LShr => "lshr",
        BinOp::AShr => "ashr",
    }
}

fn predicate_name(pred: IntPredicate) -> &'static str {
    match pred {
        IntPredicate::Eq => "eq",
        IntPredicate::Ne => "ne",
        IntPredicate::Ult => "ult",
        IntPredicate::Ule => "ule",
        IntPredicate::Ugt => "ugt",
        IntPredicate::Uge => "uge",
        IntPredicate::Slt => "slt",
        IntPredicate::Sle => "sle",
        IntPredicate::Sgt => "sgt",
        IntPredicate::Sge => "sge",
    }
}

fn cast_name(op: CastOp) -> &'static str {
    match op {
        CastOp::Trunc => "trunc",
        CastOp::ZExt => "zext",
        CastOp::SExt => "sext",
        CastOp::BitCast => "bitcast",
        CastOp::PtrToInt => "ptrtoint",
        CastOp::IntToPtr => "inttoptr",
    }
}

/// Renders functions against the pool their types live in.
pub struct Printer<'a> {
    pool: &'a TypePool,
    func: &'a Function,
}

impl<'a> Printer<'a> {
    pub fn new(pool: &'a TypePool, func: &'a Function) -> Self {
        Self { pool, func }
    }

    fn ty(&self, ty: TypeId) -> TypeDisplay<'a> {
        self.pool.display(ty)
    }

    /// `i32 %3`, `i64 7`, `i8* null`.
    fn typed_operand(&self, op: &Operand) -> String {
        let ty = self.func.operand_type(op);
        format!("{} {}", self.ty(ty), self.operand(op))
    }

    fn operand(&self, op: &Operand) -> String {
        match op {
            Operand::Value(v) => v.to_string(),
            Operand::Const(Constant::Int { ty: TypeId::I1, value }) => {
                if *value == 0 { "false" } else { "true" }.to_owned()
            }
            Operand::Const(Constant::Int { value, .. }) => value.to_string(),
            Operand::Const(Constant::Null { .. }) => "null".to_owned(),
        }
    }

    fn write_instr(&self, out: &mut String, instr: &Instr) -> fmt::Result {
        match instr {
            Instr::Alloca {
                dst,
                allocated,
                count,
            } => write!(
                out,
                "{dst} = alloca {}, {}",
                self.ty(*allocated),
                self.typed_operand(count)
            ),
            Instr::Load { dst, ty, ptr } => write!(
                out,
                "{dst} = load {}, {}",
                self.ty(*ty),
                self.typed_operand(ptr)
            ),
            Instr::Store { value, ptr } => write!(
                out,
                "store {}, {}",
                self.typed_operand(value),
                self.typed_operand(ptr)
            ),
            Instr::Gep {
                dst,
                base,
                indices,
                flags,
            } => {
                write!(out, "{dst} = getelementptr ")?;
                if flags.contains(crate::ir::GepFlags::INBOUNDS) {
                    out.push_str("inbounds ");
                }
                out.push_str(&self.typed_operand(base));
                for index in indices {
                    write!(out, ", {}", self.typed_operand(index))?;
                }
                if flags.contains(crate::ir::GepFlags::GUARDED) {
                    out.push_str(", !guarded");
                }
                Ok(())
            }
            Instr::Binary { dst, op, lhs, rhs } => write!(
                out,
                "{dst} = {} {}, {}",
                bin_op_name(*op),
                self.typed_operand(lhs),
                self.operand(rhs)
            ),
            Instr::ICmp {
                dst,
                pred,
                lhs,
                rhs,
            } => write!(
                out,
                "{dst} = icmp {} {}, {}",
                predicate_name(*pred),
                self.typed_operand(lhs),
                self.operand(rhs)
            ),
            Instr::Cast { dst, op, value, to } => write!(
                out,
                "{dst} = {} {} to {}",
                cast_name(*op),
                self.typed_operand(value),
                self.ty(*to)
            ),
            Instr::Call { dst, callee, args } => {
                if let Some(dst) = dst {
                    write!(out, "{dst} = call {} ", self.ty(self.func.value_type(*dst)))?;
                } else {
                    out.push_str("call void ");
                }
                write!(out, "@{callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.typed_operand(arg));
                }
                out.push(')');
                Ok(())
            }
        }
    }

    fn write_terminator(&self, out: &mut String, term: &Terminator) -> fmt::Result {
        match term {
            Terminator::Return { value: Some(v) } => write!(out, "ret {}", self.typed_operand(v)),
            Terminator::Return { value: None } => write!(out, "ret void"),
            Terminator::Jump { target, args } => {
                write!(out, "br label {target}")?;
                if !args.is_empty() {
                    let rendered: Vec<String> =
                        args.iter().map(|a| self.typed_operand(a)).collect();
                    write!(out, "({})", rendered.join(", "))?;
                }
                Ok(())
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => write!(
                out,
                "br {}, label {then_block}, label {else_block}",
                self.typed_operand(cond)
            ),
            Terminator::Trap => write!(out, "trap"),
            Terminator::Unreachable => write!(out, "unreachable"),
        }
    }

    fn write_block(&self, out: &mut String, block: &Block) -> fmt::Result {
        write!(out, "{}", block.id)?;
        if !block.params.is_empty() {
            let rendered: Vec<String> = block
                .params
                .iter()
                .map(|(v, ty)| format!("{} {v}", self.ty(*ty)))
                .collect();
            write!(out, "({})", rendered.join(", "))?;
        }
        out.push_str(":\n");
        for instr in &block.body {
            out.push_str("  ");
            self.write_instr(out, instr)?;
            out.push('\n');
        }
        out.push_str("  ");
        self.write_terminator(out, &block.terminator)?;
        out.push('\n');
        Ok(())
    }

    /// Render the whole function.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_function(&mut out);
        out
    }

    fn write_function(&self, out: &mut String) -> fmt::Result {
        let params: Vec<String> = self
            .func
            .params
            .iter()
            .map(|p| format!("{} {}", self.ty(p.ty), p.value))
            .collect();
        writeln!(
            out,
            "define {} @{}({}) {{",
            self.ty(self.func.return_type),
            self.func.name,
            params.join(", ")
        )?;
        for block in &self.func.blocks {
            self.write_block(out, block)?;
        }
        out.push_str("}\n");
        Ok(())
    }
}
