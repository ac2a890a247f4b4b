//! Typed basic-block IR for the gepsafe instrumentation pass.
//!
//! This crate provides:
//!
//! - **Type descriptors** ([`TypePool`], [`TypeId`], [`TypeKind`]): interned
//!   integer, float, pointer, array, vector and struct types, including
//!   named structs that refer to themselves through pointers.
//!
//! - **IR** ([`Module`], [`Function`], [`Block`], [`Instr`], [`Terminator`]):
//!   SSA values in basic blocks, shaped like LLVM IR with typed pointers.
//!   Indexed address computations ([`Instr::Gep`]) are the instructions the
//!   pass protects.
//!
//! - **Construction and editing** ([`FunctionBuilder`], [`InstrInserter`],
//!   [`graph::split_block_before`]): building functions from scratch and
//!   inserting code in front of an existing instruction.
//!
//! - **Diagnostics** ([`Printer`], [`verify_function`]): textual rendering
//!   and structural checks used by tests and debug logging.
//!
//! # Crate Dependencies
//!
//! No dependency on the pass or the evaluator. Serialization of the IR is
//! available behind the `serde` feature.

pub mod builder;
pub mod format;
pub mod graph;
pub mod ir;
pub mod types;
pub mod verify;

pub use builder::{FunctionBuilder, InstrInserter};
pub use format::{Printer, TypeDisplay};
pub use ir::{
    BinOp, Block, BlockId, CastOp, Constant, Function, GepFlags, Instr, InstrLocation,
    IntPredicate, Module, Operand, Param, Terminator, ValueId,
};
pub use types::{StructType, TypeId, TypeKind, TypePool};
pub use verify::{verify_function, VerifyError};

#[cfg(test)]
mod test_helpers;
