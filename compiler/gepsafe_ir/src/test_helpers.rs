//! Shared test utilities for IR tests.

use crate::ir::{Block, BlockId, Function, Param, Terminator, ValueId};
use crate::types::TypeId;

/// Shorthand for `ValueId::new(n)`.
pub(crate) fn v(n: u32) -> ValueId {
    ValueId::new(n)
}

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// Parameter `n` of type `ty`.
pub(crate) fn param(n: u32, ty: TypeId) -> Param {
    Param { value: v(n), ty }
}

/// An empty block with the given terminator.
pub(crate) fn block(id: u32, terminator: Terminator) -> Block {
    Block {
        id: b(id),
        params: vec![],
        body: vec![],
        terminator,
    }
}

/// Build a function named `test` from raw parts.
pub(crate) fn make_func(
    params: Vec<Param>,
    return_type: TypeId,
    blocks: Vec<Block>,
    value_types: Vec<TypeId>,
) -> Function {
    Function {
        name: "test".to_owned(),
        params,
        return_type,
        blocks,
        entry: b(0),
        value_types,
    }
}
