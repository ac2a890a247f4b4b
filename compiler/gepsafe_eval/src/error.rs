//! Evaluation errors.
//!
//! Memory faults are errors rather than outcomes: a program that reaches
//! one has undefined behaviour, which is exactly what an instrumented
//! program must never do.

use gepsafe_ir::{BlockId, ValueId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvalError {
    // Memory
    #[error("out-of-bounds access of {len} bytes at offset {offset} of region {region} ({size} bytes)")]
    OutOfBounds {
        region: u32,
        offset: i64,
        len: u64,
        size: u64,
    },

    #[error("null pointer dereference")]
    NullDereference,

    #[error("access to freed region {region}")]
    UseAfterFree { region: u32 },

    #[error("free of a pointer that is not the start of a live heap region")]
    InvalidFree,

    // Values and calls
    #[error("value {value} used before definition in `{function}`")]
    UndefinedValue { function: String, value: ValueId },

    #[error("call to unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("`{function}` expects {expected} arguments, got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    // Control
    #[error("reached unreachable code in `{function}` at {block}")]
    Unreachable { function: String, block: BlockId },

    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("call depth limit of {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("malformed IR: {message}")]
    Malformed { message: String },
}

impl EvalError {
    /// Whether the error is an invalid memory access.
    pub fn is_memory_fault(&self) -> bool {
        matches!(
            self,
            EvalError::OutOfBounds { .. }
                | EvalError::NullDereference
                | EvalError::UseAfterFree { .. }
                | EvalError::InvalidFree
        )
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        EvalError::Malformed {
            message: message.into(),
        }
    }
}
