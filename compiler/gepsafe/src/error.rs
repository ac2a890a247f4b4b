//! Errors raised by the pass.

use gepsafe_ir::ValueId;
use thiserror::Error;

/// An address computation whose index chain the pass cannot interpret.
///
/// These are fatal: the pass stops and the host must not continue with
/// a partially instrumented function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("address computation {gep} selects a struct field with a non-constant index at step {step}")]
    NonConstantFieldIndex { gep: ValueId, step: usize },

    #[error("address computation {gep} selects field {field} of a struct with {field_count} fields at step {step}")]
    FieldIndexOutOfRange {
        gep: ValueId,
        step: usize,
        field: i64,
        field_count: usize,
    },

    #[error("address computation {gep} steps through a pointer after the first index (step {step})")]
    PointerAfterFirstIndex { gep: ValueId, step: usize },

    #[error("address computation {gep} indexes into a vector at step {step}, which is not supported")]
    VectorIndex { gep: ValueId, step: usize },

    #[error("address computation {gep} indexes into non-aggregate type `{ty}` at step {step}")]
    UnindexableType {
        gep: ValueId,
        step: usize,
        ty: String,
    },
}

/// Errors returned by the pass driver.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GepSafeError {
    #[error("in function `{function}`: {violation}")]
    Contract {
        function: String,
        violation: ContractViolation,
    },

    #[error("in function `{function}`: address computation {gep} disappeared during instrumentation")]
    LostInstruction { function: String, gep: ValueId },
}
