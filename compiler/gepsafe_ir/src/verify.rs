//! Structural well-formedness checks.
//!
//! Catches the mistakes a CFG rewrite can make: dangling block targets,
//! blocks whose IDs disagree with their position, values defined twice,
//! and uses of values that are never defined. Dominance is not checked.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::graph::successors;
use crate::ir::{BlockId, Function, ValueId};

/// A structural defect found by [`verify_function`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// `blocks[index].id` does not equal `index`.
    BlockIdMismatch { index: usize, id: BlockId },
    /// The entry block does not exist.
    MissingEntry { entry: BlockId },
    /// A terminator targets a block that does not exist.
    DanglingTarget { block: BlockId, target: BlockId },
    /// A value is defined more than once.
    Redefinition { value: ValueId },
    /// A value is used but never defined.
    UndefinedUse { block: BlockId, value: ValueId },
    /// A value ID has no recorded type.
    UntypedValue { value: ValueId },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockIdMismatch { index, id } => {
                write!(f, "block at index {index} has id {id}")
            }
            Self::MissingEntry { entry } => write!(f, "entry block {entry} does not exist"),
            Self::DanglingTarget { block, target } => {
                write!(f, "{block} branches to missing block {target}")
            }
            Self::Redefinition { value } => write!(f, "value {value} defined more than once"),
            Self::UndefinedUse { block, value } => {
                write!(f, "{block} uses undefined value {value}")
            }
            Self::UntypedValue { value } => write!(f, "value {value} has no type"),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Check a function for structural defects, returning all of them.
pub fn verify_function(func: &Function) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();
    let num_blocks = func.blocks.len();

    if func.entry.index() >= num_blocks {
        errors.push(VerifyError::MissingEntry { entry: func.entry });
    }

    let mut defined: FxHashSet<ValueId> = FxHashSet::default();
    let mut define = |value: ValueId, errors: &mut Vec<VerifyError>| {
        if value.index() >= func.value_types.len() {
            errors.push(VerifyError::UntypedValue { value });
        }
        if !defined.insert(value) {
            errors.push(VerifyError::Redefinition { value });
        }
    };

    for param in &func.params {
        define(param.value, &mut errors);
    }
    for (index, block) in func.blocks.iter().enumerate() {
        if block.id.index() != index {
            errors.push(VerifyError::BlockIdMismatch {
                index,
                id: block.id,
            });
        }
        for &(value, _) in &block.params {
            define(value, &mut errors);
        }
        for instr in &block.body {
            if let Some(value) = instr.defined_value() {
                define(value, &mut errors);
            }
        }
        for target in successors(&block.terminator) {
            if target.index() >= num_blocks {
                errors.push(VerifyError::DanglingTarget {
                    block: block.id,
                    target,
                });
            }
        }
    }

    for block in &func.blocks {
        let uses = block
            .body
            .iter()
            .flat_map(crate::ir::Instr::used_values)
            .chain(block.terminator.used_values());
        for value in uses {
            if !defined.contains(&value) {
                errors.push(VerifyError::UndefinedUse {
                    block: block.id,
                    value,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
