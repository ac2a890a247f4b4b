//! Runtime bounds guards for indexed address computations.
//!
//! The pass rewrites every `getelementptr` whose indices can be checked so
//! that the program traps instead of computing an out-of-bounds address:
//!
//! - **Allocation sizes** ([`alloc_size`]): element counts of stack and
//!   heap allocations, carried through pointer reinterpretation.
//! - **Bounds conditions** ([`bounds`]): which index of a chain needs a
//!   range check, derived from the static type at each step.
//! - **Guards** ([`guard`]): the check, a trap block, and the branch that
//!   chooses between them.
//! - **Driver** ([`GepSafePass`], [`run_on_module`]): runs the phases per
//!   function and reports what changed.
//!
//! # Crate Dependencies
//!
//! Operates on `gepsafe_ir`. The reference evaluator in `gepsafe_eval` is
//! only used by this crate's tests.

pub mod alloc_size;
pub mod bounds;
mod config;
mod error;
pub mod guard;
mod pass;
mod report;

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
mod tests;

pub use alloc_size::{track_allocations, AllocationMap, AllocationOrigin, AllocationRecord, ElementCount};
pub use bounds::{
    collect_address_computations, synthesize, AddressComputation, BoundsPlan, Condition,
    RangeCheck, UpperBound,
};
pub use config::{AllocRoutine, GepSafeConfig, HeapSizeUnits};
pub use error::{ContractViolation, GepSafeError};
pub use guard::{insert_guard, Guard};
pub use pass::{run_on_module, FunctionPass, GepSafePass};
pub use report::{Counters, FunctionReport, PassReport};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset or another global subscriber is
/// already installed. Per-guard events are logged at `debug`, allocation
/// tracking at `trace`: `RUST_LOG=gepsafe=debug`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let Ok(filter) = EnvFilter::try_from_default_env() else {
            return;
        };
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init();
    });
}
