//! Reference evaluator for gepsafe IR.
//!
//! Runs IR functions against byte-addressed memory in which every
//! allocation is a separate region. Any access that leaves its region is
//! reported as [`EvalError::OutOfBounds`], which makes the effect of the
//! instrumentation observable: an uninstrumented out-of-range access is a
//! memory fault, the instrumented one ends in [`Outcome::Trapped`].

mod error;
pub mod interpreter;
pub mod layout;
pub mod memory;
mod value;

pub use error::EvalError;
pub use interpreter::{EvalConfig, Interpreter, Outcome};
pub use layout::DataLayout;
pub use memory::{Memory, Pointer, RegionKind};
pub use value::RuntimeValue;
