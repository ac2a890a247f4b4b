//! Runtime values.

use std::fmt;

use crate::memory::Pointer;

/// A value held in an SSA register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeValue {
    /// An integer of `bits` width. Bits above the width are always zero.
    Int { bits: u32, value: u64 },
    /// A pointer, `None` for null.
    Ptr(Option<Pointer>),
}

/// Keep the low `bits` of `value`.
pub(crate) fn mask(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

/// Sign-extend the low `bits` of `value` to `i64`.
pub(crate) fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    let shift = 64 - bits.min(64);
    i64::from_ne_bytes((value << shift).to_ne_bytes()) >> shift
}

impl RuntimeValue {
    /// Integer value built from a sign-extended payload.
    pub fn int(bits: u32, value: i64) -> Self {
        RuntimeValue::Int {
            bits,
            value: mask(u64::from_ne_bytes(value.to_ne_bytes()), bits),
        }
    }

    pub fn bool(value: bool) -> Self {
        RuntimeValue::Int {
            bits: 1,
            value: u64::from(value),
        }
    }

    /// Signed interpretation of an integer.
    pub fn as_signed(&self) -> Option<i64> {
        match self {
            RuntimeValue::Int { bits, value } => Some(sign_extend(*value, *bits)),
            RuntimeValue::Ptr(_) => None,
        }
    }

    /// Unsigned interpretation of an integer.
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            RuntimeValue::Int { value, .. } => Some(*value),
            RuntimeValue::Ptr(_) => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Option<Pointer>> {
        match self {
            RuntimeValue::Ptr(p) => Some(*p),
            RuntimeValue::Int { .. } => None,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Int { bits, value } => write!(f, "i{bits} {}", sign_extend(*value, *bits)),
            RuntimeValue::Ptr(None) => f.write_str("null"),
            RuntimeValue::Ptr(Some(p)) => write!(f, "&r{}+{}", p.region, p.offset),
        }
    }
}
