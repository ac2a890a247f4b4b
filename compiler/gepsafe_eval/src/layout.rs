//! Data layout: sizes, alignments and field offsets.
//!
//! A fixed 64-bit little-endian layout. Integers occupy the smallest
//! power-of-two number of bytes that holds them and are naturally
//! aligned; pointers are 8 bytes; structs are padded C-style.

use gepsafe_ir::{TypeId, TypeKind, TypePool};

/// Size in bytes of a pointer.
pub const POINTER_BYTES: u64 = 8;

/// Byte size of an `iN`/`fN` of `bits` width.
fn scalar_bytes(bits: u32) -> u64 {
    u64::from(bits.div_ceil(8).max(1)).next_power_of_two()
}

fn align_to(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// Layout queries against one type pool.
#[derive(Clone, Copy)]
pub struct DataLayout<'p> {
    pool: &'p TypePool,
}

impl<'p> DataLayout<'p> {
    pub fn new(pool: &'p TypePool) -> Self {
        Self { pool }
    }

    /// Allocation size of `ty`, including trailing padding.
    pub fn size_of(&self, ty: TypeId) -> u64 {
        match self.pool.kind(ty) {
            TypeKind::Void => 0,
            TypeKind::Int { bits } | TypeKind::Float { bits } => scalar_bytes(*bits),
            TypeKind::Pointer { .. } => POINTER_BYTES,
            TypeKind::Array { elem, len } => self.size_of(*elem).saturating_mul(*len),
            TypeKind::Vector { elem, len } => self.size_of(*elem).saturating_mul(u64::from(*len)),
            TypeKind::Struct(st) => {
                let mut size = 0;
                for &field in &st.fields {
                    size = align_to(size, self.align_of(field)) + self.size_of(field);
                }
                align_to(size, self.align_of(ty))
            }
        }
    }

    /// ABI alignment of `ty`.
    pub fn align_of(&self, ty: TypeId) -> u64 {
        match self.pool.kind(ty) {
            TypeKind::Void => 1,
            TypeKind::Int { bits } | TypeKind::Float { bits } => scalar_bytes(*bits).min(8),
            TypeKind::Pointer { .. } => POINTER_BYTES,
            TypeKind::Array { elem, .. } | TypeKind::Vector { elem, .. } => self.align_of(*elem),
            TypeKind::Struct(st) => st
                .fields
                .iter()
                .map(|&f| self.align_of(f))
                .max()
                .unwrap_or(1),
        }
    }

    /// Byte offset of field `index` inside struct `ty`.
    pub fn field_offset(&self, ty: TypeId, index: usize) -> Option<u64> {
        let fields = self.pool.fields(ty)?;
        if index >= fields.len() {
            return None;
        }
        let mut offset = 0;
        for (i, &field) in fields.iter().enumerate() {
            offset = align_to(offset, self.align_of(field));
            if i == index {
                break;
            }
            offset += self.size_of(field);
        }
        Some(offset)
    }
}
