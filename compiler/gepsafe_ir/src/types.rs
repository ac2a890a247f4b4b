//! Type descriptor model.
//!
//! Every type is stored once in a [`TypePool`] and referenced by a 32-bit
//! [`TypeId`]. Structural types are hash-consed, so type equality is an
//! index comparison. Identified structs (`%struct.lnode`) are the one
//! exception: they are created by name, may be self-referential through a
//! pointer, and get their body after creation.
//!
//! # Design (from the Ori type pool)
//!
//! - Primitive types have fixed indices (0-7) for O(1) lookup
//! - Structural types are interned through an `FxHashMap`
//! - `TypeId` is `Copy` and 4 bytes wide

use std::fmt;

use rustc_hash::FxHashMap;

/// A 32-bit index into the [`TypePool`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    // === Primitive Types (indices 0-7) ===

    /// `void`: the result type of calls that produce nothing.
    pub const VOID: Self = Self(0);
    /// `i1`: the result type of comparisons.
    pub const I1: Self = Self(1);
    /// `i8`: a byte.
    pub const I8: Self = Self(2);
    /// `i16`.
    pub const I16: Self = Self(3);
    /// `i32`.
    pub const I32: Self = Self(4);
    /// `i64`: the canonical index and size width.
    pub const I64: Self = Self(5);
    /// `float` (32-bit IEEE).
    pub const F32: Self = Self(6);
    /// `double` (64-bit IEEE).
    pub const F64: Self = Self(7);

    /// First index for dynamically interned types.
    pub const FIRST_DYNAMIC: u32 = 8;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is one of the pre-interned primitive types.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::FIRST_DYNAMIC
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Body of a struct type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructType {
    /// `Some` for identified structs, `None` for literal `{ ... }` structs.
    pub name: Option<String>,
    /// Field types in declaration order.
    pub fields: Vec<TypeId>,
}

/// The shape of a type.
///
/// Closed sum: an index chain can only ever traverse `Array`, `Struct`,
/// `Pointer` and `Vector`. The scalar kinds and `Void` are leaves.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    Void,
    Int { bits: u32 },
    Float { bits: u32 },
    Pointer { pointee: TypeId },
    Array { elem: TypeId, len: u64 },
    Vector { elem: TypeId, len: u32 },
    Struct(StructType),
}

/// Interning storage for all types of a module.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypePool {
    /// Type data, indexed by `TypeId::index()`.
    kinds: Vec<TypeKind>,
    /// Structural deduplication map. Identified structs are not in here.
    map: FxHashMap<TypeKind, TypeId>,
    /// Identified structs by name.
    named: FxHashMap<String, TypeId>,
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePool {
    /// Create a pool with the primitive types pre-interned at their fixed
    /// indices.
    pub fn new() -> Self {
        let mut pool = TypePool {
            kinds: Vec::with_capacity(64),
            map: FxHashMap::default(),
            named: FxHashMap::default(),
        };
        let primitives = [
            TypeKind::Void,               // 0 = VOID
            TypeKind::Int { bits: 1 },    // 1 = I1
            TypeKind::Int { bits: 8 },    // 2 = I8
            TypeKind::Int { bits: 16 },   // 3 = I16
            TypeKind::Int { bits: 32 },   // 4 = I32
            TypeKind::Int { bits: 64 },   // 5 = I64
            TypeKind::Float { bits: 32 }, // 6 = F32
            TypeKind::Float { bits: 64 }, // 7 = F64
        ];
        for kind in primitives {
            pool.push(kind);
        }
        debug_assert_eq!(pool.kinds.len(), TypeId::FIRST_DYNAMIC as usize);
        pool
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(
            u32::try_from(self.kinds.len()).unwrap_or_else(|_| panic!("type count exceeds u32::MAX")),
        );
        self.map.insert(kind.clone(), id);
        self.kinds.push(kind);
        id
    }

    /// Intern a structural type, returning the existing id if it is
    /// already present.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.map.get(&kind) {
            return id;
        }
        self.push(kind)
    }

    /// Look up the shape of a type.
    ///
    /// # Panics
    ///
    /// Panics if `ty` was not created by this pool.
    #[inline]
    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.kinds[ty.index()]
    }

    /// Number of types in the pool, primitives included.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    // === Constructors ===

    /// `iN`.
    pub fn int(&mut self, bits: u32) -> TypeId {
        self.intern(TypeKind::Int { bits })
    }

    /// `float` / `double` and friends.
    pub fn float(&mut self, bits: u32) -> TypeId {
        self.intern(TypeKind::Float { bits })
    }

    /// `pointee*`.
    pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer { pointee })
    }

    /// `[len x elem]`.
    pub fn array(&mut self, elem: TypeId, len: u64) -> TypeId {
        self.intern(TypeKind::Array { elem, len })
    }

    /// `<len x elem>`.
    pub fn vector(&mut self, elem: TypeId, len: u32) -> TypeId {
        self.intern(TypeKind::Vector { elem, len })
    }

    /// Literal struct `{ fields... }`.
    pub fn literal_struct(&mut self, fields: &[TypeId]) -> TypeId {
        self.intern(TypeKind::Struct(StructType {
            name: None,
            fields: fields.to_vec(),
        }))
    }

    /// Get or create the identified struct `%name`.
    ///
    /// A freshly created struct has no fields until
    /// [`set_struct_body`](Self::set_struct_body) is called, which allows
    /// self-referential types such as linked-list nodes.
    pub fn named_struct(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.named.get(name) {
            return id;
        }
        let id = TypeId(
            u32::try_from(self.kinds.len()).unwrap_or_else(|_| panic!("type count exceeds u32::MAX")),
        );
        self.kinds.push(TypeKind::Struct(StructType {
            name: Some(name.to_owned()),
            fields: Vec::new(),
        }));
        self.named.insert(name.to_owned(), id);
        id
    }

    /// Set the field list of an identified struct.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is not an identified struct.
    pub fn set_struct_body(&mut self, ty: TypeId, fields: &[TypeId]) {
        match &mut self.kinds[ty.index()] {
            TypeKind::Struct(st) if st.name.is_some() => st.fields = fields.to_vec(),
            other => panic!("set_struct_body on non-identified type {other:?}"),
        }
    }

    // === Queries ===

    /// The pointee of a pointer type.
    pub fn pointee(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    pub fn is_pointer(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), TypeKind::Pointer { .. })
    }

    /// Element type of an array, vector or pointer.
    pub fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Array { elem, .. } | TypeKind::Vector { elem, .. } => Some(*elem),
            TypeKind::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    /// Static element count of an array or vector.
    pub fn element_count(&self, ty: TypeId) -> Option<u64> {
        match self.kind(ty) {
            TypeKind::Array { len, .. } => Some(*len),
            TypeKind::Vector { len, .. } => Some(u64::from(*len)),
            _ => None,
        }
    }

    /// Field list of a struct.
    pub fn fields(&self, ty: TypeId) -> Option<&[TypeId]> {
        match self.kind(ty) {
            TypeKind::Struct(st) => Some(&st.fields),
            _ => None,
        }
    }

    /// Width of an integer type.
    pub fn int_bits(&self, ty: TypeId) -> Option<u32> {
        match self.kind(ty) {
            TypeKind::Int { bits } => Some(*bits),
            _ => None,
        }
    }

    /// Fixed bit width of a primitive type.
    ///
    /// Integers and floats report their width; a vector of primitives
    /// reports `len * width`. Pointers, arrays, structs and `void` have no
    /// primitive width.
    pub fn primitive_bits(&self, ty: TypeId) -> Option<u64> {
        match self.kind(ty) {
            TypeKind::Int { bits } | TypeKind::Float { bits } => Some(u64::from(*bits)),
            TypeKind::Vector { elem, len } => self
                .primitive_bits(*elem)
                .map(|bits| bits * u64::from(*len)),
            TypeKind::Void
            | TypeKind::Pointer { .. }
            | TypeKind::Array { .. }
            | TypeKind::Struct(_) => None,
        }
    }
}
