//! Pass configuration.

/// A function whose return value is a fresh heap allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocRoutine {
    /// Symbol name matched against `Call` callees.
    pub name: String,
    /// Position of the argument holding the requested size.
    pub size_arg: usize,
}

impl AllocRoutine {
    pub fn new(name: impl Into<String>, size_arg: usize) -> Self {
        Self {
            name: name.into(),
            size_arg,
        }
    }
}

/// What the size argument of an allocation routine counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeapSizeUnits {
    /// The size is in bytes and is converted to elements of the returned
    /// pointer's element type at the allocation site.
    #[default]
    Bytes,
    /// The size is used as the element count unchanged.
    ///
    /// Over-approximates the bound when the returned pointer's element
    /// type is wider than one byte.
    Elements,
}

/// Configuration for the gepsafe pass.
///
/// Immutable while the pass runs; shared by every function it visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GepSafeConfig {
    /// Calls recognised as heap allocations.
    pub alloc_routines: Vec<AllocRoutine>,

    /// Interpretation of the allocation routines' size argument.
    pub heap_size_units: HeapSizeUnits,
}

impl Default for GepSafeConfig {
    fn default() -> Self {
        Self {
            alloc_routines: vec![AllocRoutine::new("malloc", 0)],
            heap_size_units: HeapSizeUnits::Bytes,
        }
    }
}

impl GepSafeConfig {
    /// Configuration without any recognised allocation routine.
    #[must_use]
    pub fn stack_only() -> Self {
        Self {
            alloc_routines: Vec::new(),
            ..Self::default()
        }
    }

    /// Recognise an additional allocation routine (builder pattern).
    #[must_use]
    pub fn with_alloc_routine(mut self, name: impl Into<String>, size_arg: usize) -> Self {
        self.alloc_routines.push(AllocRoutine::new(name, size_arg));
        self
    }

    /// Set the heap size interpretation (builder pattern).
    #[must_use]
    pub fn with_heap_size_units(mut self, units: HeapSizeUnits) -> Self {
        self.heap_size_units = units;
        self
    }

    /// Look up the allocation routine called `callee`.
    pub fn alloc_routine(&self, callee: &str) -> Option<&AllocRoutine> {
        self.alloc_routines.iter().find(|r| r.name == callee)
    }
}
