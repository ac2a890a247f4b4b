//! Region-based memory.
//!
//! Every allocation is its own region and every pointer names the region
//! it was derived from. An access is valid only if it lies entirely inside
//! a live region, so out-of-bounds accesses are detected exactly instead
//! of silently landing in a neighbouring allocation.

use crate::error::EvalError;

/// Where a region was allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
    Stack,
    Heap,
}

#[derive(Clone, Debug)]
struct Region {
    bytes: Vec<u8>,
    kind: RegionKind,
    live: bool,
}

/// A non-null pointer: a region and a byte offset into it.
///
/// The offset may lie outside the region; only accesses are checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub region: u32,
    pub offset: i64,
}

impl Pointer {
    #[must_use]
    pub fn offset_by(self, delta: i64) -> Self {
        Pointer {
            region: self.region,
            offset: self.offset.wrapping_add(delta),
        }
    }

    /// Encode as the 64-bit integer stored in memory.
    ///
    /// The region number plus one goes in the high half so that null
    /// encodes as zero; the offset is kept in the low half.
    pub fn encode(ptr: Option<Pointer>) -> u64 {
        match ptr {
            None => 0,
            Some(p) => {
                let low = u64::from(u32::from_ne_bytes((p.offset as i32).to_ne_bytes()));
                (u64::from(p.region) + 1) << 32 | low
            }
        }
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(raw: u64) -> Option<Pointer> {
        let high = raw >> 32;
        if high == 0 {
            return None;
        }
        let low = u32::try_from(raw & 0xFFFF_FFFF).unwrap_or(0);
        Some(Pointer {
            region: u32::try_from(high - 1).unwrap_or(u32::MAX),
            offset: i64::from(i32::from_ne_bytes(low.to_ne_bytes())),
        })
    }
}

/// All regions of one evaluation.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    regions: Vec<Region>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled region of `size` bytes.
    pub fn allocate(&mut self, size: u64, kind: RegionKind) -> Result<Pointer, EvalError> {
        let len = usize::try_from(size)
            .map_err(|_| EvalError::malformed(format!("allocation of {size} bytes")))?;
        let region = u32::try_from(self.regions.len())
            .map_err(|_| EvalError::malformed("too many allocations"))?;
        self.regions.push(Region {
            bytes: vec![0; len],
            kind,
            live: true,
        });
        Ok(Pointer { region, offset: 0 })
    }

    /// Release a heap region. `ptr` must point at its start.
    pub fn free(&mut self, ptr: Pointer) -> Result<(), EvalError> {
        let region = self
            .regions
            .get_mut(ptr.region as usize)
            .ok_or(EvalError::InvalidFree)?;
        if ptr.offset != 0 || region.kind != RegionKind::Heap || !region.live {
            return Err(EvalError::InvalidFree);
        }
        region.live = false;
        Ok(())
    }

    /// Mark stack regions dead when their frame returns.
    pub fn release_stack(&mut self, regions: &[u32]) {
        for &r in regions {
            if let Some(region) = self.regions.get_mut(r as usize) {
                region.live = false;
            }
        }
    }

    /// Size of a region in bytes.
    pub fn region_size(&self, region: u32) -> Option<u64> {
        self.regions
            .get(region as usize)
            .map(|r| r.bytes.len() as u64)
    }

    fn checked_range(&self, ptr: Pointer, len: u64) -> Result<std::ops::Range<usize>, EvalError> {
        let region = self
            .regions
            .get(ptr.region as usize)
            .ok_or_else(|| EvalError::malformed(format!("pointer into unknown region {}", ptr.region)))?;
        if !region.live {
            return Err(EvalError::UseAfterFree { region: ptr.region });
        }
        let size = region.bytes.len() as u64;
        let out_of_bounds = || EvalError::OutOfBounds {
            region: ptr.region,
            offset: ptr.offset,
            len,
            size,
        };
        let start = u64::try_from(ptr.offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        if end > size {
            return Err(out_of_bounds());
        }
        let start = usize::try_from(start).map_err(|_| out_of_bounds())?;
        let end = usize::try_from(end).map_err(|_| out_of_bounds())?;
        Ok(start..end)
    }

    pub fn read(&self, ptr: Pointer, len: u64) -> Result<&[u8], EvalError> {
        let range = self.checked_range(ptr, len)?;
        Ok(&self.regions[ptr.region as usize].bytes[range])
    }

    pub fn write(&mut self, ptr: Pointer, data: &[u8]) -> Result<(), EvalError> {
        let range = self.checked_range(ptr, data.len() as u64)?;
        self.regions[ptr.region as usize].bytes[range].copy_from_slice(data);
        Ok(())
    }
}
