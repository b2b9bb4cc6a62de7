use std::fmt;

use crate::errors::DisplayError;
use crate::vram::{PixelFormat, VramRegion};

/// Alignment the display hardware requires for every buffer start.
pub const VRAM_ALIGNMENT: u64 = 64;

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0. Saturates instead of overflowing.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

/// Bump allocator over the fixed video memory pool.
///
/// Allocations only ever move the offset forward. There is no per-region free: every region
/// lives as long as the device that requested it, and the whole arena is recycled with
/// [`VramArena::reset`] when that device goes away.
#[derive(Clone)]
pub struct VramArena<const ALIGN: u64 = VRAM_ALIGNMENT> {
    base: u64,
    capacity: u64,
    offset: u64,
}

impl<const ALIGN: u64> VramArena<ALIGN> {
    /// Creates an empty arena. It cannot hand out memory until [`init`](Self::init) is called.
    pub fn new() -> Self {
        Self { base: 0, capacity: 0, offset: 0 }
    }

    /// Captures the pool `[base, base + capacity)` and rewinds the offset.
    ///
    /// Safe to call again after a teardown; the previous contents are simply forgotten.
    pub fn init(&mut self, base: u64, capacity: u64) {
        self.base = base;
        self.capacity = capacity;
        self.offset = 0;
        log::debug!("VramArena: init base={:#x} capacity={}", base, capacity);
    }

    /// Reserves `size` bytes, rounded up to `ALIGN`.
    ///
    /// On failure the offset is left untouched.
    pub fn allocate(&mut self, size: u64, format: PixelFormat) -> Result<VramRegion, DisplayError> {
        let rounded = align_up(size, ALIGN);
        let end = match self.offset.checked_add(rounded) {
            Some(end) if end <= self.capacity => end,
            _ => {
                log::warn!(
                    "VramArena: cannot allocate {} bytes ({} rounded), {} of {} remaining",
                    size,
                    rounded,
                    self.remaining(),
                    self.capacity
                );
                return Err(DisplayError::AllocationExhausted {
                    requested: rounded,
                    remaining: self.remaining(),
                });
            }
        };

        let region = VramRegion::new(self.base + self.offset, rounded, format);
        self.offset = end;
        log::trace!("VramArena: allocated {:?}", region);
        Ok(region)
    }

    /// Rewinds to the start of the pool. Memory is not cleared.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Drops every region handed out after `mark`, a value previously read from
    /// [`offset`](Self::offset). Used to undo a group of allocations that failed halfway.
    pub(crate) fn rewind_to(&mut self, mark: u64) {
        debug_assert!(mark <= self.offset);
        self.offset = mark.min(self.offset);
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes handed out so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn remaining(&self) -> u64 {
        self.capacity - self.offset
    }

    pub fn alignment(&self) -> u64 {
        ALIGN
    }
}

impl<const ALIGN: u64> Default for VramArena<ALIGN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const ALIGN: u64> fmt::Debug for VramArena<ALIGN> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VramArena")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("offset", &self.offset)
            .field("align", &ALIGN)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(capacity: u64) -> VramArena {
        let mut arena = VramArena::new();
        arena.init(0, capacity);
        arena
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(u64::MAX, 64), u64::MAX / 64 * 64);
    }

    #[test]
    fn allocations_are_aligned_and_contiguous() {
        let mut arena = arena(1024);
        let a = arena.allocate(10, PixelFormat::Rgb565).unwrap();
        let b = arena.allocate(100, PixelFormat::Rgb565).unwrap();
        let c = arena.allocate(64, PixelFormat::Depth16).unwrap();

        assert_eq!((a.address(), a.size()), (0, 64));
        assert_eq!((b.address(), b.size()), (64, 128));
        assert_eq!((c.address(), c.size()), (192, 64));
        assert_eq!(arena.offset(), 256);
        assert_eq!(arena.remaining(), 768);
    }

    #[test]
    fn crossing_allocation_fails_without_moving_offset() {
        let sizes = [100u64, 300, 50, 200, 400];
        let mut arena = arena(640);
        let mut used = 0u64;

        for size in sizes {
            let before = arena.offset();
            let rounded = align_up(size, 64);
            match arena.allocate(size, PixelFormat::Rgba8888) {
                Ok(region) => {
                    assert!(used + rounded <= 640);
                    assert_eq!(region.address(), before);
                    used += rounded;
                }
                Err(DisplayError::AllocationExhausted { requested, remaining }) => {
                    assert!(used + rounded > 640);
                    assert_eq!(requested, rounded);
                    assert_eq!(remaining, 640 - used);
                    assert_eq!(arena.offset(), before);
                }
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        // 128 + 320 + 64 = 512 fit, 256 does not, 448 does not.
        assert_eq!(arena.offset(), 512);
    }

    #[test]
    fn exact_fit_succeeds() {
        let mut arena = arena(128);
        arena.allocate(128, PixelFormat::Rgb565).unwrap();
        assert_eq!(arena.remaining(), 0);
        assert!(arena.allocate(1, PixelFormat::Rgb565).is_err());
    }

    #[test]
    fn reset_rewinds_and_keeps_capacity() {
        let mut arena = arena(256);
        arena.allocate(200, PixelFormat::Rgb565).unwrap();
        arena.reset();
        arena.reset();
        assert_eq!(arena.offset(), 0);
        assert_eq!(arena.capacity(), 256);
        assert_eq!(arena.allocate(8, PixelFormat::Rgb565).unwrap().address(), 0);
    }

    #[test]
    fn base_offsets_region_addresses() {
        let mut arena: VramArena = VramArena::new();
        arena.init(0x4000, 512);
        let r = arena.allocate(1, PixelFormat::Rgb565).unwrap();
        assert_eq!(r.address(), 0x4000);

        // Re-init forgets everything from the previous cycle.
        arena.init(0, 64);
        assert_eq!(arena.offset(), 0);
        assert_eq!(arena.allocate(64, PixelFormat::Rgb565).unwrap().address(), 0);
    }

    #[test]
    fn alignment_is_a_type_parameter() {
        let mut arena: VramArena<16> = VramArena::new();
        arena.init(0, 64);
        assert_eq!(arena.allocate(1, PixelFormat::Rgb565).unwrap().size(), 16);
        assert_eq!(arena.alignment(), 16);
    }
}
