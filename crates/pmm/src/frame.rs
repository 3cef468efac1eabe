use core::sync::atomic::{AtomicU64, Ordering};

/// Holds metadata for a physical memory frame.
///
/// Modeled after Linux's `struct page`, this data structure holds the allocator-level
/// metadata for a physical memory frame. Ownership of the frame's contents is tracked by
/// the virtual-memory layer, not here.
#[derive(Default)]
pub struct Frame {
    /// Flags identifying the state of this frame.
    pub flags: FrameFlags,
}

impl Frame {
    /// Returns true if the frame is handed out by the allocator.
    pub fn is_allocated(&self) -> bool {
        self.flags.atomic_test(FrameFlag::Allocated)
    }

    /// Returns true if the frame is pinned and must not be reclaimed.
    pub fn is_pinned(&self) -> bool {
        self.flags.atomic_test(FrameFlag::Pinned)
    }
}

#[derive(Clone, Copy)]
pub enum FrameFlag {
    /// Frame is allocated.
    Allocated = 1 << 0,
    /// Frame is involved in in-flight I/O and must not be chosen for eviction.
    Pinned = 1 << 1,
}

/// Atomic flags for a physical memory frame.
#[derive(Default)]
pub struct FrameFlags(AtomicU64);

impl FrameFlags {
    /// Creates a new `FrameFlags` instance with all flags cleared.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Sets the given flag non-atomically (by holding a mutable reference).
    pub fn set(&mut self, flag: FrameFlag) {
        *self.0.get_mut() |= flag as u64;
    }

    /// Clears every flag non-atomically.
    pub fn reset(&mut self) {
        *self.0.get_mut() = 0;
    }

    /// Tests if the given flag is set, non-atomically (by holding a mutable reference).
    pub fn test(&mut self, flag: FrameFlag) -> bool {
        (*self.0.get_mut() & flag as u64) != 0
    }

    /// Sets the given flag atomically.
    pub fn atomic_set(&self, flag: FrameFlag) {
        self.0.fetch_or(flag as u64, Ordering::AcqRel);
    }

    /// Clears the given flag atomically.
    pub fn atomic_clear(&self, flag: FrameFlag) {
        self.0.fetch_and(!(flag as u64), Ordering::AcqRel);
    }

    /// Tests if the given flag is set, atomically.
    pub fn atomic_test(&self, flag: FrameFlag) -> bool {
        (self.0.load(Ordering::Acquire) & flag as u64) != 0
    }
}
