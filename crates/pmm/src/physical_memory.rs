//! Emulated physical memory.
//!
//! Physical memory is a fixed array of page-sized frames. Each frame has its own lock, so
//! contents of distinct frames can be read and written concurrently while the allocator
//! state is guarded separately.

use alloc::{boxed::Box, vec::Vec};

use spin::Mutex;

use crate::{FrameNumber, PhysicalAddress, arch::PAGE_SIZE};

/// The contents of one physical frame.
pub type FrameData = [u8; PAGE_SIZE];

/// Emulated physical memory for the software model.
pub struct PhysicalMemory {
    frames: Box<[Mutex<Box<FrameData>>]>,
}

impl PhysicalMemory {
    /// Creates zero-filled physical memory holding `frame_count` frames.
    pub fn new(frame_count: usize) -> Self {
        let frames = (0..frame_count)
            .map(|_| Mutex::new(Box::new([0u8; PAGE_SIZE])))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { frames }
    }

    fn slot(&self, frame: FrameNumber) -> &Mutex<Box<FrameData>> {
        assert!(
            frame.index() < self.frames.len(),
            "physical address out of bounds"
        );
        &self.frames[frame.index()]
    }

    /// Runs `f` with shared access to the contents of `frame`.
    pub fn with_frame<R>(&self, frame: FrameNumber, f: impl FnOnce(&FrameData) -> R) -> R {
        let guard = self.slot(frame).lock();
        f(&**guard)
    }

    /// Runs `f` with exclusive access to the contents of `frame`.
    pub fn with_frame_mut<R>(&self, frame: FrameNumber, f: impl FnOnce(&mut FrameData) -> R) -> R {
        let mut guard = self.slot(frame).lock();
        f(&mut **guard)
    }

    /// Copies bytes starting at `addr` into `buf`. The range must not cross a frame.
    pub fn read(&self, addr: PhysicalAddress, buf: &mut [u8]) {
        let offset = addr.page_offset();
        assert!(offset + buf.len() <= PAGE_SIZE, "read crosses a frame boundary");
        self.with_frame(addr.frame_number(), |data| {
            buf.copy_from_slice(&data[offset..offset + buf.len()])
        });
    }

    /// Copies `data` into memory starting at `addr`. The range must not cross a frame.
    pub fn write(&self, addr: PhysicalAddress, data: &[u8]) {
        let offset = addr.page_offset();
        assert!(offset + data.len() <= PAGE_SIZE, "write crosses a frame boundary");
        self.with_frame_mut(addr.frame_number(), |frame| {
            frame[offset..offset + data.len()].copy_from_slice(data)
        });
    }

    /// Fills `frame` with zeroes.
    pub fn zero(&self, frame: FrameNumber) {
        self.with_frame_mut(frame, |data| data.fill(0));
    }

    /// Copies the full contents of `src` into `dst`.
    pub fn copy(&self, src: FrameNumber, dst: FrameNumber) {
        if src == dst {
            return;
        }

        // Always lock the lower frame first.
        let (first, second) = if src < dst { (src, dst) } else { (dst, src) };
        let mut a = self.slot(first).lock();
        let mut b = self.slot(second).lock();
        if src < dst {
            b.copy_from_slice(&a[..]);
        } else {
            a.copy_from_slice(&b[..]);
        }
    }
}
