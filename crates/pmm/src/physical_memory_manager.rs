//! Physical frame allocator.
//!
//! User pages are always backed by single frames, so the allocator only deals in
//! order-0 blocks: a LIFO free list over the frames of emulated memory plus per-frame
//! metadata used to catch double frees and to pin frames during I/O.

use alloc::{boxed::Box, vec::Vec};
use core::fmt;

use crate::{
    FrameNumber,
    frame::{Frame, FrameFlag},
};

/// Errors that can occur during physical memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free frame is available.
    OutOfMemory,
    /// The frame number does not belong to this allocator.
    InvalidFrame,
    /// The frame is already free.
    DoubleFree,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of physical frames"),
            Self::InvalidFrame => write!(f, "frame does not exist"),
            Self::DoubleFree => write!(f, "frame is already free"),
        }
    }
}

/// Physical memory manager handing out single frames.
pub struct PhysicalMemoryManager {
    frames: Box<[Frame]>,
    free_list: Vec<FrameNumber>,
}

impl PhysicalMemoryManager {
    /// Creates a manager for `total_frames` frames, all of them free.
    ///
    /// Frames are handed out in ascending order until the first one is returned.
    pub fn new(total_frames: usize) -> Self {
        let frames = (0..total_frames)
            .map(|_| Frame::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let free_list = (0..total_frames).rev().map(FrameNumber::new).collect();

        Self { frames, free_list }
    }

    /// Allocates one frame.
    pub fn allocate(&mut self) -> Result<FrameNumber, AllocError> {
        let frame = self.free_list.pop().ok_or(AllocError::OutOfMemory)?;
        let meta = &mut self.frames[frame.index()];
        debug_assert!(!meta.flags.test(FrameFlag::Allocated));
        meta.flags.set(FrameFlag::Allocated);

        Ok(frame)
    }

    /// Returns a frame to the free list.
    ///
    /// Any pin on the frame is dropped along with it.
    pub fn deallocate(&mut self, frame: FrameNumber) -> Result<(), AllocError> {
        let meta = self
            .frames
            .get_mut(frame.index())
            .ok_or(AllocError::InvalidFrame)?;
        if !meta.flags.test(FrameFlag::Allocated) {
            log::warn!("pmm: {frame} freed twice");
            return Err(AllocError::DoubleFree);
        }

        meta.flags.reset();
        self.free_list.push(frame);
        Ok(())
    }

    /// Pins an allocated frame so that it is not chosen for reclamation.
    pub fn pin(&self, frame: FrameNumber) {
        if let Some(meta) = self.frame(frame) {
            debug_assert!(meta.is_allocated(), "pinning a free frame");
            meta.flags.atomic_set(FrameFlag::Pinned);
        }
    }

    /// Removes the pin from a frame.
    pub fn unpin(&self, frame: FrameNumber) {
        if let Some(meta) = self.frame(frame) {
            meta.flags.atomic_clear(FrameFlag::Pinned);
        }
    }

    /// Returns true if the frame is currently pinned.
    pub fn is_pinned(&self, frame: FrameNumber) -> bool {
        self.frame(frame).is_some_and(Frame::is_pinned)
    }

    /// Returns the total number of frames managed by this allocator.
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns the number of free frames.
    pub fn free_frames(&self) -> usize {
        self.free_list.len()
    }

    fn frame(&self, frame_number: FrameNumber) -> Option<&Frame> {
        self.frames.get(frame_number.index())
    }
}
