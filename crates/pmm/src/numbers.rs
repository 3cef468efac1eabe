//! Physical frame numbers.
//!
//! A frame number names one PAGE_SIZE-aligned frame of physical memory, which in the
//! software model is its slot in emulated RAM.

use core::fmt;

use crate::{address::PhysicalAddress, arch};

/// A physical memory frame number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FrameNumber(usize);

impl FrameNumber {
    /// Creates a new frame number.
    #[inline]
    pub const fn new(number: usize) -> Self {
        Self(number)
    }

    /// Returns the physical address at the start of this frame.
    #[inline]
    pub const fn start(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * arch::PAGE_SIZE)
    }

    /// Returns the frame number as an index into per-frame tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameNumber({})", self.0)
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.0)
    }
}

impl From<PhysicalAddress> for FrameNumber {
    #[inline]
    fn from(addr: PhysicalAddress) -> Self {
        Self::new(addr.as_usize() / arch::PAGE_SIZE)
    }
}
