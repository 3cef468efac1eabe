//! Swap device interface and an in-memory implementation.
//!
//! A swap device stores whole pages in numbered slots. Anonymous pages are written out
//! when their frame is reclaimed and read back (releasing the slot) on the next claim.

use alloc::{vec, vec::Vec};
use core::fmt;

use pmm::{FrameData, PAGE_SIZE};

use crate::IoError;

/// Index of one page-sized slot on a swap device.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapSlot({})", self.0)
    }
}

/// Backing store for evicted anonymous pages.
pub trait SwapDevice: Send {
    /// Number of slots on the device.
    fn capacity(&self) -> usize;

    /// Number of slots currently holding a page.
    fn used(&self) -> usize;

    /// Stores a page in a free slot.
    fn swap_out(&mut self, data: &FrameData) -> Result<SwapSlot, IoError>;

    /// Copies the page held in `slot` into `buf`. The slot stays in use.
    fn read(&self, slot: SwapSlot, buf: &mut FrameData) -> Result<(), IoError>;

    /// Frees `slot`.
    fn release(&mut self, slot: SwapSlot) -> Result<(), IoError>;

    /// Reads the page held in `slot` into `buf` and frees the slot.
    fn swap_in(&mut self, slot: SwapSlot, buf: &mut FrameData) -> Result<(), IoError> {
        self.read(slot, buf)?;
        self.release(slot)
    }
}

/// A swap device backed by a flat in-memory buffer.
pub struct MemorySwap {
    data: Vec<u8>,
    occupied: Vec<bool>,
    used: usize,
}

impl MemorySwap {
    pub fn new(slots: usize) -> Self {
        Self {
            data: vec![0; slots * PAGE_SIZE],
            occupied: vec![false; slots],
            used: 0,
        }
    }

    fn range(&self, slot: SwapSlot) -> Result<core::ops::Range<usize>, IoError> {
        match self.occupied.get(slot.index()) {
            Some(true) => {
                let start = slot.index() * PAGE_SIZE;
                Ok(start..start + PAGE_SIZE)
            }
            _ => Err(IoError::BadSlot),
        }
    }
}

impl SwapDevice for MemorySwap {
    fn capacity(&self) -> usize {
        self.occupied.len()
    }

    fn used(&self) -> usize {
        self.used
    }

    fn swap_out(&mut self, data: &FrameData) -> Result<SwapSlot, IoError> {
        let index = self
            .occupied
            .iter()
            .position(|used| !used)
            .ok_or(IoError::SwapFull)?;
        self.occupied[index] = true;
        self.used += 1;

        let slot = SwapSlot::new(index);
        let range = self.range(slot)?;
        self.data[range].copy_from_slice(data);
        log::trace!("swap: wrote {slot:?}");
        Ok(slot)
    }

    fn read(&self, slot: SwapSlot, buf: &mut FrameData) -> Result<(), IoError> {
        let range = self.range(slot)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn release(&mut self, slot: SwapSlot) -> Result<(), IoError> {
        self.range(slot)?;
        self.occupied[slot.index()] = false;
        self.used -= 1;
        Ok(())
    }
}
