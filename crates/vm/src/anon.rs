//! Anonymous pages: memory with no backing file, moved to swap when evicted.

use pmm::{FrameNumber, PAGE_SIZE};

use crate::{FrameManager, IoError, swap::SwapSlot};

#[derive(Debug, Default)]
pub struct AnonPage {
    swap_slot: Option<SwapSlot>,
}

impl AnonPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot holding this page's content while it is evicted.
    pub fn swap_slot(&self) -> Option<SwapSlot> {
        self.swap_slot
    }

    /// Restores content from swap into `frame`. A page that was never swapped out keeps
    /// the zeroed frame.
    pub(crate) fn swap_in(
        &mut self,
        frame: FrameNumber,
        frames: &FrameManager,
    ) -> Result<(), IoError> {
        let Some(slot) = self.swap_slot else {
            return Ok(());
        };
        frames
            .memory()
            .with_frame_mut(frame, |data| frames.with_swap(|swap| swap.swap_in(slot, data)))?;
        self.swap_slot = None;
        Ok(())
    }

    pub(crate) fn swap_out(
        &mut self,
        frame: FrameNumber,
        frames: &FrameManager,
    ) -> Result<SwapSlot, IoError> {
        let slot = frames
            .memory()
            .with_frame(frame, |data| frames.with_swap(|swap| swap.swap_out(data)))?;
        self.swap_slot = Some(slot);
        Ok(slot)
    }

    /// Gives back the swap slot, if any.
    pub(crate) fn release(&mut self, frames: &FrameManager) {
        if let Some(slot) = self.swap_slot.take()
            && let Err(e) = frames.with_swap(|swap| swap.release(slot))
        {
            log::error!("anon: releasing {slot:?}: {e}");
        }
    }

    /// Copies this page for another address space. Swapped content is copied into a
    /// slot of its own.
    pub(crate) fn duplicate(&self, frames: &FrameManager) -> Result<Self, IoError> {
        let Some(slot) = self.swap_slot else {
            return Ok(Self::new());
        };
        let copy = frames.with_swap(|swap| {
            let mut buf = [0u8; PAGE_SIZE];
            swap.read(slot, &mut buf)?;
            swap.swap_out(&buf)
        })?;
        Ok(Self {
            swap_slot: Some(copy),
        })
    }
}
