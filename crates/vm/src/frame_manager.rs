//! The global frame pool.
//!
//! Every address space draws frames from one shared [`FrameManager`]. When the pool is
//! empty, a resident page is chosen by the eviction policy, its content is moved out to
//! swap or written back to its file, and its frame is handed to the requester.
//!
//! Lock order: pool, then the victim page (only ever `try_lock`ed), then the victim's
//! page directory, then frame contents and the swap device. Callers never request a
//! frame while holding a page directory lock.

use alloc::{boxed::Box, sync::Weak, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};

use pmm::{FrameNumber, PageDirectory, PhysicalMemory, PhysicalMemoryManager, VirtualAddress};
use spin::Mutex;

use crate::{
    AddressSpaceId, VmConfig,
    eviction::{Clock, EvictionPolicy},
    page::{Eviction, Page},
    swap::{MemorySwap, SwapDevice},
};

/// How many full sweeps over the pool are made before giving up on finding a victim.
const EVICTION_SWEEPS: usize = 3;

/// Back-reference from a frame to the page resident in it.
pub(crate) struct FrameOwner {
    pub space: AddressSpaceId,
    pub va: VirtualAddress,
    pub page: Weak<Mutex<Page>>,
    pub directory: Weak<Mutex<PageDirectory>>,
}

/// Snapshot of frame pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub total_frames: usize,
    pub free_frames: usize,
    pub evictions: usize,
    pub swap_outs: usize,
    pub writebacks: usize,
}

struct FramePool {
    pmm: PhysicalMemoryManager,
    owners: Vec<Option<FrameOwner>>,
    policy: Box<dyn EvictionPolicy>,
}

pub struct FrameManager {
    memory: PhysicalMemory,
    pool: Mutex<FramePool>,
    swap: Mutex<Box<dyn SwapDevice>>,
    evictions: AtomicUsize,
    swap_outs: AtomicUsize,
    writebacks: AtomicUsize,
}

impl FrameManager {
    /// Creates a frame manager with in-memory swap and the clock policy.
    pub fn new(config: &VmConfig) -> Self {
        Self::with_parts(
            config.frame_count,
            Box::new(MemorySwap::new(config.swap_slots)),
            Box::new(Clock::new()),
        )
    }

    pub fn with_parts(
        frame_count: usize,
        swap: Box<dyn SwapDevice>,
        policy: Box<dyn EvictionPolicy>,
    ) -> Self {
        log::debug!(
            "frames: {} frames, {} swap slots, {} eviction",
            frame_count,
            swap.capacity(),
            policy.name()
        );

        let mut owners = Vec::with_capacity(frame_count);
        owners.resize_with(frame_count, || None);

        Self {
            memory: PhysicalMemory::new(frame_count),
            pool: Mutex::new(FramePool {
                pmm: PhysicalMemoryManager::new(frame_count),
                owners,
                policy,
            }),
            swap: Mutex::new(swap),
            evictions: AtomicUsize::new(0),
            swap_outs: AtomicUsize::new(0),
            writebacks: AtomicUsize::new(0),
        }
    }

    /// Returns the emulated physical memory the frames live in.
    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn stats(&self) -> FrameStats {
        let pool = self.pool.lock();
        let stats = FrameStats {
            total_frames: pool.pmm.total_frames(),
            free_frames: pool.pmm.free_frames(),
            evictions: self.evictions.load(Ordering::Relaxed),
            swap_outs: self.swap_outs.load(Ordering::Relaxed),
            writebacks: self.writebacks.load(Ordering::Relaxed),
        };
        log::debug!("frames: {stats:?}");
        stats
    }

    /// Number of swap slots in use.
    pub fn swap_used(&self) -> usize {
        self.swap.lock().used()
    }

    pub(crate) fn with_swap<R>(&self, f: impl FnOnce(&mut dyn SwapDevice) -> R) -> R {
        f(&mut **self.swap.lock())
    }

    /// Returns a zeroed frame, evicting a resident page if the pool is empty.
    ///
    /// The frame comes back pinned and without an owner. It stays out of victim selection
    /// until [`FrameManager::unpin`] is called.
    pub(crate) fn obtain_frame(&self) -> Result<FrameNumber, pmm::AllocError> {
        let frame = {
            let mut pool = self.pool.lock();
            let frame = match pool.pmm.allocate() {
                Ok(frame) => {
                    pool.policy.on_allocate(frame);
                    frame
                }
                Err(_) => self.evict(&mut pool)?,
            };
            pool.pmm.pin(frame);
            frame
        };

        self.memory.zero(frame);
        Ok(frame)
    }

    /// Records `owner` as the page resident in `frame`.
    pub(crate) fn link(&self, frame: FrameNumber, owner: FrameOwner) {
        let mut pool = self.pool.lock();
        log::trace!("frames: {frame} -> {:?} {}", owner.space, owner.va);
        pool.owners[frame.index()] = Some(owner);
    }

    pub(crate) fn pin(&self, frame: FrameNumber) {
        self.pool.lock().pmm.pin(frame);
    }

    pub(crate) fn unpin(&self, frame: FrameNumber) {
        self.pool.lock().pmm.unpin(frame);
    }

    /// Returns a frame to the free pool, dropping its owner and any pin.
    pub(crate) fn release_frame(&self, frame: FrameNumber) {
        let mut pool = self.pool.lock();
        pool.owners[frame.index()] = None;
        pool.policy.on_release(frame);
        if let Err(e) = pool.pmm.deallocate(frame) {
            log::error!("frames: releasing {frame}: {e}");
        }
    }

    pub(crate) fn note_writeback(&self) {
        self.writebacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Picks a victim, moves its content out and returns its frame.
    fn evict(&self, pool: &mut FramePool) -> Result<FrameNumber, pmm::AllocError> {
        let attempts = EVICTION_SWEEPS * pool.pmm.total_frames();

        for _ in 0..attempts {
            let Some(candidate) = pool.policy.propose() else {
                break;
            };
            if pool.pmm.is_pinned(candidate) {
                continue;
            }
            let (space, va, page, directory) = match &pool.owners[candidate.index()] {
                Some(owner) => (
                    owner.space,
                    owner.va,
                    owner.page.upgrade(),
                    owner.directory.upgrade(),
                ),
                None => continue,
            };
            let (Some(page), Some(directory)) = (page, directory) else {
                continue;
            };
            // A locked page is in the middle of a claim, destroy or fork copy.
            let Some(mut page) = page.try_lock() else {
                continue;
            };
            if page.frame() != Some(candidate) {
                continue;
            }

            let mut directory = directory.lock();
            if pool.policy.second_chance() && directory.is_accessed(va) {
                directory.set_accessed(va, false);
                continue;
            }

            match page.swap_out(candidate, self, &mut directory) {
                Ok(outcome) => {
                    log::debug!("frames: evicted {va} of {space:?} from {candidate} ({outcome:?})");
                    match outcome {
                        Eviction::Swapped(_) => self.swap_outs.fetch_add(1, Ordering::Relaxed),
                        Eviction::WrittenBack => self.writebacks.fetch_add(1, Ordering::Relaxed),
                        Eviction::Discarded => 0,
                    };
                }
                Err(e) => {
                    log::warn!("frames: could not evict {va} of {space:?}: {e}");
                    continue;
                }
            }

            pool.owners[candidate.index()] = None;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            return Ok(candidate);
        }

        log::warn!("frames: no evictable frame after {attempts} proposals");
        Err(pmm::AllocError::OutOfMemory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(frames: usize) -> FrameManager {
        FrameManager::new(&VmConfig {
            frame_count: frames,
            swap_slots: 4,
            ..VmConfig::default()
        })
    }

    #[test]
    fn obtained_frames_are_zeroed_and_pinned() {
        let frames = setup(2);
        let frame = frames.obtain_frame().unwrap();
        frames.memory().write(frame.start(), &[1, 2, 3]);
        frames.release_frame(frame);

        let again = frames.obtain_frame().unwrap();
        assert_eq!(again, frame);
        let mut buf = [9u8; 3];
        frames.memory().read(again.start(), &mut buf);
        assert_eq!(buf, [0, 0, 0]);
        assert!(frames.pool.lock().pmm.is_pinned(again));
    }

    #[test]
    fn exhausted_pool_without_victims_is_out_of_memory() {
        let frames = setup(2);
        frames.obtain_frame().unwrap();
        frames.obtain_frame().unwrap();
        assert_eq!(frames.obtain_frame(), Err(pmm::AllocError::OutOfMemory));
    }

    #[test]
    fn unowned_frames_are_never_victims() {
        let frames = setup(1);
        let frame = frames.obtain_frame().unwrap();
        frames.unpin(frame);
        assert_eq!(frames.obtain_frame(), Err(pmm::AllocError::OutOfMemory));
        assert_eq!(frames.stats().evictions, 0);
    }

    #[test]
    fn stats_track_free_frames() {
        let frames = setup(3);
        let frame = frames.obtain_frame().unwrap();
        let stats = frames.stats();
        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.free_frames, 2);

        frames.release_frame(frame);
        assert_eq!(frames.stats().free_frames, 3);
    }
}
