//! Per-process address spaces.
//!
//! An [`AddressSpace`] pairs a supplemental page table with the page directory the
//! emulated MMU walks. Pages are created lazily and only get a frame when they are
//! claimed, either explicitly or by the fault resolver.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use pmm::{
    FrameNumber, PAGE_SIZE, PageDirectory, PageFlags, PhysicalAddress, PhysicalMemory, USER_TOP,
    VirtualAddress,
};
use spin::Mutex;

use crate::{
    AllocError, ClaimError, DuplicateError, FaultError, FrameManager, VmConfig,
    fault::PageFault,
    frame_manager::FrameOwner,
    page::{Page, PageRef},
    spt::SupplementalPageTable,
    uninit::{LazyLoad, Target},
};

/// How often a user access is retried after its fault was resolved. Another address
/// space may evict the page between resolution and retry.
const ACCESS_RETRIES: usize = 4;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Identifies an address space in log output and frame ownership records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSpaceId(usize);

impl AddressSpaceId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct AddressSpace {
    id: AddressSpaceId,
    pub(crate) spt: SupplementalPageTable,
    directory: Arc<Mutex<PageDirectory>>,
    frames: Arc<FrameManager>,
    pub(crate) config: VmConfig,
    pub(crate) stack_pointer: usize,
}

impl AddressSpace {
    /// Creates an empty address space drawing frames from `frames`.
    pub fn new(frames: Arc<FrameManager>, config: VmConfig) -> Self {
        let id = AddressSpaceId::next();
        log::debug!("vm: created {id:?}");
        Self {
            id,
            spt: SupplementalPageTable::new(config.page_limit),
            directory: Arc::new(Mutex::new(PageDirectory::with_table_limit(
                config.page_table_limit,
            ))),
            frames,
            stack_pointer: config.stack_top,
            config,
        }
    }

    pub fn id(&self) -> AddressSpaceId {
        self.id
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn frames(&self) -> &Arc<FrameManager> {
        &self.frames
    }

    pub fn spt(&self) -> &SupplementalPageTable {
        &self.spt
    }

    /// The hardware page table of this address space.
    pub fn directory(&self) -> &Mutex<PageDirectory> {
        &self.directory
    }

    /// The user stack pointer used to classify faults as stack growth.
    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    pub fn set_stack_pointer(&mut self, sp: usize) {
        self.stack_pointer = sp;
    }

    /// Finds the page containing `va`.
    pub fn lookup(&self, va: VirtualAddress) -> Option<PageRef> {
        self.spt.lookup(va)
    }

    /// Creates a page at `va` that becomes `target` on its first claim, running `init`
    /// against the new frame if given. No frame is obtained yet.
    pub fn allocate_lazy(
        &mut self,
        target: Target,
        va: VirtualAddress,
        writable: bool,
        init: Option<LazyLoad>,
    ) -> Result<(), AllocError> {
        if va.as_usize() == 0 || !va.is_page_aligned() || !va.is_user() {
            return Err(AllocError::InvalidAddress);
        }
        let page_type = target.page_type();
        self.spt.insert(Page::new(va, writable, target, init))?;
        log::trace!("vm: {:?} allocated {page_type:?} page at {va}", self.id);
        Ok(())
    }

    /// Creates a page at `va` that is zero-filled (anonymous) or read from its file
    /// (file-backed) when first claimed.
    pub fn allocate(
        &mut self,
        target: Target,
        va: VirtualAddress,
        writable: bool,
    ) -> Result<(), AllocError> {
        self.allocate_lazy(target, va, writable, None)
    }

    /// Gives `page` a frame, maps it and fills it. Does nothing if it is already resident.
    pub fn claim(&self, page: &PageRef) -> Result<(), ClaimError> {
        let mut guard = page.lock();
        if guard.is_resident() {
            return Ok(());
        }
        let va = guard.va();

        let frame = self.frames.obtain_frame()?;
        self.frames.link(
            frame,
            FrameOwner {
                space: self.id,
                va,
                page: Arc::downgrade(page),
                directory: Arc::downgrade(&self.directory),
            },
        );

        let mapped = self
            .directory
            .lock()
            .map(va, frame.start(), PageFlags::user(guard.is_writable()));
        if let Err(e) = mapped {
            log::warn!("vm: {:?} cannot map {va}: {e}", self.id);
            self.frames.release_frame(frame);
            return Err(e.into());
        }
        guard.set_frame(Some(frame));

        if let Err(e) = guard.swap_in(frame, &self.frames) {
            log::error!("vm: {:?} swap-in of {va} failed: {e}", self.id);
            guard.set_frame(None);
            self.directory.lock().unmap(va);
            self.frames.release_frame(frame);
            return Err(e.into());
        }

        self.frames.unpin(frame);
        log::trace!("vm: {:?} claimed {va} in {frame}", self.id);
        Ok(())
    }

    /// Claims the page containing `va`.
    pub fn claim_at(&self, va: VirtualAddress) -> Result<(), ClaimError> {
        let page = self.spt.lookup(va).ok_or(ClaimError::NotFound)?;
        self.claim(&page)
    }

    /// Removes and destroys the page containing `va`. Returns false if there is none.
    pub fn remove_page(&mut self, va: VirtualAddress) -> bool {
        match self.spt.remove(va) {
            Some(page) => {
                page.lock().destroy(&self.frames, &self.directory);
                true
            }
            None => false,
        }
    }

    /// Creates the first stack page directly below the stack top and returns the initial
    /// stack pointer.
    pub fn setup_stack(&mut self) -> Result<usize, FaultError> {
        let top = self.config.stack_top;
        let va = VirtualAddress::try_new(top.wrapping_sub(PAGE_SIZE))
            .filter(|va| va.as_usize() != 0 && va.is_page_aligned() && va.is_user())
            .ok_or(FaultError::Alloc(AllocError::InvalidAddress))?;
        self.grow_stack(va)?;
        self.stack_pointer = top;
        log::debug!("vm: {:?} stack at {va}", self.id);
        Ok(top)
    }

    /// Adds a resident, zero-filled stack page at `va`.
    pub(crate) fn grow_stack(&mut self, va: VirtualAddress) -> Result<(), FaultError> {
        let page = self.spt.insert(Page::stack(va))?;
        if let Err(e) = self.claim(&page) {
            self.remove_page(va);
            return Err(e.into());
        }
        Ok(())
    }

    /// Creates a copy of this address space for a forked child.
    ///
    /// Resident pages get a frame of their own holding a copy of the content; everything
    /// else is copied as metadata and populated independently later. On failure nothing of
    /// the child survives.
    pub fn duplicate(&self) -> Result<AddressSpace, DuplicateError> {
        let mut child = AddressSpace::new(Arc::clone(&self.frames), self.config.clone());
        child.stack_pointer = self.stack_pointer;

        for (va, page) in self.spt.iter() {
            let parent = page.lock();
            let copy = child.spt.insert(parent.duplicate(&self.frames)?)?;
            if let Some(src) = parent.frame() {
                let dirty = self.directory.lock().is_dirty(va);
                child.adopt_copy(&copy, src, dirty)?;
            }
        }

        log::debug!(
            "vm: duplicated {:?} into {:?} ({} pages)",
            self.id,
            child.id,
            child.spt.len()
        );
        Ok(child)
    }

    /// Makes `page` resident in a new frame holding a copy of `src`.
    fn adopt_copy(&self, page: &PageRef, src: FrameNumber, dirty: bool) -> Result<(), ClaimError> {
        let mut guard = page.lock();
        let va = guard.va();

        let frame = self.frames.obtain_frame()?;
        self.frames.memory().copy(src, frame);
        self.frames.link(
            frame,
            FrameOwner {
                space: self.id,
                va,
                page: Arc::downgrade(page),
                directory: Arc::downgrade(&self.directory),
            },
        );

        {
            let mut directory = self.directory.lock();
            if let Err(e) = directory.map(va, frame.start(), PageFlags::user(guard.is_writable())) {
                drop(directory);
                self.frames.release_frame(frame);
                return Err(e.into());
            }
            if dirty {
                directory.set_dirty(va, true);
            }
        }

        guard.set_frame(Some(frame));
        self.frames.unpin(frame);
        Ok(())
    }

    /// Destroys every page. The address space is empty but usable afterwards.
    pub fn teardown(&mut self) {
        let pages = self.spt.take_all();
        if pages.is_empty() {
            return;
        }
        log::debug!("vm: tearing down {:?} ({} pages)", self.id, pages.len());
        for page in pages {
            page.lock().destroy(&self.frames, &self.directory);
        }
    }

    /// Returns true if `[addr, addr + len)` is a valid user buffer: non-null, below the
    /// kernel split and with every page either known or mapped.
    pub fn check_user_range(&self, addr: usize, len: usize) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        if addr == 0 || end > USER_TOP {
            return false;
        }
        if len == 0 {
            return true;
        }

        let directory = self.directory.lock();
        let mut page = addr & !(PAGE_SIZE - 1);
        while page < end {
            let va = VirtualAddress::new(page);
            if !self.spt.contains(va) && directory.translate(va).is_none() {
                return false;
            }
            page += PAGE_SIZE;
        }
        true
    }

    /// Copies user memory at `addr` into `buf` through the page tables, resolving faults
    /// as the MMU would.
    pub fn read_user(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), FaultError> {
        let mut done = 0;
        while done < buf.len() {
            let at = addr.checked_add(done).ok_or(FaultError::Unrecoverable)?;
            let len = (PAGE_SIZE - at % PAGE_SIZE).min(buf.len() - done);
            let chunk = &mut buf[done..done + len];
            self.access(at, false, |memory, phys| memory.read(phys, chunk))?;
            done += len;
        }
        Ok(())
    }

    /// Copies `data` into user memory at `addr`, setting the dirty bit of every page
    /// written.
    pub fn write_user(&mut self, addr: usize, data: &[u8]) -> Result<(), FaultError> {
        let mut done = 0;
        while done < data.len() {
            let at = addr.checked_add(done).ok_or(FaultError::Unrecoverable)?;
            let len = (PAGE_SIZE - at % PAGE_SIZE).min(data.len() - done);
            let chunk = &data[done..done + len];
            self.access(at, true, |memory, phys| memory.write(phys, chunk))?;
            done += len;
        }
        Ok(())
    }

    /// Performs one access that does not cross a page boundary.
    fn access(
        &mut self,
        addr: usize,
        write: bool,
        op: impl FnOnce(&PhysicalMemory, PhysicalAddress),
    ) -> Result<(), FaultError> {
        for _ in 0..ACCESS_RETRIES {
            let fault = match VirtualAddress::try_new(addr) {
                Some(va) => {
                    let mut directory = self.directory.lock();
                    let entry = directory.translate(va.page_base());
                    match entry.map(|e| (e.flags(), e.address())) {
                        Some((flags, _)) if write && !flags.is_writable() => PageFault {
                            addr,
                            user: true,
                            write,
                            not_present: false,
                        },
                        Some((_, Some(base))) => {
                            directory.set_accessed(va, true);
                            if write {
                                directory.set_dirty(va, true);
                            }
                            op(self.frames.memory(), base + va.page_offset());
                            return Ok(());
                        }
                        _ => PageFault {
                            addr,
                            user: true,
                            write,
                            not_present: true,
                        },
                    }
                }
                None => PageFault {
                    addr,
                    user: true,
                    write,
                    not_present: true,
                },
            };
            self.handle_fault(fault)?;
        }

        log::warn!("vm: {:?} access to {addr:#x} keeps faulting", self.id);
        Err(FaultError::Unrecoverable)
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        self.teardown();
        log::debug!("vm: dropped {:?}", self.id);
    }
}

#[cfg(test)]
mod tests {
    use core::any::Any;

    use super::*;
    use crate::{
        IoError,
        eviction::Fifo,
        file::FilePage,
        fs::MemoryFile,
        page::PageType,
        swap::MemorySwap,
        uninit::LoadPayload,
    };

    fn setup(config: VmConfig) -> AddressSpace {
        let frames = Arc::new(FrameManager::new(&config));
        AddressSpace::new(frames, config)
    }

    fn small(frames: usize) -> AddressSpace {
        setup(VmConfig {
            frame_count: frames,
            swap_slots: 16,
            ..VmConfig::default()
        })
    }

    fn va(addr: usize) -> VirtualAddress {
        VirtualAddress::new(addr)
    }

    fn count_and_fill(
        data: &mut pmm::FrameData,
        aux: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<(), IoError> {
        let runs = aux
            .and_then(|aux| aux.downcast_ref::<AtomicUsize>())
            .ok_or(IoError::MissingPayload)?;
        runs.fetch_add(1, Ordering::SeqCst);
        data.fill(0x5A);
        Ok(())
    }

    #[test]
    fn allocate_rejects_bad_addresses() {
        let mut space = small(4);
        assert_eq!(
            space.allocate(Target::Anonymous, va(0), true),
            Err(AllocError::InvalidAddress)
        );
        assert_eq!(
            space.allocate(Target::Anonymous, va(0x1234), true),
            Err(AllocError::InvalidAddress)
        );
        assert_eq!(
            space.allocate(Target::Anonymous, VirtualAddress::new(pmm::USER_TOP - PAGE_SIZE), true),
            Ok(())
        );
    }

    #[test]
    fn allocate_twice_fails_without_change() {
        let mut space = small(4);
        space.allocate(Target::Anonymous, va(0x40_0000), false).unwrap();
        let before = space.lookup(va(0x40_0000)).unwrap();

        assert_eq!(
            space.allocate(Target::Anonymous, va(0x40_0000), true),
            Err(AllocError::AlreadyMapped)
        );
        let after = space.lookup(va(0x40_0000)).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(!after.lock().is_writable());
        assert_eq!(space.spt().len(), 1);
    }

    #[test]
    fn claim_is_idempotent() {
        let mut space = small(4);
        let runs = Arc::new(AtomicUsize::new(0));
        let init = LazyLoad::new(count_and_fill, Some(runs.clone() as LoadPayload));
        space
            .allocate_lazy(Target::Anonymous, va(0x40_0000), true, Some(init))
            .unwrap();

        space.claim_at(va(0x40_0000)).unwrap();
        space.write_user(0x40_0010, b"kept").unwrap();
        space.claim_at(va(0x40_0000)).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let mut buf = [0u8; 6];
        space.read_user(0x40_000e, &mut buf).unwrap();
        assert_eq!(&buf, b"\x5a\x5akept");

        let page = space.lookup(va(0x40_0000)).unwrap();
        assert_eq!(page.lock().current_type(), PageType::Anonymous);
    }

    #[test]
    fn claim_at_unknown_address() {
        let space = small(4);
        assert_eq!(space.claim_at(va(0x1000)), Err(ClaimError::NotFound));
    }

    #[test]
    fn anonymous_content_survives_eviction() {
        let mut space = small(2);
        for i in 0..3 {
            space
                .allocate(Target::Anonymous, va(0x40_0000 + i * PAGE_SIZE), true)
                .unwrap();
        }

        space.write_user(0x40_0000, b"swapped out and back").unwrap();
        space.write_user(0x40_1000, b"second").unwrap();
        space.write_user(0x40_2000, b"third").unwrap();
        assert!(space.frames().stats().swap_outs >= 1);

        let mut buf = [0u8; 20];
        space.read_user(0x40_0000, &mut buf).unwrap();
        assert_eq!(&buf, b"swapped out and back");

        let mut buf = [0u8; 6];
        space.read_user(0x40_1000, &mut buf).unwrap();
        assert_eq!(&buf, b"second");
    }

    #[test]
    fn mapping_failure_releases_frame() {
        let mut space = setup(VmConfig {
            frame_count: 4,
            page_table_limit: 1,
            ..VmConfig::default()
        });
        space.allocate(Target::Anonymous, va(0x40_0000), true).unwrap();

        assert_eq!(space.claim_at(va(0x40_0000)), Err(ClaimError::MappingFailed));
        assert_eq!(space.frames().stats().free_frames, 4);
        assert!(!space.lookup(va(0x40_0000)).unwrap().lock().is_resident());
    }

    #[test]
    fn swap_in_failure_is_reported_and_cleaned_up() {
        let mut space = small(4);
        let file = MemoryFile::new(vec![1u8; 8]);
        let page = FilePage::new(Box::new(file.reopen()), 0, 64, va(0x1000));
        space.allocate(Target::File(page), va(0x1000), true).unwrap();

        for _ in 0..2 {
            assert_eq!(
                space.claim_at(va(0x1000)),
                Err(ClaimError::Io(IoError::ShortRead))
            );
        }
        assert_eq!(space.frames().stats().free_frames, 4);
        assert!(space.directory().lock().translate(va(0x1000)).is_none());
        let page = space.lookup(va(0x1000)).unwrap();
        assert_eq!(page.lock().current_type(), PageType::Uninit);
    }

    #[test]
    fn fork_copies_resident_page() {
        let mut parent = small(8);
        parent.allocate(Target::Anonymous, va(0x40_0000), true).unwrap();
        parent.write_user(0x40_0000, &[0xAB; 8]).unwrap();

        let mut child = parent.duplicate().unwrap();
        assert_ne!(child.id(), parent.id());
        parent.write_user(0x40_0000, &[0xCD; 8]).unwrap();

        let mut buf = [0u8; 8];
        child.read_user(0x40_0000, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 8]);
        parent.read_user(0x40_0000, &mut buf).unwrap();
        assert_eq!(buf, [0xCD; 8]);

        let parent_frame = parent.lookup(va(0x40_0000)).unwrap().lock().frame();
        let child_frame = child.lookup(va(0x40_0000)).unwrap().lock().frame();
        assert!(child_frame.is_some());
        assert_ne!(parent_frame, child_frame);
    }

    #[test]
    fn fork_shares_lazy_payload() {
        let mut parent = small(8);
        let runs = Arc::new(AtomicUsize::new(0));
        let init = LazyLoad::new(count_and_fill, Some(runs.clone() as LoadPayload));
        parent
            .allocate_lazy(Target::Anonymous, va(0x40_0000), false, Some(init))
            .unwrap();

        let mut child = parent.duplicate().unwrap();
        assert_eq!(Arc::strong_count(&runs), 3);

        drop(parent);
        assert_eq!(Arc::strong_count(&runs), 2);

        let mut buf = [0u8; 1];
        child.read_user(0x40_0000, &mut buf).unwrap();
        assert_eq!(buf, [0x5A]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fork_copies_swapped_page() {
        let mut parent = small(2);
        for i in 0..3 {
            parent
                .allocate(Target::Anonymous, va(0x40_0000 + i * PAGE_SIZE), true)
                .unwrap();
        }
        parent.write_user(0x40_0000, b"on swap").unwrap();
        parent.write_user(0x40_1000, b"resident").unwrap();
        parent.write_user(0x40_2000, b"third").unwrap();
        assert!(parent.lookup(va(0x40_0000)).unwrap().lock().swap_slot().is_some());

        // Copying a resident page evicts another parent page to make room.
        let mut child = match parent.duplicate() {
            Ok(child) => child,
            Err(e) => panic!("fork failed: {e}"),
        };
        assert_eq!(child.spt().len(), 3);

        let mut buf = [0u8; 8];
        child.read_user(0x40_1000, &mut buf).unwrap();
        assert_eq!(&buf, b"resident");
        child.read_user(0x40_0000, &mut buf[..7]).unwrap();
        assert_eq!(&buf[..7], b"on swap");
        child.read_user(0x40_2000, &mut buf[..5]).unwrap();
        assert_eq!(&buf[..5], b"third");
        parent.read_user(0x40_0000, &mut buf[..7]).unwrap();
        assert_eq!(&buf[..7], b"on swap");
    }

    #[test]
    fn failed_fork_leaves_nothing_behind() {
        let mut parent = setup(VmConfig {
            frame_count: 2,
            swap_slots: 0,
            ..VmConfig::default()
        });
        parent.allocate(Target::Anonymous, va(0x40_0000), true).unwrap();
        parent.allocate(Target::Anonymous, va(0x40_1000), true).unwrap();
        parent.write_user(0x40_0000, b"a").unwrap();
        parent.write_user(0x40_1000, b"b").unwrap();

        assert_eq!(parent.duplicate().err(), Some(DuplicateError::OutOfMemory));
        assert_eq!(parent.frames().stats().free_frames, 0);

        let mut buf = [0u8; 1];
        parent.read_user(0x40_1000, &mut buf).unwrap();
        assert_eq!(&buf, b"b");
    }

    #[test]
    fn teardown_releases_frames_and_swap() {
        let frames = Arc::new(FrameManager::new(&VmConfig {
            frame_count: 1,
            ..VmConfig::default()
        }));
        let mut space = AddressSpace::new(frames.clone(), VmConfig::default());
        space.allocate(Target::Anonymous, va(0x40_0000), true).unwrap();
        space.allocate(Target::Anonymous, va(0x40_1000), true).unwrap();
        space.write_user(0x40_0000, b"x").unwrap();
        space.write_user(0x40_1000, b"y").unwrap();
        assert_eq!(frames.swap_used(), 1);

        drop(space);
        assert_eq!(frames.stats().free_frames, 1);
        assert_eq!(frames.swap_used(), 0);
    }

    #[test]
    fn setup_stack_claims_top_page() {
        let mut space = small(4);
        let sp = space.setup_stack().unwrap();
        assert_eq!(sp, space.config().stack_top);

        let page = space.lookup(va(sp - 1)).unwrap();
        assert!(page.lock().is_stack());
        assert!(page.lock().is_resident());
        space.write_user(sp - 8, &[1; 8]).unwrap();
    }

    #[test]
    fn write_to_read_only_page_is_fatal() {
        let mut space = small(4);
        space.allocate(Target::Anonymous, va(0x40_0000), false).unwrap();
        let mut buf = [1u8; 4];
        space.read_user(0x40_0000, &mut buf).unwrap();
        assert_eq!(buf, [0; 4]);
        assert_eq!(
            space.write_user(0x40_0000, &buf),
            Err(FaultError::WriteProtection)
        );
    }

    #[test]
    fn user_access_crosses_pages() {
        let mut space = small(4);
        space.allocate(Target::Anonymous, va(0x40_0000), true).unwrap();
        space.allocate(Target::Anonymous, va(0x40_1000), true).unwrap();

        space.write_user(0x40_0ffe, b"span").unwrap();
        assert!(space.directory().lock().is_dirty(va(0x40_0000)));
        assert!(space.directory().lock().is_dirty(va(0x40_1000)));

        let mut buf = [0u8; 4];
        space.read_user(0x40_0ffe, &mut buf).unwrap();
        assert_eq!(&buf, b"span");
    }

    #[test]
    fn check_user_range_rules() {
        let mut space = small(4);
        space.allocate(Target::Anonymous, va(0x40_0000), true).unwrap();

        assert!(space.check_user_range(0x40_0000, PAGE_SIZE));
        assert!(space.check_user_range(0x40_0ff0, 0));
        assert!(!space.check_user_range(0x40_0ff0, 0x20));
        assert!(!space.check_user_range(0, 4));
        assert!(!space.check_user_range(pmm::USER_TOP - 2, 4));
        assert!(!space.check_user_range(usize::MAX, 2));
    }

    #[test]
    fn fifo_policy_round_trips_through_swap() {
        let frames = Arc::new(FrameManager::with_parts(
            2,
            Box::new(MemorySwap::new(8)),
            Box::new(Fifo::new()),
        ));
        let mut space = AddressSpace::new(frames, VmConfig::default());
        for i in 0..3 {
            space
                .allocate(Target::Anonymous, va(0x40_0000 + i * PAGE_SIZE), true)
                .unwrap();
            space.write_user(0x40_0000 + i * PAGE_SIZE, &[i as u8 + 1; 32]).unwrap();
        }

        let mut buf = [0u8; 32];
        for i in (0..3).rev().chain(0..3) {
            space.read_user(0x40_0000 + i * PAGE_SIZE, &mut buf).unwrap();
            assert_eq!(buf, [i as u8 + 1; 32]);
        }
        assert!(space.frames().stats().swap_outs >= 2);
    }

    #[test]
    fn spaces_on_many_threads_share_one_pool() {
        const THREADS: usize = 4;
        const PAGES: usize = 8;

        let config = VmConfig {
            frame_count: 6,
            swap_slots: THREADS * PAGES,
            ..VmConfig::default()
        };
        let frames = Arc::new(FrameManager::new(&config));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let frames = Arc::clone(&frames);
                let config = config.clone();
                std::thread::spawn(move || {
                    let mut space = AddressSpace::new(frames, config);
                    for p in 0..PAGES {
                        space
                            .allocate(Target::Anonymous, va(0x40_0000 + p * PAGE_SIZE), true)
                            .unwrap();
                    }
                    for round in 0..20u8 {
                        for p in 0..PAGES {
                            let value = [t as u8, p as u8, round];
                            space.write_user(0x40_0000 + p * PAGE_SIZE + 64, &value).unwrap();
                        }
                        for p in 0..PAGES {
                            let mut buf = [0u8; 3];
                            space.read_user(0x40_0000 + p * PAGE_SIZE + 64, &mut buf).unwrap();
                            assert_eq!(buf, [t as u8, p as u8, round]);
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        let stats = frames.stats();
        assert_eq!(stats.free_frames, stats.total_frames);
        assert!(stats.evictions > 0);
        assert_eq!(frames.swap_used(), 0);
    }
}
