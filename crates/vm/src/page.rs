//! Pages: the per-address metadata held in a supplemental page table.

use alloc::sync::Arc;
use core::mem;

use pmm::{FrameNumber, PageDirectory, VirtualAddress};
use spin::Mutex;

use crate::{
    FrameManager, IoError,
    anon::AnonPage,
    file::FilePage,
    swap::SwapSlot,
    uninit::{LazyLoad, Target, UninitPage},
};

/// Shared handle to a page. The supplemental page table holds the only strong reference;
/// the frame manager refers back to resident pages weakly.
pub type PageRef = Arc<Mutex<Page>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Uninit,
    Anonymous,
    File,
}

pub enum PageKind {
    Uninit(UninitPage),
    Anonymous(AnonPage),
    File(FilePage),
}

/// What happened to a page's content when its frame was reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    Swapped(SwapSlot),
    WrittenBack,
    Discarded,
}

pub struct Page {
    va: VirtualAddress,
    writable: bool,
    stack: bool,
    frame: Option<FrameNumber>,
    kind: PageKind,
}

impl Page {
    pub(crate) fn new(
        va: VirtualAddress,
        writable: bool,
        target: Target,
        init: Option<LazyLoad>,
    ) -> Self {
        debug_assert!(va.is_page_aligned());
        Self {
            va,
            writable,
            stack: false,
            frame: None,
            kind: PageKind::Uninit(UninitPage::new(target, init)),
        }
    }

    /// A writable, zero-filled stack page.
    pub(crate) fn stack(va: VirtualAddress) -> Self {
        Self {
            stack: true,
            ..Self::new(va, true, Target::Anonymous, None)
        }
    }

    pub fn va(&self) -> VirtualAddress {
        self.va
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_stack(&self) -> bool {
        self.stack
    }

    /// The frame holding this page, if it is resident.
    pub fn frame(&self) -> Option<FrameNumber> {
        self.frame
    }

    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }

    pub fn kind(&self) -> &PageKind {
        &self.kind
    }

    /// The current variant.
    pub fn current_type(&self) -> PageType {
        match self.kind {
            PageKind::Uninit(_) => PageType::Uninit,
            PageKind::Anonymous(_) => PageType::Anonymous,
            PageKind::File(_) => PageType::File,
        }
    }

    /// The variant this page is or will be once initialized.
    pub fn page_type(&self) -> PageType {
        match &self.kind {
            PageKind::Uninit(uninit) => uninit.target().page_type(),
            _ => self.current_type(),
        }
    }

    /// File details, for file pages whether initialized or not.
    pub fn file_page(&self) -> Option<&FilePage> {
        match &self.kind {
            PageKind::File(file) => Some(file),
            PageKind::Uninit(uninit) => match uninit.target() {
                Target::File(file) => Some(file),
                Target::Anonymous => None,
            },
            PageKind::Anonymous(_) => None,
        }
    }

    pub fn file_page_mut(&mut self) -> Option<&mut FilePage> {
        match &mut self.kind {
            PageKind::File(file) => Some(file),
            _ => None,
        }
    }

    /// First page of the file mapping this page belongs to.
    pub fn mapping_start(&self) -> Option<VirtualAddress> {
        self.file_page().map(FilePage::mapping_start)
    }

    pub fn swap_slot(&self) -> Option<SwapSlot> {
        match &self.kind {
            PageKind::Anonymous(anon) => anon.swap_slot(),
            _ => None,
        }
    }

    pub(crate) fn set_frame(&mut self, frame: Option<FrameNumber>) {
        self.frame = frame;
    }

    /// Populates `frame`, which must already be linked to this page and mapped.
    pub(crate) fn swap_in(
        &mut self,
        frame: FrameNumber,
        frames: &FrameManager,
    ) -> Result<(), IoError> {
        if matches!(self.kind, PageKind::Uninit(_)) {
            return self.initialize(frame, frames);
        }
        match &mut self.kind {
            PageKind::Anonymous(anon) => anon.swap_in(frame, frames),
            PageKind::File(file) => frames.memory().with_frame_mut(frame, |data| file.load(data)),
            PageKind::Uninit(_) => Ok(()),
        }
    }

    /// Fills the first frame of an uninitialized page, then promotes it to its target
    /// variant. If the fill fails the page stays uninitialized with its initializer, so
    /// the next claim runs it again.
    fn initialize(&mut self, frame: FrameNumber, frames: &FrameManager) -> Result<(), IoError> {
        let PageKind::Uninit(uninit) = &mut self.kind else {
            return Ok(());
        };
        frames.memory().with_frame_mut(frame, |data| uninit.fill(data))?;

        let placeholder = PageKind::Anonymous(AnonPage::new());
        if let PageKind::Uninit(uninit) = mem::replace(&mut self.kind, placeholder) {
            self.kind = uninit.promote();
        }
        log::trace!("page: {} initialized as {:?}", self.va, self.current_type());
        Ok(())
    }

    /// Moves the content of `frame` out and removes the mapping.
    ///
    /// On failure the page stays resident and mapped.
    pub(crate) fn swap_out(
        &mut self,
        frame: FrameNumber,
        frames: &FrameManager,
        directory: &mut PageDirectory,
    ) -> Result<Eviction, IoError> {
        let dirty = directory.is_dirty(self.va);
        let outcome = match &mut self.kind {
            PageKind::Anonymous(anon) => Eviction::Swapped(anon.swap_out(frame, frames)?),
            PageKind::File(file) if dirty || file.is_dirty() => {
                frames.memory().with_frame(frame, |data| file.write_back(data))?;
                Eviction::WrittenBack
            }
            PageKind::File(_) => Eviction::Discarded,
            PageKind::Uninit(_) => {
                debug_assert!(false, "uninitialized page {} is resident", self.va);
                Eviction::Discarded
            }
        };

        directory.unmap(self.va);
        self.frame = None;
        Ok(outcome)
    }

    /// Releases everything this page holds: the frame, the mapping and the swap slot.
    /// Modified file content is written back first. The file handle goes with the page.
    pub(crate) fn destroy(&mut self, frames: &FrameManager, directory: &Mutex<PageDirectory>) {
        if let Some(frame) = self.frame.take() {
            frames.pin(frame);
            {
                let mut directory = directory.lock();
                let dirty = directory
                    .unmap(self.va)
                    .is_some_and(|entry| entry.flags().is_dirty());

                if let PageKind::File(file) = &mut self.kind
                    && (dirty || file.is_dirty())
                {
                    match frames.memory().with_frame(frame, |data| file.write_back(data)) {
                        Ok(()) => frames.note_writeback(),
                        Err(e) => log::error!("page: writeback of {} failed: {e}", self.va),
                    }
                }
            }
            frames.release_frame(frame);
        }

        if let PageKind::Anonymous(anon) = &mut self.kind {
            anon.release(frames);
        }
        log::trace!("page: destroyed {}", self.va);
    }

    /// Copies the metadata of this page for another address space. The copy is never
    /// resident; the caller fills in its frame.
    pub(crate) fn duplicate(&self, frames: &FrameManager) -> Result<Self, IoError> {
        let kind = match &self.kind {
            PageKind::Uninit(uninit) => PageKind::Uninit(uninit.duplicate()?),
            // Resident content is copied frame to frame by the caller.
            PageKind::Anonymous(_) if self.is_resident() => PageKind::Anonymous(AnonPage::new()),
            PageKind::Anonymous(anon) => PageKind::Anonymous(anon.duplicate(frames)?),
            PageKind::File(file) => PageKind::File(file.duplicate()?),
        };
        Ok(Self {
            va: self.va,
            writable: self.writable,
            stack: self.stack,
            frame: None,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use super::*;
    use crate::fs::MemoryFile;

    fn file_target(mapping: usize) -> Target {
        Target::File(FilePage::new(
            Box::new(MemoryFile::new(vec![1u8; 16])),
            0,
            16,
            VirtualAddress::new(mapping),
        ))
    }

    #[test]
    fn uninit_page_reports_target_type() {
        let page = Page::new(VirtualAddress::new(0x1000), false, file_target(0x1000), None);
        assert_eq!(page.current_type(), PageType::Uninit);
        assert_eq!(page.page_type(), PageType::File);
        assert_eq!(page.mapping_start(), Some(VirtualAddress::new(0x1000)));
        assert!(!page.is_resident());
    }

    #[test]
    fn stack_pages_are_writable_anonymous() {
        let page = Page::stack(VirtualAddress::new(0x4747_f000));
        assert!(page.is_stack());
        assert!(page.is_writable());
        assert_eq!(page.page_type(), PageType::Anonymous);
        assert_eq!(page.mapping_start(), None);
    }
}
