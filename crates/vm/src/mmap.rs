//! Memory-mapped files.
//!
//! A mapping is a run of file-backed pages that all record the same starting address.
//! It has no other representation: `munmap` finds its pages by walking the
//! supplemental page table from that address one page at a time.

use pmm::{PAGE_SIZE, USER_TOP, VirtualAddress};

use crate::{
    AddressSpace, MmapError, MunmapError,
    file::FilePage,
    fs::File,
    page::Page,
    uninit::Target,
};

impl AddressSpace {
    /// Maps `length` bytes of `file`, starting at byte `offset`, at `addr`.
    ///
    /// Each page gets its own handle on the file and is read in on first access. Bytes
    /// past the end of the file read as zero. Either every page is created or none is.
    pub fn mmap(
        &mut self,
        addr: usize,
        length: usize,
        writable: bool,
        file: &dyn File,
        offset: usize,
    ) -> Result<VirtualAddress, MmapError> {
        let start = VirtualAddress::try_new(addr)
            .filter(|va| addr != 0 && va.is_page_aligned() && va.is_user())
            .ok_or(MmapError::InvalidArgument)?;
        let end = addr
            .checked_add(length)
            .filter(|&end| length != 0 && end <= USER_TOP)
            .ok_or(MmapError::InvalidArgument)?;
        let file_length = file.length();
        if offset % PAGE_SIZE != 0 || file_length == 0 {
            return Err(MmapError::InvalidArgument);
        }

        let pages = length.div_ceil(PAGE_SIZE);
        if let Some(taken) = (0..pages)
            .map(|i| start + i * PAGE_SIZE)
            .find(|&va| self.spt.contains(va))
        {
            log::debug!("mmap: {taken} already in use in {:?}", self.id());
            return Err(MmapError::Overlap);
        }
        if pages > self.spt.remaining() {
            return Err(MmapError::OutOfMemory);
        }

        for i in 0..pages {
            if let Err(e) = self.map_file_page(start, i, writable, file, offset, file_length) {
                for done in 0..i {
                    self.remove_page(start + done * PAGE_SIZE);
                }
                return Err(e);
            }
        }

        log::debug!(
            "mmap: {:?} mapped {start}..{end:#x} ({pages} pages) at file offset {offset:#x}",
            self.id()
        );
        Ok(start)
    }

    fn map_file_page(
        &mut self,
        start: VirtualAddress,
        index: usize,
        writable: bool,
        file: &dyn File,
        offset: usize,
        file_length: usize,
    ) -> Result<(), MmapError> {
        let va = start + index * PAGE_SIZE;
        let page_offset = offset + index * PAGE_SIZE;
        let read_bytes = file_length.saturating_sub(page_offset).min(PAGE_SIZE);

        let page = FilePage::new(file.duplicate()?, page_offset, read_bytes, start);
        self.spt
            .insert(Page::new(va, writable, Target::File(page), None))?;
        Ok(())
    }

    /// Removes the mapping that starts at `addr`, writing modified pages back to the file.
    pub fn munmap(&mut self, addr: usize) -> Result<(), MunmapError> {
        let start = VirtualAddress::try_new(addr)
            .filter(|va| va.is_page_aligned())
            .ok_or(MunmapError::NotMappingStart)?;
        if self.mapping_of(start) != Some(start) {
            return Err(MunmapError::NotMappingStart);
        }

        let mut va = start;
        let mut pages = 0;
        while self.mapping_of(va) == Some(start) {
            self.remove_page(va);
            pages += 1;
            match va.checked_add(PAGE_SIZE) {
                Some(next) => va = next,
                None => break,
            }
        }

        log::debug!("munmap: {:?} unmapped {start} ({pages} pages)", self.id());
        Ok(())
    }

    /// Start of the mapping the page at `va` belongs to, if it is a file page.
    fn mapping_of(&self, va: VirtualAddress) -> Option<VirtualAddress> {
        let page = self.spt.lookup(va)?;
        let start = page.lock().mapping_start();
        start
    }
}
