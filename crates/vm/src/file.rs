//! File-backed pages: memory mirroring a region of a file.
//!
//! Content is read from the file on claim and written back, only if modified, when the
//! page is evicted or destroyed. Each page owns a private file handle.

use core::fmt;

use pmm::{FrameData, VirtualAddress};

use crate::{
    IoError,
    fs::{self, FileHandle},
};

pub struct FilePage {
    file: FileHandle,
    offset: usize,
    read_bytes: usize,
    dirty: bool,
    mapping: VirtualAddress,
}

impl FilePage {
    /// Creates a page covering `read_bytes` bytes of `file` at `offset`, belonging to the
    /// mapping that starts at `mapping`.
    pub fn new(
        file: FileHandle,
        offset: usize,
        read_bytes: usize,
        mapping: VirtualAddress,
    ) -> Self {
        debug_assert!(read_bytes <= pmm::PAGE_SIZE);
        Self {
            file,
            offset,
            read_bytes,
            dirty: false,
            mapping,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }

    /// First page of the mapping this page belongs to.
    pub fn mapping_start(&self) -> VirtualAddress {
        self.mapping
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the content as modified outside the page table's tracking.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Fills `data` from the file and zeroes the rest of the page.
    pub(crate) fn load(&mut self, data: &mut FrameData) -> Result<(), IoError> {
        fs::read_exact_at(&mut *self.file, self.offset, &mut data[..self.read_bytes])?;
        data[self.read_bytes..].fill(0);
        self.dirty = false;
        Ok(())
    }

    /// Writes the file-backed part of `data` back to the file.
    pub(crate) fn write_back(&mut self, data: &FrameData) -> Result<(), IoError> {
        fs::write_all_at(&mut *self.file, self.offset, &data[..self.read_bytes])?;
        log::trace!(
            "file: wrote {} bytes at offset {:#x}",
            self.read_bytes,
            self.offset
        );
        self.dirty = false;
        Ok(())
    }

    pub(crate) fn duplicate(&self) -> Result<Self, IoError> {
        Ok(Self {
            file: self.file.duplicate()?,
            offset: self.offset,
            read_bytes: self.read_bytes,
            dirty: self.dirty,
            mapping: self.mapping,
        })
    }
}

impl fmt::Debug for FilePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePage")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("dirty", &self.dirty)
            .field("mapping", &self.mapping)
            .finish()
    }
}
