//! Architecture-independent page table management.
//!
//! This module provides the `PageDirectory` type, which owns the page tables of one
//! address space and provides high-level operations for mapping and unmapping virtual
//! addresses and for reading and clearing the access-tracking bits.

use alloc::vec::Vec;
use core::fmt;

use crate::{
    PhysicalAddress, VirtualAddress,
    arch::{self, PageEntry, PageFlags, PageTable},
};

/// Errors that can occur while installing a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// An intermediate page table was needed but the table budget is exhausted.
    OutOfTables,
    /// The virtual address already has a present mapping.
    AlreadyMapped,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfTables => write!(f, "out of page table memory"),
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
        }
    }
}

/// A page table manager for one address space.
///
/// Tables are kept in an arena; table 0 is the root. Intermediate entries store the
/// number of the next-level table. Leaf entries map to physical frames.
pub struct PageDirectory {
    tables: Vec<PageTable>,
    table_limit: usize,
}

impl PageDirectory {
    /// Creates a new page directory with an empty root page table and no table limit.
    pub fn new() -> Self {
        Self::with_table_limit(usize::MAX)
    }

    /// Creates a page directory that may hold at most `table_limit` tables, root included.
    pub fn with_table_limit(table_limit: usize) -> Self {
        let mut tables = Vec::new();
        tables.push(PageTable::new());
        Self {
            tables,
            table_limit: table_limit.max(1),
        }
    }

    /// Maps a virtual address to a physical address with the given flags.
    ///
    /// This function walks the page table hierarchy, allocating intermediate tables
    /// as needed, and sets the final page table entry to map the virtual address
    /// to the physical address. The present bit is always set.
    ///
    /// # Panics
    /// Panics if the virtual address is not page-aligned or if the physical address
    /// is not page-aligned.
    pub fn map(
        &mut self,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        flags: PageFlags,
    ) -> Result<(), MapError> {
        assert!(
            virt.is_page_aligned(),
            "virtual address must be page-aligned"
        );
        assert!(
            phys.is_page_aligned(),
            "physical address must be page-aligned"
        );

        let entry = self.walk_or_create(virt)?;
        if entry.is_present() {
            return Err(MapError::AlreadyMapped);
        }

        let mut new_flags = flags;
        new_flags.set_present(true);
        *entry = PageEntry::new(phys, new_flags);
        Ok(())
    }

    /// Unmaps a virtual address.
    ///
    /// Returns the entry that was removed, so callers can inspect its dirty and accessed
    /// bits, or None if the address was not mapped.
    ///
    /// # Panics
    /// Panics if the virtual address is not page-aligned.
    pub fn unmap(&mut self, virt: VirtualAddress) -> Option<PageEntry> {
        assert!(
            virt.is_page_aligned(),
            "virtual address must be page-aligned"
        );

        let entry = self.walk_mut(virt)?;
        if !entry.is_present() {
            return None;
        }
        let old = *entry;
        entry.clear();

        Some(old)
    }

    /// Returns the leaf entry for a virtual address if it is present.
    pub fn translate(&self, virt: VirtualAddress) -> Option<PageEntry> {
        let table = self.leaf_table(virt)?;
        let entry = self.tables[table].entry(arch::page_index(virt.as_usize(), 0));
        entry.is_present().then_some(entry)
    }

    /// Returns true if the page containing `virt` is mapped and its dirty bit is set.
    pub fn is_dirty(&self, virt: VirtualAddress) -> bool {
        self.translate(virt.page_base())
            .is_some_and(|e| e.flags().is_dirty())
    }

    /// Sets or clears the dirty bit of a present mapping. Returns false if not mapped.
    pub fn set_dirty(&mut self, virt: VirtualAddress, dirty: bool) -> bool {
        self.update_present(virt, |f| f.set_dirty(dirty))
    }

    /// Returns true if the page containing `virt` is mapped and its accessed bit is set.
    pub fn is_accessed(&self, virt: VirtualAddress) -> bool {
        self.translate(virt.page_base())
            .is_some_and(|e| e.flags().is_accessed())
    }

    /// Sets or clears the accessed bit of a present mapping. Returns false if not mapped.
    pub fn set_accessed(&mut self, virt: VirtualAddress, accessed: bool) -> bool {
        self.update_present(virt, |f| f.set_accessed(accessed))
    }

    fn update_present(&mut self, virt: VirtualAddress, f: impl FnOnce(&mut PageFlags)) -> bool {
        match self.walk_mut(virt.page_base()) {
            Some(entry) if entry.is_present() => {
                entry.update_flags(f);
                true
            }
            _ => false,
        }
    }

    /// Walks the hierarchy down to the level-0 table for `virt` without creating tables.
    fn leaf_table(&self, virt: VirtualAddress) -> Option<usize> {
        let mut table = 0;
        for level in (1..arch::PAGE_TABLE_LEVELS).rev() {
            let index = arch::page_index(virt.as_usize(), level);
            table = self.tables[table].entry(index).table_number()?;
        }
        Some(table)
    }

    /// Walks the page table hierarchy to find the entry for a virtual address.
    ///
    /// Returns None if any intermediate table is not present.
    fn walk_mut(&mut self, virt: VirtualAddress) -> Option<&mut PageEntry> {
        let table = self.leaf_table(virt)?;
        let index = arch::page_index(virt.as_usize(), 0);
        Some(self.tables[table].entry_mut(index))
    }

    /// Walks the page table hierarchy, creating intermediate tables as needed.
    ///
    /// Fails without modifying anything if the tables required would exceed the limit.
    fn walk_or_create(&mut self, virt: VirtualAddress) -> Result<&mut PageEntry, MapError> {
        let virt_addr = virt.as_usize();

        let mut missing = 0;
        let mut table = Some(0);
        for level in (1..arch::PAGE_TABLE_LEVELS).rev() {
            table = table.and_then(|t| {
                self.tables[t]
                    .entry(arch::page_index(virt_addr, level))
                    .table_number()
            });
            if table.is_none() {
                missing += 1;
            }
        }
        if self.tables.len() + missing > self.table_limit {
            log::debug!(
                "pmm: mapping {virt} needs {missing} more tables, {} of {} in use",
                self.tables.len(),
                self.table_limit
            );
            return Err(MapError::OutOfTables);
        }

        let mut table = 0;
        for level in (1..arch::PAGE_TABLE_LEVELS).rev() {
            let index = arch::page_index(virt_addr, level);
            table = match self.tables[table].entry(index).table_number() {
                Some(next) => next,
                None => {
                    let next = self.tables.len();
                    self.tables.push(PageTable::new());
                    *self.tables[table].entry_mut(index) = PageEntry::table(next);
                    next
                }
            };
        }

        let index = arch::page_index(virt_addr, 0);
        Ok(self.tables[table].entry_mut(index))
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_rw() -> PageFlags {
        PageFlags::user(true)
    }

    #[test]
    fn map_and_translate_single_page() {
        let mut dir = PageDirectory::new();
        let virt = VirtualAddress::new(0x40_0000);
        let phys = PhysicalAddress::new(0x3000);

        dir.map(virt, phys, user_rw()).unwrap();

        assert_eq!(dir.translate(virt).and_then(|e| e.address()), Some(phys));
        assert!(dir.translate(virt + arch::PAGE_SIZE).is_none());
    }

    #[test]
    fn unmap_returns_old_entry() {
        let mut dir = PageDirectory::new();
        let virt = VirtualAddress::new(0x1000);
        dir.map(virt, PhysicalAddress::new(0x2000), user_rw()).unwrap();
        dir.set_dirty(virt, true);

        let old = dir.unmap(virt).unwrap();
        assert!(old.flags().is_dirty());
        assert!(dir.translate(virt).is_none());
    }

    #[test]
    fn unmap_unmapped_page() {
        let mut dir = PageDirectory::new();
        assert!(dir.unmap(VirtualAddress::new(0x1000)).is_none());
    }

    #[test]
    fn refuses_to_remap_present_entry() {
        let mut dir = PageDirectory::new();
        let virt = VirtualAddress::new(0x1000);
        dir.map(virt, PhysicalAddress::new(0x2000), user_rw()).unwrap();
        assert_eq!(
            dir.map(virt, PhysicalAddress::new(0x3000), user_rw()),
            Err(MapError::AlreadyMapped)
        );
    }

    #[test]
    fn tracking_bits_follow_mapping() {
        let mut dir = PageDirectory::new();
        let virt = VirtualAddress::new(0x5000);
        assert!(!dir.set_dirty(virt, true));

        dir.map(virt, PhysicalAddress::new(0x1000), user_rw()).unwrap();
        assert!(!dir.is_dirty(virt));
        assert!(dir.set_dirty(virt + 8, true));
        assert!(dir.is_dirty(virt));
        assert!(dir.set_accessed(virt, true));
        assert!(dir.is_accessed(virt + 0xfff));
    }

    #[test]
    fn shares_intermediate_tables() {
        let mut dir = PageDirectory::new();
        for i in 0..10 {
            let virt = VirtualAddress::new(0x40_0000 + i * arch::PAGE_SIZE);
            let phys = PhysicalAddress::new(i * arch::PAGE_SIZE);
            dir.map(virt, phys, user_rw()).unwrap();
        }
        // root + one level-1 table + one level-0 table
        assert_eq!(dir.tables.len(), 3);
    }

    #[test]
    fn table_limit_fails_without_side_effects() {
        let mut dir = PageDirectory::with_table_limit(2);
        let virt = VirtualAddress::new(0x40_0000);
        assert_eq!(
            dir.map(virt, PhysicalAddress::new(0x1000), user_rw()),
            Err(MapError::OutOfTables)
        );
        assert_eq!(dir.tables.len(), 1);
        assert!(dir.translate(virt).is_none());
    }
}
