//! The supplemental page table.
//!
//! Holds every page of one address space, keyed by page-aligned virtual address. Pages
//! removed from the table are handed back to the caller, which destroys them; the table
//! itself never runs page teardown.

use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};

use pmm::VirtualAddress;
use spin::Mutex;

use crate::{
    AllocError,
    page::{Page, PageRef},
};

pub struct SupplementalPageTable {
    pages: BTreeMap<VirtualAddress, PageRef>,
    limit: usize,
}

impl SupplementalPageTable {
    /// Creates an empty table holding at most `limit` pages.
    pub fn new(limit: usize) -> Self {
        Self {
            pages: BTreeMap::new(),
            limit,
        }
    }

    /// Finds the page containing `va`.
    pub fn lookup(&self, va: VirtualAddress) -> Option<PageRef> {
        self.pages.get(&va.page_base()).cloned()
    }

    pub fn contains(&self, va: VirtualAddress) -> bool {
        self.pages.contains_key(&va.page_base())
    }

    /// Adds `page`, failing without changes if its address is taken or the table is full.
    pub fn insert(&mut self, page: Page) -> Result<PageRef, AllocError> {
        let va = page.va();
        if self.pages.contains_key(&va) {
            return Err(AllocError::AlreadyMapped);
        }
        if self.pages.len() >= self.limit {
            return Err(AllocError::OutOfMemory);
        }

        let page = Arc::new(Mutex::new(page));
        self.pages.insert(va, Arc::clone(&page));
        Ok(page)
    }

    /// Detaches the page at `va`.
    pub fn remove(&mut self, va: VirtualAddress) -> Option<PageRef> {
        self.pages.remove(&va.page_base())
    }

    /// Detaches every page.
    pub fn take_all(&mut self) -> Vec<PageRef> {
        core::mem::take(&mut self.pages).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of pages that can still be inserted.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.pages.len())
    }

    /// Addresses of all pages, in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = VirtualAddress> + '_ {
        self.pages.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VirtualAddress, &PageRef)> + '_ {
        self.pages.iter().map(|(&va, page)| (va, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uninit::Target;

    fn anon(va: usize) -> Page {
        Page::new(VirtualAddress::new(va), true, Target::Anonymous, None)
    }

    #[test]
    fn lookup_rounds_down() {
        let mut spt = SupplementalPageTable::new(8);
        spt.insert(anon(0x40_0000)).unwrap();

        let page = spt.lookup(VirtualAddress::new(0x40_0abc)).unwrap();
        assert_eq!(page.lock().va(), VirtualAddress::new(0x40_0000));
        assert!(spt.lookup(VirtualAddress::new(0x40_1000)).is_none());
    }

    #[test]
    fn every_inserted_page_is_found_once() {
        let mut spt = SupplementalPageTable::new(64);
        let addrs: Vec<usize> = (0..10).map(|i| 0x1000 + i * 0x3000).collect();
        for (n, &va) in addrs.iter().enumerate() {
            spt.insert(anon(va)).unwrap();
            assert_eq!(spt.len(), n + 1);
            for &seen in &addrs[..=n] {
                assert!(spt.contains(VirtualAddress::new(seen)));
            }
        }
        let listed: Vec<usize> = spt.addresses().map(VirtualAddress::as_usize).collect();
        assert_eq!(listed, addrs);
    }

    #[test]
    fn duplicate_insert_leaves_table_unchanged() {
        let mut spt = SupplementalPageTable::new(8);
        let first = spt.insert(anon(0x2000)).unwrap();
        let before: Vec<_> = spt.addresses().collect();

        assert_eq!(spt.insert(anon(0x2000)).err(), Some(AllocError::AlreadyMapped));
        assert_eq!(spt.addresses().collect::<Vec<_>>(), before);
        assert!(Arc::ptr_eq(&spt.lookup(VirtualAddress::new(0x2000)).unwrap(), &first));
    }

    #[test]
    fn full_table_is_out_of_memory() {
        let mut spt = SupplementalPageTable::new(1);
        spt.insert(anon(0x1000)).unwrap();
        assert_eq!(spt.insert(anon(0x2000)).err(), Some(AllocError::OutOfMemory));
        assert_eq!(spt.remaining(), 0);
    }

    #[test]
    fn take_all_empties_table() {
        let mut spt = SupplementalPageTable::new(8);
        spt.insert(anon(0x1000)).unwrap();
        spt.insert(anon(0x2000)).unwrap();

        assert_eq!(spt.take_all().len(), 2);
        assert!(spt.is_empty());
        assert!(spt.remove(VirtualAddress::new(0x1000)).is_none());
    }
}
