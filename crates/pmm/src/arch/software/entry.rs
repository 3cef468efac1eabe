//! Page table entry for software emulation.

use crate::PhysicalAddress;

use super::{PAGE_SHIFT, flags::PageFlags};

/// A single page table entry for software emulation.
///
/// The entry format:
/// - Bits 0-5: Flags
/// - Bits 12-51: Physical frame address (leaf entries) or table number (intermediate entries)
///
/// Intermediate entries do not point into physical memory: page tables live in the owning
/// [`crate::PageDirectory`], so the address field holds the number of the next-level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(usize);

impl PageEntry {
    /// Address mask (bits 12-51).
    const ADDRESS_MASK: usize = 0x000F_FFFF_FFFF_F000;

    /// Creates a new leaf entry mapping a page-aligned physical address.
    pub fn new(address: PhysicalAddress, flags: PageFlags) -> Self {
        debug_assert!(
            address.as_usize() & !Self::ADDRESS_MASK == 0,
            "physical address must be page-aligned"
        );

        Self((address.as_usize() & Self::ADDRESS_MASK) | flags.to_raw())
    }

    /// Creates a present intermediate entry pointing at the table with the given number.
    pub fn table(number: usize) -> Self {
        let mut flags = PageFlags::empty();
        flags.set_present(true);
        Self(((number << PAGE_SHIFT) & Self::ADDRESS_MASK) | flags.to_raw())
    }

    /// Returns the physical address stored in this entry.
    ///
    /// Returns None if the entry is not present.
    pub fn address(self) -> Option<PhysicalAddress> {
        if self.is_present() {
            Some(PhysicalAddress::new(self.0 & Self::ADDRESS_MASK))
        } else {
            None
        }
    }

    /// Returns the table number stored in an intermediate entry.
    pub fn table_number(self) -> Option<usize> {
        if self.is_present() {
            Some((self.0 & Self::ADDRESS_MASK) >> PAGE_SHIFT)
        } else {
            None
        }
    }

    /// Returns the flags for this entry.
    pub fn flags(self) -> PageFlags {
        PageFlags::from_raw(self.0)
    }

    /// Sets the flags for this entry, preserving the address.
    pub fn set_flags(&mut self, flags: PageFlags) {
        self.0 = (self.0 & Self::ADDRESS_MASK) | flags.to_raw();
    }

    /// Applies `f` to a copy of the flags and stores the result.
    pub fn update_flags(&mut self, f: impl FnOnce(&mut PageFlags)) {
        let mut flags = self.flags();
        f(&mut flags);
        self.set_flags(flags);
    }

    /// Returns whether this entry is present (valid).
    pub fn is_present(self) -> bool {
        self.flags().is_present()
    }

    /// Clears this entry (sets it to zero).
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns the raw usize value of this entry.
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_entry_round_trips_address_and_flags() {
        let phys = PhysicalAddress::new(0x7000);
        let entry = PageEntry::new(phys, PageFlags::user(true));
        assert_eq!(entry.address(), Some(phys));
        assert!(entry.flags().is_writable());
    }

    #[test]
    fn absent_entry_has_no_address() {
        let entry = PageEntry::default();
        assert_eq!(entry.address(), None);
        assert_eq!(entry.table_number(), None);
    }

    #[test]
    fn update_flags_keeps_address() {
        let phys = PhysicalAddress::new(0x3000);
        let mut entry = PageEntry::new(phys, PageFlags::user(false));
        entry.update_flags(|f| f.set_dirty(true));
        assert!(entry.flags().is_dirty());
        assert_eq!(entry.address(), Some(phys));
    }

    #[test]
    fn table_entry() {
        assert_eq!(PageEntry::table(5).table_number(), Some(5));
    }
}
