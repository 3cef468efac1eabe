//! Software emulation of a paging MMU.
//!
//! The emulated architecture is a scale model of a 3-level, 4 KiB-page MMU (close to
//! RISC-V Sv39):
//! - 39-bit canonical virtual addresses (bits 39-63 sign-extended from bit 38)
//! - 3 levels of page tables (level 2 is the root)
//! - 9-bit indexes (512 entries per table)
//! - 12-bit page offset (4 KiB pages)
//!
//! Physical memory is a plain buffer owned by [`crate::PhysicalMemory`], so physical
//! addresses are offsets into that buffer.

mod entry;
mod flags;
mod table;

use static_assertions::const_assert;

pub use entry::PageEntry;
pub use flags::PageFlags;
pub use table::PageTable;

/// Maximum number of bits in a physical address for software emulation.
pub const MAX_PHYSICAL_BITS: usize = 40;

/// Maximum number of bits in a virtual address for software emulation.
pub const MAX_VIRTUAL_BITS: usize = 39;

/// Page size in bytes (4 KiB = 2^12).
pub const PAGE_SIZE: usize = 4096;

/// Number of bits in the page offset.
pub const PAGE_SHIFT: usize = 12;

/// Number of page table levels (3 levels: level 2, 1, 0).
pub const PAGE_TABLE_LEVELS: usize = 3;

/// Number of index bits consumed by each level.
pub const INDEX_BITS: usize = 9;

/// First address of the kernel half. Everything below is user space.
pub const USER_TOP: usize = 1 << (MAX_VIRTUAL_BITS - 1);

const_assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
const_assert!(PAGE_SHIFT + PAGE_TABLE_LEVELS * INDEX_BITS == MAX_VIRTUAL_BITS);

/// Returns the page table index for a given virtual address at the specified level.
///
/// - Level 0: Bits 12-20 (page table)
/// - Level 1: Bits 21-29 (page directory)
/// - Level 2: Bits 30-38 (root)
#[inline]
pub const fn page_index(address: usize, level: usize) -> usize {
    assert!(
        level < PAGE_TABLE_LEVELS,
        "level out of range for software emulation (0-2)"
    );
    let shift = PAGE_SHIFT + level * INDEX_BITS;
    (address >> shift) & ((1 << INDEX_BITS) - 1)
}

/// Validates a physical address for software emulation.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr < (1 << MAX_PHYSICAL_BITS)
}

/// Validates a virtual address for software emulation.
///
/// Virtual addresses must be canonical (bits 39-63 must be sign-extended from bit 38).
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    canonicalize_virtual(addr) == addr
}

/// Canonicalizes a virtual address by sign-extending bit 38 to bits 39-63.
#[inline]
pub const fn canonicalize_virtual(addr: usize) -> usize {
    let low = addr & ((1 << MAX_VIRTUAL_BITS) - 1);
    if low & USER_TOP != 0 {
        low | !((1 << MAX_VIRTUAL_BITS) - 1)
    } else {
        low
    }
}

/// Returns true if `addr` lies in the user half of the address space.
#[inline]
pub const fn is_user_address(addr: usize) -> bool {
    addr < USER_TOP
}
