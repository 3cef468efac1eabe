//! Address types for physical and virtual memory management.
//!
//! This module provides architecture-independent wrappers around physical and virtual
//! addresses, with methods to manipulate them for page table operations.

use core::fmt;
use core::ops::{Add, Sub};

use crate::{FrameNumber, arch};

/// Macro to define common address type functionality.
///
/// This macro generates the basic structure and methods common to both physical
/// and virtual address types, reducing code duplication.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Checks if the address is aligned to a page boundary.
            #[inline]
            pub const fn is_page_aligned(self) -> bool {
                self.is_aligned(arch::PAGE_SIZE)
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }

            /// Returns the offset of this address within its page.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (arch::PAGE_SIZE - 1)
            }

            /// Adds `rhs` bytes, returning None on overflow or if the result is invalid.
            #[inline]
            pub fn checked_add(self, rhs: usize) -> Option<Self> {
                let sum = self.0.checked_add(rhs)?;
                Self::is_valid(sum).then_some(Self(sum))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     In the software model this is an offset into emulated RAM. It provides methods for\n\
     address manipulation and alignment checks."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the architecture's maximum physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            arch::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }

    #[inline]
    const fn is_valid(addr: usize) -> bool {
        arch::validate_physical(addr)
    }

    /// Returns the corresponding frame number for this physical address.
    #[inline]
    pub fn frame_number(self) -> FrameNumber {
        FrameNumber::from(self)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     This is a newtype wrapper around a canonical virtual address. It provides methods for\n\
     address manipulation, alignment checks and the user/kernel split check."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address is not canonical for the architecture.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(arch::validate_virtual(addr), "address is not canonical");
        Self(addr)
    }

    /// Creates a virtual address if `addr` is canonical.
    #[inline]
    pub const fn try_new(addr: usize) -> Option<Self> {
        if arch::validate_virtual(addr) {
            Some(Self(addr))
        } else {
            None
        }
    }

    #[inline]
    const fn is_valid(addr: usize) -> bool {
        arch::validate_virtual(addr)
    }

    /// Rounds the address down to the start of its page.
    #[inline]
    pub const fn page_base(self) -> Self {
        self.align_down(arch::PAGE_SIZE)
    }

    /// Returns true if this address belongs to the user half of the address space.
    #[inline]
    pub const fn is_user(self) -> bool {
        arch::is_user_address(self.0)
    }
}
