//! Page table entry flags for software emulation.

/// Page table entry flags for software emulation.
///
/// Flags are stored as a raw usize with specific bits representing permissions and the
/// hardware-maintained access tracking bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFlags(usize);

macro_rules! flag_accessors {
    ($($(#[$doc:meta])* $bit:ident: $is:ident, $set:ident;)*) => {
        $(
            $(#[$doc])*
            pub const fn $is(self) -> bool {
                (self.0 & Self::$bit) != 0
            }

            #[doc = concat!("Sets or clears the `", stringify!($bit), "` bit.")]
            pub fn $set(&mut self, value: bool) {
                if value {
                    self.0 |= Self::$bit;
                } else {
                    self.0 &= !Self::$bit;
                }
            }
        )*
    };
}

impl PageFlags {
    /// Present bit (bit 0).
    const PRESENT: usize = 1 << 0;

    /// Writable bit (bit 1).
    const WRITABLE: usize = 1 << 1;

    /// User-accessible bit (bit 2).
    const USER: usize = 1 << 2;

    /// Accessed bit (bit 3), set by the MMU on any access through the mapping.
    const ACCESSED: usize = 1 << 3;

    /// Dirty bit (bit 4), set by the MMU on a write through the mapping.
    const DIRTY: usize = 1 << 4;

    /// No-execute bit (bit 5).
    const NO_EXECUTE: usize = 1 << 5;

    /// Mask covering every defined flag bit.
    pub const MASK: usize = (1 << 6) - 1;

    /// Creates empty page flags (page not present).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Flags for a present user page, optionally writable.
    pub const fn user(writable: bool) -> Self {
        let mut bits = Self::PRESENT | Self::USER;
        if writable {
            bits |= Self::WRITABLE;
        }
        Self(bits)
    }

    /// Creates page flags from a raw usize value.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw & Self::MASK)
    }

    /// Returns the raw usize value of these flags.
    pub const fn to_raw(self) -> usize {
        self.0
    }

    flag_accessors! {
        /// Returns whether the present bit is set.
        PRESENT: is_present, set_present;
        /// Returns whether the writable bit is set.
        WRITABLE: is_writable, set_writable;
        /// Returns whether the user-accessible bit is set.
        USER: is_user, set_user;
        /// Returns whether the page has been accessed since the bit was last cleared.
        ACCESSED: is_accessed, set_accessed;
        /// Returns whether the page has been written since the bit was last cleared.
        DIRTY: is_dirty, set_dirty;
        /// Returns whether the no-execute bit is set.
        NO_EXECUTE: is_no_execute, set_no_execute;
    }
}

impl Default for PageFlags {
    fn default() -> Self {
        Self::empty()
    }
}
