//! Run-time configuration of the virtual memory core.

use pmm::PAGE_SIZE;
use static_assertions::const_assert;

/// Default top of the user stack. The first stack page sits directly below it.
pub const DEFAULT_STACK_TOP: usize = 0x4748_0000;

/// Default maximum stack size.
pub const DEFAULT_STACK_LIMIT: usize = 1 << 20;

const_assert!(DEFAULT_STACK_TOP % PAGE_SIZE == 0);
const_assert!(DEFAULT_STACK_LIMIT % PAGE_SIZE == 0);
const_assert!(DEFAULT_STACK_LIMIT < DEFAULT_STACK_TOP);

/// Tunables shared by the frame manager and every address space built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Size of emulated physical memory, in frames.
    pub frame_count: usize,
    /// Number of page-sized slots on the swap device.
    pub swap_slots: usize,
    /// Highest user stack address (exclusive).
    pub stack_top: usize,
    /// Maximum distance the stack may grow below `stack_top`.
    pub stack_limit: usize,
    /// How far below the stack pointer a fault still counts as a stack access.
    pub stack_slack: usize,
    /// Maximum number of page tables per address space, root included.
    pub page_table_limit: usize,
    /// Maximum number of pages in one supplemental page table.
    pub page_limit: usize,
}

impl VmConfig {
    /// Lowest address the stack may grow down to.
    pub fn stack_bottom(&self) -> usize {
        self.stack_top.saturating_sub(self.stack_limit)
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            frame_count: 64,
            swap_slots: 256,
            stack_top: DEFAULT_STACK_TOP,
            stack_limit: DEFAULT_STACK_LIMIT,
            stack_slack: 32,
            page_table_limit: 256,
            page_limit: 16384,
        }
    }
}
