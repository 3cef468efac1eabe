//! Architecture-specific implementations for memory management.
//!
//! Only the software model is provided: the virtual-memory core runs against an emulated
//! MMU so that paging, fault handling and eviction can be exercised on any host.

mod software;

pub use software::*;

// Re-export page table primitives from the active architecture
pub use self::{PageEntry, PageFlags, PageTable};
