#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

//! # Polaris Memory Manager (PMM)
//!
//! The Polaris Memory Manager (PMM) is the low-level half of the Polaris virtual memory
//! subsystem. It provides:
//!
//! - Physical and virtual address types.
//! - A physical frame allocator with per-frame metadata and pinning.
//! - Emulated physical memory and a 3-level page table with accessed and dirty tracking.
//!
//! The paging hardware is modelled in software so the whole stack can run in ordinary
//! test environments.

extern crate alloc;

mod address;
mod arch;
mod frame;
mod numbers;
mod page_directory;
mod physical_memory;
mod physical_memory_manager;

pub use address::{PhysicalAddress, VirtualAddress};
pub use numbers::FrameNumber;
pub use page_directory::{MapError, PageDirectory};
pub use physical_memory::{FrameData, PhysicalMemory};
pub use physical_memory_manager::{AllocError, PhysicalMemoryManager};

pub use arch::{PAGE_SIZE, PageEntry, PageFlags, USER_TOP};
