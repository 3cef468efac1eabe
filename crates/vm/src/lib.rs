#![cfg_attr(not(test), no_std)]

//! # Polaris Virtual Memory
//!
//! Demand-paged virtual memory on top of the Polaris Memory Manager:
//!
//! - A supplemental page table per address space, recording every page and what backs it.
//! - Lazily populated pages: anonymous memory, file-backed memory and deferred loaders.
//! - A shared frame pool that evicts pages to swap or back to their file under pressure.
//! - A page fault resolver with stack growth.
//! - Memory-mapped files and address space duplication for fork.

extern crate alloc;

mod address_space;
mod anon;
mod config;
mod error;
pub mod eviction;
mod fault;
mod file;
mod frame_manager;
pub mod fs;
pub mod loader;
pub mod logging;
mod mmap;
mod page;
mod spt;
pub mod swap;
mod uninit;

use static_assertions::assert_impl_all;

pub use address_space::{AddressSpace, AddressSpaceId};
pub use anon::AnonPage;
pub use config::{DEFAULT_STACK_LIMIT, DEFAULT_STACK_TOP, VmConfig};
pub use error::{
    AllocError, ClaimError, DuplicateError, FaultError, IoError, MmapError, MunmapError,
};
pub use fault::{FaultOutcome, PageFault};
pub use file::FilePage;
pub use frame_manager::{FrameManager, FrameStats};
pub use page::{Eviction, Page, PageKind, PageRef, PageType};
pub use spt::SupplementalPageTable;
pub use uninit::{Initializer, LazyLoad, LoadPayload, Target, UninitPage};

assert_impl_all!(FrameManager: Send, Sync);
assert_impl_all!(AddressSpace: Send);
assert_impl_all!(Page: Send);
