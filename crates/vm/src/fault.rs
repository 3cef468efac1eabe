//! Page fault resolution.
//!
//! A fault on a page the supplemental page table knows about is resolved by claiming
//! that page. A user-mode fault just below the stack pointer grows the stack by one
//! page. The kernel only touches user buffers that passed
//! [`AddressSpace::check_user_range`], so a kernel-mode fault never grows the stack.
//! Everything else, including writes to read-only pages, is fatal to the faulting
//! process.

use pmm::VirtualAddress;

use crate::{AddressSpace, FaultError};

/// A fault as reported by the MMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// The faulting address.
    pub addr: usize,
    /// The access came from user mode. Only user-mode faults can grow the stack.
    pub user: bool,
    /// The access was a write.
    pub write: bool,
    /// No mapping was present. When false, the access violated the mapping's protection.
    pub not_present: bool,
}

/// How a fault was resolved. The faulting access can be retried in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    Resolved,
    StackGrown,
}

impl AddressSpace {
    /// Resolves a page fault in this address space.
    ///
    /// An error means the faulting context must be terminated.
    pub fn handle_fault(&mut self, fault: PageFault) -> Result<FaultOutcome, FaultError> {
        let result = self.resolve_fault(fault);
        match &result {
            Ok(outcome) => {
                log::trace!("vm: {:?} fault at {:#x}: {outcome:?}", self.id(), fault.addr)
            }
            Err(e) => log::error!(
                "vm: {:?} fatal fault at {:#x} ({fault:?}): {e}",
                self.id(),
                fault.addr
            ),
        }
        result
    }

    fn resolve_fault(&mut self, fault: PageFault) -> Result<FaultOutcome, FaultError> {
        let va = match VirtualAddress::try_new(fault.addr) {
            Some(va) if fault.addr != 0 && va.is_user() => va,
            _ => return Err(FaultError::Unrecoverable),
        };
        let page_va = va.page_base();

        if let Some(page) = self.spt.lookup(page_va) {
            let writable = page.lock().is_writable();
            if !fault.not_present {
                // The page is mapped, so the access broke its protection.
                return Err(if fault.write {
                    FaultError::WriteProtection
                } else {
                    FaultError::Unrecoverable
                });
            }
            if fault.write && !writable {
                return Err(FaultError::WriteProtection);
            }
            self.claim(&page)?;
            return Ok(FaultOutcome::Resolved);
        }

        if fault.user && fault.not_present && self.is_stack_access(va) {
            self.grow_stack(page_va)?;
            return Ok(FaultOutcome::StackGrown);
        }

        Err(FaultError::Unrecoverable)
    }

    /// Returns true if `va` is inside the stack window and close enough to the stack
    /// pointer to be a push.
    fn is_stack_access(&self, va: VirtualAddress) -> bool {
        let addr = va.as_usize();
        addr >= self.config.stack_bottom()
            && addr < self.config.stack_top
            && addr.saturating_add(self.config.stack_slack) >= self.stack_pointer
    }
}
