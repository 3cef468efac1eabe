//! Error types for the virtual memory core.
//!
//! Every operation fails synchronously at the point of the call; none of these errors
//! leave partially-modified state behind.

use core::fmt;

use pmm::MapError;

/// I/O failure reported by a file or the swap device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// Fewer bytes were read than requested.
    ShortRead,
    /// Fewer bytes were written than requested.
    ShortWrite,
    /// The swap device has no free slot.
    SwapFull,
    /// The swap slot is out of range or not in use.
    BadSlot,
    /// A lazy-load initializer was run without the payload it expects.
    MissingPayload,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortRead => write!(f, "short read"),
            Self::ShortWrite => write!(f, "short write"),
            Self::SwapFull => write!(f, "swap device is full"),
            Self::BadSlot => write!(f, "invalid swap slot"),
            Self::MissingPayload => write!(f, "lazy load payload missing"),
        }
    }
}

/// Errors from creating pages in a supplemental page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// A page already exists at the virtual address.
    AlreadyMapped,
    /// The page record could not be allocated.
    OutOfMemory,
    /// The address is null, unaligned or outside user space.
    InvalidAddress,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyMapped => write!(f, "virtual address already mapped"),
            Self::OutOfMemory => write!(f, "out of memory for page records"),
            Self::InvalidAddress => write!(f, "invalid user page address"),
        }
    }
}

/// Errors from giving a page a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    /// No page exists at the requested address.
    NotFound,
    /// No frame could be obtained, even by eviction.
    OutOfMemory,
    /// The hardware mapping could not be installed.
    MappingFailed,
    /// Populating the frame failed.
    Io(IoError),
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no page at address"),
            Self::OutOfMemory => write!(f, "out of frames"),
            Self::MappingFailed => write!(f, "failed to install mapping"),
            Self::Io(e) => write!(f, "swap-in failed: {e}"),
        }
    }
}

impl From<pmm::AllocError> for ClaimError {
    fn from(_: pmm::AllocError) -> Self {
        Self::OutOfMemory
    }
}

impl From<MapError> for ClaimError {
    fn from(_: MapError) -> Self {
        Self::MappingFailed
    }
}

impl From<IoError> for ClaimError {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

/// Errors from `mmap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapError {
    /// Null or unaligned address, zero length, unaligned offset or empty file.
    InvalidArgument,
    /// Part of the range is already in use.
    Overlap,
    /// The pages could not be allocated.
    OutOfMemory,
    /// A private file handle could not be created.
    Io(IoError),
}

impl fmt::Display for MmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid mmap argument"),
            Self::Overlap => write!(f, "range overlaps an existing page"),
            Self::OutOfMemory => write!(f, "out of memory for mapping"),
            Self::Io(e) => write!(f, "failed to reopen file: {e}"),
        }
    }
}

impl From<AllocError> for MmapError {
    fn from(e: AllocError) -> Self {
        match e {
            AllocError::AlreadyMapped => Self::Overlap,
            AllocError::OutOfMemory => Self::OutOfMemory,
            AllocError::InvalidAddress => Self::InvalidArgument,
        }
    }
}

impl From<IoError> for MmapError {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

/// Errors from `munmap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MunmapError {
    /// The address is not the first page of a file mapping.
    NotMappingStart,
}

impl fmt::Display for MunmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMappingStart => write!(f, "address is not the start of a mapping"),
        }
    }
}

/// A page fault that cannot be resolved. The faulting context must be terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// No page exists and the access does not qualify as stack growth.
    Unrecoverable,
    /// A write was attempted on a read-only page.
    WriteProtection,
    /// A new stack page could not be created.
    Alloc(AllocError),
    /// The page exists but could not be claimed.
    Claim(ClaimError),
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecoverable => write!(f, "unrecoverable page fault"),
            Self::WriteProtection => write!(f, "write to read-only page"),
            Self::Alloc(e) => write!(f, "stack growth failed: {e}"),
            Self::Claim(e) => write!(f, "claim failed: {e}"),
        }
    }
}

impl From<AllocError> for FaultError {
    fn from(e: AllocError) -> Self {
        Self::Alloc(e)
    }
}

impl From<ClaimError> for FaultError {
    fn from(e: ClaimError) -> Self {
        Self::Claim(e)
    }
}

/// Errors from duplicating an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateError {
    /// A frame, swap slot or page record could not be allocated.
    OutOfMemory,
    /// A mapping could not be installed in the child.
    MappingFailed,
    /// Copying swapped content or reopening a file failed.
    Io(IoError),
}

impl fmt::Display for DuplicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory while duplicating"),
            Self::MappingFailed => write!(f, "failed to install mapping in child"),
            Self::Io(e) => write!(f, "I/O failure while duplicating: {e}"),
        }
    }
}

impl From<ClaimError> for DuplicateError {
    fn from(e: ClaimError) -> Self {
        match e {
            ClaimError::NotFound | ClaimError::OutOfMemory => Self::OutOfMemory,
            ClaimError::MappingFailed => Self::MappingFailed,
            ClaimError::Io(e) => Self::Io(e),
        }
    }
}

impl From<AllocError> for DuplicateError {
    fn from(_: AllocError) -> Self {
        Self::OutOfMemory
    }
}

impl From<IoError> for DuplicateError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::SwapFull => Self::OutOfMemory,
            other => Self::Io(other),
        }
    }
}
