//! Lazy loading of executable segments.
//!
//! The program loader describes each segment by a file region and a page range. Every
//! page gets an anonymous page whose initializer copies its share of the segment from
//! the file when first touched. Pages of one segment share the file handle.

use alloc::sync::Arc;
use core::any::Any;

use pmm::{FrameData, PAGE_SIZE, VirtualAddress};
use spin::Mutex;

use crate::{
    AddressSpace, AllocError, IoError,
    fs::{self, FileHandle},
    uninit::{LazyLoad, Target},
};

/// The part of a segment one page loads.
pub struct SegmentChunk {
    file: Arc<Mutex<FileHandle>>,
    offset: usize,
    read_bytes: usize,
}

impl SegmentChunk {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }
}

fn load_chunk(
    data: &mut FrameData,
    payload: Option<&(dyn Any + Send + Sync)>,
) -> Result<(), IoError> {
    let chunk = payload
        .and_then(|payload| payload.downcast_ref::<SegmentChunk>())
        .ok_or(IoError::MissingPayload)?;

    let mut file = chunk.file.lock();
    fs::read_exact_at(&mut **file, chunk.offset, &mut data[..chunk.read_bytes])?;
    data[chunk.read_bytes..].fill(0);
    Ok(())
}

/// Registers a segment: `read_bytes` bytes of `file` from `offset` followed by
/// `zero_bytes` zeroes, mapped at `upage`.
///
/// Nothing is read until the pages are accessed. If any page cannot be created, the
/// pages already added for this segment are removed again.
pub fn load_segment(
    space: &mut AddressSpace,
    file: FileHandle,
    offset: usize,
    upage: usize,
    read_bytes: usize,
    zero_bytes: usize,
    writable: bool,
) -> Result<(), AllocError> {
    let total = read_bytes
        .checked_add(zero_bytes)
        .ok_or(AllocError::InvalidAddress)?;
    if total % PAGE_SIZE != 0 || upage % PAGE_SIZE != 0 || offset % PAGE_SIZE != 0 {
        return Err(AllocError::InvalidAddress);
    }
    let start = VirtualAddress::try_new(upage).ok_or(AllocError::InvalidAddress)?;
    let pages = total / PAGE_SIZE;

    let file = Arc::new(Mutex::new(file));
    let mut remaining = read_bytes;
    for i in 0..pages {
        let page_read = remaining.min(PAGE_SIZE);
        let chunk: Arc<dyn Any + Send + Sync> = Arc::new(SegmentChunk {
            file: Arc::clone(&file),
            offset: offset + i * PAGE_SIZE,
            read_bytes: page_read,
        });
        let init = LazyLoad::new(load_chunk, Some(chunk));

        let va = start
            .checked_add(i * PAGE_SIZE)
            .ok_or(AllocError::InvalidAddress);
        let allocated =
            va.and_then(|va| space.allocate_lazy(Target::Anonymous, va, writable, Some(init)));
        if let Err(e) = allocated {
            for done in 0..i {
                space.remove_page(start + done * PAGE_SIZE);
            }
            return Err(e);
        }
        remaining -= page_read;
    }

    log::debug!(
        "loader: {:?} segment at {start}, {pages} pages, {read_bytes:#x} bytes from {offset:#x}",
        space.id()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloc::{boxed::Box, vec::Vec};

    use super::*;
    use crate::{
        ClaimError, FaultError, FrameManager, VmConfig,
        fs::MemoryFile,
        page::{PageKind, PageType},
    };

    fn setup() -> AddressSpace {
        let config = VmConfig {
            frame_count: 8,
            ..VmConfig::default()
        };
        AddressSpace::new(Arc::new(FrameManager::new(&config)), config)
    }

    fn image() -> MemoryFile {
        MemoryFile::new((0..3 * PAGE_SIZE).map(|i| (i / PAGE_SIZE) as u8 + 1).collect::<Vec<u8>>())
    }

    #[test]
    fn segment_pages_load_lazily() {
        let mut space = setup();
        let file = image();
        load_segment(
            &mut space,
            Box::new(file.reopen()),
            PAGE_SIZE,
            0x40_0000,
            PAGE_SIZE + 10,
            2 * PAGE_SIZE - 10,
            false,
        )
        .unwrap();

        assert_eq!(space.spt().len(), 3);
        let page = space.lookup(VirtualAddress::new(0x40_1000)).unwrap();
        assert_eq!(page.lock().page_type(), PageType::Anonymous);
        assert_eq!(space.frames().stats().free_frames, 8);

        let mut buf = [0u8; 4];
        space.read_user(0x40_0000, &mut buf).unwrap();
        assert_eq!(buf, [2; 4]);
        space.read_user(0x40_1000 + 8, &mut buf).unwrap();
        assert_eq!(buf, [3, 3, 0, 0]);
        space.read_user(0x40_2000, &mut buf).unwrap();
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn short_segment_fails_every_access() {
        let mut space = setup();
        let file = MemoryFile::new(vec![0xEEu8; 16]);
        load_segment(&mut space, Box::new(file), 0, 0x40_0000, PAGE_SIZE, 0, false).unwrap();

        let mut buf = [0xFFu8; 4];
        for _ in 0..2 {
            assert_eq!(
                space.read_user(0x40_0000, &mut buf),
                Err(FaultError::Claim(ClaimError::Io(IoError::ShortRead)))
            );
        }
        assert_eq!(buf, [0xFF; 4]);

        let page = space.lookup(VirtualAddress::new(0x40_0000)).unwrap();
        let page = page.lock();
        assert_eq!(page.current_type(), PageType::Uninit);
        assert!(!page.is_resident());
        assert!(matches!(page.kind(), PageKind::Uninit(u) if u.lazy_load().is_some()));
        assert_eq!(space.frames().stats().free_frames, 8);
    }

    #[test]
    fn rejects_misaligned_segments() {
        let mut space = setup();
        let file = image();
        assert_eq!(
            load_segment(&mut space, Box::new(file.reopen()), 0, 0x40_0000, 100, 100, false),
            Err(AllocError::InvalidAddress)
        );
        assert_eq!(
            load_segment(&mut space, Box::new(file.reopen()), 0, 0x40_0010, PAGE_SIZE, 0, false),
            Err(AllocError::InvalidAddress)
        );
    }

    #[test]
    fn overlapping_segment_is_rolled_back() {
        let mut space = setup();
        let file = image();
        space
            .allocate(Target::Anonymous, VirtualAddress::new(0x40_1000), true)
            .unwrap();

        assert_eq!(
            load_segment(
                &mut space,
                Box::new(file.reopen()),
                0,
                0x40_0000,
                2 * PAGE_SIZE,
                0,
                false,
            ),
            Err(AllocError::AlreadyMapped)
        );
        assert_eq!(space.spt().len(), 1);
    }

    #[test]
    fn fork_shares_segment_descriptor() {
        let mut parent = setup();
        let file = image();
        load_segment(
            &mut parent,
            Box::new(file.reopen()),
            0,
            0x40_0000,
            PAGE_SIZE,
            0,
            false,
        )
        .unwrap();

        let page = parent.lookup(VirtualAddress::new(0x40_0000)).unwrap();
        let payload = match page.lock().kind() {
            PageKind::Uninit(uninit) => uninit.lazy_load().and_then(|l| l.payload().cloned()),
            _ => None,
        };
        let payload = payload.unwrap();
        assert_eq!(Arc::strong_count(&payload), 2);

        let mut child = parent.duplicate().unwrap();
        assert_eq!(Arc::strong_count(&payload), 3);

        let mut buf = [0u8; 2];
        child.read_user(0x40_0000, &mut buf).unwrap();
        assert_eq!(buf, [1, 1]);
        assert!(
            payload
                .downcast_ref::<SegmentChunk>()
                .is_some_and(|c| c.read_bytes() == PAGE_SIZE)
        );
    }
}
