//! File system interface used by file-backed pages and the program loader.

use alloc::{boxed::Box, sync::Arc, vec::Vec};

use spin::Mutex;

use crate::IoError;

/// An open file with its own read/write position.
pub trait File: Send {
    /// Reads into `buf` from the current position, returning the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Writes `buf` at the current position, returning the number of bytes written.
    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError>;

    /// Moves the position to `pos` bytes from the start of the file.
    fn seek(&mut self, pos: usize);

    /// Returns the current position.
    fn tell(&self) -> usize;

    /// Returns the length of the file in bytes.
    fn length(&self) -> usize;

    /// Opens an independent handle on the same file, positioned at the start.
    fn duplicate(&self) -> Result<FileHandle, IoError>;
}

/// An owned file handle.
pub type FileHandle = Box<dyn File>;

/// Reads exactly `buf.len()` bytes starting at `offset`.
pub(crate) fn read_exact_at(
    file: &mut dyn File,
    offset: usize,
    buf: &mut [u8],
) -> Result<(), IoError> {
    file.seek(offset);
    if file.read(buf)? == buf.len() {
        Ok(())
    } else {
        Err(IoError::ShortRead)
    }
}

/// Writes all of `buf` starting at `offset`.
pub(crate) fn write_all_at(file: &mut dyn File, offset: usize, buf: &[u8]) -> Result<(), IoError> {
    file.seek(offset);
    if file.write(buf)? == buf.len() {
        Ok(())
    } else {
        Err(IoError::ShortWrite)
    }
}

/// A file held in memory.
///
/// Handles created with [`File::duplicate`] or [`MemoryFile::reopen`] share the contents
/// but not the position. Writes past the end are truncated; files never grow.
pub struct MemoryFile {
    contents: Arc<Mutex<Vec<u8>>>,
    position: usize,
}

impl MemoryFile {
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(contents.into())),
            position: 0,
        }
    }

    /// Opens another handle on the same contents.
    pub fn reopen(&self) -> Self {
        Self {
            contents: Arc::clone(&self.contents),
            position: 0,
        }
    }

    /// Returns a snapshot of the contents.
    pub fn contents(&self) -> Vec<u8> {
        self.contents.lock().clone()
    }
}

impl File for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let contents = self.contents.lock();
        let start = self.position.min(contents.len());
        let count = buf.len().min(contents.len() - start);
        buf[..count].copy_from_slice(&contents[start..start + count]);
        self.position = start + count;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, IoError> {
        let mut contents = self.contents.lock();
        let start = self.position.min(contents.len());
        let count = buf.len().min(contents.len() - start);
        contents[start..start + count].copy_from_slice(&buf[..count]);
        self.position = start + count;
        Ok(count)
    }

    fn seek(&mut self, pos: usize) {
        self.position = pos;
    }

    fn tell(&self) -> usize {
        self.position
    }

    fn length(&self) -> usize {
        self.contents.lock().len()
    }

    fn duplicate(&self) -> Result<FileHandle, IoError> {
        Ok(Box::new(self.reopen()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_share_contents_not_position() {
        let mut a = MemoryFile::new(b"hello world".to_vec());
        let mut b = a.duplicate().unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(a.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(b.tell(), 0);

        b.seek(6);
        assert_eq!(b.write(b"WORLD").unwrap(), 5);
        assert_eq!(a.contents(), b"hello WORLD");
    }

    #[test]
    fn writes_do_not_grow_the_file() {
        let mut file = MemoryFile::new(vec![0u8; 4]);
        file.seek(2);
        assert_eq!(file.write(b"abcd").unwrap(), 2);
        assert_eq!(file.contents(), vec![0, 0, b'a', b'b']);
        assert_eq!(file.length(), 4);
    }

    #[test]
    fn read_past_end_is_short() {
        let mut file = MemoryFile::new(vec![7u8; 4]);
        let mut buf = [0u8; 8];
        assert_eq!(read_exact_at(&mut file, 2, &mut buf), Err(IoError::ShortRead));
        assert_eq!(read_exact_at(&mut file, 0, &mut buf[..4]), Ok(()));
        assert_eq!(&buf[..4], &[7; 4]);
    }

    #[test]
    fn write_all_at_reports_truncation() {
        let mut file = MemoryFile::new(vec![0u8; 4]);
        assert_eq!(write_all_at(&mut file, 3, b"xy"), Err(IoError::ShortWrite));
    }
}
