//! Views over a blob: disjoint sub-ranges of one backing blob, and a fully
//! buffered wrapper for small blobs that are read one byte at a time.

use std::io;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{check_range, Blob};

/// A window `[start, start + size)` of a shared backing blob, addressed from 0.
#[derive(Clone)]
pub struct SubBlob {
    blob: Arc<dyn Blob>,
    start: u64,
    size: u64,
}

impl SubBlob {
    /// Creates a window over `blob`. Panics if the window does not fit.
    pub fn new(blob: Arc<dyn Blob>, start: u64, size: u64) -> SubBlob {
        if start.checked_add(size).map_or(true, |end| end > blob.size()) {
            panic!(
                "sub blob out of range: {} + {} > {}",
                start,
                size,
                blob.size()
            );
        }
        SubBlob { blob, start, size }
    }

    /// Offset of this window inside the backing blob.
    pub fn start(&self) -> u64 {
        self.start
    }
}

/// Splits `blob` at byte `at` into `[0, at)` and `[at, size)`.
///
/// `at` must be strictly inside the blob, so both halves are non-empty.
pub fn split_blob(blob: Arc<dyn Blob>, at: u64) -> (SubBlob, SubBlob) {
    let size = blob.size();
    if at == 0 || at >= size {
        panic!("split point {} out of range 1..{}", at, size);
    }
    let left = SubBlob::new(blob.clone(), 0, at);
    let right = SubBlob::new(blob, at, size - at);
    (left, right)
}

impl Blob for SubBlob {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        check_range(buf.len(), offset, self.size)?;
        self.blob.read_at(buf, self.start + offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        check_range(buf.len(), offset, self.size)?;
        self.blob.write_at(buf, self.start + offset)
    }

    fn sync(&self) -> io::Result<()> {
        self.blob.sync()
    }
}

/// Keeps a full copy of a blob in memory. Reads never reach the backing blob;
/// writes go to both.
pub struct BufferedBlob<B: Blob> {
    blob: B,
    buf: RwLock<Vec<u8>>,
}

impl<B: Blob> BufferedBlob<B> {
    /// Reads all of `blob` into memory.
    pub fn new(blob: B) -> io::Result<BufferedBlob<B>> {
        let mut buf = vec![0u8; blob.size() as usize];
        blob.read_at(&mut buf, 0)?;
        Ok(BufferedBlob {
            blob,
            buf: RwLock::new(buf),
        })
    }

    /// Returns the backing blob.
    pub fn into_inner(self) -> B {
        self.blob
    }
}

impl<B: Blob> Blob for BufferedBlob<B> {
    fn size(&self) -> u64 {
        self.blob.size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let data = self.buf.read();
        check_range(buf.len(), offset, data.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut data = self.buf.write();
        self.blob.write_at(buf, offset)?;
        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        self.blob.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemBlob;

    #[test]
    fn test_split_blob() {
        let backing = Arc::new(MemBlob::new(10));
        let (left, right) = split_blob(backing.clone(), 4);
        assert_eq!(left.size(), 4);
        assert_eq!(right.size(), 6);

        left.write_at(&[1, 2], 2).unwrap();
        right.write_at(&[7, 8, 9], 0).unwrap();
        assert_eq!(backing.to_vec(), vec![0, 0, 1, 2, 7, 8, 9, 0, 0, 0]);

        // the left half cannot reach into the right one
        let err = left.write_at(&[5, 5], 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut out = [0u8; 3];
        right.read_at(&mut out, 0).unwrap();
        assert_eq!(out, [7, 8, 9]);
    }

    #[test]
    #[should_panic(expected = "split point")]
    fn test_split_at_end_panics() {
        let backing = Arc::new(MemBlob::new(10));
        split_blob(backing, 10);
    }

    #[test]
    fn test_buffered_blob() {
        let backing = Arc::new(MemBlob::from_vec(vec![1, 2, 3, 4]));
        let buffered = BufferedBlob::new(backing.clone()).unwrap();
        let mut out = [0u8; 1];
        for _ in 0..10 {
            buffered.read_at(&mut out, 2).unwrap();
        }
        assert_eq!(out, [3]);

        buffered.write_at(&[9], 2).unwrap();
        buffered.read_at(&mut out, 2).unwrap();
        assert_eq!(out, [9]);
        assert_eq!(backing.to_vec(), vec![1, 2, 9, 4]);
        assert_eq!(backing.write_count(), 1);
    }
}
