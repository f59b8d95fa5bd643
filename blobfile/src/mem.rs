use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::{check_range, Blob};

/// An in-memory blob, mimicking a `FileBlob` without touching the file system.
///
/// It counts write and sync operations so callers can check how many I/O operations
/// a batch of changes turned into.
#[derive(Debug, Default)]
pub struct MemBlob {
    data: RwLock<Vec<u8>>,
    writes: AtomicU64,
    syncs: AtomicU64,
}

impl MemBlob {
    /// Creates a zero-filled blob of `size` bytes.
    pub fn new(size: u64) -> MemBlob {
        Self::from_vec(vec![0u8; size as usize])
    }

    /// Creates a blob holding `data`; its size is `data.len()`.
    pub fn from_vec(data: Vec<u8>) -> MemBlob {
        MemBlob {
            data: RwLock::new(data),
            writes: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the current content.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Number of `write_at` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `sync` calls so far.
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::SeqCst)
    }
}

impl Blob for MemBlob {
    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let data = self.data.read();
        check_range(buf.len(), offset, data.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let mut data = self.data.write();
        check_range(buf.len(), offset, data.len() as u64)?;
        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
