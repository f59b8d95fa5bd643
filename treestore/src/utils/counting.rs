//! A [`BlobBitSet`] that keeps the number of set bits, persisted right after the bits.
//!
//! The count is only trusted when the bits on storage match it. A flush first replaces the
//! stored count with `DIRTY_COUNT` and syncs, then writes the bits, syncs again and writes
//! the real count. The sentinel is only on storage while a flush is running, so a blob found
//! with a dirty or impossible count on open was cut off mid-flush and is recounted.

use std::io;

use blobfile::Blob;
use log::warn;

use crate::def::{COUNT_BYTES, DIRTY_COUNT, WRITE_BLOCK};

use super::bitset::BlobBitSet;
use super::bytes_for_bits;
use super::codec::{decode_le_i64, encode_le_i64};

pub struct CountingBitSet<B: Blob> {
    bits: BlobBitSet<B>,
    count: i64,
}

/// Bytes of a blob holding a counting bitmap of `capacity` bits.
pub fn counting_blob_size(capacity: u64) -> u64 {
    bytes_for_bits(capacity) + COUNT_BYTES
}

impl<B: Blob> CountingBitSet<B> {
    /// Opens a counting bitmap over `blob`, which must be exactly
    /// `counting_blob_size(capacity)` bytes. A zero-filled blob is an empty bitmap.
    pub fn open(blob: B, capacity: u64) -> io::Result<CountingBitSet<B>> {
        let size = counting_blob_size(capacity);
        if blob.size() != size {
            panic!("blob of wrong size: {} != {}", blob.size(), size);
        }
        let mut counting = CountingBitSet {
            bits: BlobBitSet::new(blob, capacity),
            count: 0,
        };
        let stored = counting.read_count()?;
        counting.count = if stored == DIRTY_COUNT {
            warn!(
                "recount on bitset of capacity {}, this should only happen after a crash",
                capacity
            );
            counting.recount()?
        } else if stored < 0 || stored as u64 > capacity {
            warn!(
                "count {} out of range on bitset of capacity {}, recounting",
                stored, capacity
            );
            counting.recount()?
        } else {
            stored
        };
        Ok(counting)
    }

    fn count_offset(&self) -> u64 {
        self.bits.byte_len()
    }

    fn read_count(&self) -> io::Result<i64> {
        let mut buf = [0u8; COUNT_BYTES as usize];
        self.bits.blob().read_at(&mut buf, self.count_offset())?;
        Ok(decode_le_i64(&buf))
    }

    fn write_count(&self, count: i64) -> io::Result<()> {
        self.bits
            .blob()
            .write_at(&encode_le_i64(count), self.count_offset())
    }

    fn recount(&self) -> io::Result<i64> {
        let bytes = self.bits.byte_len();
        let mut buf = vec![0u8; WRITE_BLOCK as usize];
        let mut count = 0i64;
        let mut start = 0u64;
        while start < bytes {
            let len = WRITE_BLOCK.min(bytes - start) as usize;
            self.bits.blob().read_at(&mut buf[..len], start)?;
            count += buf[..len]
                .iter()
                .map(|b| b.count_ones() as i64)
                .sum::<i64>();
            start += len as u64;
        }
        Ok(count)
    }

    pub fn capacity(&self) -> u64 {
        self.bits.capacity()
    }

    pub fn count(&self) -> u64 {
        self.count as u64
    }

    pub fn full(&self) -> bool {
        self.count() == self.capacity()
    }

    pub fn get(&self, i: u64) -> io::Result<bool> {
        self.bits.get(i)
    }

    /// Sets bit `i`; setting a set bit changes nothing.
    pub fn set(&mut self, i: u64) -> io::Result<()> {
        if self.bits.get(i)? {
            return Ok(());
        }
        self.count += 1;
        if self.count as u64 > self.capacity() {
            panic!("count {} > capacity {}", self.count, self.capacity());
        }
        self.bits.set(i);
        Ok(())
    }

    /// Clears bit `i`; clearing a clear bit changes nothing.
    pub fn unset(&mut self, i: u64) -> io::Result<()> {
        if !self.bits.get(i)? {
            return Ok(());
        }
        self.count -= 1;
        if self.count < 0 {
            panic!("count {} < 0", self.count);
        }
        self.bits.unset(i);
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.bits.has_changes()
    }

    /// Writes pending bits and then the count to the blob. If this fails the stored
    /// count is left dirty.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.bits.has_changes() {
            return Ok(());
        }
        self.write_count(DIRTY_COUNT)?;
        self.bits.blob().sync()?;
        self.bits.flush()?;
        self.bits.blob().sync()?;
        self.write_count(self.count)
    }

    /// Makes bits and count durable.
    pub fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.bits.blob().sync()
    }

    /// Syncs and releases the blob.
    pub fn close(mut self) -> io::Result<()> {
        self.sync()
    }

    /// Flushes and returns the bytes holding the bits, without the count.
    pub fn export_bytes(&mut self) -> io::Result<Vec<u8>> {
        self.bits.export_bytes()
    }
}
