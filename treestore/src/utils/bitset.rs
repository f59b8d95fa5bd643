//! A bit array stored in a blob.
//!
//! Changes are collected in memory, grouped by the `WRITE_BLOCK`-byte window they fall in,
//! and only reach the blob on `flush`. Each touched window is then read, patched and written
//! back with a single write, so the number of blob writes depends on how many windows were
//! touched and not on how many bits changed.
//!
//! Bit `i` lives in byte `i / 8` under mask `1 << (i % 8)`.

use std::collections::BTreeMap;
use std::io;

use blobfile::Blob;

use crate::def::{WRITE_BLOCK, WRITE_BLOCK_BITS};

use super::bytes_for_bits;

pub struct BlobBitSet<B: Blob> {
    blob: B,
    bits: u64,
    // window number -> bit in window -> new value
    changes: BTreeMap<u64, BTreeMap<u64, bool>>,
}

impl<B: Blob> BlobBitSet<B> {
    /// Uses the first `ceil(bits / 8)` bytes of `blob` as a bit array.
    pub fn new(blob: B, bits: u64) -> BlobBitSet<B> {
        let bytes = bytes_for_bits(bits);
        if blob.size() < bytes {
            panic!("blob of {} bytes can't hold {} bits", blob.size(), bits);
        }
        BlobBitSet {
            blob,
            bits,
            changes: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.bits
    }

    /// Bytes of the blob used by the bits.
    pub fn byte_len(&self) -> u64 {
        bytes_for_bits(self.bits)
    }

    pub fn blob(&self) -> &B {
        &self.blob
    }

    fn locate(&self, i: u64) -> (u64, u64) {
        if i >= self.bits {
            panic!("bit index {} out of range {}", i, self.bits);
        }
        (i / WRITE_BLOCK_BITS, i % WRITE_BLOCK_BITS)
    }

    fn set_as(&mut self, i: u64, v: bool) {
        let (block, bit) = self.locate(i);
        self.changes.entry(block).or_default().insert(bit, v);
    }

    pub fn set(&mut self, i: u64) {
        self.set_as(i, true);
    }

    pub fn unset(&mut self, i: u64) {
        self.set_as(i, false);
    }

    pub fn get(&self, i: u64) -> io::Result<bool> {
        let (block, bit) = self.locate(i);
        if let Some(v) = self.changes.get(&block).and_then(|m| m.get(&bit)) {
            return Ok(*v);
        }
        let mut one = [0u8; 1];
        self.blob.read_at(&mut one, i / 8)?;
        Ok(one[0] & (1 << (i % 8)) != 0)
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Writes all pending changes to the blob, one write per touched window.
    pub fn flush(&mut self) -> io::Result<()> {
        let bytes = self.byte_len();
        let mut buf = vec![0u8; WRITE_BLOCK as usize];
        while let Some((block, bits)) = self.changes.pop_first() {
            if bits.is_empty() {
                continue;
            }
            let start = block * WRITE_BLOCK;
            let len = WRITE_BLOCK.min(bytes - start) as usize;
            let window = &mut buf[..len];
            let result = self.blob.read_at(window, start).and_then(|_| {
                for (bit, v) in bits.iter() {
                    let mask = 1u8 << (bit % 8);
                    let byte = &mut window[(bit / 8) as usize];
                    if *v {
                        *byte |= mask;
                    } else {
                        *byte &= !mask;
                    }
                }
                self.blob.write_at(window, start)
            });
            if let Err(e) = result {
                self.changes.insert(block, bits);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Flushes, then makes the blob durable.
    pub fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.blob.sync()
    }

    /// Flushes and returns the bytes holding the bits.
    pub fn export_bytes(&mut self) -> io::Result<Vec<u8>> {
        self.flush()?;
        let mut out = vec![0u8; self.byte_len() as usize];
        self.blob.read_at(&mut out, 0)?;
        Ok(out)
    }

    pub fn into_inner(self) -> B {
        self.blob
    }
}
