//! Scans exported bitmap bytes for clear bits.
//!
//! Uses the layout of [`super::bitset::BlobBitSet`]: bit `i` is `bytes[i / 8] & (1 << (i % 8))`.

pub struct ZeroScan<'a> {
    bytes: &'a [u8],
    pos: u64,
    end: u64,
}

impl<'a> ZeroScan<'a> {
    /// Scans bits `[0, capacity)`.
    pub fn new(bytes: &'a [u8], capacity: u64) -> ZeroScan<'a> {
        Self::range(bytes, 0, capacity)
    }

    /// Scans bits `[start, end)`.
    ///
    /// # Panics
    /// If `start > end` or `bytes` holds fewer than `end` bits
    pub fn range(bytes: &'a [u8], start: u64, end: u64) -> ZeroScan<'a> {
        if start > end || (bytes.len() as u64) * 8 < end {
            panic!(
                "bit range {}..{} out of {} bytes",
                start,
                end,
                bytes.len()
            );
        }
        ZeroScan {
            bytes,
            pos: start,
            end,
        }
    }

    fn is_set(&self, i: u64) -> bool {
        self.bytes[(i / 8) as usize] & (1 << (i % 8)) != 0
    }

    /// The next clear bit and at most `max_len - 1` clear bits right after it, as
    /// `(start, len)`.
    pub fn next_range(&mut self, max_len: u64) -> Option<(u64, u64)> {
        if max_len == 0 {
            panic!("max range length must be positive");
        }
        let start = self.next()?;
        let mut len = 1;
        while len < max_len && self.pos < self.end && !self.is_set(self.pos) {
            self.pos += 1;
            len += 1;
        }
        Some((start, len))
    }
}

impl Iterator for ZeroScan<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.pos < self.end {
            // whole bytes of set bits
            if self.pos % 8 == 0
                && self.pos + 8 <= self.end
                && self.bytes[(self.pos / 8) as usize] == 0xff
            {
                self.pos += 8;
                continue;
            }
            let i = self.pos;
            self.pos += 1;
            if !self.is_set(i) {
                return Some(i);
            }
        }
        None
    }
}
