//! Utilities for persisted tree state.
//!
//! - Bit arrays kept in a [`blobfile::Blob`] with batched write-back
//! - The counting variant used as the completion map of a persisted tree
//! - Little-endian encoding of the persisted count
//! - Scans for runs of clear bits in exported bitmap bytes

pub mod bitset;
pub mod codec;
pub mod counting;
pub mod zeros;

/// Bytes needed to hold `bits` bits.
pub fn bytes_for_bits(bits: u64) -> u64 {
    bits.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::codec::*;
    use super::*;

    #[test]
    fn test_bytes_for_bits() {
        assert_eq!(bytes_for_bits(0), 0);
        assert_eq!(bytes_for_bits(1), 1);
        assert_eq!(bytes_for_bits(8), 1);
        assert_eq!(bytes_for_bits(9), 2);
    }

    #[test]
    fn test_encode_decode_i64() {
        let v = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        assert_eq!(decode_le_i64(&v), -8613303245920329199);
        assert_eq!(encode_le_i64(-8613303245920329199), v);
        assert_eq!(encode_le_i64(-1), [0xff; 8]);
    }
}
