//! Little-endian encoding of the signed count stored after a bitmap.

use byteorder::{ByteOrder, LittleEndian};

/// Decodes a signed 64-bit integer from the first 8 bytes of `v`.
///
/// # Panics
/// If the input slice is less than 8 bytes long
pub fn decode_le_i64(v: &[u8]) -> i64 {
    LittleEndian::read_i64(&v[0..8])
}

pub fn encode_le_i64(n: i64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    LittleEndian::write_i64(&mut buf, n);
    buf
}
