use crate::def::Hash32;
use crate::hashtree::Bytes;

/// Hash and length of some content.
///
/// The length is not needed for uniqueness, but until a file is fully verified its length
/// can't be confirmed, and two downloads with the same hash and different lengths may be
/// in progress at once. Both are always passed together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HLKey {
    pub hash: Hash32,
    pub length: Bytes,
}

impl HLKey {
    pub fn new(hash: Hash32, length: Bytes) -> HLKey {
        HLKey { hash, length }
    }

    /// Hash followed by the little-endian length.
    pub fn full_bytes(&self) -> [u8; 40] {
        let mut out = [0u8; 40];
        out[..32].copy_from_slice(&self.hash);
        out[32..].copy_from_slice(&self.length.to_le_bytes());
        out
    }
}

impl std::fmt::Display for HLKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.hash), self.length)
    }
}
