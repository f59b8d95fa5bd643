//! Word representation of a node hash and the inner-node compressor.
//!
//! Inner nodes are hashed with the bare SHA-256 block function, starting from the SHA-224
//! initial values. One 64-byte block holds exactly two child hashes, so no padding or
//! length encoding is needed, and the different IV keeps inner hashes apart from plain
//! SHA-256 leaf hashes.

use byteorder::{BigEndian, ByteOrder};
use sha2::digest::consts::U64;
use sha2::digest::generic_array::GenericArray;

use crate::def::{Hash32, HASH_SIZE};

const SHA224_IV: [u32; 8] = [
    0xC1059ED8, 0x367CD507, 0x3070DD17, 0xF70E5939, 0xFFC00B31, 0x68581511, 0x64F98FA7,
    0xBEFA4FA4,
];

/// A node hash as eight 32-bit words, each serialized big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct H256(pub [u32; 8]);

impl H256 {
    /// Reads a hash from the first 32 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> H256 {
        let mut words = [0u32; 8];
        BigEndian::read_u32_into(&bytes[..HASH_SIZE], &mut words);
        H256(words)
    }

    pub fn to_bytes(&self) -> Hash32 {
        let mut out = [0u8; HASH_SIZE];
        self.write_to(&mut out);
        out
    }

    /// Writes the hash into the first 32 bytes of `out`.
    pub fn write_to(&self, out: &mut [u8]) {
        BigEndian::write_u32_into(&self.0, &mut out[..HASH_SIZE]);
    }
}

impl From<Hash32> for H256 {
    fn from(bytes: Hash32) -> H256 {
        H256::from_bytes(&bytes)
    }
}

/// Combines a left and a right child into their parent.
pub type Compressor = fn(&H256, &H256) -> H256;

/// The standard inner-node compressor.
pub fn sha224_block(left: &H256, right: &H256) -> H256 {
    let mut block = [0u8; 2 * HASH_SIZE];
    left.write_to(&mut block[..HASH_SIZE]);
    right.write_to(&mut block[HASH_SIZE..]);
    let mut state = SHA224_IV;
    sha2::compress256(&mut state, &[GenericArray::<u8, U64>::clone_from_slice(&block)]);
    H256(state)
}
