//! Core constants of the hash tree and its persisted form.
//!
//! # Hash tree
//! - Leaves are SHA-256 digests of `LEAF_BLOCK_SIZE` byte blocks of content
//! - Every node is `HASH_SIZE` bytes
//! - A tree never grows beyond `MAX_LEVEL` levels
//!
//! # Persisted trees
//! - Only levels covering at least one `BLOB_SIZE` block are stored
//! - Bitmaps are flushed in windows of `WRITE_BLOCK` bytes
//! - A counting bitmap ends with a `COUNT_BYTES` little-endian count, `DIRTY_COUNT` while
//!   a flush is in progress

/// Size of a node hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte hash in its serialized form.
pub type Hash32 = [u8; HASH_SIZE];

/// All-zero hash.
pub const ZERO_HASH32: Hash32 = [0u8; HASH_SIZE];

/// Maximum number of levels of a tree.
pub const MAX_LEVEL: usize = 64;

/// Maximum number of content bytes hashed into one leaf.
pub const LEAF_BLOCK_SIZE: u64 = 1024;

/// Default size of the coarse blocks whose subtrees are not persisted (4MB).
pub const BLOB_SIZE: u64 = 4 << 20;

/// Bitmap bytes read and written back together on flush.
pub const WRITE_BLOCK: u64 = 4096;

/// Bits in one flush window.
pub const WRITE_BLOCK_BITS: u64 = WRITE_BLOCK * 8;

/// Bytes of the trailing count of a counting bitmap.
pub const COUNT_BYTES: u64 = 8;

/// Persisted count while bits may be out of sync with it.
pub const DIRTY_COUNT: i64 = -1;

/// Subdirectory of the data directory holding persisted trees.
pub const HASH_DIR: &str = "m_hash";
