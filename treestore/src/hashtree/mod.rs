//! Merkle hash trees over content of any length.
//!
//! - [`structure`]: shape of a tree with any number of leaves, flat node numbering and
//!   the split of node ranges into independently verifiable subtrees
//! - [`h256`]: node hash words and the inner-node compressor
//! - [`tree`]: streaming tree hash with an inner-hash listener
//! - [`file`]: file hash over 1024-byte SHA-256 leaves

pub mod file;
pub mod h256;
pub mod structure;
pub mod tree;

pub use file::{nodes_for_length, FileDigest};
pub use h256::{sha224_block, Compressor, H256};
pub use structure::{Bytes, Level, Nodes};
pub use tree::{InnerHashListener, Padder, TreeDigest};
