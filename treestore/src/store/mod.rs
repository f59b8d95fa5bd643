//! Storage of partially known hash trees.
//!
//! A file is known by its [`HLKey`]: root hash plus length. For each key the store keeps the
//! upper part of the file's hash tree, from the level whose nodes cover one coarse block up
//! to the root, together with a counting bitmap of which of those nodes are known. Nodes
//! arrive from untrusted peers and are only kept once they are proven against an ancestor
//! that is already known, or against the key itself.

pub mod key;
pub mod partial;

use std::io;

use thiserror::Error;

pub use key::HLKey;
pub use partial::PartialTreeStore;

use crate::hashtree::Nodes;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("hash incomplete: {has} of {want} nodes known")]
    Incomplete { has: Nodes, want: Nodes },

    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

/// How much of a file's persisted tree is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    /// Nothing stored for this key.
    None,
    /// Some nodes are missing.
    Part,
    /// Every persisted node is known.
    Complete,
}

/// Result of storing hashes for a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    /// Number of persisted nodes known after the call.
    pub has: Nodes,
    /// Whether the whole persisted tree is known.
    pub complete: bool,
}
