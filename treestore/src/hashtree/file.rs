//! File hash: SHA-256 over fixed-size leaf blocks, combined by a [`TreeDigest`].
//!
//! A file shorter than one block hashes to its plain SHA-256 digest. A short last block is
//! only hashed when the digest is taken, so writing can resume after a `peek`.

use sha2::digest::FixedOutputReset;
use sha2::{Digest, Sha256};

use crate::def::{Hash32, LEAF_BLOCK_SIZE};

use super::structure::{Bytes, Nodes};
use super::tree::{InnerHashListener, TreeDigest};

/// Number of leaf blocks of a file of `len` bytes; an empty file still has one.
pub fn nodes_for_length(len: Bytes) -> Nodes {
    if len == 0 {
        return 1;
    }
    (len - 1) / LEAF_BLOCK_SIZE + 1
}

pub struct FileDigest<'l, D = Sha256> {
    len: Bytes,
    leaf: D,
    block_size: Bytes,
    tree: TreeDigest<'l>,
}

impl<'l> FileDigest<'l> {
    /// The standard file hash: 1024-byte SHA-256 leaves under a no-pad tree.
    pub fn new() -> FileDigest<'l> {
        Self::with(LEAF_BLOCK_SIZE, Sha256::new(), TreeDigest::no_pad())
    }
}

impl<'l> Default for FileDigest<'l> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'l, D: Digest + FixedOutputReset + Clone> FileDigest<'l, D> {
    pub fn with(block_size: Bytes, leaf: D, tree: TreeDigest<'l>) -> FileDigest<'l, D> {
        assert!(block_size > 0, "leaf block size must be positive");
        FileDigest {
            len: 0,
            leaf,
            block_size,
            tree,
        }
    }

    /// Number of leaves of a file of `len` bytes.
    pub fn nodes(&self, len: Bytes) -> Nodes {
        if len == 0 {
            return 1;
        }
        (len - 1) / self.block_size + 1
    }

    pub fn block_size(&self) -> Bytes {
        self.block_size
    }

    pub fn len(&self) -> Bytes {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Listener for the nodes of the tree above the leaf hashes.
    pub fn set_listener<L: InnerHashListener + 'l>(&mut self, listener: L) {
        self.tree.set_listener(listener);
    }

    pub fn update(&mut self, mut data: &[u8]) {
        let mut filled = self.len % self.block_size;
        self.len += data.len() as Bytes;
        while data.len() as Bytes + filled >= self.block_size {
            let take = (self.block_size - filled) as usize;
            Digest::update(&mut self.leaf, &data[..take]);
            data = &data[take..];
            let leaf = self.leaf.finalize_reset();
            self.tree.update(leaf.as_slice());
            filled = 0;
        }
        if !data.is_empty() {
            Digest::update(&mut self.leaf, data);
        }
    }

    fn has_tail(&self) -> bool {
        self.len % self.block_size != 0 || self.len == 0
    }

    /// Digest of the bytes written so far; writing may continue.
    pub fn peek(&self) -> Hash32 {
        let mut tree = self.tree.fork();
        if self.has_tail() {
            let leaf = Digest::finalize(self.leaf.clone());
            tree.update(leaf.as_slice());
        }
        tree.finalize()
    }

    pub fn finalize(mut self) -> Hash32 {
        if self.has_tail() {
            let leaf = self.leaf.finalize_reset();
            self.tree.update(leaf.as_slice());
        }
        self.tree.finalize()
    }

    pub fn reset(&mut self) {
        self.tree.reset();
        Digest::reset(&mut self.leaf);
        self.len = 0;
    }
}
