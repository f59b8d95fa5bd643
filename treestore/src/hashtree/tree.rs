//! Streaming hash tree over 32-byte nodes.
//!
//! Input bytes are cut into 32-byte nodes that form level 0 of a binary tree. Pending
//! subtree roots are kept in a stack indexed by level: a new node either fills the empty
//! slot of its level or is combined with the left sibling found there and carried one level
//! up, like a carry in binary addition. Memory stays O(log n) for any input length.
//!
//! When the digest is taken, the stack is collapsed bottom-up. A subtree with no left
//! sibling at the next level is promoted unchanged instead of being hashed with itself, so
//! trees with any number of leaves have a well defined root.

use crate::def::{Hash32, HASH_SIZE, MAX_LEVEL, ZERO_HASH32};

use super::h256::{sha224_block, Compressor, H256};
use super::structure::{Bytes, Level, Nodes};

/// Receives every node the tree computes, in bottom-up, left to right order per level.
///
/// `index` counts the nodes reported so far at `level`. Level 0 nodes come without children.
/// A promoted node is reported with `left` equal to `hash` and no `right`.
pub trait InnerHashListener {
    fn on_inner_hash(
        &mut self,
        level: Level,
        index: Nodes,
        hash: &H256,
        left: Option<&H256>,
        right: Option<&H256>,
    );
}

impl<F> InnerHashListener for F
where
    F: FnMut(Level, Nodes, &H256, Option<&H256>, Option<&H256>),
{
    fn on_inner_hash(
        &mut self,
        level: Level,
        index: Nodes,
        hash: &H256,
        left: Option<&H256>,
        right: Option<&H256>,
    ) {
        self(level, index, hash, left, right)
    }
}

/// Extends the input to a whole number of nodes before the digest is taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padder {
    /// Pads with zero bytes to the next multiple of 32. Empty input becomes one zero node.
    ZeroPad32,
    /// Input must already be a non-empty multiple of 32 bytes.
    NoPad32,
}

impl Padder {
    /// Number of padding bytes for an input of `len` bytes.
    pub fn pad_size(&self, len: Bytes) -> Bytes {
        let node = HASH_SIZE as Bytes;
        match self {
            Padder::ZeroPad32 if len == 0 => node,
            Padder::ZeroPad32 => (node - len % node) % node,
            Padder::NoPad32 => {
                if len % node != 0 || len == 0 {
                    panic!(
                        "need padding of {} bytes for length of {}",
                        node - len % node,
                        len
                    );
                }
                0
            }
        }
    }
}

#[derive(Clone)]
struct TreeState {
    pending: [u8; HASH_SIZE],
    pending_len: usize,
    len: Bytes,
    stack: [Option<H256>; MAX_LEVEL],
    height: usize,
    counters: [Nodes; MAX_LEVEL],
}

impl TreeState {
    fn new() -> TreeState {
        TreeState {
            pending: ZERO_HASH32,
            pending_len: 0,
            len: 0,
            stack: [None; MAX_LEVEL],
            height: 0,
            counters: [0; MAX_LEVEL],
        }
    }
}

/// An incremental tree hash. Bytes are fed with `update`; `peek` reads the digest so far
/// and leaves the tree writable, `finalize` consumes it.
pub struct TreeDigest<'l> {
    state: TreeState,
    padder: Padder,
    compressor: Compressor,
    listener: Option<Box<dyn InnerHashListener + 'l>>,
}

impl<'l> Default for TreeDigest<'l> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'l> TreeDigest<'l> {
    /// Zero-padding tree with the standard compressor.
    pub fn new() -> TreeDigest<'l> {
        Self::with(Padder::ZeroPad32, sha224_block)
    }

    /// Tree over input that is already a sequence of hashes.
    pub fn no_pad() -> TreeDigest<'l> {
        Self::with(Padder::NoPad32, sha224_block)
    }

    pub fn with(padder: Padder, compressor: Compressor) -> TreeDigest<'l> {
        TreeDigest {
            state: TreeState::new(),
            padder,
            compressor,
            listener: None,
        }
    }

    pub fn set_listener<L: InnerHashListener + 'l>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    /// Number of level 0 nodes of a tree over `len` bytes of input.
    pub fn nodes(&self, len: Bytes) -> Nodes {
        (len + self.padder.pad_size(len)) / HASH_SIZE as Bytes
    }

    /// Bytes written since creation or the last reset.
    pub fn len(&self) -> Bytes {
        self.state.len
    }

    pub fn is_empty(&self) -> bool {
        self.state.len == 0
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.state.len += data.len() as Bytes;
        while self.state.pending_len + data.len() >= HASH_SIZE {
            let take = HASH_SIZE - self.state.pending_len;
            self.state.pending[self.state.pending_len..].copy_from_slice(&data[..take]);
            data = &data[take..];
            self.state.pending_len = 0;
            let node = H256::from_bytes(&self.state.pending);
            self.push(node);
        }
        let start = self.state.pending_len;
        self.state.pending[start..start + data.len()].copy_from_slice(data);
        self.state.pending_len += data.len();
    }

    /// Digest of everything written so far. The tree stays writable and the listener
    /// does not hear the nodes computed for the digest.
    pub fn peek(&self) -> Hash32 {
        self.fork().finish().to_bytes()
    }

    /// Digest of everything written, reporting the closing nodes to the listener.
    pub fn finalize(mut self) -> Hash32 {
        self.finish().to_bytes()
    }

    pub fn reset(&mut self) {
        self.state = TreeState::new();
    }

    /// An independent copy of the current state, without the listener.
    pub fn fork<'a>(&self) -> TreeDigest<'a> {
        TreeDigest {
            state: self.state.clone(),
            padder: self.padder,
            compressor: self.compressor,
            listener: None,
        }
    }

    fn notify(&mut self, level: usize, hash: &H256, left: Option<&H256>, right: Option<&H256>) {
        let index = self.state.counters[level];
        self.state.counters[level] += 1;
        if let Some(listener) = self.listener.as_mut() {
            listener.on_inner_hash(level as Level, index, hash, left, right);
        }
    }

    fn push(&mut self, leaf: H256) {
        let mut level = 0usize;
        let mut node = leaf;
        let mut children: Option<(H256, H256)> = None;
        loop {
            match &children {
                Some((l, r)) => self.notify(level, &node, Some(l), Some(r)),
                None => self.notify(level, &node, None, None),
            }
            if self.state.height == level {
                self.state.stack[level] = Some(node);
                self.state.height += 1;
                return;
            }
            match self.state.stack[level].take() {
                None => {
                    self.state.stack[level] = Some(node);
                    return;
                }
                Some(left) => {
                    let parent = (self.compressor)(&left, &node);
                    children = Some((left, node));
                    node = parent;
                    level += 1;
                }
            }
        }
    }

    fn finish(&mut self) -> H256 {
        let pad = self.padder.pad_size(self.state.len) as usize;
        self.update(&ZERO_HASH32[..pad]);
        if self.state.pending_len != 0 {
            panic!("{} bytes left after padding", self.state.pending_len);
        }

        let height = self.state.height;
        let mut i = match self.state.stack[..height].iter().position(|n| n.is_some()) {
            Some(i) => i,
            None => panic!("no node to sum"),
        };
        let mut right = match self.state.stack[i] {
            Some(node) => node,
            None => panic!("no node at level {}", i),
        };
        i += 1;
        if i < height {
            self.notify(i, &right, Some(&right), None);
        }
        while i < height {
            match self.state.stack[i] {
                Some(left) => {
                    let parent = (self.compressor)(&left, &right);
                    self.notify(i + 1, &parent, Some(&left), Some(&right));
                    right = parent;
                }
                None => self.notify(i + 1, &right, Some(&right), None),
            }
            i += 1;
        }
        right
    }
}
