//! Shape of a hash tree with an arbitrary number of leaves.
//!
//! A tree over `n` leaves has `levels(n)` levels. Level 0 holds the leaves and every level
//! above is half as wide, rounded up, so a lone last node is carried up unchanged. All nodes
//! of all levels are numbered bottom-up, left to right, which gives every node one slot in
//! a packed array of hashes.

use crate::def::{HASH_SIZE, LEAF_BLOCK_SIZE};

/// Height of a node counted from the bottom level 0. Signed to allow deltas.
pub type Level = i32;
/// A number of nodes in a level, or the index of a node inside a level.
pub type Nodes = u64;
/// A length or offset in bytes.
pub type Bytes = u64;

/// Largest power of two less than or equal to `n`, 0 for 0.
pub fn high_bit_mask(n: u64) -> u64 {
    if n == 0 {
        0
    } else {
        1 << (63 - n.leading_zeros())
    }
}

/// Number of levels (1 or more) of a tree with `n` leaves.
pub fn levels(n: Nodes) -> Level {
    let below = n.saturating_sub(1);
    (64 - below.leading_zeros()) as Level + 1
}

/// Number of nodes at level `l` of a tree with `n` leaves. Below the leaves there is nothing.
pub fn level_width(n: Nodes, l: Level) -> Nodes {
    if l < 0 {
        return 0;
    }
    let mut w = n;
    for _ in 0..l {
        if w <= 1 {
            break;
        }
        w = w / 2 + w % 2;
    }
    w
}

/// Flat number of node `idx` at level `l`: all nodes of the lower levels come first.
pub fn hash_number(leafs: Nodes, l: Level, idx: Nodes) -> u64 {
    let below: Nodes = (0..l).map(|i| level_width(leafs, i)).sum();
    below + idx
}

/// Total number of nodes in a tree with `leafs` leaves.
pub fn hash_tree_size(leafs: Nodes) -> u64 {
    hash_number(leafs, levels(leafs), 0)
}

/// Byte offset of a node's hash in a packed hash array.
pub fn hash_position(leafs: Nodes, l: Level, idx: Nodes) -> u64 {
    hash_number(leafs, l, idx) * HASH_SIZE as u64
}

/// Splits the byte length covered by an inner node into the lengths covered by its two
/// children. The left one is the largest power of two below `b`, so the left subtree is
/// always complete; a power of two splits in equal halves.
pub fn split_length(b: Bytes) -> (Bytes, Bytes) {
    if b <= LEAF_BLOCK_SIZE {
        panic!("can't split a leaf node of {} bytes", b);
    }
    let mask = high_bit_mask(b);
    if mask == b {
        (b / 2, b / 2)
    } else {
        (mask, b - mask)
    }
}

/// Decomposes the node range `[from, to]` of a level `width` nodes wide into the aligned
/// ranges whose subtree root can be computed from the range alone.
///
/// Each returned range is a complete power-of-two subtree, or the lone last node of an odd
/// level. Nodes whose sibling lies outside `[from, to]` are left out, so the result may be
/// empty.
///
/// Panics if `from > to` or `to >= width`; use [`split_locally_summable_untrusted`] for
/// ranges that come from a peer.
pub fn split_locally_summable(from: Nodes, to: Nodes, width: Nodes) -> Vec<(Nodes, Nodes)> {
    if from > to || to >= width {
        panic!("from:{}, to:{}, width:{}", from, to, width);
    }
    sls(from, to, width)
}

/// Same as [`split_locally_summable`], but an invalid range yields `None`.
pub fn split_locally_summable_untrusted(
    from: Nodes,
    to: Nodes,
    width: Nodes,
) -> Option<Vec<(Nodes, Nodes)>> {
    if from > to || to >= width {
        return None;
    }
    Some(sls(from, to, width))
}

fn sls(from: Nodes, to: Nodes, width: Nodes) -> Vec<(Nodes, Nodes)> {
    let from = from + from % 2;
    if from > to {
        return Vec::new();
    }
    if from == to {
        // a single node only stands alone as the unpaired tail of the level
        if from == width - 1 && from % 2 == 0 {
            return vec![(from, to)];
        }
        return Vec::new();
    }
    if from == 0 {
        let dev = high_bit_mask(to + 1);
        if to == width - 1 || to == dev - 1 {
            return vec![(from, to)];
        }
        let mut r = sls(0, dev - 1, dev);
        r.extend(shifted(sls(0, to - dev, width - dev), dev));
        return r;
    }
    let dev = high_bit_mask(width - 1);
    if from >= dev {
        return shifted(sls(from - dev, to - dev, width - dev), dev);
    }
    if to < dev {
        return sls(from, to, dev);
    }
    let mut r = sls(from, dev - 1, dev);
    r.extend(shifted(sls(0, to - dev, width - dev), dev));
    r
}

fn shifted(ranges: Vec<(Nodes, Nodes)>, delta: Nodes) -> Vec<(Nodes, Nodes)> {
    ranges
        .into_iter()
        .map(|(a, b)| (a + delta, b + delta))
        .collect()
}

/// Splits packed hashes of the nodes `off..` of a level `width` nodes wide into the locally
/// summable chunks, each with the level index of its first node.
///
/// `hashes` must be a non-empty multiple of the hash size. Returns `None` when the range
/// does not fit in the level.
pub fn split_hashes(hashes: &[u8], off: Nodes, width: Nodes) -> Option<Vec<(Nodes, &[u8])>> {
    let n = (hashes.len() / HASH_SIZE) as Nodes;
    if n == 0 {
        return None;
    }
    let ranges = split_locally_summable_untrusted(off, off.checked_add(n - 1)?, width)?;
    let chunks = ranges
        .into_iter()
        .map(|(a, b)| {
            let start = ((a - off) as usize) * HASH_SIZE;
            let end = ((b - off + 1) as usize) * HASH_SIZE;
            (a, &hashes[start..end])
        })
        .collect();
    Some(chunks)
}
