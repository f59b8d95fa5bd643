//! Partial tree store.
//!
//! Only the levels from `min_level - 1` up are persisted, rebased so that level
//! `min_level - 1` of the full tree is row 0 of the persisted tree. One blob per key holds:
//!
//! ```text
//! [0, hash_bytes)           32-byte node hashes, numbered by `hash_number`
//! [hash_bytes, +bitmap)     one bit per node, set once the node is proven
//! last 8 bytes              little-endian count of set bits (-1 while dirty)
//! ```
//!
//! Incoming hashes are split into locally summable chunks. The root of a chunk (climbed
//! through any promoted lone nodes) must be the key itself or a node that is already known;
//! the chunk is hashed and kept only if it reproduces that root. Chunks that can't be
//! checked yet are skipped, chunks that fail the check are dropped.

use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use blobfile::{split_blob, Blob, BufferedBlob, FolderLv, Lv, SubBlob};
use dashmap::DashMap;
use log::{debug, info};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::config::Config;
use crate::def::{Hash32, HASH_DIR, HASH_SIZE};
use crate::hashtree::structure::{
    hash_number, hash_position, hash_tree_size, level_width, levels, split_hashes,
};
use crate::hashtree::{nodes_for_length, FileDigest, Level, Nodes, TreeDigest, H256};
use crate::utils::bytes_for_bits;
use crate::utils::counting::{counting_blob_size, CountingBitSet};
use crate::utils::zeros::ZeroScan;

use super::{FileState, HLKey, PutOutcome, StoreError};

const IMPORT_BUF_SIZE: usize = 64 * 1024;

/// Shape of the persisted tree of one key.
#[derive(Clone, Copy, Debug)]
struct Layout {
    // width of persisted row 0
    file_blobs: Nodes,
    tree_size: Nodes,
}

impl Layout {
    fn new(key: &HLKey, min_level: Level) -> Layout {
        let file_blobs = level_width(nodes_for_length(key.length), min_level - 1);
        Layout {
            file_blobs,
            tree_size: hash_tree_size(file_blobs),
        }
    }

    fn hash_bytes(&self) -> u64 {
        self.tree_size * HASH_SIZE as u64
    }

    fn blob_bytes(&self) -> u64 {
        self.hash_bytes() + counting_blob_size(self.tree_size)
    }

    /// Rebased level of the root.
    fn top(&self) -> Level {
        levels(self.file_blobs) - 1
    }

    fn width(&self, rebased: Level) -> Nodes {
        level_width(self.file_blobs, rebased)
    }

    fn position(&self, rebased: Level, idx: Nodes) -> u64 {
        hash_number(self.file_blobs, rebased, idx)
    }
}

/// The opened blob of one key.
struct Record {
    layout: Layout,
    hashes: SubBlob,
    bits: CountingBitSet<BufferedBlob<SubBlob>>,
}

impl Record {
    fn open(layout: Layout, blob: Arc<dyn Blob>) -> io::Result<Record> {
        let (hashes, bits) = split_blob(blob, layout.hash_bytes());
        let bits = CountingBitSet::open(BufferedBlob::new(bits)?, layout.tree_size)?;
        Ok(Record {
            layout,
            hashes,
            bits,
        })
    }

    fn read_hash(&self, pos: u64) -> io::Result<Hash32> {
        let mut out = [0u8; HASH_SIZE];
        self.hashes.read_at(&mut out, pos * HASH_SIZE as u64)?;
        Ok(out)
    }

    fn write_node(&mut self, rebased: Level, idx: Nodes, hash: &H256) -> io::Result<()> {
        let pos = self.layout.position(rebased, idx);
        self.hashes
            .write_at(&hash.to_bytes(), pos * HASH_SIZE as u64)?;
        self.bits.set(pos)
    }

    /// Writes a node and the chain of lone last nodes below it that were promoted into it.
    fn write_node_down(&mut self, rebased: Level, idx: Nodes, hash: &H256) -> io::Result<()> {
        self.write_node(rebased, idx, hash)?;
        let (mut l, mut i) = (rebased, idx);
        while l > 0 && i + 1 == self.layout.width(l) && self.layout.width(l - 1) % 2 == 1 {
            l -= 1;
            i = self.layout.width(l) - 1;
            self.write_node(l, i, hash)?;
        }
        Ok(())
    }

    /// Writes every node of a verified chunk starting at node `start` of row `rebased`.
    fn write_chunk(&mut self, rebased: Level, start: Nodes, chunk: &[u8]) -> io::Result<()> {
        let mut failed: Option<io::Error> = None;
        {
            let record = &mut *self;
            let failed = &mut failed;
            let mut tree = TreeDigest::no_pad();
            tree.set_listener(
                |level: Level, index: Nodes, hash: &H256, _: Option<&H256>, _: Option<&H256>| {
                    if failed.is_some() {
                        return;
                    }
                    let l = rebased + level;
                    let i = (start >> level) + index;
                    let result = if level == 0 {
                        record.write_node_down(l, i, hash)
                    } else {
                        record.write_node(l, i, hash)
                    };
                    if let Err(e) = result {
                        *failed = Some(e);
                    }
                },
            );
            tree.update(chunk);
            tree.finalize();
        }
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        self.hashes.sync()?;
        self.bits.sync()
    }

    fn outcome(&self) -> PutOutcome {
        PutOutcome {
            has: self.bits.count(),
            complete: self.bits.full(),
        }
    }
}

type LockTable = DashMap<HLKey, Arc<Mutex<()>>>;

/// Holds the lock of one key. The table entry is dropped with the last holder.
struct KeyGuard<'s> {
    locks: &'s LockTable,
    key: HLKey,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // runs under the shard lock, so no one can clone the entry meanwhile
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Stores the upper levels of hash trees, keyed by [`HLKey`], accepting only hashes that
/// verify against what is already known.
///
/// Calls for the same key are serialized; different keys proceed in parallel.
pub struct PartialTreeStore<L: Lv = FolderLv> {
    lv: L,
    min_level: Level,
    locks: LockTable,
}

impl PartialTreeStore<FolderLv> {
    /// Opens the store kept in `<dir>/m_hash`.
    pub fn open(config: &Config) -> anyhow::Result<PartialTreeStore<FolderLv>> {
        let lv = FolderLv::open(Path::new(&config.dir).join(HASH_DIR))?;
        info!(
            "partial tree store at {} persisting from level {}",
            lv.root().display(),
            config.min_level() - 1
        );
        Ok(Self::with_config(lv, config))
    }
}

impl<L: Lv> PartialTreeStore<L> {
    pub fn new(lv: L, min_level: Level) -> PartialTreeStore<L> {
        if min_level < 1 {
            panic!("min level {} < 1", min_level);
        }
        PartialTreeStore {
            lv,
            min_level,
            locks: DashMap::new(),
        }
    }

    pub fn with_config(lv: L, config: &Config) -> PartialTreeStore<L> {
        Self::new(lv, config.min_level())
    }

    /// Levels at or above `min_level() - 1` can be stored and read.
    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn lv(&self) -> &L {
        &self.lv
    }

    fn lock_key(&self, key: &HLKey) -> KeyGuard<'_> {
        let lock = self.locks.entry(*key).or_default().clone();
        KeyGuard {
            locks: &self.locks,
            key: *key,
            guard: Some(lock.lock_arc()),
        }
    }

    fn find_record(&self, key: &HLKey) -> io::Result<Option<Record>> {
        let layout = Layout::new(key, self.min_level);
        match self.lv.get(&key.hash, layout.blob_bytes())? {
            Some(blob) => {
                let blob: Arc<dyn Blob> = Arc::new(blob);
                Record::open(layout, blob).map(Some)
            }
            None => Ok(None),
        }
    }

    fn create_record(&self, key: &HLKey) -> io::Result<Record> {
        if let Some(record) = self.find_record(key)? {
            return Ok(record);
        }
        let layout = Layout::new(key, self.min_level);
        match self.lv.create(&key.hash, layout.blob_bytes())? {
            Some(blob) => {
                let blob: Arc<dyn Blob> = Arc::new(blob);
                Record::open(layout, blob)
            }
            // created by someone else in between
            None => self.find_record(key)?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("can't create tree record for {}", key),
                )
            }),
        }
    }

    /// Checks the shape of a request and returns the number of hashes and the rebased level.
    fn check_request(&self, key: &HLKey, layout: &Layout, len: usize, level: Level) -> (Nodes, Level) {
        if len == 0 || len % HASH_SIZE != 0 {
            panic!("buffer of {} bytes is not a whole number of hashes", len);
        }
        ((len / HASH_SIZE) as Nodes, self.rebase(key, layout, level))
    }

    fn rebase(&self, key: &HLKey, layout: &Layout, level: Level) -> Level {
        let rebased = level - (self.min_level - 1);
        if rebased < 0 {
            panic!(
                "can't request level {} below {}",
                level,
                self.min_level - 1
            );
        }
        if rebased > layout.top() {
            panic!("level {} is above the root of {}", level, key);
        }
        rebased
    }

    /// Full tree level of the highest persisted node of `key`. For content of at most
    /// `blob_size` bytes this is `min_level() - 1`, holding just the root.
    pub fn top_level(&self, key: &HLKey) -> Level {
        self.min_level - 1 + Layout::new(key, self.min_level).top()
    }

    /// Reads the hashes of nodes `off..` at `level` into `hs`.
    ///
    /// Fails with [`StoreError::Incomplete`] unless the whole persisted tree is known.
    ///
    /// # Panics
    /// If `hs` is not a non-empty multiple of 32 bytes, or the nodes are outside the tree
    pub fn get_inner_hashes(
        &self,
        key: &HLKey,
        hs: &mut [u8],
        level: Level,
        off: Nodes,
    ) -> Result<(), StoreError> {
        let layout = Layout::new(key, self.min_level);
        let (n, rebased) = self.check_request(key, &layout, hs.len(), level);
        let width = layout.width(rebased);
        if off.checked_add(n).map_or(true, |end| end > width) {
            panic!("offset out: {} + {} > {}", off, n, width);
        }

        let _guard = self.lock_key(key);
        let record = match self.find_record(key)? {
            Some(record) => record,
            None => {
                return Err(StoreError::Incomplete {
                    has: 0,
                    want: layout.tree_size,
                })
            }
        };
        if !record.bits.full() {
            return Err(StoreError::Incomplete {
                has: record.bits.count(),
                want: layout.tree_size,
            });
        }
        record
            .hashes
            .read_at(hs, hash_position(layout.file_blobs, rebased, off))?;
        Ok(())
    }

    /// Stores whatever part of the hashes of nodes `off..` at `level` can be verified.
    ///
    /// Chunks whose ancestor is unknown are skipped and chunks that fail verification are
    /// dropped; neither is an error. A range reaching past the end of the level stores
    /// nothing.
    ///
    /// # Panics
    /// If `hs` is not a non-empty multiple of 32 bytes, or `level` is outside the tree
    pub fn put_inner_hashes(
        &self,
        key: &HLKey,
        hs: &[u8],
        level: Level,
        off: Nodes,
    ) -> Result<PutOutcome, StoreError> {
        let layout = Layout::new(key, self.min_level);
        let (n, rebased) = self.check_request(key, &layout, hs.len(), level);

        let _guard = self.lock_key(key);
        let mut record = self.create_record(key)?;
        if record.bits.full() {
            return Ok(record.outcome());
        }

        let width = layout.width(rebased);
        let chunks = match split_hashes(hs, off, width) {
            Some(chunks) => chunks,
            None => {
                debug!(
                    "ignore {} hashes at level {} offset {} of {}, level width {}",
                    n, level, off, key, width
                );
                return Ok(record.outcome());
            }
        };

        let top = layout.top();
        for (start, chunk) in chunks {
            let k = (chunk.len() / HASH_SIZE) as Nodes;
            let height = levels(k) - 1;
            let (mut al, mut ai) = (rebased + height, start >> height);
            // lone last nodes are promoted unchanged, so their parent has the same hash
            let mut chain = Vec::new();
            while al < top && ai + 1 == layout.width(al) && ai % 2 == 0 {
                al += 1;
                ai /= 2;
                chain.push((al, ai));
            }

            let expected = if al == top {
                key.hash
            } else {
                let pos = layout.position(al, ai);
                if !record.bits.get(pos)? {
                    debug!(
                        "skip {} hashes at level {} offset {} of {}: ancestor {}:{} unknown",
                        k, level, start, key, al, ai
                    );
                    continue;
                }
                record.read_hash(pos)?
            };

            let mut tree = TreeDigest::no_pad();
            tree.update(chunk);
            let root = tree.finalize();
            if root != expected {
                debug!(
                    "drop {} hashes at level {} offset {} of {}: verification failed",
                    k, level, start, key
                );
                continue;
            }

            record.write_chunk(rebased, start, chunk)?;
            let root = H256::from(root);
            for (l, i) in chain {
                record.write_node(l, i, &root)?;
            }
        }
        record.sync()?;
        Ok(record.outcome())
    }

    /// Runs of unknown nodes at `level`, as `(offset, count)` with `count <= max_run`, in
    /// order. Everything is unknown for a key with nothing stored.
    ///
    /// # Panics
    /// If `max_run` is 0 or `level` is outside the tree
    pub fn missing(
        &self,
        key: &HLKey,
        level: Level,
        max_run: Nodes,
    ) -> Result<Vec<(Nodes, Nodes)>, StoreError> {
        let layout = Layout::new(key, self.min_level);
        let rebased = self.rebase(key, &layout, level);
        let bits = {
            let _guard = self.lock_key(key);
            match self.find_record(key)? {
                Some(mut record) => record.bits.export_bytes()?,
                None => vec![0u8; bytes_for_bits(layout.tree_size) as usize],
            }
        };
        let first = layout.position(rebased, 0);
        let mut scan = ZeroScan::range(&bits, first, first + layout.width(rebased));
        let mut runs = Vec::new();
        while let Some((start, len)) = scan.next_range(max_run) {
            runs.push((start - first, len));
        }
        Ok(runs)
    }

    pub fn file_state(&self, key: &HLKey) -> Result<FileState, StoreError> {
        let _guard = self.lock_key(key);
        Ok(match self.find_record(key)? {
            None => FileState::None,
            Some(record) if record.bits.full() => FileState::Complete,
            Some(_) => FileState::Part,
        })
    }

    /// Hashes local content and stores its complete persisted tree. Returns the content's key.
    ///
    /// The persisted nodes are kept in memory until the content is fully read: 32 bytes a
    /// node, about 64 bytes for every `blob_size` bytes of content.
    pub fn import_reader<R: Read>(&self, mut reader: R) -> Result<HLKey, StoreError> {
        let bottom = self.min_level - 1;
        // rows[l][i] is node i of persisted level l
        let mut rows: Vec<Vec<H256>> = Vec::new();
        let (root, length) = {
            let mut digest = FileDigest::new();
            digest.set_listener(
                |level: Level, index: Nodes, hash: &H256, _: Option<&H256>, _: Option<&H256>| {
                    if level < bottom {
                        return;
                    }
                    let l = (level - bottom) as usize;
                    if rows.len() <= l {
                        rows.resize(l + 1, Vec::new());
                    }
                    debug_assert_eq!(rows[l].len() as Nodes, index);
                    rows[l].push(*hash);
                },
            );
            let mut buf = vec![0u8; IMPORT_BUF_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => digest.update(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            let length = digest.len();
            (digest.finalize(), length)
        };
        let key = HLKey::new(root, length);
        if rows.is_empty() {
            // the whole tree is below the persisted levels, its root stands in for it
            rows.push(vec![H256::from(root)]);
        }

        let _guard = self.lock_key(&key);
        let mut record = self.create_record(&key)?;
        if !record.bits.full() {
            for (l, row) in rows.iter().enumerate() {
                for (i, hash) in row.iter().enumerate() {
                    record.write_node(l as Level, i as Nodes, hash)?;
                }
            }
            record.sync()?;
        }
        let outcome = record.outcome();
        if !outcome.complete {
            return Err(StoreError::Incomplete {
                has: outcome.has,
                want: record.layout.tree_size,
            });
        }
        info!("imported {}, {} persisted nodes", key, outcome.has);
        Ok(key)
    }

    /// Removes everything stored for `key`. Returns whether there was anything.
    pub fn remove(&self, key: &HLKey) -> Result<bool, StoreError> {
        let _guard = self.lock_key(key);
        let layout = Layout::new(key, self.min_level);
        Ok(self.lv.delete(&key.hash, layout.blob_bytes())?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use blobfile::MemLv;
    use sha2::Digest;
    use std::io::Cursor;

    pub(crate) fn content(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ ((i >> 8) as u8))
            .collect()
    }

    /// Root and every node of the full tree of `data`, per level.
    pub(crate) fn full_tree(data: &[u8]) -> (Hash32, Vec<Vec<Hash32>>) {
        let mut tree: Vec<Vec<Hash32>> = Vec::new();
        let root = {
            let mut d = FileDigest::new();
            d.set_listener(
                |level: Level, index: Nodes, hash: &H256, _: Option<&H256>, _: Option<&H256>| {
                    let l = level as usize;
                    if tree.len() <= l {
                        tree.resize(l + 1, Vec::new());
                    }
                    assert_eq!(tree[l].len() as u64, index);
                    tree[l].push(hash.to_bytes());
                },
            );
            d.update(data);
            d.finalize()
        };
        (root, tree)
    }

    fn small_store() -> PartialTreeStore<MemLv> {
        PartialTreeStore::with_config(MemLv::new(), &Config::new("mem", 1024))
    }

    fn expect_incomplete(r: Result<(), StoreError>, has: Nodes, want: Nodes) {
        match r {
            Err(StoreError::Incomplete { has: h, want: w }) => {
                assert_eq!((h, w), (has, want));
            }
            other => panic!("expected incomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_put_top_down() {
        let store = small_store();
        let data = content(2050, 1);
        let (root, tree) = full_tree(&data);
        let key = HLKey::new(root, 2050);
        assert_eq!(tree[0].len(), 3);
        assert_eq!(tree[2], vec![root]);

        let mut out = vec![0u8; 96];
        expect_incomplete(store.get_inner_hashes(&key, &mut out, 0, 0), 0, 6);
        assert_eq!(store.file_state(&key).unwrap(), FileState::None);

        // both level 1 nodes, the lone third leaf comes for free
        let r = store.put_inner_hashes(&key, &tree[1].concat(), 1, 0).unwrap();
        assert_eq!(r, PutOutcome { has: 4, complete: false });
        assert_eq!(store.file_state(&key).unwrap(), FileState::Part);
        expect_incomplete(store.get_inner_hashes(&key, &mut out, 0, 0), 4, 6);

        let r = store
            .put_inner_hashes(&key, &tree[0][..2].concat(), 0, 0)
            .unwrap();
        assert_eq!(r, PutOutcome { has: 6, complete: true });
        assert_eq!(store.file_state(&key).unwrap(), FileState::Complete);

        store.get_inner_hashes(&key, &mut out, 0, 0).unwrap();
        assert_eq!(out, tree[0].concat());
        let mut one = [0u8; 32];
        store.get_inner_hashes(&key, &mut one, 2, 0).unwrap();
        assert_eq!(one, root);
        store.get_inner_hashes(&key, &mut one, 1, 1).unwrap();
        assert_eq!(one, tree[0][2]);

        // complete: a no-op, even with garbage
        let r = store.put_inner_hashes(&key, &[0u8; 64], 0, 0).unwrap();
        assert_eq!(r, PutOutcome { has: 6, complete: true });
    }

    #[test]
    fn test_root_first() {
        let store = small_store();
        let data = content(2050, 2);
        let (root, tree) = full_tree(&data);
        let key = HLKey::new(root, 2050);

        let r = store.put_inner_hashes(&key, &root, 2, 0).unwrap();
        assert_eq!(r.has, 1);
        let r = store.put_inner_hashes(&key, &tree[0].concat(), 0, 0).unwrap();
        assert_eq!(r, PutOutcome { has: 6, complete: true });
    }

    #[test]
    fn test_unknown_ancestor_skipped() {
        let store = small_store();
        let data = content(2050, 3);
        let (root, tree) = full_tree(&data);
        let key = HLKey::new(root, 2050);

        let r = store
            .put_inner_hashes(&key, &tree[0][..2].concat(), 0, 0)
            .unwrap();
        assert_eq!(r.has, 0);
        let r = store.put_inner_hashes(&key, &tree[0][2], 0, 2).unwrap();
        assert_eq!(r.has, 0);

        // the lone leaf checks against its promoted parent once that is known
        store.put_inner_hashes(&key, &tree[1].concat(), 1, 0).unwrap();
        let r = store.put_inner_hashes(&key, &tree[0][2], 0, 2).unwrap();
        assert_eq!(r.has, 4);
        let r = store
            .put_inner_hashes(&key, &tree[0][..2].concat(), 0, 0)
            .unwrap();
        assert!(r.complete);
    }

    #[test]
    fn test_wrong_root_rejected() {
        let store = small_store();
        let data = content(2050, 4);
        let (root, tree) = full_tree(&data);
        let key = HLKey::new(root, 2050);

        let mut bad = tree[1].clone();
        bad[1][31] ^= 0x80;
        let r = store.put_inner_hashes(&key, &bad.concat(), 1, 0).unwrap();
        assert_eq!(r.has, 0);
        let r = store.put_inner_hashes(&key, &[7u8; 32], 2, 0).unwrap();
        assert_eq!(r.has, 0);
    }

    #[test]
    fn test_tampered_chunk_dropped() {
        let store = small_store();
        let data = content(10 * 1024, 5);
        let (root, tree) = full_tree(&data);
        let key = HLKey::new(root, data.len() as u64);
        let widths: Vec<usize> = tree.iter().map(|l| l.len()).collect();
        assert_eq!(widths, vec![10, 5, 3, 2, 1]);

        let r = store.put_inner_hashes(&key, &tree[1].concat(), 1, 0).unwrap();
        assert_eq!(r, PutOutcome { has: 11, complete: false });

        // chunks [2,3], [4,7] and [8,9]; node 5 is tampered
        let mut mixed = tree[0][2..10].to_vec();
        mixed[3][0] ^= 1;
        let r = store.put_inner_hashes(&key, &mixed.concat(), 0, 2).unwrap();
        assert_eq!(r.has, 15);
        let mut out = [0u8; 32];
        expect_incomplete(store.get_inner_hashes(&key, &mut out, 0, 5), 15, 21);

        let r = store
            .put_inner_hashes(&key, &tree[0][4..8].concat(), 0, 4)
            .unwrap();
        assert_eq!(r.has, 19);
        let r = store
            .put_inner_hashes(&key, &tree[0][..2].concat(), 0, 0)
            .unwrap();
        assert_eq!(r, PutOutcome { has: 21, complete: true });

        let mut all = vec![0u8; 10 * 32];
        store.get_inner_hashes(&key, &mut all, 0, 0).unwrap();
        assert_eq!(all, tree[0].concat());
    }

    #[test]
    fn test_range_past_level_end_ignored() {
        let store = small_store();
        let data = content(2050, 6);
        let (root, tree) = full_tree(&data);
        let key = HLKey::new(root, 2050);
        store.put_inner_hashes(&key, &root, 2, 0).unwrap();
        let r = store
            .put_inner_hashes(&key, &tree[0][1..].concat(), 0, 2)
            .unwrap();
        assert_eq!(r.has, 1);
    }

    #[test]
    fn test_import_and_copy() {
        let source = small_store();
        let data = content(5000, 7);
        let key = source.import_reader(Cursor::new(&data)).unwrap();
        let (root, tree) = full_tree(&data);
        assert_eq!(key, HLKey::new(root, 5000));
        assert_eq!(source.file_state(&key).unwrap(), FileState::Complete);
        // importing twice changes nothing
        assert_eq!(source.import_reader(Cursor::new(&data)).unwrap(), key);

        let target = small_store();
        for level in (0..tree.len()).rev() {
            let mut hs = vec![0u8; tree[level].len() * 32];
            source
                .get_inner_hashes(&key, &mut hs, level as Level, 0)
                .unwrap();
            assert_eq!(hs, tree[level].concat());
            target
                .put_inner_hashes(&key, &hs, level as Level, 0)
                .unwrap();
        }
        assert_eq!(target.file_state(&key).unwrap(), FileState::Complete);
    }

    #[test]
    fn test_import_empty() {
        let store = small_store();
        let key = store.import_reader(io::empty()).unwrap();
        let expected: Hash32 = sha2::Sha256::digest(b"").into();
        assert_eq!(key, HLKey::new(expected, 0));
        let mut out = [0u8; 32];
        store.get_inner_hashes(&key, &mut out, 0, 0).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_import_below_persisted_levels() {
        let store = PartialTreeStore::with_config(MemLv::new(), &Config::default());
        let data = content(2050, 9);
        let key = store.import_reader(Cursor::new(&data)).unwrap();
        let (root, tree) = full_tree(&data);
        assert_eq!(tree.len(), 3);
        assert_eq!(key, HLKey::new(root, 2050));
        assert_eq!(store.top_level(&key), 12);
        assert_eq!(store.file_state(&key).unwrap(), FileState::Complete);

        let mut out = [0u8; 32];
        store.get_inner_hashes(&key, &mut out, 12, 0).unwrap();
        assert_eq!(out, root);
    }

    #[test]
    fn test_top_level() {
        let store = small_store();
        assert_eq!(store.top_level(&HLKey::new([0u8; 32], 10 * 1024)), 4);
        assert_eq!(store.top_level(&HLKey::new([0u8; 32], 1024)), 0);
        let store = PartialTreeStore::with_config(MemLv::new(), &Config::default());
        assert_eq!(store.top_level(&HLKey::new([0u8; 32], 8 << 20)), 13);
        assert_eq!(store.top_level(&HLKey::new([0u8; 32], 2050)), 12);
    }

    #[test]
    fn test_missing_runs() {
        let store = small_store();
        let data = content(10 * 1024, 10);
        let (root, tree) = full_tree(&data);
        let key = HLKey::new(root, data.len() as u64);
        assert_eq!(store.missing(&key, 0, 64).unwrap(), vec![(0, 10)]);
        assert_eq!(store.missing(&key, 4, 64).unwrap(), vec![(0, 1)]);

        store.put_inner_hashes(&key, &tree[1].concat(), 1, 0).unwrap();
        store
            .put_inner_hashes(&key, &tree[0][2..4].concat(), 0, 2)
            .unwrap();
        store
            .put_inner_hashes(&key, &tree[0][8..].concat(), 0, 8)
            .unwrap();
        assert_eq!(store.missing(&key, 1, 64).unwrap(), vec![]);
        assert_eq!(store.missing(&key, 0, 64).unwrap(), vec![(0, 2), (4, 4)]);
        assert_eq!(
            store.missing(&key, 0, 3).unwrap(),
            vec![(0, 2), (4, 3), (7, 1)]
        );

        // ask for what is missing, fill it in
        for (off, n) in store.missing(&key, 0, 64).unwrap() {
            let (a, b) = (off as usize, (off + n) as usize);
            store
                .put_inner_hashes(&key, &tree[0][a..b].concat(), 0, off)
                .unwrap();
        }
        assert!(store.missing(&key, 0, 64).unwrap().is_empty());
        assert_eq!(store.file_state(&key).unwrap(), FileState::Complete);
    }

    #[test]
    fn test_lock_table_drained() {
        let store = small_store();
        let key = store.import_reader(Cursor::new(content(3000, 11))).unwrap();
        let mut out = [0u8; 32];
        store.get_inner_hashes(&key, &mut out, 0, 0).unwrap();
        store.put_inner_hashes(&key, &out, 0, 0).unwrap();
        store.file_state(&key).unwrap();
        store.missing(&key, 0, 4).unwrap();
        assert!(store.locks.is_empty());

        // a held lock stays in the table until its last holder is done
        let first = store.lock_key(&key);
        assert_eq!(store.locks.len(), 1);
        std::thread::scope(|s| {
            let waiter = s.spawn(|| store.file_state(&key).unwrap());
            while store.locks.get(&key).map_or(0, |l| Arc::strong_count(l.value())) < 3 {
                std::thread::yield_now();
            }
            drop(first);
            assert_eq!(waiter.join().unwrap(), FileState::Complete);
        });
        assert!(store.locks.is_empty());
        assert!(store.remove(&key).unwrap());
        assert!(store.locks.is_empty());
    }

    #[test]
    fn test_remove() {
        let store = small_store();
        let key = store.import_reader(Cursor::new(content(3000, 8))).unwrap();
        assert!(store.remove(&key).unwrap());
        assert_eq!(store.file_state(&key).unwrap(), FileState::None);
        assert!(!store.remove(&key).unwrap());
        assert!(store.lv().is_empty());
    }

    #[test]
    fn test_parallel_keys() {
        let store = small_store();
        std::thread::scope(|s| {
            for t in 0..4u8 {
                let store = &store;
                s.spawn(move || {
                    let data = content(3000 + t as usize * 1024, t);
                    let (root, tree) = full_tree(&data);
                    let key = HLKey::new(root, data.len() as u64);
                    for level in (0..tree.len()).rev() {
                        store
                            .put_inner_hashes(&key, &tree[level].concat(), level as Level, 0)
                            .unwrap();
                    }
                    assert_eq!(store.file_state(&key).unwrap(), FileState::Complete);
                });
            }
        });
        assert_eq!(store.lv().len(), 4);
        assert!(store.locks.is_empty());
    }

    #[test]
    #[should_panic(expected = "below")]
    fn test_level_below_min() {
        let store = PartialTreeStore::with_config(MemLv::new(), &Config::default());
        let key = HLKey::new([0u8; 32], 2050);
        let mut out = [0u8; 32];
        let _ = store.get_inner_hashes(&key, &mut out, 0, 0);
    }

    #[test]
    #[should_panic(expected = "whole number of hashes")]
    fn test_misaligned_buffer() {
        let store = small_store();
        let key = HLKey::new([0u8; 32], 2050);
        let _ = store.put_inner_hashes(&key, &[0u8; 31], 0, 0);
    }

    #[test]
    #[should_panic(expected = "offset out")]
    fn test_offset_out_of_range() {
        let store = small_store();
        let key = HLKey::new([0u8; 32], 2050);
        let mut out = [0u8; 64];
        let _ = store.get_inner_hashes(&key, &mut out, 0, 2);
    }

    #[test]
    #[should_panic(expected = "above the root")]
    fn test_level_above_root() {
        let store = small_store();
        let key = HLKey::new([0u8; 32], 2050);
        let _ = store.put_inner_hashes(&key, &[0u8; 32], 3, 0);
    }
}
