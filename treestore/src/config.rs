//! Configuration of a partial tree store.
//!
//! - `dir`: data directory; persisted trees live in its `m_hash` subdirectory
//! - `blob_size`: size of the coarse content blocks (default: 4MB). Subtrees below one
//!   block are cheap to rebuild from the block's content and are not persisted, so the
//!   lowest persisted level is the one whose nodes each cover a whole block.
//!
//! # Usage
//! ```no_run
//! use treestore::config::Config;
//!
//! // 4MB blocks, persisted from level 12 up
//! let config = Config::from_dir("/path/to/store");
//! assert_eq!(config.min_level(), 13);
//!
//! // one persisted level per 1KB leaf block
//! let config = Config::new("/path/to/store", 1024);
//! assert_eq!(config.min_level(), 1);
//! ```

use crate::def::{BLOB_SIZE, LEAF_BLOCK_SIZE};
use crate::hashtree::structure::{levels, Level};

#[derive(Debug, Clone)]
pub struct Config {
    pub dir: String,
    /// Bytes of content under one node of the lowest persisted level.
    pub blob_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dir: "default".to_string(),
            blob_size: BLOB_SIZE,
        }
    }
}

impl Config {
    /// # Panics
    /// If `blob_size` is not a power-of-two multiple of the 1KB leaf block
    pub fn new(dir: &str, blob_size: u64) -> Self {
        if blob_size < LEAF_BLOCK_SIZE
            || blob_size % LEAF_BLOCK_SIZE != 0
            || !(blob_size / LEAF_BLOCK_SIZE).is_power_of_two()
        {
            panic!(
                "blob size {} is not a power-of-two multiple of {}",
                blob_size, LEAF_BLOCK_SIZE
            );
        }
        Config {
            dir: dir.to_string(),
            blob_size,
        }
    }

    pub fn from_dir(dir: &str) -> Self {
        Config {
            dir: dir.to_string(),
            ..Config::default()
        }
    }

    /// One above the lowest persisted level of the full tree. Level `min_level() - 1`
    /// is stored as the bottom row of a persisted tree.
    pub fn min_level(&self) -> Level {
        levels(self.blob_size / LEAF_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_level() {
        assert_eq!(Config::default().min_level(), 13);
        assert_eq!(Config::new("x", 1024).min_level(), 1);
        assert_eq!(Config::new("x", 2048).min_level(), 2);
        assert_eq!(Config::from_dir("x").blob_size, BLOB_SIZE);
    }

    #[test]
    #[should_panic(expected = "power-of-two")]
    fn test_bad_blob_size() {
        Config::new("x", 3000);
    }
}
