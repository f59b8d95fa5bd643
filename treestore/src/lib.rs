//! Streaming Merkle hash trees and a store for partially known trees.
//!
//! # Overview
//! A file is hashed by splitting it into 1024-byte blocks, hashing each block with SHA-256
//! and combining the leaf hashes pairwise up to a single root. Inner nodes use the SHA-256
//! block compression function started from the SHA-224 initial values, so an inner hash can
//! never be confused with a leaf. A lone last node of a level is promoted to the next level
//! unchanged.
//!
//! The root and the length together form an [`HLKey`]. Given a key, a peer can check any
//! range of inner hashes it receives against hashes it already trusts.
//!
//! # Components
//! - [`hashtree`]: tree shape arithmetic, [`TreeDigest`] and [`FileDigest`]
//! - [`store`]: [`PartialTreeStore`], which keeps the upper levels of many trees, accepts
//!   only hashes that verify, and reports how much of each tree is known
//! - [`utils`]: blob-backed bitmaps, including the crash-safe counting bitmap
//! - [`config`]: where the store lives and which levels it keeps
//!
//! # Example
//! ```no_run
//! use treestore::{Config, FileState, PartialTreeStore};
//!
//! let store = PartialTreeStore::open(&Config::from_dir("/tmp/trees")).unwrap();
//! let key = store
//!     .import_reader(std::fs::File::open("/tmp/movie.mkv").unwrap())
//!     .unwrap();
//! assert_eq!(store.file_state(&key).unwrap(), FileState::Complete);
//!
//! // the root is the only node of the highest persisted level
//! let top = store.top_level(&key);
//! let mut root = [0u8; 32];
//! store.get_inner_hashes(&key, &mut root, top, 0).unwrap();
//! assert_eq!(root, key.hash);
//! ```

pub mod config;
pub mod def;
pub mod hashtree;
pub mod store;
pub mod utils;

pub use config::Config;
pub use hashtree::{FileDigest, TreeDigest, H256};
pub use store::{FileState, HLKey, PartialTreeStore, PutOutcome, StoreError};
