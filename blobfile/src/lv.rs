//! Keyed blob allocation.
//!
//! An `Lv` hands out fixed-size blobs named by `(key, size)`. `create` only succeeds for a
//! fresh name, so the caller that gets `Some` is the one that must initialize the content.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use log::warn;

use crate::{Blob, FileBlob, MemBlob};

// bytes of the key used for the two directory levels
const FOLDER_KEY_SIZE: usize = 2;

pub trait Lv: Send + Sync {
    type Blob: Blob + 'static;

    /// Allocates a new zero-filled blob. Returns `Ok(None)` if the blob already exists.
    fn create(&self, key: &[u8], size: u64) -> io::Result<Option<Self::Blob>>;

    /// Opens an existing blob. Returns `Ok(None)` if there is none.
    fn get(&self, key: &[u8], size: u64) -> io::Result<Option<Self::Blob>>;

    /// Removes a blob. Returns whether it existed.
    fn delete(&self, key: &[u8], size: u64) -> io::Result<bool>;
}

/// One file per blob under a root directory, fanned out by the first two key bytes.
#[derive(Debug, Clone)]
pub struct FolderLv {
    root: PathBuf,
}

impl FolderLv {
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<FolderLv> {
        let root = dir.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(FolderLv { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &[u8], size: u64) -> (PathBuf, PathBuf) {
        let mut ks = [0u8; FOLDER_KEY_SIZE];
        if key.len() >= FOLDER_KEY_SIZE {
            ks.copy_from_slice(&key[..FOLDER_KEY_SIZE]);
        }
        let folder = self
            .root
            .join(format!("{:x}", ks[0]))
            .join(format!("{:x}", ks[1]));
        let file = folder.join(format!("{:x}-{}", size, hex::encode(key)));
        (folder, file)
    }

    fn open_existing(&self, file: &Path, size: u64) -> io::Result<Option<FileBlob>> {
        let opened = match fs::OpenOptions::new().read(true).write(true).open(file) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let disk_size = opened.metadata()?.len();
        if disk_size == 0 {
            return Ok(None);
        }
        if disk_size != size {
            return Err(wrong_size(file, disk_size, size));
        }
        Ok(Some(FileBlob::new(opened, size)))
    }
}

fn wrong_size(file: &Path, disk_size: u64, size: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}: size {} != {}", file.display(), disk_size, size),
    )
}

impl Lv for FolderLv {
    type Blob = FileBlob;

    fn create(&self, key: &[u8], size: u64) -> io::Result<Option<FileBlob>> {
        let (folder, file) = self.blob_path(key, size);
        fs::create_dir_all(&folder)?;
        match fs::metadata(&file) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                FileBlob::open(&file, size).map(Some)
            }
            Err(e) => Err(e),
            Ok(meta) if meta.len() == 0 => {
                // crashed between create and set_len last time
                warn!("repairing empty blob file {}", file.display());
                FileBlob::open(&file, size).map(Some)
            }
            Ok(meta) if meta.len() == size => Ok(None),
            Ok(meta) => Err(wrong_size(&file, meta.len(), size)),
        }
    }

    fn get(&self, key: &[u8], size: u64) -> io::Result<Option<FileBlob>> {
        let (_, file) = self.blob_path(key, size);
        self.open_existing(&file, size)
    }

    fn delete(&self, key: &[u8], size: u64) -> io::Result<bool> {
        let (_, file) = self.blob_path(key, size);
        match fs::remove_file(&file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// In-memory `Lv`, for tests.
#[derive(Debug, Default)]
pub struct MemLv {
    blobs: DashMap<(Vec<u8>, u64), Arc<MemBlob>>,
}

impl MemLv {
    pub fn new() -> MemLv {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Lv for MemLv {
    type Blob = Arc<MemBlob>;

    fn create(&self, key: &[u8], size: u64) -> io::Result<Option<Arc<MemBlob>>> {
        match self.blobs.entry((key.to_vec(), size)) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(None),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let blob = Arc::new(MemBlob::new(size));
                v.insert(blob.clone());
                Ok(Some(blob))
            }
        }
    }

    fn get(&self, key: &[u8], size: u64) -> io::Result<Option<Arc<MemBlob>>> {
        Ok(self.blobs.get(&(key.to_vec(), size)).map(|b| b.clone()))
    }

    fn delete(&self, key: &[u8], size: u64) -> io::Result<bool> {
        Ok(self.blobs.remove(&(key.to_vec(), size)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_lv<L: Lv>(lv: &L) {
        let blob = lv.create(&[1], 8).unwrap().unwrap();
        blob.write_at(&[3, 4, 5], 4).unwrap();
        blob.sync().unwrap();
        drop(blob);
        assert!(lv.create(&[1], 8).unwrap().is_none());

        let blob = lv.get(&[1], 8).unwrap().unwrap();
        let mut out = [0u8; 8];
        blob.read_at(&mut out, 0).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 3, 4, 5, 0]);
        drop(blob);

        // same key, other size: a different blob
        assert!(lv.get(&[1], 16).unwrap().is_none());

        assert!(lv.delete(&[1], 8).unwrap());
        assert!(!lv.delete(&[1], 8).unwrap());
        assert!(lv.get(&[1], 8).unwrap().is_none());
    }

    #[test]
    fn test_folder_lv() {
        let temp_dir = tempfile::Builder::new()
            .prefix("folder_lv")
            .tempdir()
            .unwrap();
        let lv = FolderLv::open(temp_dir.path()).unwrap();
        check_lv(&lv);
    }

    #[test]
    fn test_mem_lv() {
        let lv = MemLv::new();
        check_lv(&lv);
        assert!(lv.is_empty());
    }

    #[test]
    fn test_folder_lv_layout_and_repair() {
        let temp_dir = tempfile::Builder::new()
            .prefix("folder_lv_layout")
            .tempdir()
            .unwrap();
        let lv = FolderLv::open(temp_dir.path()).unwrap();
        let key = [0xab, 0x0c, 0x01];
        let (_, file) = lv.blob_path(&key, 0x20);
        assert_eq!(file, temp_dir.path().join("ab").join("c").join("20-ab0c01"));

        // leftover of an interrupted create
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();
        assert!(lv.get(&key, 0x20).unwrap().is_none());
        let blob = lv.create(&key, 0x20).unwrap().unwrap();
        assert_eq!(blob.size(), 0x20);
        assert_eq!(fs::metadata(&file).unwrap().len(), 0x20);

        fs::write(&file, [1u8; 5]).unwrap();
        let err = lv.get(&key, 0x20).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(lv.create(&key, 0x20).is_err());
    }
}
