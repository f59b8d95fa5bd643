//! # Fixed-size byte ranges
//!
//! A `Blob` is a random-access byte range whose size is fixed when it is created. It is
//! the storage unit under a partially known hash tree: one blob holds a packed array of
//! node hashes, the completion bitmap over those nodes and the bitmap's popcount.
//!
//! Every transfer is exact. `read_at` fills the whole buffer and `write_at` writes the whole
//! buffer, or they fail. A request that reaches past `size()` fails with
//! `io::ErrorKind::InvalidInput` before touching the backing storage, and a short transfer
//! fails with `io::ErrorKind::UnexpectedEof`.
//!
//! Writes may reach stable storage in any order. Only `sync` makes them durable, so callers
//! that need ordering (write data, then mark it valid) must `sync` between the steps.
//!
//! A blob is released by dropping it. All methods take `&self`, so one backing blob can be
//! shared by several `SubBlob`s that address disjoint ranges of it (see `split_blob`).
//!
//! Keyed allocation of blobs lives in [`lv`]: a blob is identified by a raw key plus its
//! size, and the same key with two sizes names two different blobs.

pub mod lv;
pub mod mem;
pub mod sub;

pub use lv::{FolderLv, Lv, MemLv};
pub use mem::MemBlob;
pub use sub::{split_blob, BufferedBlob, SubBlob};

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
};

#[cfg(not(unix))]
use parking_lot::Mutex;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// A fixed-size random-access byte range.
pub trait Blob: Send + Sync {
    /// Length in bytes of this blob.
    fn size(&self) -> u64;

    /// Reads exactly `buf.len()` bytes starting at byte `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Writes all of `buf` starting at byte `offset`. The write may or may not reach
    /// stable storage before the next `sync`.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Commits all previous writes to stable storage.
    fn sync(&self) -> io::Result<()>;
}

impl<T: Blob + ?Sized> Blob for Arc<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_at(buf, offset)
    }

    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }
}

impl<T: Blob + ?Sized> Blob for Box<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        (**self).write_at(buf, offset)
    }

    fn sync(&self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Fails with `InvalidInput` unless `[offset, offset + len)` lies inside a blob of `size` bytes.
pub fn check_range(len: usize, offset: u64, size: u64) -> io::Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("out of range: {} + {} > {}", offset, len, size),
        )),
    }
}

/// A blob backed by an OS file of a declared size.
#[derive(Debug)]
pub struct FileBlob {
    file: File,
    size: u64,
    // set by write_at, cleared by sync; a sync without writes is skipped
    dirty: AtomicBool,
    // guards seek + transfer where there is no positioned I/O
    #[cfg(not(unix))]
    cursor: Mutex<()>,
}

impl FileBlob {
    /// Wraps an opened file. The file must be readable and writable and at least `size`
    /// bytes long for reads near the end to succeed.
    pub fn new(file: File, size: u64) -> FileBlob {
        FileBlob {
            file,
            size,
            dirty: AtomicBool::new(false),
            #[cfg(not(unix))]
            cursor: Mutex::new(()),
        }
    }

    /// Opens (or creates) the file at `path` and resizes it to exactly `size` bytes.
    /// Bytes beyond the old end of file read as zero.
    pub fn open<P: AsRef<Path>>(path: P, size: u64) -> io::Result<FileBlob> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() != size {
            file.set_len(size)?;
        }
        Ok(Self::new(file, size))
    }

    /// Returns the underlying file.
    pub fn file(&self) -> &File {
        &self.file
    }

    #[cfg(unix)]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(unix)]
    fn pwrite(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.file.write_all_at(buf, offset)
    }

    #[cfg(not(unix))]
    fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let _cursor = self.cursor.lock();
        seek_read_exact(&self.file, buf, offset)
    }

    #[cfg(not(unix))]
    fn pwrite(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        let _cursor = self.cursor.lock();
        seek_write_all(&self.file, buf, offset)
    }
}

/// Reads `buf.len()` bytes at `offset` by moving the file cursor.
#[cfg_attr(unix, allow(dead_code))]
fn seek_read_exact(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

/// Writes all of `buf` at `offset` by moving the file cursor.
#[cfg_attr(unix, allow(dead_code))]
fn seek_write_all(mut file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)
}

impl Blob for FileBlob {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        check_range(buf.len(), offset, self.size)?;
        self.pread(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        check_range(buf.len(), offset, self.size)?;
        self.pwrite(buf, offset)?;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.file.sync_all() {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }
}
