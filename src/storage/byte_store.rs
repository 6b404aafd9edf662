//! # Memory-Mapped Byte Store
//!
//! `ByteStore` owns a single on-disk file mapped into memory, plus (in write
//! mode) an in-memory append buffer that virtually extends the file past its
//! on-disk end. It is the byte-granular base of every higher-level store.
//!
//! ## Logical Address Space
//!
//! ```text
//!         on disk (mmap)              in memory (aligned buffer)
//! ┌────────────────────────────┬─────────────────────────┐
//! │ 0 ..                       │ disk_size() ..          │
//! └────────────────────────────┴─────────────────────────┘
//!                              ▲                         ▲
//!                        disk_size()                  size()
//! ```
//!
//! `size()` is always `disk_size() + buffered bytes`. Reads resolve into
//! whichever region holds the requested range; a range is never allowed to
//! straddle the boundary, because appends are whole-record operations and the
//! file only ever grows by entire buffer contents, so no committed record can
//! span it.
//!
//! ## Deferred Writes
//!
//! Growing a mapped file means an `ftruncate` plus a full remap, which is far
//! too expensive to pay per record. Appends therefore accumulate in the
//! buffer; once it exceeds the configured threshold the store flushes: the
//! file is extended by the buffer's length, the buffer is copied into the
//! newly mapped tail, synced, and cleared. `append` reports whether it
//! triggered such a flush so callers can account for handle invalidation.
//!
//! ## Write Cursor
//!
//! The cursor starts at the end of the file and advances with every append.
//! `seek` may move it anywhere in `[0, size()]`; appending below `size()`
//! overwrites in place (first in the mapping, then in the buffer) before any
//! bytes extend the store. This supports rewriting a truncated tail during
//! chain reorganizations without rewriting the whole file.
//!
//! ## Crash Behavior
//!
//! Losing the process loses the buffer; the file is left at its last flushed
//! size. An interrupted flush can leave a partially extended file, which the
//! typed stores above tolerate by ignoring trailing bytes that do not
//! complete a record.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::{Mmap, MmapMut};

use super::buffer::AlignedBuf;
use super::{dat_path, Offset, DEFAULT_MAX_BUFFER_BYTES, INVALID_OFFSET};

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::ReadOnly {}
    impl Sealed for super::ReadWrite {}
    impl Sealed for memmap2::Mmap {}
    impl Sealed for memmap2::MmapMut {}
}

/// A mapped region readable as a byte slice.
pub trait MapRegion: sealed::Sealed {
    fn as_slice(&self) -> &[u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

impl MapRegion for Mmap {
    fn as_slice(&self) -> &[u8] {
        self
    }
}

impl MapRegion for MmapMut {
    fn as_slice(&self) -> &[u8] {
        self
    }
}

/// Compile-time access mode of a store; see [`ReadOnly`] and [`ReadWrite`].
pub trait AccessMode: sealed::Sealed + Sized + 'static {
    type Map: MapRegion;

    /// Invoked from `Drop`; writers flush their buffer here.
    fn teardown(store: &mut ByteStore<Self>) -> Result<()>;
}

/// Marker for stores that only read the on-disk state.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnly;

/// Marker for the (single) writer of a file set.
#[derive(Debug, Clone, Copy)]
pub struct ReadWrite;

impl AccessMode for ReadOnly {
    type Map = Mmap;

    fn teardown(_store: &mut ByteStore<Self>) -> Result<()> {
        Ok(())
    }
}

impl AccessMode for ReadWrite {
    type Map = MmapMut;

    fn teardown(store: &mut ByteStore<Self>) -> Result<()> {
        store.flush()
    }
}

pub struct ByteStore<M: AccessMode = ReadOnly> {
    path: PathBuf,
    file: Option<File>,
    map: Option<M::Map>,
    buf: AlignedBuf,
    write_pos: Offset,
    max_buffer: usize,
}

impl<M: AccessMode> ByteStore<M> {
    /// The backing `.dat` file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical size: bytes on disk plus buffered bytes.
    pub fn size(&self) -> Offset {
        (self.map_len() + self.buf.len()) as Offset
    }

    /// Bytes currently on disk, excluding the append buffer.
    pub fn disk_size(&self) -> Offset {
        self.map_len() as Offset
    }

    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    /// Borrows `len` bytes starting at `offset`.
    ///
    /// The range must lie within `[0, size())` and entirely inside either the
    /// mapping or the buffer; committed records never straddle the boundary.
    pub fn slice_at(&self, offset: Offset, len: usize) -> Result<&[u8]> {
        let size = self.size();
        let end = offset + len as Offset;
        ensure!(
            offset >= 0 && end <= size,
            "byte range {}..{} out of bounds (size {}) in {:?}",
            offset,
            end,
            size,
            self.path
        );
        let disk = self.disk_size();
        if offset < disk {
            ensure!(
                end <= disk,
                "byte range {}..{} straddles the unflushed tail at {} in {:?}",
                offset,
                end,
                disk,
                self.path
            );
            let map = self
                .map
                .as_ref()
                .ok_or_else(|| eyre::eyre!("no mapping for {:?}", self.path))?;
            Ok(&map.as_slice()[offset as usize..end as usize])
        } else {
            let pos = (offset - disk) as usize;
            Ok(&self.buf.as_slice()[pos..pos + len])
        }
    }

    /// Like [`slice_at`](Self::slice_at), but resolves the `INVALID_OFFSET`
    /// sentinel to `None`.
    pub fn bytes_at(&self, offset: Offset, len: usize) -> Result<Option<&[u8]>> {
        if offset == INVALID_OFFSET {
            return Ok(None);
        }
        self.slice_at(offset, len).map(Some)
    }

    /// Advises the kernel that the given mapped range will be read soon.
    pub fn prefetch(&self, offset: Offset, len: usize) {
        #[cfg(unix)]
        if let Some(map) = &self.map {
            let map_len = map.len();
            if offset < 0 || offset as usize >= map_len {
                return;
            }
            let start = offset as usize;
            let amount = len.min(map_len - start);
            // SAFETY: madvise is a hint and cannot invalidate memory. The
            // range is in bounds because:
            // 1. start < map_len was checked above.
            // 2. amount is clamped so start + amount <= map_len.
            unsafe {
                libc::madvise(
                    map.as_slice().as_ptr().add(start) as *mut libc::c_void,
                    amount,
                    libc::MADV_WILLNEED,
                );
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (offset, len);
        }
    }

    fn map_len(&self) -> usize {
        self.map.as_ref().map_or(0, |map| map.len())
    }
}

impl ByteStore<ReadOnly> {
    /// Opens a read-only view of `P.dat`. A missing or empty file yields a
    /// store of size zero; `reload` picks the file up once it appears.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = dat_path(path.as_ref());
        let map = match File::open(&path) {
            Ok(file) => map_readable(&file, &path)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("failed to open {:?}", path));
            }
        };
        Ok(Self {
            path,
            file: None,
            map,
            buf: AlignedBuf::new(),
            write_pos: 0,
            max_buffer: DEFAULT_MAX_BUFFER_BYTES,
        })
    }

    /// Re-syncs to the current on-disk state. Remaps only when the file's
    /// size changed or the file (dis)appeared; otherwise a no-op.
    pub fn reload(&mut self) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                if meta.len() != self.map_len() as u64 {
                    let file = File::open(&self.path)
                        .wrap_err_with(|| format!("failed to reopen {:?}", self.path))?;
                    self.map = map_readable(&file, &self.path)?;
                }
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.map = None;
                Ok(())
            }
            Err(err) => Err(err).wrap_err_with(|| format!("failed to stat {:?}", self.path)),
        }
    }
}

impl ByteStore<ReadWrite> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_max_buffer(path, DEFAULT_MAX_BUFFER_BYTES)
    }

    /// Opens (creating if necessary) `P.dat` for writing, with a custom
    /// buffer-flush threshold. The write cursor starts at the end of the
    /// file.
    pub fn with_max_buffer<P: AsRef<Path>>(path: P, max_buffer: usize) -> Result<Self> {
        let path = dat_path(path.as_ref());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open or create {:?}", path))?;
        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat {:?}", path))?
            .len();
        let map = map_writable(&file, len, &path)?;
        Ok(Self {
            path,
            file: Some(file),
            map,
            buf: AlignedBuf::new(),
            write_pos: len as Offset,
            max_buffer,
        })
    }

    /// Current write cursor.
    pub fn cursor(&self) -> Offset {
        self.write_pos
    }

    /// Bytes sitting in the append buffer, not yet on disk.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Writes `bytes` at the cursor and advances it.
    ///
    /// Bytes overwrite the mapping while the cursor is below `disk_size()`,
    /// then overwrite existing buffer content, and only the remainder extends
    /// the buffer. Returns `true` iff this call pushed the buffer over the
    /// threshold and flushed it (invalidating prior handles).
    pub fn append(&mut self, bytes: &[u8]) -> Result<bool> {
        let mut bytes = bytes;
        if let Some(map) = self.map.as_mut() {
            let disk = map.len() as Offset;
            if self.write_pos < disk && !bytes.is_empty() {
                let take = ((disk - self.write_pos) as usize).min(bytes.len());
                let start = self.write_pos as usize;
                map[start..start + take].copy_from_slice(&bytes[..take]);
                self.write_pos += take as Offset;
                bytes = &bytes[take..];
            }
        }
        if !bytes.is_empty() {
            let buf_pos = (self.write_pos - self.disk_size()) as usize;
            if buf_pos < self.buf.len() {
                let take = (self.buf.len() - buf_pos).min(bytes.len());
                self.buf.as_mut_slice()[buf_pos..buf_pos + take].copy_from_slice(&bytes[..take]);
                self.write_pos += take as Offset;
                bytes = &bytes[take..];
            }
        }
        if !bytes.is_empty() {
            debug_assert_eq!(self.write_pos, self.size());
            self.buf.extend_from_slice(bytes);
            self.write_pos += bytes.len() as Offset;
        }
        if self.buf.len() > self.max_buffer {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Persists the buffer: extends the file by the buffer's length, copies
    /// the buffer into the newly mapped tail, syncs, and clears the buffer.
    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let old_len = self.map_len();
        let new_len = old_len + self.buf.len();
        let file = self.backing_file()?;
        file.set_len(new_len as u64)
            .wrap_err_with(|| format!("failed to extend {:?} to {} bytes", self.path, new_len))?;
        // SAFETY: MmapMut::map_mut is unsafe because external modification of
        // the file would be undefined behavior. This is safe because:
        // 1. This store is the single writer of the file by contract.
        // 2. The file was just extended to new_len, so the mapping covers
        //    exactly the bytes we are about to initialize.
        // 3. The previous mapping is replaced (and unmapped) only after the
        //    new one is established; no handles borrow it here since flush
        //    takes &mut self.
        let mut map = unsafe { MmapMut::map_mut(file) }
            .wrap_err_with(|| format!("failed to remap {:?} after extend", self.path))?;
        map[old_len..new_len].copy_from_slice(self.buf.as_slice());
        map.flush()
            .wrap_err_with(|| format!("failed to sync {:?}", self.path))?;
        self.map = Some(map);
        self.buf.clear();
        Ok(())
    }

    /// Moves the write cursor to `offset` (anywhere in `[0, size()]`).
    pub fn seek(&mut self, offset: Offset) -> Result<()> {
        let size = self.size();
        ensure!(
            offset >= 0 && offset <= size,
            "seek target {} outside [0, {}] for {:?}",
            offset,
            size,
            self.path
        );
        self.write_pos = offset;
        Ok(())
    }

    pub fn seek_end(&mut self) {
        self.write_pos = self.size();
    }

    /// Flushes, then resizes the file to exactly `offset` bytes (zero-filling
    /// when growing) and remaps. The cursor is clamped to the new size.
    pub fn truncate(&mut self, offset: Offset) -> Result<()> {
        ensure!(
            offset >= 0,
            "cannot truncate {:?} to negative size {}",
            self.path,
            offset
        );
        self.flush()?;
        self.map = None;
        let file = self.backing_file()?;
        file.set_len(offset as u64)
            .wrap_err_with(|| format!("failed to resize {:?} to {} bytes", self.path, offset))?;
        self.map = map_writable(file, offset as u64, &self.path)?;
        if self.write_pos > offset {
            self.write_pos = offset;
        }
        Ok(())
    }

    /// For a writer, re-syncing means flushing the buffer (which remaps).
    pub fn reload(&mut self) -> Result<()> {
        self.flush()
    }

    /// Mutable borrow of `len` bytes at `offset`, under the same range rules
    /// as [`slice_at`](ByteStore::slice_at).
    pub fn slice_at_mut(&mut self, offset: Offset, len: usize) -> Result<&mut [u8]> {
        let size = self.size();
        let end = offset + len as Offset;
        ensure!(
            offset >= 0 && end <= size,
            "byte range {}..{} out of bounds (size {}) in {:?}",
            offset,
            end,
            size,
            self.path
        );
        let disk = self.disk_size();
        if offset < disk {
            ensure!(
                end <= disk,
                "byte range {}..{} straddles the unflushed tail at {} in {:?}",
                offset,
                end,
                disk,
                self.path
            );
            let map = self
                .map
                .as_mut()
                .ok_or_else(|| eyre::eyre!("no mapping for {:?}", self.path))?;
            Ok(&mut map[offset as usize..end as usize])
        } else {
            let pos = (offset - disk) as usize;
            Ok(&mut self.buf.as_mut_slice()[pos..pos + len])
        }
    }

    fn backing_file(&self) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| eyre::eyre!("byte store {:?} has no backing file handle", self.path))
    }
}

impl<M: AccessMode> Drop for ByteStore<M> {
    fn drop(&mut self) {
        if let Err(err) = M::teardown(self) {
            eprintln!(
                "chainstore: failed to flush {:?} on drop: {:#}",
                self.path, err
            );
        }
    }
}

impl<M: AccessMode> std::fmt::Debug for ByteStore<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStore")
            .field("path", &self.path)
            .field("disk_size", &self.disk_size())
            .field("buffered", &self.buf.len())
            .field("cursor", &self.write_pos)
            .finish()
    }
}

fn map_readable(file: &File, path: &Path) -> Result<Option<Mmap>> {
    let len = file
        .metadata()
        .wrap_err_with(|| format!("failed to stat {:?}", path))?
        .len();
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: Mmap::map is unsafe because external truncation of the file
    // could invalidate the mapping. This is safe because:
    // 1. The file set is only ever shrunk by its single writer, which owns a
    //    separate mapping; readers observe size changes via reload().
    // 2. All access goes through slice_at, which bounds-checks against the
    //    mapped length captured here.
    let map = unsafe { Mmap::map(file) }
        .wrap_err_with(|| format!("failed to memory-map {:?}", path))?;
    Ok(Some(map))
}

fn map_writable(file: &File, len: u64, path: &Path) -> Result<Option<MmapMut>> {
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: MmapMut::map_mut is unsafe because concurrent modification of
    // the file would be undefined behavior. This is safe because:
    // 1. This store is the single writer of the file by contract.
    // 2. The mapping's lifetime is tied to the store, and every remap site
    //    takes &mut self, so no stale borrows can observe the old region.
    let map = unsafe { MmapMut::map_mut(file) }
        .wrap_err_with(|| format!("failed to memory-map {:?} for writing", path))?;
    Ok(Some(map))
}
