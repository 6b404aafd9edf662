//! # Fixed-Size Record Array
//!
//! `ArrayStore<T>` interprets a `ByteStore` as a dense array of fixed-size
//! records, converting record numbers to byte offsets. Element `i` occupies
//! bytes `[i * size_of::<T>(), (i + 1) * size_of::<T>())`; the underlying
//! logical size is kept a multiple of the record size by construction.
//!
//! Alignment holds on both sides of the flush boundary: the mapping starts
//! page-aligned, the append buffer starts 64-byte aligned, and flushes only
//! happen between appends, so every record sits at an offset that is a
//! multiple of its own alignment within its region. The `zerocopy` view in
//! [`record_at`](super::record_at) still verifies this at runtime.
//!
//! A file whose size is not a multiple of the record size (the tail of an
//! interrupted flush) is tolerated: readers ignore the partial record,
//! writers discard it when they open the file.

use std::marker::PhantomData;
use std::mem;
use std::path::Path;

use eyre::{ensure, Result};
use zerocopy::IntoBytes;

use super::byte_store::{AccessMode, ByteStore, ReadOnly, ReadWrite};
use super::{record_at, record_at_mut, Offset, Record, DEFAULT_MAX_BUFFER_BYTES};

#[derive(Debug)]
pub struct ArrayStore<T: Record, M: AccessMode = ReadOnly> {
    store: ByteStore<M>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record, M: AccessMode> ArrayStore<T, M> {
    const RECORD_SIZE: usize = mem::size_of::<T>();

    pub fn len(&self) -> Offset {
        self.store.size() / Self::RECORD_SIZE as Offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records currently on disk, excluding any still buffered by a writer.
    pub fn disk_len(&self) -> Offset {
        self.store.disk_size() / Self::RECORD_SIZE as Offset
    }

    pub fn get(&self, index: Offset) -> Result<&T> {
        let len = self.len();
        ensure!(
            index >= 0 && index < len,
            "record {} out of bounds (len {}) in {:?}",
            index,
            len,
            self.store.path()
        );
        let bytes = self
            .store
            .slice_at(index * Self::RECORD_SIZE as Offset, Self::RECORD_SIZE)?;
        record_at(bytes)
    }

    /// Indices of all records satisfying `predicate`, in order.
    pub fn find_all(&self, mut predicate: impl FnMut(&T) -> bool) -> Result<Vec<u32>> {
        let mut indices = Vec::new();
        for index in 0..self.len() {
            if predicate(self.get(index)?) {
                indices.push(index as u32);
            }
        }
        Ok(indices)
    }

    pub fn byte_store(&self) -> &ByteStore<M> {
        &self.store
    }
}

impl<T: Record> ArrayStore<T, ReadOnly> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        ensure!(
            Self::RECORD_SIZE > 0,
            "cannot store zero-sized record type {}",
            std::any::type_name::<T>()
        );
        Ok(Self {
            store: ByteStore::<ReadOnly>::open(path)?,
            _record: PhantomData,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.store.reload()
    }
}

impl<T: Record> ArrayStore<T, ReadWrite> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_max_buffer(path, DEFAULT_MAX_BUFFER_BYTES)
    }

    pub fn with_max_buffer<P: AsRef<Path>>(path: P, max_buffer: usize) -> Result<Self> {
        ensure!(
            Self::RECORD_SIZE > 0,
            "cannot store zero-sized record type {}",
            std::any::type_name::<T>()
        );
        let mut store = ByteStore::with_max_buffer(path, max_buffer)?;
        let excess = store.size() % Self::RECORD_SIZE as Offset;
        if excess != 0 {
            // torn tail from an interrupted flush
            store.truncate(store.size() - excess)?;
        }
        Ok(Self {
            store,
            _record: PhantomData,
        })
    }

    /// Appends a record; returns `true` iff the underlying buffer was
    /// flushed as part of this call.
    pub fn append(&mut self, value: &T) -> Result<bool> {
        self.store.append(value.as_bytes())
    }

    pub fn get_mut(&mut self, index: Offset) -> Result<&mut T> {
        let len = self.len();
        ensure!(
            index >= 0 && index < len,
            "record {} out of bounds (len {}) in {:?}",
            index,
            len,
            self.store.path()
        );
        let bytes = self
            .store
            .slice_at_mut(index * Self::RECORD_SIZE as Offset, Self::RECORD_SIZE)?;
        record_at_mut(bytes)
    }

    /// Keeps records `[0, index)`; extends with zeroed records when `index`
    /// exceeds the current length.
    pub fn truncate(&mut self, index: Offset) -> Result<()> {
        ensure!(
            index >= 0,
            "cannot truncate {:?} to negative length {}",
            self.store.path(),
            index
        );
        self.store.truncate(index * Self::RECORD_SIZE as Offset)
    }

    pub fn seek(&mut self, index: Offset) -> Result<()> {
        ensure!(
            index >= 0,
            "cannot seek {:?} to negative record {}",
            self.store.path(),
            index
        );
        self.store.seek(index * Self::RECORD_SIZE as Offset)
    }

    pub fn seek_end(&mut self) {
        self.store.seek_end();
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    pub fn reload(&mut self) -> Result<()> {
        self.store.reload()
    }
}
