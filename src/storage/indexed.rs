//! # Multi-Stream Indexed Stores
//!
//! An indexed store composes two files: a byte-granular *data* file holding
//! the payloads, and a fixed-stride *index* file holding one
//! [`StreamOffsets`] record per logical entry. Entry `k`'s index record gives
//! the data-file offset of each of its N payload streams:
//!
//! ```text
//! P_index.dat                      P_data.dat
//! ┌──────────────────┐             ┌──────────────────────────────┐
//! │ k=0: [o₀, o₁]    │   o₀ ──────▶│ primary record               │
//! │ k=1: [o₀, INVALID]│            │ aux record (stream 1)        │
//! │ k=2: [o₀, o₁]    │             │ ...                          │
//! └──────────────────┘             └──────────────────────────────┘
//! ```
//!
//! Stream 0 is the *primary* stream: appending a primary record creates the
//! entry, and a committed entry always has a valid stream-0 offset.
//! Auxiliary streams (1..N) start out `INVALID` ("absent") and can be
//! attached exactly once, at any later time. Keeping the fixed-stride index
//! separate from the variable-length payloads makes lookup a single O(1)
//! indirection while absent streams cost nothing in the data file.
//!
//! The original design point is a blockchain layout: a transaction entry has
//! its parsed record as the primary stream and optional per-input metadata
//! attached as auxiliary streams while later parse passes run.
//!
//! ## Arities
//!
//! The store is monomorphized at the stream counts that occur in practice:
//! [`IndexedStore`] (1 stream), [`IndexedStore2`] (2), [`IndexedStore3`] (3).
//! All share the untyped core `RawIndexedStore<N>`; the typed wrappers add
//! the per-stream accessors (generated by the `aux_stream_*` macros).
//!
//! ## Truncation and Recovery
//!
//! `truncate(k)` drops index entries `[k, len)` and cuts the data file back
//! to entry `k`'s primary offset; auxiliary payloads written after that point
//! for earlier entries are dropped with it, so callers must not interleave
//! truncation with attachments behind the truncation point. A writer opening
//! the store discards any index suffix whose offsets point past the end of
//! the data file (the tail of an interrupted flush), keeping the longest
//! consistent prefix.

use std::marker::PhantomData;
use std::path::Path;

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::array_store::ArrayStore;
use super::builder::VarRecordBuilder;
use super::byte_store::{AccessMode, ByteStore, ReadOnly, ReadWrite};
use super::{record_at, record_at_mut, suffixed_path, Offset, Record, INVALID_OFFSET};

/// Per-entry index record: one data-file offset per stream.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct StreamOffsets<const N: usize>([Offset; N]);

impl<const N: usize> StreamOffsets<N> {
    /// A fresh entry: stream 0 set, all auxiliary streams absent.
    pub fn primary(offset: Offset) -> Self {
        let mut offsets = [INVALID_OFFSET; N];
        offsets[0] = offset;
        Self(offsets)
    }

    pub fn get(&self, stream: usize) -> Offset {
        self.0[stream]
    }

    pub fn as_array(&self) -> [Offset; N] {
        self.0
    }

    fn set(&mut self, stream: usize, offset: Offset) {
        self.0[stream] = offset;
    }
}

/// Untyped core shared by all arities: the data file, the index file, and
/// the offset bookkeeping between them.
#[derive(Debug)]
struct RawIndexedStore<const N: usize, M: AccessMode> {
    // declared before `index` so a writer flushes payloads first on drop
    data: ByteStore<M>,
    index: ArrayStore<StreamOffsets<N>, M>,
}

impl<const N: usize, M: AccessMode> RawIndexedStore<N, M> {
    fn len(&self) -> Offset {
        self.index.len()
    }

    fn data_size(&self) -> Offset {
        self.data.size()
    }

    fn offsets(&self, index: Offset) -> Result<[Offset; N]> {
        Ok(self.index.get(index)?.as_array())
    }

    fn stream_slice(&self, index: Offset, stream: usize, len: usize) -> Result<Option<&[u8]>> {
        let offsets = self.offsets(index)?;
        let offset = offsets[stream];
        if offset == INVALID_OFFSET {
            return Ok(None);
        }
        self.data.slice_at(offset, len).map(Some)
    }
}

impl<const N: usize> RawIndexedStore<N, ReadOnly> {
    fn open(prefix: &Path) -> Result<Self> {
        Ok(Self {
            data: ByteStore::<ReadOnly>::open(suffixed_path(prefix, "_data"))?,
            index: ArrayStore::<StreamOffsets<N>, ReadOnly>::open(suffixed_path(prefix, "_index"))?,
        })
    }

    fn reload(&mut self) -> Result<()> {
        self.index.reload()?;
        self.data.reload()
    }
}

impl<const N: usize> RawIndexedStore<N, ReadWrite> {
    fn open(prefix: &Path) -> Result<Self> {
        let data = ByteStore::<ReadWrite>::open(suffixed_path(prefix, "_data"))?;
        let mut index =
            ArrayStore::<StreamOffsets<N>, ReadWrite>::open(suffixed_path(prefix, "_index"))?;

        // keep the longest index prefix consistent with the data file; a
        // longer index than data survives an interrupted flush, since data
        // is flushed first
        let data_size = data.size();
        let mut keep = index.len();
        for k in 0..index.len() {
            let offsets = index.get(k)?.as_array();
            let intact = offsets[0] != INVALID_OFFSET
                && offsets
                    .iter()
                    .all(|&o| o == INVALID_OFFSET || (o >= 0 && o < data_size));
            if !intact {
                keep = k;
                break;
            }
        }
        if keep < index.len() {
            index.truncate(keep)?;
        }

        Ok(Self { data, index })
    }

    fn append_raw(&mut self, bytes: &[u8], align: usize) -> Result<()> {
        ensure!(
            bytes.len() % align == 0,
            "payload of {} bytes is not a multiple of the required {}-byte alignment",
            bytes.len(),
            align
        );
        let offset = self.data.cursor();
        self.data.append(bytes)?;
        self.index.append(&StreamOffsets::primary(offset))?;
        Ok(())
    }

    fn attach_raw(&mut self, index: Offset, stream: usize, bytes: &[u8], align: usize) -> Result<()> {
        debug_assert!(stream >= 1 && stream < N);
        ensure!(
            bytes.len() % align == 0,
            "payload of {} bytes is not a multiple of the required {}-byte alignment",
            bytes.len(),
            align
        );
        let current = self.index.get(index)?.get(stream);
        ensure!(
            current == INVALID_OFFSET,
            "stream {} of entry {} is already attached (offset {})",
            stream,
            index,
            current
        );
        let offset = self.data.cursor();
        self.data.append(bytes)?;
        self.index.get_mut(index)?.set(stream, offset);
        Ok(())
    }

    fn stream_slice_mut(
        &mut self,
        index: Offset,
        stream: usize,
        len: usize,
    ) -> Result<Option<&mut [u8]>> {
        let offsets = self.offsets(index)?;
        let offset = offsets[stream];
        if offset == INVALID_OFFSET {
            return Ok(None);
        }
        self.data.slice_at_mut(offset, len).map(Some)
    }

    fn truncate(&mut self, index: Offset) -> Result<()> {
        ensure!(
            index >= 0,
            "cannot truncate to negative entry {}",
            index
        );
        if index >= self.len() {
            return Ok(());
        }
        let offsets = self.offsets(index)?;
        self.index.truncate(index)?;
        self.data.truncate(offsets[0])?;
        Ok(())
    }

    fn grow(&mut self, index_delta: Offset, data_delta: Offset) -> Result<()> {
        ensure!(
            index_delta >= 0 && data_delta >= 0,
            "grow deltas must be non-negative (got {}, {})",
            index_delta,
            data_delta
        );
        let new_len = self.index.len() + index_delta;
        self.index.truncate(new_len)?;
        self.data.truncate(self.data.size() + data_delta)?;
        Ok(())
    }

    fn seek(&mut self, index: Offset, data_offset: Offset) -> Result<()> {
        self.index.seek(index)?;
        self.data.seek(data_offset)
    }

    fn seek_end(&mut self) {
        self.index.seek_end();
        self.data.seek_end();
    }

    fn flush(&mut self) -> Result<()> {
        // data first: an index entry must never outlive its payload on disk
        self.data.flush()?;
        self.index.flush()
    }

    fn reload(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Single-stream indexed store: every entry is exactly one (possibly
/// variable-length) record, addressed by entry number.
pub struct IndexedStore<T0: Record, M: AccessMode = ReadOnly> {
    raw: RawIndexedStore<1, M>,
    _records: PhantomData<fn() -> T0>,
}

impl<T0: Record, M: AccessMode> IndexedStore<T0, M> {
    pub fn len(&self) -> Offset {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Logical size of the data file.
    pub fn data_size(&self) -> Offset {
        self.raw.data_size()
    }

    pub fn offsets(&self, index: Offset) -> Result<[Offset; 1]> {
        self.raw.offsets(index)
    }

    pub fn get(&self, index: Offset) -> Result<&T0> {
        let bytes = self
            .raw
            .stream_slice(index, 0, std::mem::size_of::<T0>())?
            .ok_or_else(|| eyre::eyre!("entry {} has no primary payload", index))?;
        record_at(bytes)
    }
}

impl<T0: Record> IndexedStore<T0, ReadOnly> {
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Ok(Self {
            raw: RawIndexedStore::<1, ReadOnly>::open(prefix.as_ref())?,
            _records: PhantomData,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.raw.reload()
    }
}

impl<T0: Record> IndexedStore<T0, ReadWrite> {
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Ok(Self {
            raw: RawIndexedStore::<1, ReadWrite>::open(prefix.as_ref())?,
            _records: PhantomData,
        })
    }

    /// Creates a new entry whose primary payload is `value`.
    pub fn append(&mut self, value: &T0) -> Result<()> {
        self.raw
            .append_raw(value.as_bytes(), std::mem::align_of::<T0>())
    }

    /// Creates a new entry from a staged head-plus-tail payload.
    pub fn append_variable(&mut self, payload: &mut VarRecordBuilder<T0>) -> Result<()> {
        let bytes = payload.finalize();
        self.raw.append_raw(bytes, std::mem::align_of::<T0>())
    }

    pub fn get_mut(&mut self, index: Offset) -> Result<&mut T0> {
        let bytes = self
            .raw
            .stream_slice_mut(index, 0, std::mem::size_of::<T0>())?
            .ok_or_else(|| eyre::eyre!("entry {} has no primary payload", index))?;
        record_at_mut(bytes)
    }

    /// Drops entries `[index, len)` and their payloads.
    pub fn truncate(&mut self, index: Offset) -> Result<()> {
        self.raw.truncate(index)
    }

    /// Extends the index by `index_delta` zeroed entries and the data file by
    /// `data_delta` zero bytes, for callers that fill pre-reserved slots
    /// out of order.
    pub fn grow(&mut self, index_delta: Offset, data_delta: Offset) -> Result<()> {
        self.raw.grow(index_delta, data_delta)
    }

    pub fn seek(&mut self, index: Offset, data_offset: Offset) -> Result<()> {
        self.raw.seek(index, data_offset)
    }

    pub fn seek_end(&mut self) {
        self.raw.seek_end();
    }

    pub fn flush(&mut self) -> Result<()> {
        self.raw.flush()
    }

    pub fn reload(&mut self) -> Result<()> {
        self.raw.reload()
    }
}

/// Two-stream indexed store: a primary record plus one optional auxiliary
/// payload per entry.
pub struct IndexedStore2<T0: Record, T1: Record, M: AccessMode = ReadOnly> {
    raw: RawIndexedStore<2, M>,
    _records: PhantomData<fn() -> (T0, T1)>,
}

impl<T0: Record, T1: Record, M: AccessMode> IndexedStore2<T0, T1, M> {
    pub fn len(&self) -> Offset {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    pub fn data_size(&self) -> Offset {
        self.raw.data_size()
    }

    pub fn offsets(&self, index: Offset) -> Result<[Offset; 2]> {
        self.raw.offsets(index)
    }

    pub fn primary(&self, index: Offset) -> Result<&T0> {
        let bytes = self
            .raw
            .stream_slice(index, 0, std::mem::size_of::<T0>())?
            .ok_or_else(|| eyre::eyre!("entry {} has no primary payload", index))?;
        record_at(bytes)
    }

    aux_stream_reader!(1, T1);

    /// All streams of entry `index` at once.
    pub fn get(&self, index: Offset) -> Result<(&T0, Option<&T1>)> {
        Ok((self.primary(index)?, self.stream1(index)?))
    }
}

impl<T0: Record, T1: Record> IndexedStore2<T0, T1, ReadOnly> {
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Ok(Self {
            raw: RawIndexedStore::<2, ReadOnly>::open(prefix.as_ref())?,
            _records: PhantomData,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.raw.reload()
    }
}

impl<T0: Record, T1: Record> IndexedStore2<T0, T1, ReadWrite> {
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Ok(Self {
            raw: RawIndexedStore::<2, ReadWrite>::open(prefix.as_ref())?,
            _records: PhantomData,
        })
    }

    pub fn append(&mut self, value: &T0) -> Result<()> {
        self.raw
            .append_raw(value.as_bytes(), std::mem::align_of::<T0>())
    }

    pub fn append_variable(&mut self, payload: &mut VarRecordBuilder<T0>) -> Result<()> {
        let bytes = payload.finalize();
        self.raw.append_raw(bytes, std::mem::align_of::<T0>())
    }

    pub fn primary_mut(&mut self, index: Offset) -> Result<&mut T0> {
        let bytes = self
            .raw
            .stream_slice_mut(index, 0, std::mem::size_of::<T0>())?
            .ok_or_else(|| eyre::eyre!("entry {} has no primary payload", index))?;
        record_at_mut(bytes)
    }

    aux_stream_writer!(1, T1);

    pub fn truncate(&mut self, index: Offset) -> Result<()> {
        self.raw.truncate(index)
    }

    pub fn grow(&mut self, index_delta: Offset, data_delta: Offset) -> Result<()> {
        self.raw.grow(index_delta, data_delta)
    }

    pub fn seek(&mut self, index: Offset, data_offset: Offset) -> Result<()> {
        self.raw.seek(index, data_offset)
    }

    pub fn seek_end(&mut self) {
        self.raw.seek_end();
    }

    pub fn flush(&mut self) -> Result<()> {
        self.raw.flush()
    }

    pub fn reload(&mut self) -> Result<()> {
        self.raw.reload()
    }
}

/// Three-stream indexed store: a primary record plus two optional auxiliary
/// payloads per entry.
pub struct IndexedStore3<T0: Record, T1: Record, T2: Record, M: AccessMode = ReadOnly> {
    raw: RawIndexedStore<3, M>,
    _records: PhantomData<fn() -> (T0, T1, T2)>,
}

impl<T0: Record, T1: Record, T2: Record, M: AccessMode> IndexedStore3<T0, T1, T2, M> {
    pub fn len(&self) -> Offset {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    pub fn data_size(&self) -> Offset {
        self.raw.data_size()
    }

    pub fn offsets(&self, index: Offset) -> Result<[Offset; 3]> {
        self.raw.offsets(index)
    }

    pub fn primary(&self, index: Offset) -> Result<&T0> {
        let bytes = self
            .raw
            .stream_slice(index, 0, std::mem::size_of::<T0>())?
            .ok_or_else(|| eyre::eyre!("entry {} has no primary payload", index))?;
        record_at(bytes)
    }

    aux_stream_reader!(1, T1);
    aux_stream_reader!(2, T2);

    /// All streams of entry `index` at once.
    pub fn get(&self, index: Offset) -> Result<(&T0, Option<&T1>, Option<&T2>)> {
        Ok((
            self.primary(index)?,
            self.stream1(index)?,
            self.stream2(index)?,
        ))
    }
}

impl<T0: Record, T1: Record, T2: Record> IndexedStore3<T0, T1, T2, ReadOnly> {
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Ok(Self {
            raw: RawIndexedStore::<3, ReadOnly>::open(prefix.as_ref())?,
            _records: PhantomData,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.raw.reload()
    }
}

impl<T0: Record, T1: Record, T2: Record> IndexedStore3<T0, T1, T2, ReadWrite> {
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        Ok(Self {
            raw: RawIndexedStore::<3, ReadWrite>::open(prefix.as_ref())?,
            _records: PhantomData,
        })
    }

    pub fn append(&mut self, value: &T0) -> Result<()> {
        self.raw
            .append_raw(value.as_bytes(), std::mem::align_of::<T0>())
    }

    pub fn append_variable(&mut self, payload: &mut VarRecordBuilder<T0>) -> Result<()> {
        let bytes = payload.finalize();
        self.raw.append_raw(bytes, std::mem::align_of::<T0>())
    }

    pub fn primary_mut(&mut self, index: Offset) -> Result<&mut T0> {
        let bytes = self
            .raw
            .stream_slice_mut(index, 0, std::mem::size_of::<T0>())?
            .ok_or_else(|| eyre::eyre!("entry {} has no primary payload", index))?;
        record_at_mut(bytes)
    }

    aux_stream_writer!(1, T1);
    aux_stream_writer!(2, T2);

    pub fn truncate(&mut self, index: Offset) -> Result<()> {
        self.raw.truncate(index)
    }

    pub fn grow(&mut self, index_delta: Offset, data_delta: Offset) -> Result<()> {
        self.raw.grow(index_delta, data_delta)
    }

    pub fn seek(&mut self, index: Offset, data_offset: Offset) -> Result<()> {
        self.raw.seek(index, data_offset)
    }

    pub fn seek_end(&mut self) {
        self.raw.seek_end();
    }

    pub fn flush(&mut self) -> Result<()> {
        self.raw.flush()
    }

    pub fn reload(&mut self) -> Result<()> {
        self.raw.reload()
    }
}
