//! # Storage Module
//!
//! This module provides the on-disk substrate for chainstore: append-only,
//! memory-mapped record files with zero-copy typed access and compile-time
//! safety guarantees through Rust's borrow checker.
//!
//! ## Architecture Overview
//!
//! Three layers, each a thin view over the one below:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ IndexedStore / IndexedStore2 / IndexedStore3  │  one primary record +
//! │ (data file + fixed-stride offset index)       │  optional aux payloads
//! ├───────────────────────────────────────────────┤
//! │ ArrayStore<T>                                 │  dense array of
//! │ (record number ↔ byte offset)                │  fixed-size records
//! ├───────────────────────────────────────────────┤
//! │ ByteStore                                     │  mapped file + deferred
//! │ (mmap + aligned append buffer)                │  write buffer
//! └───────────────────────────────────────────────┘
//! ```
//!
//! A `ByteStore` maps its whole backing file and keeps appended bytes in an
//! in-memory buffer until the buffer crosses a size threshold, so growing the
//! file (an `ftruncate` plus a remap) is amortized over many small appends.
//! Callers see one continuous logical address space that is the file followed
//! by the buffer.
//!
//! ## Access Modes
//!
//! Stores are generic over an [`AccessMode`]: [`ReadOnly`] stores map with
//! `Mmap` and expose only the read API; [`ReadWrite`] stores map with
//! `MmapMut` and add append/seek/truncate/flush. At most one writer may exist
//! per file set; any number of read-only instances may be open concurrently,
//! each seeing a snapshot of the on-disk state as of its last `reload()`.
//! Bytes still in a writer's buffer are invisible to other instances until
//! the writer flushes.
//!
//! ## Safety Model
//!
//! Memory-mapped regions become invalid when the file is grown and remapped.
//! Instead of runtime guards or epochs, the borrow checker enforces the
//! invalidation contract at compile time:
//!
//! ```text
//! get(&self) -> &T          // immutable borrow of the store
//! append(&mut self)         // exclusive borrow; no handle can be live
//! ```
//!
//! Every typed handle borrows the store, and every operation that can remap
//! (`append`, `flush`, `truncate`, `reload`) takes `&mut self`, so holding a
//! handle across a remap is a compile error, with zero runtime cost.
//!
//! ## Record Types
//!
//! Typed access goes through the [`Record`] marker trait, which bundles the
//! `zerocopy` capabilities (`FromBytes + IntoBytes + Immutable +
//! KnownLayout`). A `#[repr(C)]` struct of primitives with no implicit
//! padding qualifies automatically. Records are stored in the platform's
//! native byte order and layout; the files are not portable across
//! architectures with different endianness or alignment rules. That is the
//! price of zero-copy access and is deliberate.
//!
//! ## File Naming
//!
//! A `ByteStore` opened at logical name `P` backs itself with `P.dat`. An
//! indexed store at prefix `P` uses `P_data.dat` for payloads and
//! `P_index.dat` for the fixed-stride offset index.
//!
//! ## Module Organization
//!
//! - `byte_store`: mapped file plus append buffer (`ByteStore`)
//! - `array_store`: fixed-size record array (`ArrayStore<T>`)
//! - `indexed`: multi-stream indexed stores (`IndexedStore*`)
//! - `builder`: variable-length payload staging (`VarRecordBuilder`)
//! - `buffer`: the aligned append buffer primitive

mod array_store;
mod buffer;
mod builder;
mod byte_store;
mod indexed;

pub use array_store::ArrayStore;
pub use builder::VarRecordBuilder;
pub use byte_store::{AccessMode, ByteStore, MapRegion, ReadOnly, ReadWrite};
pub use indexed::{IndexedStore, IndexedStore2, IndexedStore3, StreamOffsets};

use std::path::{Path, PathBuf};

use eyre::Result;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Byte position within a store's logical address space.
pub type Offset = i64;

/// Sentinel offset denoting "no payload" in an index entry.
pub const INVALID_OFFSET: Offset = i64::MAX;

/// Buffered appends are flushed to disk once the buffer exceeds this many
/// bytes (overridable per store).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 50_000_000;

/// Marker for types that can be stored and viewed zero-copy.
///
/// Implemented automatically for any type satisfying the `zerocopy`
/// capability bounds: `#[repr(C)]`, no implicit padding, no interior
/// mutability, layout known at compile time.
pub trait Record: FromBytes + IntoBytes + Immutable + KnownLayout {}

impl<T: FromBytes + IntoBytes + Immutable + KnownLayout> Record for T {}

/// Views an exactly-sized byte slice as a record reference.
#[inline]
pub(crate) fn record_at<T: Record>(bytes: &[u8]) -> Result<&T> {
    T::ref_from_bytes(bytes).map_err(|err| {
        eyre::eyre!(
            "failed to view bytes as {}: {:?}",
            std::any::type_name::<T>(),
            err
        )
    })
}

/// Mutable counterpart of [`record_at`].
#[inline]
pub(crate) fn record_at_mut<T: Record>(bytes: &mut [u8]) -> Result<&mut T> {
    T::mut_from_bytes(bytes).map_err(|err| {
        eyre::eyre!(
            "failed to view bytes as mut {}: {:?}",
            std::any::type_name::<T>(),
            err
        )
    })
}

/// Appends a textual suffix to a path, keeping any existing file name intact
/// (`tx` + `_index` → `tx_index`).
pub(crate) fn suffixed_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// The on-disk file for a store opened at a logical name: `P` → `P.dat`.
pub(crate) fn dat_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".dat");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dat_path_appends_extension() {
        assert_eq!(
            dat_path(Path::new("/tmp/blocks")),
            Path::new("/tmp/blocks.dat")
        );
    }

    #[test]
    fn dat_path_keeps_existing_dots() {
        assert_eq!(dat_path(Path::new("chain.v2")), Path::new("chain.v2.dat"));
    }

    #[test]
    fn suffixed_path_extends_file_name() {
        assert_eq!(
            suffixed_path(Path::new("/tmp/tx"), "_index"),
            Path::new("/tmp/tx_index")
        );
    }

    #[test]
    fn record_view_rejects_short_buffer() {
        let bytes = [0u8; 3];
        assert!(record_at::<u32>(&bytes).is_err());
    }

    #[test]
    fn record_view_roundtrips_primitive() {
        let source = 0xDEAD_BEEFu32;
        let value: &u32 = record_at(source.as_bytes()).unwrap();
        assert_eq!(*value, 0xDEAD_BEEF);
    }
}
