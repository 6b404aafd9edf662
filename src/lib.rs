//! # chainstore: Append-Only Mapped Record Storage
//!
//! chainstore is the on-disk substrate of a blockchain analysis toolkit:
//! memory-mapped, append-only record files with zero-copy typed access. The
//! parser writes millions of small fixed-layout records per pass; analyses
//! then scan them at memory bandwidth through borrowed views, without
//! deserialization.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chainstore::{ArrayStore, ReadWrite};
//! use chainstore::chain::RawBlock;
//!
//! let mut blocks = ArrayStore::<RawBlock, ReadWrite>::open("data/blocks")?;
//! blocks.append(&parsed_block)?;
//! let genesis = blocks.get(0)?;            // &RawBlock straight out of the mmap
//! blocks.flush()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │   Analysis layers (chain model, heuristics) │   out of crate
//! ├─────────────────────────────────────────────┤
//! │   chain: record layouts + store aliases     │
//! ├─────────────────────────────────────────────┤
//! │   storage: IndexedStore / ArrayStore        │
//! │            over ByteStore (mmap + buffer)   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Appends land in an aligned in-memory buffer and reach disk in large
//! batches, so file growth (resize + remap) is amortized; reads see one
//! continuous logical address space covering both. Handle invalidation
//! across remaps is enforced by the borrow checker: every typed view borrows
//! its store, and every operation that can remap takes `&mut self`.
//!
//! ## Module Overview
//!
//! - [`storage`]: the three store layers, access modes, and the
//!   variable-length payload builder
//! - [`chain`]: fixed-layout chain records (`RawBlock`, `RawTransaction`)
//!   and the store aliases built from them

#[macro_use]
mod macros;

pub mod chain;
pub mod storage;

pub use storage::{
    AccessMode, ArrayStore, ByteStore, IndexedStore, IndexedStore2, IndexedStore3, Offset,
    ReadOnly, ReadWrite, Record, StreamOffsets, VarRecordBuilder, DEFAULT_MAX_BUFFER_BYTES,
    INVALID_OFFSET,
};
