//! # Chain Record Layouts
//!
//! Fixed-size records the analysis layers persist through the storage module,
//! plus the store aliases they are read and written with. The storage layer
//! treats all of these as opaque bytes; the layouts live here so they have a
//! single definition and a compile-time size check.
//!
//! All records are `#[repr(C)]` with explicit reserved fields in place of
//! implicit padding, which is what makes them [`Record`]-capable and keeps
//! their on-disk layout stable on a given platform.
//!
//! [`Record`]: crate::storage::Record

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::storage::{ArrayStore, ByteStore, IndexedStore3, ReadOnly};

/// Parsed block descriptor, one per block height.
///
/// `coinbase_offset` points into the coinbase byte store; `first_tx_index`
/// and `tx_count` give the block's slice of the transaction store.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawBlock {
    pub hash: [u8; 32],
    pub coinbase_offset: u64,
    pub first_tx_index: u32,
    pub tx_count: u32,
    pub input_count: u32,
    pub output_count: u32,
    pub height: u32,
    pub version: i32,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
    pub real_size: u32,
    pub base_size: u32,
    reserved: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<RawBlock>() == 88);

impl RawBlock {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hash: [u8; 32],
        coinbase_offset: u64,
        first_tx_index: u32,
        tx_count: u32,
        input_count: u32,
        output_count: u32,
        height: u32,
        version: i32,
        timestamp: u32,
        bits: u32,
        nonce: u32,
        real_size: u32,
        base_size: u32,
    ) -> Self {
        Self {
            hash,
            coinbase_offset,
            first_tx_index,
            tx_count,
            input_count,
            output_count,
            height,
            version,
            timestamp,
            bits,
            nonce,
            real_size,
            base_size,
            reserved: [0; 4],
        }
    }
}

/// Parsed transaction head; inputs and outputs follow it inline in the data
/// file as a variable-length tail.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RawTransaction {
    pub real_size: u32,
    pub base_size: u32,
    pub locktime: u32,
    pub input_count: u16,
    pub output_count: u16,
}

const _: () = assert!(std::mem::size_of::<RawTransaction>() == 16);

/// Block descriptors, indexed by height.
pub type BlockStore<M = ReadOnly> = ArrayStore<RawBlock, M>;

/// Transactions with two lazily attached streams: per-input sequence numbers
/// and the transaction version.
pub type TxStore<M = ReadOnly> = IndexedStore3<RawTransaction, u32, i32, M>;

/// Raw coinbase payloads, addressed by [`RawBlock::coinbase_offset`].
pub type CoinbaseStore<M = ReadOnly> = ByteStore<M>;
