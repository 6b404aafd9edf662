//! # Internal Macros
//!
//! Helpers for the fixed-arity indexed stores. Each auxiliary stream of an
//! `IndexedStore2`/`IndexedStore3` gets the same accessor surface: a typed
//! reader returning `None` for absent payloads, plus attach methods for fixed
//! and variable-length payloads. The method bodies are generated here and
//! named via `paste` (`stream1`, `attach1`, `attach1_variable`, ...).
//!
//! The macros expand inside the typed store impls; `$stream` is the stream's
//! index literal and `$ty` the stream's record type parameter.

/// Generates the read accessor for one auxiliary stream.
macro_rules! aux_stream_reader {
    ($stream:literal, $ty:ident) => {
        ::paste::paste! {
            #[doc = concat!("Typed handle for stream ", $stream, " of entry `index`, or `None` if it was never attached.")]
            pub fn [<stream $stream>](&self, index: Offset) -> ::eyre::Result<Option<&$ty>> {
                match self
                    .raw
                    .stream_slice(index, $stream, ::core::mem::size_of::<$ty>())?
                {
                    Some(bytes) => $crate::storage::record_at::<$ty>(bytes).map(Some),
                    None => Ok(None),
                }
            }
        }
    };
}

/// Generates the attach methods for one auxiliary stream.
macro_rules! aux_stream_writer {
    ($stream:literal, $ty:ident) => {
        ::paste::paste! {
            #[doc = concat!("Writes `value` to the data file and points stream ", $stream, " of entry `index` at it. Each stream of an entry can be attached exactly once.")]
            pub fn [<attach $stream>](&mut self, index: Offset, value: &$ty) -> ::eyre::Result<()> {
                self.raw.attach_raw(
                    index,
                    $stream,
                    value.as_bytes(),
                    ::core::mem::align_of::<$ty>(),
                )
            }

            #[doc = concat!("Variable-length counterpart of `attach", $stream, "`; the payload is finalized (alignment-padded) before writing.")]
            pub fn [<attach $stream _variable>](
                &mut self,
                index: Offset,
                payload: &mut VarRecordBuilder<$ty>,
            ) -> ::eyre::Result<()> {
                let bytes = payload.finalize();
                self.raw
                    .attach_raw(index, $stream, bytes, ::core::mem::align_of::<$ty>())
            }
        }
    };
}
