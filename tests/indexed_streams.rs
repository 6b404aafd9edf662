//! # Indexed Store Stream Tests
//!
//! End-to-end coverage of the two-file indexed stores across process-like
//! boundaries:
//! 1. Auxiliary streams can be attached in a later session than the one that
//!    created their entries
//! 2. Readers observe entries and attachments only after the writer flushes
//! 3. Reopening repairs an index whose tail points past the data file

use std::fs;

use tempfile::tempdir;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use chainstore::{
    IndexedStore2, ReadOnly, ReadWrite, VarRecordBuilder, INVALID_OFFSET,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct Head {
    h: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct Tail {
    t: u32,
    flags: u32,
}

mod reopen_attach_tests {
    use super::*;

    #[test]
    fn attach_lands_on_entry_from_previous_session() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        {
            let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
            for i in 0..3u64 {
                store.append(&Head { h: i }).unwrap();
            }
            store.flush().unwrap();
        }

        let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
        assert_eq!(store.len(), 3);

        let tail = Tail { t: 7, flags: 3 };
        store.attach1(1, &tail).unwrap();

        let offsets = store.offsets(1).unwrap();
        assert!(offsets[1] != INVALID_OFFSET && offsets[1] < store.data_size());
        assert_eq!(store.stream1(1).unwrap(), Some(&tail));
        assert!(store.stream1(0).unwrap().is_none());
        assert!(store.stream1(2).unwrap().is_none());
    }

    #[test]
    fn attachments_survive_reopen() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        let tail = Tail { t: 123, flags: 1 };
        {
            let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
            store.append(&Head { h: 10 }).unwrap();
            store.append(&Head { h: 20 }).unwrap();
            store.attach1(0, &tail).unwrap();
        }

        let store = IndexedStore2::<Head, Tail, ReadOnly>::open(&prefix).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap(), (&Head { h: 10 }, Some(&tail)));
        assert_eq!(store.get(1).unwrap(), (&Head { h: 20 }, None));
    }

    #[test]
    fn variable_payloads_roundtrip_across_sessions() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        {
            let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
            let mut payload = VarRecordBuilder::new(&Head { h: 99 });
            payload.extend([1u8, 2, 3, 4, 5].iter());
            store.append_variable(&mut payload).unwrap();

            let mut tail = VarRecordBuilder::new(&Tail { t: 5, flags: 0 });
            tail.push(&0xABCD_EF01u32);
            store.attach1_variable(0, &mut tail).unwrap();
        }

        let store = IndexedStore2::<Head, Tail, ReadOnly>::open(&prefix).unwrap();
        let (head, tail) = store.get(0).unwrap();
        assert_eq!(head, &Head { h: 99 });
        assert_eq!(tail, Some(&Tail { t: 5, flags: 0 }));
        // variable primary: 8 head + 5 tail → padded to 16
        assert_eq!(store.offsets(0).unwrap()[1], 16);
    }
}

mod reader_visibility_tests {
    use super::*;

    #[test]
    fn reader_sees_entries_only_after_writer_flush() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        let mut writer = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
        let mut reader = IndexedStore2::<Head, Tail, ReadOnly>::open(&prefix).unwrap();

        writer.append(&Head { h: 1 }).unwrap();
        reader.reload().unwrap();
        assert_eq!(reader.len(), 0);

        writer.flush().unwrap();
        reader.reload().unwrap();
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.primary(0).unwrap(), &Head { h: 1 });
    }

    #[test]
    fn reader_sees_attachment_after_flush() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        let mut writer = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
        writer.append(&Head { h: 1 }).unwrap();
        writer.flush().unwrap();

        let mut reader = IndexedStore2::<Head, Tail, ReadOnly>::open(&prefix).unwrap();
        assert!(reader.stream1(0).unwrap().is_none());

        let tail = Tail { t: 2, flags: 2 };
        writer.attach1(0, &tail).unwrap();
        writer.flush().unwrap();

        reader.reload().unwrap();
        assert_eq!(reader.stream1(0).unwrap(), Some(&tail));
    }
}

mod recovery_tests {
    use super::*;

    #[test]
    fn reopen_drops_index_entries_past_data_end() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        {
            let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
            for i in 0..3u64 {
                store.append(&Head { h: i }).unwrap();
            }
        }
        // cut the data file back to two payloads; the third index entry now
        // points at nothing
        let data_path = dir.path().join("tx_data.dat");
        let file = fs::OpenOptions::new().write(true).open(&data_path).unwrap();
        file.set_len(16).unwrap();
        drop(file);

        let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.primary(1).unwrap(), &Head { h: 1 });

        store.append(&Head { h: 5 }).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.offsets(2).unwrap()[0], 16);
        assert_eq!(store.primary(2).unwrap(), &Head { h: 5 });
    }

    #[test]
    fn reopen_ignores_partial_index_record() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        {
            let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
            for i in 0..3u64 {
                store.append(&Head { h: i }).unwrap();
            }
        }
        // each index record is two 8-byte offsets; leave half a record behind
        let index_path = dir.path().join("tx_index.dat");
        let file = fs::OpenOptions::new().write(true).open(&index_path).unwrap();
        file.set_len(3 * 16 - 8).unwrap();
        drop(file);

        let store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.primary(1).unwrap(), &Head { h: 1 });
    }

    #[test]
    fn truncate_is_stable_across_reopen() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("tx");
        {
            let mut store = IndexedStore2::<Head, Tail, ReadWrite>::open(&prefix).unwrap();
            for i in 0..5u64 {
                store.append(&Head { h: i }).unwrap();
            }
            store.truncate(2).unwrap();
        }
        let store = IndexedStore2::<Head, Tail, ReadOnly>::open(&prefix).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.data_size(), 16);
        assert_eq!(store.primary(1).unwrap(), &Head { h: 1 });
    }
}
