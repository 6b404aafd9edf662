//! Fuzz testing for the byte store write path.
//!
//! Drives an arbitrary sequence of append/seek/flush/truncate operations
//! against a ByteStore and mirrors every operation into a plain in-memory
//! model, then checks that sizes and readable bytes agree. This covers the
//! three-region write split (mapping overwrite, buffer overwrite, buffer
//! extension) including cursor positions that straddle the flush boundary.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use chainstore::{ByteStore, Offset, ReadWrite};

#[derive(Debug, Arbitrary)]
enum Op {
    Append(Vec<u8>),
    Seek(u16),
    SeekEnd,
    Flush,
    Truncate(u16),
}

/// In-memory mirror: the byte contents, the cursor, and how much of the
/// contents counts as "on disk" (advanced by flush/truncate).
struct Model {
    bytes: Vec<u8>,
    cursor: usize,
    disk: usize,
}

impl Model {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            cursor: 0,
            disk: 0,
        }
    }

    fn append(&mut self, data: &[u8]) {
        let end = self.cursor + data.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[self.cursor..end].copy_from_slice(data);
        self.cursor = end;
    }

    fn truncate(&mut self, len: usize) {
        self.disk = len;
        self.bytes.resize(len, 0);
        if self.cursor > len {
            self.cursor = len;
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    if ops.len() > 64 {
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut store = ByteStore::<ReadWrite>::open(dir.path().join("fuzzed")).unwrap();
    let mut model = Model::new();

    for op in &ops {
        match op {
            Op::Append(data) => {
                if data.len() > 4096 {
                    continue;
                }
                store.append(data).unwrap();
                model.append(data);
            }
            Op::Seek(raw) => {
                let target = (*raw as usize).min(model.bytes.len());
                store.seek(target as Offset).unwrap();
                model.cursor = target;
            }
            Op::SeekEnd => {
                store.seek_end();
                model.cursor = model.bytes.len();
            }
            Op::Flush => {
                store.flush().unwrap();
                model.disk = model.bytes.len();
            }
            Op::Truncate(raw) => {
                let target = *raw as usize & 0x1FFF;
                store.truncate(target as Offset).unwrap();
                model.truncate(target);
            }
        }

        assert_eq!(store.size(), model.bytes.len() as Offset);
        assert_eq!(store.disk_size(), model.disk.min(model.bytes.len()) as Offset);
    }

    // every byte is readable through exactly one region
    let disk = store.disk_size() as usize;
    if disk > 0 {
        assert_eq!(store.slice_at(0, disk).unwrap(), &model.bytes[..disk]);
    }
    let buffered = model.bytes.len() - disk;
    if buffered > 0 {
        assert_eq!(
            store.slice_at(disk as Offset, buffered).unwrap(),
            &model.bytes[disk..]
        );
    }
});
