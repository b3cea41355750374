//! Reading a real file on disk through `ReadAt`'s `std::fs::File` impl,
//! instead of an in-memory buffer.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::io::Write as _;

use mcap::indexed_reader::{IndexedReader, ReadMessageOptions};
use mcap::writer::{WriteOptions, Writer};
use mcap::Compression;

#[test]
fn indexed_reader_reads_from_a_file_handle() {
    let options = WriteOptions::new()
        .compression(Compression::None)
        .chunk_size_threshold(64);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let channel = writer
        .register_channel("/t", "raw", 0, BTreeMap::new())
        .unwrap();
    for i in 0..40u64 {
        writer.write_message(channel, i as u32, i, i, b"on-disk").unwrap();
    }
    let bytes = writer.into_inner().unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let handle = file.reopen().unwrap();
    let reader = IndexedReader::new(handle).unwrap();
    assert_eq!(reader.info().statistics.unwrap().message_count, 40);
    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 40);
    assert!(messages.iter().all(|m| m.data == b"on-disk"));
}
