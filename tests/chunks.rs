//! Chunk-splitting and chunk-index behavior observed through the public
//! writer/indexed reader API.

use std::collections::BTreeMap;

use mcap::indexed_reader::{IndexedReader, ReadMessageOptions};
use mcap::streaming_reader::StreamingReader;
use mcap::records::Record;
use mcap::writer::{WriteOptions, Writer};
use mcap::Compression;

#[test]
fn messages_split_across_multiple_chunks_past_the_size_threshold() {
    let options = WriteOptions::new()
        .compression(Compression::None)
        .chunk_size_threshold(128);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let channel = writer
        .register_channel("/data", "raw", 0, BTreeMap::new())
        .unwrap();
    for i in 0..100u64 {
        writer
            .write_message(channel, i as u32, i, i, &vec![0u8; 16])
            .unwrap();
    }
    let bytes = writer.into_inner().unwrap();

    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let info = reader.info();
    assert!(
        info.chunk_indexes.len() > 1,
        "expected more than one chunk, got {}",
        info.chunk_indexes.len()
    );
    assert_eq!(info.statistics.unwrap().chunk_count as usize, info.chunk_indexes.len());

    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 100);
}

#[test]
fn chunk_index_message_offsets_cover_every_channel_in_the_chunk() {
    let options = WriteOptions::new()
        .compression(Compression::None)
        .chunk_size_threshold(64 * 1024);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let a = writer.register_channel("/a", "raw", 0, BTreeMap::new()).unwrap();
    let b = writer.register_channel("/b", "raw", 0, BTreeMap::new()).unwrap();
    writer.write_message(a, 0, 0, 0, b"x").unwrap();
    writer.write_message(b, 0, 1, 1, b"y").unwrap();
    let bytes = writer.into_inner().unwrap();

    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let info = reader.info();
    assert_eq!(info.chunk_indexes.len(), 1);
    let offsets = &info.chunk_indexes[0].message_index_offsets;
    assert!(offsets.contains_key(&a));
    assert!(offsets.contains_key(&b));
}

#[test]
fn single_chunk_when_under_threshold() {
    let options = WriteOptions::new().chunk_size_threshold(1024 * 1024);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let channel = writer
        .register_channel("/data", "raw", 0, BTreeMap::new())
        .unwrap();
    for i in 0..10u64 {
        writer.write_message(channel, i as u32, i, i, b"tiny").unwrap();
    }
    let bytes = writer.into_inner().unwrap();
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    assert_eq!(reader.info().chunk_indexes.len(), 1);
}

#[test]
fn disabling_chunking_writes_messages_directly_with_no_chunk_index() {
    let options = WriteOptions::new().use_chunks(false);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let channel = writer
        .register_channel("/data", "raw", 0, BTreeMap::new())
        .unwrap();
    for i in 0..5u64 {
        writer.write_message(channel, i as u32, i, i, b"m").unwrap();
    }
    let bytes = writer.into_inner().unwrap();
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    assert!(reader.info().chunk_indexes.is_empty());
    assert_eq!(reader.info().statistics.unwrap().message_count, 5);
}

#[test]
fn disabling_repeat_schemas_and_channels_writes_each_id_into_the_data_section_once() {
    // Tiny threshold forces many chunks, each referencing the same schema
    // and channel.
    let options = WriteOptions::new()
        .compression(Compression::None)
        .chunk_size_threshold(16)
        .repeat_schemas(false)
        .repeat_channels(false);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let schema = writer.register_schema("S", "raw", b"def").unwrap();
    let channel = writer
        .register_channel("/data", "raw", schema, BTreeMap::new())
        .unwrap();
    for i in 0..20u64 {
        writer
            .write_message(channel, i as u32, i, i, &vec![0u8; 8])
            .unwrap();
    }
    let bytes = writer.into_inner().unwrap();

    // The indexed reader still sees exactly one schema/channel, and every
    // message, regardless of how many chunks they were split across.
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let info = reader.info();
    assert!(info.chunk_indexes.len() > 1, "test needs several chunks");
    assert_eq!(info.schemas.len(), 1);
    assert_eq!(info.channels.len(), 1);
    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 20);

    // A full linear scan of the data section sees exactly one Schema record
    // and one Channel record in the whole file, not one per chunk.
    let mut streaming = StreamingReader::new();
    streaming.append(&bytes);
    let mut schema_count = 0;
    let mut channel_count = 0;
    while let Some(result) = streaming.next_record() {
        match result.unwrap() {
            Record::Schema(_) => schema_count += 1,
            Record::Channel(_) => channel_count += 1,
            _ => {}
        }
    }
    assert_eq!(schema_count, 1);
    assert_eq!(channel_count, 1);
}

#[test]
fn reading_falls_back_to_a_linear_scan_when_message_index_is_disabled() {
    let options = WriteOptions::new()
        .compression(Compression::None)
        .chunk_size_threshold(64)
        .use_message_index(false);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let channel = writer
        .register_channel("/data", "raw", 0, BTreeMap::new())
        .unwrap();
    for i in 0..30u64 {
        writer
            .write_message(channel, i as u32, i, i, &vec![0u8; 8])
            .unwrap();
    }
    let bytes = writer.into_inner().unwrap();

    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let info = reader.info();
    assert!(info.chunk_indexes.len() > 1, "test needs several chunks");
    assert!(
        info.chunk_indexes
            .iter()
            .all(|c| c.message_index_offsets.is_empty()),
        "writer had message indexing disabled"
    );
    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 30);
}
