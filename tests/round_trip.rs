//! End-to-end writer -> indexed reader / streaming reader round trips.

use std::collections::BTreeMap;

use mcap::indexed_reader::{IndexedReader, ReadMessageOptions};
use mcap::streaming_reader::StreamingReader;
use mcap::writer::{WriteOptions, Writer};
use mcap::Compression;

fn write_sample(compression: Compression) -> Vec<u8> {
    let options = WriteOptions::new()
        .profile("test-profile")
        .compression(compression)
        .chunk_size_threshold(64);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();

    let schema_id = writer.register_schema("Pose", "jsonschema", b"{}").unwrap();
    let channel_id = writer
        .register_channel("/pose", "json", schema_id, BTreeMap::new())
        .unwrap();
    let other_channel = writer
        .register_channel("/status", "json", 0, BTreeMap::new())
        .unwrap();

    for i in 0..20u64 {
        writer
            .write_message(channel_id, i as u32, i * 10, i * 10, format!("{{\"i\":{i}}}").as_bytes())
            .unwrap();
    }
    for i in 0..5u64 {
        writer
            .write_message(other_channel, i as u32, i * 100, i * 100, b"ok")
            .unwrap();
    }

    writer
        .write_attachment(5, 5, "calibration.json", "application/json", b"{\"k\":1}")
        .unwrap();
    let mut meta = BTreeMap::new();
    meta.insert("recorded_by".to_string(), "test-harness".to_string());
    writer.write_metadata("recording_info", meta).unwrap();

    writer.into_inner().unwrap()
}

#[test]
fn indexed_reader_reads_back_all_messages_in_time_order() {
    let bytes = write_sample(Compression::None);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let info = reader.info();
    assert_eq!(info.schemas.len(), 1);
    assert_eq!(info.channels.len(), 2);
    assert_eq!(info.statistics.unwrap().message_count, 25);

    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 25);
    for pair in messages.windows(2) {
        assert!(pair[0].log_time <= pair[1].log_time);
    }
}

#[test]
fn indexed_reader_filters_by_topic() {
    let bytes = write_sample(Compression::None);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let messages = reader
        .read_messages(&ReadMessageOptions {
            topics: Some(vec!["/status".to_string()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(messages.len(), 5);
    assert!(messages.iter().all(|m| m.channel.topic == "/status"));
}

#[test]
fn indexed_reader_filters_by_time_range() {
    let bytes = write_sample(Compression::None);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let messages = reader
        .read_messages(&ReadMessageOptions {
            start_time: Some(50),
            end_time: Some(150),
            ..Default::default()
        })
        .unwrap();
    assert!(messages.iter().all(|m| m.log_time >= 50 && m.log_time <= 150));
    assert!(!messages.is_empty());
}

#[test]
fn indexed_reader_reverse_order() {
    let bytes = write_sample(Compression::None);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let messages = reader
        .read_messages(&ReadMessageOptions {
            reverse: true,
            ..Default::default()
        })
        .unwrap();
    for pair in messages.windows(2) {
        assert!(pair[0].log_time >= pair[1].log_time);
    }
}

#[test]
fn streaming_reader_reads_back_all_messages() {
    let bytes = write_sample(Compression::None);
    let mut reader = StreamingReader::new();
    reader.append(&bytes);

    let mut count = 0;
    while let Some(result) = reader.next_message() {
        result.unwrap();
        count += 1;
    }
    reader.finish().unwrap();
    assert_eq!(count, 25);
}

#[test]
fn streaming_reader_tolerates_fed_in_pieces() {
    let bytes = write_sample(Compression::None);
    let mut reader = StreamingReader::new();
    let mut count = 0;
    for chunk in bytes.chunks(7) {
        reader.append(chunk);
        while let Some(result) = reader.next_message() {
            result.unwrap();
            count += 1;
        }
    }
    reader.finish().unwrap();
    assert_eq!(count, 25);
}

#[test]
fn indexed_reader_reads_back_attachment_and_metadata() {
    let bytes = write_sample(Compression::None);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let info = reader.info();

    assert_eq!(info.attachment_indexes.len(), 1);
    let attachment = reader.read_attachment(&info.attachment_indexes[0]).unwrap();
    assert_eq!(attachment.name, "calibration.json");
    assert_eq!(attachment.media_type, "application/json");
    assert_eq!(attachment.log_time, 5);
    assert_eq!(attachment.create_time, 5);
    assert_eq!(attachment.data, b"{\"k\":1}");

    assert_eq!(info.metadata_indexes.len(), 1);
    let metadata = reader.read_metadata(&info.metadata_indexes[0]).unwrap();
    assert_eq!(metadata.name, "recording_info");
    assert_eq!(
        metadata.metadata.get("recorded_by").map(String::as_str),
        Some("test-harness")
    );
}

#[cfg(feature = "zstd")]
#[test]
fn round_trips_through_zstd_compressed_chunks() {
    let bytes = write_sample(Compression::Zstd);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 25);
}

#[cfg(feature = "lz4")]
#[test]
fn round_trips_through_lz4_compressed_chunks() {
    let bytes = write_sample(Compression::Lz4);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 25);
}
