//! Compression selection and the decompression handler table.

use std::collections::BTreeMap;

use mcap::indexed_reader::{IndexedReader, ReadMessageOptions};
use mcap::streaming_reader::StreamingReader;
use mcap::writer::{WriteOptions, Writer};
use mcap::{Compression, McapError};

fn write_one_message(compression: Compression) -> Vec<u8> {
    let options = WriteOptions::new().compression(compression);
    let mut writer = Writer::with_options(Vec::new(), options).unwrap();
    let channel = writer
        .register_channel("/t", "raw", 0, BTreeMap::new())
        .unwrap();
    writer.write_message(channel, 0, 0, 0, b"payload").unwrap();
    writer.into_inner().unwrap()
}

#[test]
fn compression_display_names() {
    assert_eq!(Compression::None.to_string(), "none");
    #[cfg(feature = "zstd")]
    assert_eq!(Compression::Zstd.to_string(), "zstd");
    #[cfg(feature = "lz4")]
    assert_eq!(Compression::Lz4.to_string(), "lz4");
}

#[test]
fn none_compression_round_trips() {
    let bytes = write_one_message(Compression::None);
    let reader = IndexedReader::new(bytes.as_slice()).unwrap();
    let messages = reader.read_messages(&ReadMessageOptions::default()).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data, b"payload");
}

#[cfg(feature = "lz4")]
#[test]
fn removing_a_decompress_handler_surfaces_unsupported_compression() {
    let bytes = write_one_message(Compression::Lz4);
    let mut reader = IndexedReader::new(bytes.as_slice()).unwrap();
    reader.decompress_handlers_mut().remove("lz4");
    let err = reader
        .read_messages(&ReadMessageOptions::default())
        .unwrap_err();
    assert!(matches!(err, McapError::UnsupportedCompression(scheme) if scheme == "lz4"));
}

#[cfg(feature = "zstd")]
#[test]
fn streaming_reader_without_handler_errors_on_compressed_chunk() {
    let bytes = write_one_message(Compression::Zstd);
    let mut reader = StreamingReader::new();
    reader.decompress_handlers_mut().remove("zstd");
    reader.append(&bytes);
    let mut saw_error = false;
    while let Some(result) = reader.next_record() {
        if let Err(McapError::UnsupportedCompression(scheme)) = &result {
            assert_eq!(scheme, "zstd");
            saw_error = true;
            break;
        }
    }
    assert!(saw_error);
}
