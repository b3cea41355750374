//! `mcap` reads and writes [MCAP](https://mcap.dev) files: a container format
//! for timestamped, heterogeneously-schematized pub/sub messages, built around
//! compressed chunks and a two-tier index that makes random-access reads fast
//! without requiring the whole file in memory.
//!
//! The entry points are [`Writer`](writer::Writer) for producing files,
//! [`StreamingReader`](streaming_reader::StreamingReader) for pull-based,
//! truncation-tolerant reading, and
//! [`IndexedReader`](indexed_reader::IndexedReader) for random-access,
//! time-ordered reads over a file with a summary section.

mod chunk;
pub mod codec;
pub mod compression;
mod error;
mod io_util;
pub mod indexed_reader;
pub mod records;
pub mod streaming_reader;
pub mod writer;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use compression::Compression;
pub use error::{McapError, McapResult};
pub use indexed_reader::{IndexedReader, ReadAt};
pub use streaming_reader::StreamingReader;
pub use writer::{WriteOptions, Writer};

/// Leading and trailing magic bytes that bracket every MCAP file (spec §3, §6).
pub const MAGIC: [u8; 8] = codec::MAGIC;

/// Schema id reserved to mean "no schema" (spec §3, "Channel" and "Schema").
pub const NO_SCHEMA_ID: u16 = 0;

/// A registered schema: the shape of the data on one or more channels.
///
/// Cheaply cloned and shared: every [`Message`] holds an `Arc<Channel>`, and
/// every `Channel` holds an `Arc<Schema>` (or `None` for schemaless channels),
/// so a file with a million messages on one channel stores the schema and
/// channel metadata exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub id: u16,
    pub name: String,
    pub encoding: String,
    pub data: Vec<u8>,
}

/// A registered channel: one topic, with a message encoding and an optional
/// schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u16,
    pub schema: Option<Arc<Schema>>,
    pub topic: String,
    pub message_encoding: String,
    pub metadata: BTreeMap<String, String>,
}

/// One message read from or to be written to an MCAP file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: Arc<Channel>,
    pub sequence: u32,
    pub log_time: u64,
    pub publish_time: u64,
    pub data: Vec<u8>,
}

/// An attachment: an arbitrary named blob with a media type, not tied to any
/// channel or schema (spec §3, "Attachment").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub log_time: u64,
    pub create_time: u64,
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// A metadata record: an arbitrary named key/value bag (spec §3, "Metadata").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}
