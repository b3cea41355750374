//! Chunk builder (spec §4.2, component C2): accumulates Schema, Channel and
//! Message records into an in-memory inner stream, tracking the bookkeeping
//! (message index offsets, time bounds, which ids have already been written)
//! a [`crate::writer::Writer`] needs to close the chunk out.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use crate::codec;
use crate::compression::Compression;
use crate::io_util::CountingCrcWriter;
use crate::records::{
    ChannelRecord, ChunkRecord, MessageHeader, MessageIndex, MessageIndexEntry, MessageRecord,
    SchemaRecord,
};
use crate::{McapError, McapResult};

/// Builds one chunk's worth of records. A fresh `ChunkBuilder` is started
/// every time the writer opens a chunk and consumed by [`ChunkBuilder::finish`]
/// when the chunk is closed (by size threshold or by `Writer::end`).
pub struct ChunkBuilder {
    sink: CountingCrcWriter<Vec<u8>>,
    written_schemas: HashSet<u16>,
    written_channels: HashSet<u16>,
    message_indexes: BTreeMap<u16, Vec<MessageIndexEntry>>,
    message_start_time: Option<u64>,
    message_end_time: u64,
    message_count: u64,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self {
            sink: CountingCrcWriter::new(Vec::new()),
            written_schemas: HashSet::new(),
            written_channels: HashSet::new(),
            message_indexes: BTreeMap::new(),
            message_start_time: None,
            message_end_time: 0,
            message_count: 0,
        }
    }

    /// Bytes written to the inner stream so far (uncompressed).
    pub fn uncompressed_size(&self) -> u64 {
        self.sink.position()
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn has_schema(&self, id: u16) -> bool {
        self.written_schemas.contains(&id)
    }

    pub fn has_channel(&self, id: u16) -> bool {
        self.written_channels.contains(&id)
    }

    /// Writes a Schema record into this chunk if it hasn't been written to it
    /// already (spec §4.2: "a chunk records which schema/channel ids it has
    /// already written and skips duplicates").
    pub fn add_schema(&mut self, schema: &SchemaRecord) -> McapResult<()> {
        if self.written_schemas.insert(schema.id) {
            let mut payload = Vec::new();
            codec::encode_schema(&mut payload, schema);
            write_framed(&mut self.sink, crate::records::op::SCHEMA, &payload)?;
        }
        Ok(())
    }

    /// Writes a Channel record into this chunk if it hasn't been written to
    /// it already.
    pub fn add_channel(&mut self, channel: &ChannelRecord) -> McapResult<()> {
        if self.written_channels.insert(channel.id) {
            let mut payload = Vec::new();
            codec::encode_channel(&mut payload, channel);
            write_framed(&mut self.sink, crate::records::op::CHANNEL, &payload)?;
        }
        Ok(())
    }

    /// Marks a schema id as known to this chunk without writing a Schema
    /// record into it. Used when the writer has `repeat_schemas` disabled and
    /// the schema was already written to an earlier chunk in the file; a
    /// message on this id still needs `add_message`'s "is this id known"
    /// check to pass.
    pub fn mark_schema_known(&mut self, id: u16) {
        self.written_schemas.insert(id);
    }

    /// Channel counterpart to [`ChunkBuilder::mark_schema_known`].
    pub fn mark_channel_known(&mut self, id: u16) {
        self.written_channels.insert(id);
    }

    /// Writes a Message record, recording its offset within the chunk's
    /// inner stream for the eventual per-channel MessageIndex.
    pub fn add_message(&mut self, message: &MessageRecord) -> McapResult<()> {
        if !self.written_channels.contains(&message.channel_id) {
            return Err(McapError::UsageError(format!(
                "channel id {} was not registered in this chunk before the message that references it",
                message.channel_id
            )));
        }
        let offset = self.sink.position();
        let mut payload = Vec::new();
        codec::encode_message_header(
            &mut payload,
            &MessageHeader {
                channel_id: message.channel_id,
                sequence: message.sequence,
                log_time: message.log_time,
                publish_time: message.publish_time,
            },
        );
        payload.extend_from_slice(&message.data);
        write_framed(&mut self.sink, crate::records::op::MESSAGE, &payload)?;

        self.message_indexes
            .entry(message.channel_id)
            .or_default()
            .push(MessageIndexEntry {
                log_time: message.log_time,
                offset,
            });
        self.message_start_time = Some(match self.message_start_time {
            Some(t) => t.min(message.log_time),
            None => message.log_time,
        });
        self.message_end_time = self.message_end_time.max(message.log_time);
        self.message_count += 1;
        Ok(())
    }

    /// Closes the chunk: compresses the inner stream with `compression`,
    /// returning the finished [`ChunkRecord`] plus one [`MessageIndex`] per
    /// channel that had messages in this chunk (spec §3, "MessageIndex").
    pub fn finish(self, compression: Compression) -> McapResult<(ChunkRecord, Vec<MessageIndex>)> {
        let (inner, size, crc) = self.sink.finalize();
        let compressed = compression.compress(&inner)?;
        let chunk = ChunkRecord {
            message_start_time: self.message_start_time.unwrap_or(0),
            message_end_time: self.message_end_time,
            uncompressed_size: size,
            uncompressed_crc: crc,
            compression: compression.as_str().to_string(),
            records: compressed,
        };
        let indexes = self
            .message_indexes
            .into_iter()
            .map(|(channel_id, records)| MessageIndex {
                channel_id,
                records,
            })
            .collect();
        Ok((chunk, indexes))
    }
}

impl Default for ChunkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_framed<W: Write>(sink: &mut W, opcode: u8, payload: &[u8]) -> McapResult<()> {
    let mut envelope = Vec::with_capacity(9);
    codec::write_envelope(&mut envelope, opcode, payload.len() as u64);
    sink.write_all(&envelope)?;
    sink.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn schema(id: u16) -> SchemaRecord {
        SchemaRecord {
            id,
            name: "S".into(),
            encoding: "raw".into(),
            data: vec![],
        }
    }

    fn channel(id: u16, schema_id: u16) -> ChannelRecord {
        ChannelRecord {
            id,
            schema_id,
            topic: "/t".into(),
            message_encoding: "raw".into(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn dedupes_schema_and_channel_writes() {
        let mut builder = ChunkBuilder::new();
        builder.add_schema(&schema(1)).unwrap();
        let size_after_first = builder.uncompressed_size();
        builder.add_schema(&schema(1)).unwrap();
        assert_eq!(builder.uncompressed_size(), size_after_first);
    }

    #[test]
    fn tracks_message_index_and_time_bounds() {
        let mut builder = ChunkBuilder::new();
        builder.add_schema(&schema(1)).unwrap();
        builder.add_channel(&channel(1, 1)).unwrap();
        builder
            .add_message(&MessageRecord {
                channel_id: 1,
                sequence: 0,
                log_time: 5,
                publish_time: 5,
                data: vec![1, 2, 3],
            })
            .unwrap();
        builder
            .add_message(&MessageRecord {
                channel_id: 1,
                sequence: 1,
                log_time: 2,
                publish_time: 2,
                data: vec![4],
            })
            .unwrap();
        assert_eq!(builder.message_count(), 2);
        let (chunk, indexes) = builder.finish(Compression::None).unwrap();
        assert_eq!(chunk.message_start_time, 2);
        assert_eq!(chunk.message_end_time, 5);
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].records.len(), 2);
    }

    #[test]
    fn message_on_unregistered_channel_is_usage_error() {
        let mut builder = ChunkBuilder::new();
        let err = builder
            .add_message(&MessageRecord {
                channel_id: 9,
                sequence: 0,
                log_time: 0,
                publish_time: 0,
                data: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, McapError::UsageError(_)));
    }
}
