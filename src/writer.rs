//! The writer (spec §4.3, component C3): a state machine that serializes a
//! Header, zero or more chunks (or raw records, if chunking is disabled),
//! DataEnd, a summary section, and a Footer, in that order.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use crc32fast::Hasher as Crc32Hasher;
use log::{debug, warn};

use crate::chunk::ChunkBuilder;
use crate::codec::{self, MAGIC};
use crate::compression::Compression;
use crate::records::{
    op, AttachmentHeader, AttachmentIndex, ChannelRecord, ChunkIndex, DataEnd, Header, Metadata,
    MetadataIndex, MessageRecord, SchemaRecord, Statistics, SummaryOffset,
};
use crate::{McapError, McapResult};

/// Construction-time choices for a [`Writer`] (spec §4.3's configuration
/// table). Built with the builder pattern and handed to [`Writer::with_options`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    profile: String,
    library: String,
    use_chunks: bool,
    chunk_size_threshold: u64,
    compression: Compression,
    use_statistics: bool,
    use_chunk_index: bool,
    use_message_index: bool,
    use_attachment_index: bool,
    use_metadata_index: bool,
    use_summary_offsets: bool,
    repeat_schemas: bool,
    repeat_channels: bool,
    start_channel_id: u16,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            profile: String::new(),
            library: concat!("mcap-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            use_chunks: true,
            chunk_size_threshold: 1024 * 1024,
            compression: default_compression(),
            use_statistics: true,
            use_chunk_index: true,
            use_message_index: true,
            use_attachment_index: true,
            use_metadata_index: true,
            use_summary_offsets: true,
            repeat_schemas: true,
            repeat_channels: true,
            start_channel_id: 0,
        }
    }
}

fn default_compression() -> Compression {
    #[cfg(feature = "zstd")]
    {
        Compression::Zstd
    }
    #[cfg(all(not(feature = "zstd"), feature = "lz4"))]
    {
        Compression::Lz4
    }
    #[cfg(all(not(feature = "zstd"), not(feature = "lz4")))]
    {
        Compression::None
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn library(mut self, library: impl Into<String>) -> Self {
        self.library = library.into();
        self
    }

    pub fn use_chunks(mut self, yes: bool) -> Self {
        self.use_chunks = yes;
        self
    }

    pub fn chunk_size_threshold(mut self, bytes: u64) -> Self {
        self.chunk_size_threshold = bytes;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn use_statistics(mut self, yes: bool) -> Self {
        self.use_statistics = yes;
        self
    }

    pub fn use_chunk_index(mut self, yes: bool) -> Self {
        self.use_chunk_index = yes;
        self
    }

    pub fn use_message_index(mut self, yes: bool) -> Self {
        self.use_message_index = yes;
        self
    }

    pub fn use_attachment_index(mut self, yes: bool) -> Self {
        self.use_attachment_index = yes;
        self
    }

    pub fn use_metadata_index(mut self, yes: bool) -> Self {
        self.use_metadata_index = yes;
        self
    }

    pub fn use_summary_offsets(mut self, yes: bool) -> Self {
        self.use_summary_offsets = yes;
        self
    }

    pub fn repeat_schemas(mut self, yes: bool) -> Self {
        self.repeat_schemas = yes;
        self
    }

    pub fn repeat_channels(mut self, yes: bool) -> Self {
        self.repeat_channels = yes;
        self
    }

    pub fn start_channel_id(mut self, id: u16) -> Self {
        self.start_channel_id = id;
        self
    }
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Data,
    Ended,
    Closed,
}

/// A group of consecutive records in the summary section, tracked so a
/// SummaryOffset record can point back to it (spec §3, "SummaryOffset").
struct SummaryGroup {
    opcode: u8,
    start: u64,
    length: u64,
}

/// Writes an MCAP file to any `W: Write`. Not seekable: every field that
/// depends on a later position (chunk lengths, the footer) is computed by
/// buffering just enough to know the length before emitting the envelope,
/// never by seeking backwards.
pub struct Writer<W: Write> {
    sink: Option<W>,
    options: WriteOptions,
    state: State,
    file_offset: u64,
    data_crc: Crc32Hasher,
    summary_crc: Crc32Hasher,

    schemas: BTreeMap<u16, SchemaRecord>,
    channels: BTreeMap<u16, ChannelRecord>,
    next_schema_id: u16,
    next_channel_id: u16,

    current_chunk: Option<ChunkBuilder>,
    chunk_start_offset: u64,
    /// Schema/channel ids that have been written into at least one chunk's
    /// inner stream so far. Consulted only when `repeat_schemas`/
    /// `repeat_channels` is `false`, to skip writing an id into the file's
    /// data section more than once (spec §4.2, §4.3).
    emitted_schema_ids: HashSet<u16>,
    emitted_channel_ids: HashSet<u16>,

    chunk_indexes: Vec<ChunkIndex>,
    attachment_indexes: Vec<AttachmentIndex>,
    metadata_indexes: Vec<MetadataIndex>,
    statistics: Statistics,

    attachment_in_progress: Option<AttachmentInProgress>,
}

struct AttachmentInProgress {
    header: AttachmentHeader,
    declared_length: u64,
    written: u64,
    data: Vec<u8>,
    offset: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(sink: W) -> McapResult<Self> {
        Self::with_options(sink, WriteOptions::default())
    }

    pub fn with_options(sink: W, options: WriteOptions) -> McapResult<Self> {
        let next_channel_id = if options.start_channel_id == 0 {
            1
        } else {
            options.start_channel_id
        };
        let mut writer = Self {
            sink: Some(sink),
            options,
            state: State::Data,
            file_offset: 0,
            data_crc: Crc32Hasher::new(),
            summary_crc: Crc32Hasher::new(),
            schemas: BTreeMap::new(),
            channels: BTreeMap::new(),
            next_schema_id: 1,
            next_channel_id,
            current_chunk: None,
            chunk_start_offset: 0,
            emitted_schema_ids: HashSet::new(),
            emitted_channel_ids: HashSet::new(),
            chunk_indexes: Vec::new(),
            attachment_indexes: Vec::new(),
            metadata_indexes: Vec::new(),
            statistics: Statistics::default(),
            attachment_in_progress: None,
        };
        writer.write_raw(&MAGIC)?;
        let header = Header {
            profile: writer.options.profile.clone(),
            library: writer.options.library.clone(),
        };
        let mut payload = Vec::new();
        codec::encode_header(&mut payload, &header);
        // The Header record precedes the data section and is not covered by
        // data_section_crc, so it's framed with write_raw, not write_data_record.
        let mut framed = Vec::new();
        codec::write_envelope(&mut framed, op::HEADER, payload.len() as u64);
        framed.extend_from_slice(&payload);
        writer.write_raw(&framed)?;
        Ok(writer)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> McapResult<()> {
        let sink = self.sink.as_mut().ok_or(McapError::WriterClosed)?;
        sink.write_all(bytes)?;
        self.file_offset += bytes.len() as u64;
        Ok(())
    }

    /// Finalizes the file (if not already done) and returns the underlying
    /// sink, e.g. to flush or close a file handle explicitly rather than
    /// relying on `Drop`.
    pub fn into_inner(mut self) -> McapResult<W> {
        self.end()?;
        self.sink.take().ok_or(McapError::WriterClosed)
    }

    /// Writes a framed record directly to the data section, updating the
    /// running `data_section_crc` (spec §3, "DataEnd").
    fn write_data_record(&mut self, opcode: u8, payload: &[u8]) -> McapResult<()> {
        let mut framed = Vec::with_capacity(payload.len() + 9);
        codec::write_envelope(&mut framed, opcode, payload.len() as u64);
        framed.extend_from_slice(payload);
        self.data_crc.update(&framed);
        self.write_raw(&framed)
    }

    /// Registers a schema and returns its id. Schema id 0 ("no schema") is
    /// never returned; pass `None` as a channel's schema instead.
    ///
    /// Re-registering the exact same name/encoding/data returns the existing
    /// id; anything else about the content differing mints a new id rather
    /// than erroring, so logging an updated definition under the same name
    /// (schema evolution) is a normal, successful call.
    pub fn register_schema(&mut self, name: &str, encoding: &str, data: &[u8]) -> McapResult<u16> {
        if self.next_schema_id == 0 {
            return Err(McapError::TooManySchemas);
        }
        if let Some(existing) = self
            .schemas
            .values()
            .find(|s| s.name == name && s.encoding == encoding && s.data == data)
        {
            return Ok(existing.id);
        }
        let id = self.next_schema_id;
        self.next_schema_id = self
            .next_schema_id
            .checked_add(1)
            .ok_or(McapError::TooManySchemas)?;
        self.schemas.insert(
            id,
            SchemaRecord {
                id,
                name: name.to_string(),
                encoding: encoding.to_string(),
                data: data.to_vec(),
            },
        );
        self.statistics.schema_count += 1;
        Ok(id)
    }

    /// Registers a channel and returns its id. `schema_id` of `0` means the
    /// channel has no schema.
    ///
    /// Re-registering the exact same topic/schema/encoding/metadata returns
    /// the existing id; anything else about the content differing mints a new
    /// id for the same topic rather than erroring.
    pub fn register_channel(
        &mut self,
        topic: &str,
        message_encoding: &str,
        schema_id: u16,
        metadata: BTreeMap<String, String>,
    ) -> McapResult<u16> {
        if schema_id != 0 && !self.schemas.contains_key(&schema_id) {
            return Err(McapError::UnknownSchema(topic.to_string(), schema_id));
        }
        if let Some(existing) = self.channels.values().find(|c| {
            c.topic == topic
                && c.schema_id == schema_id
                && c.message_encoding == message_encoding
                && c.metadata == metadata
        }) {
            return Ok(existing.id);
        }
        let id = self.next_channel_id;
        self.next_channel_id = self
            .next_channel_id
            .checked_add(1)
            .ok_or(McapError::TooManyChannels)?;
        self.channels.insert(
            id,
            ChannelRecord {
                id,
                schema_id,
                topic: topic.to_string(),
                message_encoding: message_encoding.to_string(),
                metadata,
            },
        );
        self.statistics.channel_count += 1;
        Ok(id)
    }

    /// Writes one message. `channel_id` must have been returned by
    /// [`Writer::register_channel`].
    pub fn write_message(
        &mut self,
        channel_id: u16,
        sequence: u32,
        log_time: u64,
        publish_time: u64,
        data: &[u8],
    ) -> McapResult<()> {
        if self.state != State::Data {
            return Err(McapError::WriterClosed);
        }
        let channel = self
            .channels
            .get(&channel_id)
            .ok_or(McapError::UnknownChannel(sequence, channel_id))?
            .clone();
        let message = MessageRecord {
            channel_id,
            sequence,
            log_time,
            publish_time,
            data: data.to_vec(),
        };

        if self.statistics.message_count == 0 || log_time < self.statistics.message_start_time {
            self.statistics.message_start_time = log_time;
        }
        self.statistics.message_end_time = self.statistics.message_end_time.max(log_time);
        self.statistics.message_count += 1;
        *self
            .statistics
            .channel_message_counts
            .entry(channel_id)
            .or_insert(0) += 1;

        if self.options.use_chunks {
            self.write_to_known_channel(&channel, &message)?;
        } else {
            let mut payload = Vec::new();
            codec::encode_message(&mut payload, &message);
            self.write_data_record(op::MESSAGE, &payload)?;
        }
        Ok(())
    }

    /// Writes a message whose channel/schema are already known to be
    /// registered, skipping the lookups `write_message` does. A performance
    /// escape hatch for callers writing many messages on the same channel.
    pub fn write_to_known_channel(
        &mut self,
        channel: &ChannelRecord,
        message: &MessageRecord,
    ) -> McapResult<()> {
        if self.current_chunk.is_none() {
            self.chunk_start_offset = self.file_offset;
            self.current_chunk = Some(ChunkBuilder::new());
        }
        let builder = self.current_chunk.as_mut().expect("just ensured Some");
        if channel.schema_id != 0 && !builder.has_schema(channel.schema_id) {
            if self.options.repeat_schemas || !self.emitted_schema_ids.contains(&channel.schema_id) {
                let schema = self
                    .schemas
                    .get(&channel.schema_id)
                    .ok_or_else(|| McapError::UnknownSchema(channel.topic.clone(), channel.schema_id))?;
                builder.add_schema(schema)?;
                self.emitted_schema_ids.insert(channel.schema_id);
            } else {
                // Already written to an earlier chunk and repeat_schemas is
                // off: satisfy the chunk's own "schema seen" bookkeeping
                // without writing another copy into this chunk.
                builder.mark_schema_known(channel.schema_id);
            }
        }
        if !builder.has_channel(channel.id) {
            if self.options.repeat_channels || !self.emitted_channel_ids.contains(&channel.id) {
                builder.add_channel(channel)?;
                self.emitted_channel_ids.insert(channel.id);
            } else {
                builder.mark_channel_known(channel.id);
            }
        }
        builder.add_message(message)?;

        if builder.uncompressed_size() >= self.options.chunk_size_threshold {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> McapResult<()> {
        let Some(builder) = self.current_chunk.take() else {
            return Ok(());
        };
        if builder.message_count() == 0 {
            return Ok(());
        }
        let chunk_start_offset = self.chunk_start_offset;
        let (chunk, message_indexes) = builder.finish(self.options.compression)?;
        debug!(
            "flushing chunk at offset {chunk_start_offset} ({} messages, {} -> {} bytes)",
            chunk.message_end_time.saturating_sub(chunk.message_start_time),
            chunk.uncompressed_size,
            chunk.records.len()
        );

        let mut payload = Vec::new();
        codec::encode_chunk_header_fields(
            &mut payload,
            chunk.message_start_time,
            chunk.message_end_time,
            chunk.uncompressed_size,
            chunk.uncompressed_crc,
            &chunk.compression,
            chunk.records.len() as u64,
        );
        payload.extend_from_slice(&chunk.records);
        self.write_data_record(op::CHUNK, &payload)?;
        let chunk_length = self.file_offset - chunk_start_offset;

        let mut message_index_offsets = BTreeMap::new();
        let message_index_start = self.file_offset;
        if self.options.use_message_index {
            for index in &message_indexes {
                let offset = self.file_offset;
                let mut idx_payload = Vec::new();
                codec::encode_message_index(&mut idx_payload, index);
                self.write_data_record(op::MESSAGE_INDEX, &idx_payload)?;
                message_index_offsets.insert(index.channel_id, offset);
            }
        }
        let message_index_length = self.file_offset - message_index_start;

        self.statistics.chunk_count += 1;
        if self.options.use_chunk_index {
            self.chunk_indexes.push(ChunkIndex {
                message_start_time: chunk.message_start_time,
                message_end_time: chunk.message_end_time,
                chunk_start_offset,
                chunk_length,
                message_index_offsets,
                message_index_length,
                compression: chunk.compression,
                compressed_size: chunk.records.len() as u64,
                uncompressed_size: chunk.uncompressed_size,
            });
        }
        Ok(())
    }

    /// Writes an attachment in one call.
    pub fn write_attachment(
        &mut self,
        log_time: u64,
        create_time: u64,
        name: &str,
        media_type: &str,
        data: &[u8],
    ) -> McapResult<()> {
        self.start_attachment(log_time, create_time, name, media_type, data.len() as u64)?;
        self.write_attachment_data(data)?;
        self.finish_attachment()
    }

    /// Begins a streamed attachment write. Exactly `declared_length` bytes
    /// must be passed to [`Writer::write_attachment_data`] before
    /// [`Writer::finish_attachment`].
    pub fn start_attachment(
        &mut self,
        log_time: u64,
        create_time: u64,
        name: &str,
        media_type: &str,
        declared_length: u64,
    ) -> McapResult<()> {
        if self.attachment_in_progress.is_some() {
            return Err(McapError::UsageError(
                "an attachment write is already in progress".to_string(),
            ));
        }
        if self.options.use_chunks {
            self.flush_chunk()?;
        }
        self.attachment_in_progress = Some(AttachmentInProgress {
            header: AttachmentHeader {
                log_time,
                create_time,
                name: name.to_string(),
                media_type: media_type.to_string(),
            },
            declared_length,
            written: 0,
            data: Vec::with_capacity(declared_length.min(1 << 20) as usize),
            offset: self.file_offset,
        });
        Ok(())
    }

    pub fn write_attachment_data(&mut self, chunk: &[u8]) -> McapResult<()> {
        let in_progress = self
            .attachment_in_progress
            .as_mut()
            .ok_or(McapError::AttachmentNotInProgress)?;
        let new_written = in_progress.written + chunk.len() as u64;
        if new_written > in_progress.declared_length {
            return Err(McapError::AttachmentTooLarge {
                excess: new_written - in_progress.declared_length,
                attachment_length: in_progress.declared_length,
            });
        }
        in_progress.data.extend_from_slice(chunk);
        in_progress.written = new_written;
        Ok(())
    }

    pub fn finish_attachment(&mut self) -> McapResult<()> {
        let in_progress = self
            .attachment_in_progress
            .take()
            .ok_or(McapError::AttachmentNotInProgress)?;
        if in_progress.written != in_progress.declared_length {
            return Err(McapError::AttachmentIncomplete {
                expected: in_progress.declared_length,
                current: in_progress.written,
            });
        }
        let crc = crate::io_util::crc32(&in_progress.data);
        let mut payload = Vec::new();
        codec::encode_attachment_header(&mut payload, &in_progress.header);
        let data_len = in_progress.data.len() as u64;
        payload.extend_from_slice(&data_len.to_le_bytes());
        payload.extend_from_slice(&in_progress.data);
        payload.extend_from_slice(&crc.to_le_bytes());
        self.write_data_record(op::ATTACHMENT, &payload)?;

        self.statistics.attachment_count += 1;
        if self.options.use_attachment_index {
            self.attachment_indexes.push(AttachmentIndex {
                offset: in_progress.offset,
                length: self.file_offset - in_progress.offset,
                log_time: in_progress.header.log_time,
                create_time: in_progress.header.create_time,
                data_size: data_len,
                name: in_progress.header.name,
                media_type: in_progress.header.media_type,
            });
        }
        Ok(())
    }

    pub fn write_metadata(&mut self, name: &str, metadata: BTreeMap<String, String>) -> McapResult<()> {
        if self.options.use_chunks {
            self.flush_chunk()?;
        }
        let offset = self.file_offset;
        let mut payload = Vec::new();
        codec::encode_metadata(
            &mut payload,
            &Metadata {
                name: name.to_string(),
                metadata,
            },
        );
        self.write_data_record(op::METADATA, &payload)?;
        self.statistics.metadata_count += 1;
        if self.options.use_metadata_index {
            self.metadata_indexes.push(MetadataIndex {
                offset,
                length: self.file_offset - offset,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Finalizes the file: flushes any open chunk, writes DataEnd, the
    /// summary section, the Footer, and trailing magic. Idempotent after the
    /// first successful call.
    pub fn end(&mut self) -> McapResult<()> {
        if self.state == State::Ended || self.state == State::Closed {
            return Ok(());
        }
        if self.attachment_in_progress.is_some() {
            return Err(McapError::UsageError(
                "attachment write left in progress when end() was called".to_string(),
            ));
        }
        self.flush_chunk()?;

        let data_section_crc = self.data_crc.clone().finalize();
        let mut data_end_payload = Vec::new();
        codec::encode_data_end(&mut data_end_payload, &DataEnd { data_section_crc });
        // DataEnd itself is outside the CRC it reports, so it is written with
        // write_raw's framing rather than write_data_record.
        let mut framed = Vec::new();
        codec::write_envelope(&mut framed, op::DATA_END, data_end_payload.len() as u64);
        framed.extend_from_slice(&data_end_payload);
        self.write_raw(&framed)?;

        self.write_summary_section()?;
        self.state = State::Ended;
        Ok(())
    }

    fn write_summary_section(&mut self) -> McapResult<()> {
        let summary_start = self.file_offset;
        self.summary_crc = Crc32Hasher::new();
        let mut groups = Vec::new();

        if self.options.repeat_schemas && !self.schemas.is_empty() {
            let start = self.file_offset;
            let schemas: Vec<_> = self.schemas.values().cloned().collect();
            for schema in &schemas {
                let mut payload = Vec::new();
                codec::encode_schema(&mut payload, schema);
                self.write_summary_record(op::SCHEMA, &payload)?;
            }
            groups.push(SummaryGroup {
                opcode: op::SCHEMA,
                start,
                length: self.file_offset - start,
            });
        }

        if self.options.repeat_channels && !self.channels.is_empty() {
            let start = self.file_offset;
            let channels: Vec<_> = self.channels.values().cloned().collect();
            for channel in &channels {
                let mut payload = Vec::new();
                codec::encode_channel(&mut payload, channel);
                self.write_summary_record(op::CHANNEL, &payload)?;
            }
            groups.push(SummaryGroup {
                opcode: op::CHANNEL,
                start,
                length: self.file_offset - start,
            });
        }

        if !self.chunk_indexes.is_empty() {
            let start = self.file_offset;
            let chunk_indexes = self.chunk_indexes.clone();
            for index in &chunk_indexes {
                let mut payload = Vec::new();
                codec::encode_chunk_index(&mut payload, index);
                self.write_summary_record(op::CHUNK_INDEX, &payload)?;
            }
            groups.push(SummaryGroup {
                opcode: op::CHUNK_INDEX,
                start,
                length: self.file_offset - start,
            });
        }

        if !self.attachment_indexes.is_empty() {
            let start = self.file_offset;
            let attachment_indexes = self.attachment_indexes.clone();
            for index in &attachment_indexes {
                let mut payload = Vec::new();
                codec::encode_attachment_index(&mut payload, index);
                self.write_summary_record(op::ATTACHMENT_INDEX, &payload)?;
            }
            groups.push(SummaryGroup {
                opcode: op::ATTACHMENT_INDEX,
                start,
                length: self.file_offset - start,
            });
        }

        if !self.metadata_indexes.is_empty() {
            let start = self.file_offset;
            let metadata_indexes = self.metadata_indexes.clone();
            for index in &metadata_indexes {
                let mut payload = Vec::new();
                codec::encode_metadata_index(&mut payload, index);
                self.write_summary_record(op::METADATA_INDEX, &payload)?;
            }
            groups.push(SummaryGroup {
                opcode: op::METADATA_INDEX,
                start,
                length: self.file_offset - start,
            });
        }

        if self.options.use_statistics {
            let start = self.file_offset;
            let mut payload = Vec::new();
            codec::encode_statistics(&mut payload, &self.statistics);
            self.write_summary_record(op::STATISTICS, &payload)?;
            groups.push(SummaryGroup {
                opcode: op::STATISTICS,
                start,
                length: self.file_offset - start,
            });
        }

        let summary_offset_start = if self.options.use_summary_offsets && !groups.is_empty() {
            let start = self.file_offset;
            for group in &groups {
                let mut payload = Vec::new();
                codec::encode_summary_offset(
                    &mut payload,
                    &SummaryOffset {
                        group_opcode: group.opcode,
                        group_start: group.start,
                        group_length: group.length,
                    },
                );
                self.write_summary_record(op::SUMMARY_OFFSET, &payload)?;
            }
            start
        } else {
            0
        };

        // Footer: opcode + length + summary_start + summary_offset_start are
        // part of the summary_crc; the crc field itself is not.
        let mut footer_partial = Vec::new();
        footer_partial.push(op::FOOTER);
        footer_partial.extend_from_slice(&20u64.to_le_bytes());
        footer_partial.extend_from_slice(&summary_start.to_le_bytes());
        footer_partial.extend_from_slice(&summary_offset_start.to_le_bytes());

        // summary_crc covers the whole summary section plus the footer's
        // non-crc fields, starting at summary_start; fed incrementally as
        // each summary record was written since self.sink isn't seekable.
        let mut hasher = self.summary_crc.clone();
        hasher.update(&footer_partial);
        let summary_crc = hasher.finalize();

        self.write_raw(&footer_partial)?;
        self.write_raw(&summary_crc.to_le_bytes())?;
        self.write_raw(&MAGIC)?;
        Ok(())
    }

    fn write_summary_record(&mut self, opcode: u8, payload: &[u8]) -> McapResult<()> {
        let mut framed = Vec::with_capacity(payload.len() + 9);
        codec::write_envelope(&mut framed, opcode, payload.len() as u64);
        framed.extend_from_slice(payload);
        self.summary_crc.update(&framed);
        self.write_raw(&framed)
    }
}

impl<W: Write> Drop for Writer<W> {
    fn drop(&mut self) {
        if self.state == State::Data {
            if let Err(e) = self.end() {
                warn!("failed to finalize MCAP file on drop: {e}");
            }
        }
    }
}
