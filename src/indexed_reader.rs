//! The indexed (random-access) reader (spec §4.5, component C5): opens a file
//! by its footer, reads the summary section once, and serves time-ordered,
//! optionally topic-filtered reads by merging only the chunks that overlap
//! the query.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use log::warn;

use crate::codec::{self, MAGIC};
use crate::compression::DecompressHandler;
use crate::records::{
    op, AttachmentIndex, ChannelRecord, ChunkIndex, Footer, Header, MetadataIndex, Record,
    SchemaRecord, Statistics, SummaryOffset,
};
use crate::{Channel, McapError, McapResult, Message, Schema};

/// An abstraction over a random-access byte source (spec §6's `IReadable`):
/// a file's total size and the ability to read an arbitrary byte range.
/// Implemented here for an in-memory buffer and for a real file; callers can
/// implement it for anything else a file's bytes might live behind (a
/// network range-read client, a memory-mapped region, and so on).
pub trait ReadAt {
    fn size(&self) -> McapResult<u64>;
    fn read_at(&self, offset: u64, len: u64) -> McapResult<Vec<u8>>;
}

impl ReadAt for &[u8] {
    fn size(&self) -> McapResult<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, len: u64) -> McapResult<Vec<u8>> {
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&e| e <= self.len())
            .ok_or(McapError::BadIndex)?;
        Ok(self[start..end].to_vec())
    }
}

impl ReadAt for Vec<u8> {
    fn size(&self) -> McapResult<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, offset: u64, len: u64) -> McapResult<Vec<u8>> {
        self.as_slice().read_at(offset, len)
    }
}

#[cfg(unix)]
impl ReadAt for std::fs::File {
    fn size(&self) -> McapResult<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_at(&self, offset: u64, len: u64) -> McapResult<Vec<u8>> {
        use std::os::unix::fs::FileExt;
        let mut buf = vec![0u8; len as usize];
        self.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

/// Query options for [`IndexedReader::read_messages`] (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct ReadMessageOptions {
    /// Only messages on these topics. `None` means all topics.
    pub topics: Option<Vec<String>>,
    /// Inclusive lower bound on `log_time`. `None` means unbounded.
    pub start_time: Option<u64>,
    /// Inclusive upper bound on `log_time`. `None` means unbounded.
    pub end_time: Option<u64>,
    /// Yield messages in descending `log_time` order instead of ascending.
    pub reverse: bool,
}

/// Everything the summary section told us, independent of any query: schema
/// and channel tables, statistics, and the index lists. Returned by
/// [`IndexedReader::info`].
#[derive(Debug, Clone)]
pub struct Summary {
    pub header: Header,
    pub schemas: BTreeMap<u16, Arc<Schema>>,
    pub channels: BTreeMap<u16, Arc<Channel>>,
    pub statistics: Option<Statistics>,
    pub chunk_indexes: Vec<ChunkIndex>,
    pub attachment_indexes: Vec<AttachmentIndex>,
    pub metadata_indexes: Vec<MetadataIndex>,
}

#[derive(Debug)]
pub struct IndexedReader<R: ReadAt> {
    source: R,
    header: Header,
    footer: Footer,
    schemas_by_id: BTreeMap<u16, Arc<Schema>>,
    channels_by_id: BTreeMap<u16, Arc<Channel>>,
    chunk_indexes: Vec<ChunkIndex>,
    attachment_indexes: Vec<AttachmentIndex>,
    metadata_indexes: Vec<MetadataIndex>,
    statistics: Option<Statistics>,
    summary_offsets_by_opcode: BTreeMap<u8, SummaryOffset>,
    decompress_handlers: HashMap<String, DecompressHandler>,
}

const FOOTER_PAYLOAD_LEN: u64 = 20;
const FOOTER_RECORD_LEN: u64 = 1 + 8 + FOOTER_PAYLOAD_LEN; // opcode + length + payload

impl<R: ReadAt> IndexedReader<R> {
    /// Opens `source` for random-access reads: validates the leading and
    /// trailing magic, parses the footer, and loads the summary section.
    /// Fails with [`McapError::NotIndexed`] if the file has no summary
    /// section (spec §7).
    pub fn new(source: R) -> McapResult<Self> {
        let size = source.size()?;
        if size < (MAGIC.len() as u64) * 2 + FOOTER_RECORD_LEN {
            return Err(McapError::TruncatedTail);
        }

        let leading_magic = source.read_at(0, MAGIC.len() as u64)?;
        if leading_magic != MAGIC {
            return Err(McapError::InvalidMagic);
        }
        let trailing_magic = source.read_at(size - MAGIC.len() as u64, MAGIC.len() as u64)?;
        if trailing_magic != MAGIC {
            return Err(McapError::TruncatedTail);
        }

        let footer_offset = size - MAGIC.len() as u64 - FOOTER_RECORD_LEN;
        let footer_record = source.read_at(footer_offset, FOOTER_RECORD_LEN)?;
        if footer_record[0] != op::FOOTER {
            return Err(McapError::malformed(
                footer_record[0],
                footer_offset,
                "expected Footer record at end of file",
            ));
        }
        let declared_len = u64::from_le_bytes(footer_record[1..9].try_into().unwrap());
        if declared_len != FOOTER_PAYLOAD_LEN {
            return Err(McapError::malformed(
                op::FOOTER,
                footer_offset,
                format!("footer payload length {declared_len} != {FOOTER_PAYLOAD_LEN}"),
            ));
        }
        let footer = codec::decode_footer(&footer_record[9..])?;

        if footer.summary_start == 0 {
            return Err(McapError::NotIndexed);
        }
        if footer.summary_start > footer_offset {
            return Err(McapError::BadIndex);
        }

        let summary_len = footer_offset - footer.summary_start;
        let summary_bytes = source.read_at(footer.summary_start, summary_len)?;

        if footer.summary_crc != 0 {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&summary_bytes);
            // footer bytes covered by the crc: opcode + length + the two
            // offset fields, excluding the crc field itself.
            hasher.update(&footer_record[..9 + 16]);
            let computed = hasher.finalize();
            if computed != footer.summary_crc {
                warn!(
                    "summary CRC mismatch: file declares {:#010x}, computed {:#010x}",
                    footer.summary_crc, computed
                );
                return Err(McapError::CrcMismatch {
                    expected: footer.summary_crc,
                    computed,
                });
            }
        }

        let header = read_header(&source)?;

        let mut schema_records: BTreeMap<u16, SchemaRecord> = BTreeMap::new();
        let mut channel_records: BTreeMap<u16, ChannelRecord> = BTreeMap::new();
        let mut chunk_indexes = Vec::new();
        let mut attachment_indexes = Vec::new();
        let mut metadata_indexes = Vec::new();
        let mut statistics = None;
        let mut summary_offsets_by_opcode = BTreeMap::new();

        let mut cursor = 0usize;
        while cursor < summary_bytes.len() {
            let (record, next) = read_one_record(&summary_bytes, cursor, footer.summary_start)?;
            cursor = next;
            match record {
                Record::Schema(s) => {
                    schema_records.insert(s.id, s);
                }
                Record::Channel(c) => {
                    channel_records.insert(c.id, c);
                }
                Record::ChunkIndex(c) => chunk_indexes.push(c),
                Record::AttachmentIndex(a) => attachment_indexes.push(a),
                Record::MetadataIndex(m) => metadata_indexes.push(m),
                Record::Statistics(s) => statistics = Some(s),
                Record::SummaryOffset(s) => {
                    summary_offsets_by_opcode.insert(s.group_opcode, s);
                }
                _ => {}
            }
        }

        chunk_indexes.sort_by_key(|c| c.message_start_time);

        let mut schemas_by_id = BTreeMap::new();
        for (id, s) in &schema_records {
            schemas_by_id.insert(
                *id,
                Arc::new(Schema {
                    id: *id,
                    name: s.name.clone(),
                    encoding: s.encoding.clone(),
                    data: s.data.clone(),
                }),
            );
        }

        let mut channels_by_id = BTreeMap::new();
        for (id, c) in &channel_records {
            let schema = if c.schema_id == 0 {
                None
            } else {
                Some(
                    schemas_by_id
                        .get(&c.schema_id)
                        .ok_or(McapError::UnknownSchema(c.topic.clone(), c.schema_id))?
                        .clone(),
                )
            };
            channels_by_id.insert(
                *id,
                Arc::new(Channel {
                    id: *id,
                    schema,
                    topic: c.topic.clone(),
                    message_encoding: c.message_encoding.clone(),
                    metadata: c.metadata.clone(),
                }),
            );
        }

        Ok(Self {
            source,
            header,
            footer,
            schemas_by_id,
            channels_by_id,
            chunk_indexes,
            attachment_indexes,
            metadata_indexes,
            statistics,
            summary_offsets_by_opcode,
            decompress_handlers: crate::compression::default_decompress_handlers(),
        })
    }

    pub fn decompress_handlers_mut(&mut self) -> &mut HashMap<String, DecompressHandler> {
        &mut self.decompress_handlers
    }

    /// The summary-section-only view of this file: schema/channel tables,
    /// statistics, and index lists, without reading a single chunk.
    pub fn info(&self) -> Summary {
        Summary {
            header: self.header.clone(),
            schemas: self.schemas_by_id.clone(),
            channels: self.channels_by_id.clone(),
            statistics: self.statistics.clone(),
            chunk_indexes: self.chunk_indexes.clone(),
            attachment_indexes: self.attachment_indexes.clone(),
            metadata_indexes: self.metadata_indexes.clone(),
        }
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    /// Reads and decodes the full attachment an [`AttachmentIndex`] points at,
    /// verifying its CRC (skipped if the writer left it as `0`, meaning "not
    /// computed").
    pub fn read_attachment(&self, index: &AttachmentIndex) -> McapResult<crate::Attachment> {
        let envelope = self.source.read_at(index.offset, 9)?;
        if envelope[0] != op::ATTACHMENT {
            return Err(McapError::malformed(
                envelope[0],
                index.offset,
                "AttachmentIndex did not point at an Attachment record",
            ));
        }
        let len = u64::from_le_bytes(envelope[1..9].try_into().unwrap());
        let payload = self.source.read_at(index.offset + 9, len)?;
        let record = codec::decode_attachment(&payload)?;

        if record.crc != 0 {
            let computed = crate::io_util::crc32(&record.data);
            if computed != record.crc {
                return Err(McapError::CrcMismatch {
                    expected: record.crc,
                    computed,
                });
            }
        }

        Ok(crate::Attachment {
            log_time: record.log_time,
            create_time: record.create_time,
            name: record.name,
            media_type: record.media_type,
            data: record.data,
        })
    }

    /// Reads and decodes the full metadata record a [`MetadataIndex`] points
    /// at.
    pub fn read_metadata(&self, index: &MetadataIndex) -> McapResult<crate::Metadata> {
        let envelope = self.source.read_at(index.offset, 9)?;
        if envelope[0] != op::METADATA {
            return Err(McapError::malformed(
                envelope[0],
                index.offset,
                "MetadataIndex did not point at a Metadata record",
            ));
        }
        let len = u64::from_le_bytes(envelope[1..9].try_into().unwrap());
        let payload = self.source.read_at(index.offset + 9, len)?;
        let record = codec::decode_metadata(&payload)?;
        Ok(crate::Metadata {
            name: record.name,
            metadata: record.metadata,
        })
    }

    /// Reads messages matching `options`, merged into time order across
    /// however many chunks overlap the query. Chunks outside the requested
    /// time range or with no message on a requested topic are never read or
    /// decompressed (spec §8, testable property 7).
    pub fn read_messages(&self, options: &ReadMessageOptions) -> McapResult<Vec<Message>> {
        let wanted_channels: Option<HashSet<u16>> = options.topics.as_ref().map(|topics| {
            self.channels_by_id
                .values()
                .filter(|c| topics.iter().any(|t| t == &c.topic))
                .map(|c| c.id)
                .collect()
        });

        let start_time = options.start_time.unwrap_or(0);
        let end_time = options.end_time.unwrap_or(u64::MAX);

        let mut candidates: Vec<&ChunkIndex> = self
            .chunk_indexes
            .iter()
            .filter(|c| c.message_start_time <= end_time && c.message_end_time >= start_time)
            .filter(|c| match &wanted_channels {
                None => true,
                Some(wanted) => c
                    .message_index_offsets
                    .keys()
                    .any(|id| wanted.contains(id)),
            })
            .collect();

        if options.reverse {
            candidates.sort_by(|a, b| b.message_end_time.cmp(&a.message_end_time));
        } else {
            candidates.sort_by_key(|c| c.message_start_time);
        }

        let mut chunk_heap: BinaryHeap<ChunkCandidate> = candidates
            .iter()
            .enumerate()
            .map(|(idx, c)| ChunkCandidate {
                key: if options.reverse {
                    c.message_end_time
                } else {
                    c.message_start_time
                },
                idx,
                reverse: options.reverse,
            })
            .collect();

        let mut msg_heap: BinaryHeap<MsgCandidate> = BinaryHeap::new();
        let mut out = Vec::new();

        loop {
            // Load chunks until it's safe to emit the current best message
            // (no not-yet-loaded chunk could contain something earlier).
            while let Some(next_chunk) = chunk_heap.peek() {
                let safe_to_emit = match msg_heap.peek() {
                    Some(top) => {
                        if options.reverse {
                            top.log_time >= next_chunk.key
                        } else {
                            top.log_time <= next_chunk.key
                        }
                    }
                    None => false,
                };
                if safe_to_emit {
                    break;
                }
                let ChunkCandidate { idx, .. } = chunk_heap.pop().unwrap();
                let chunk_index = candidates[idx];
                let messages = self.load_chunk_messages(
                    chunk_index,
                    &wanted_channels,
                    start_time,
                    end_time,
                )?;
                for m in messages {
                    msg_heap.push(MsgCandidate {
                        log_time: m.log_time,
                        channel_id: m.channel.id,
                        sequence: m.sequence,
                        reverse: options.reverse,
                        message: m,
                    });
                }
            }

            match msg_heap.pop() {
                Some(candidate) => out.push(candidate.message),
                None => break,
            }
        }

        Ok(out)
    }

    fn load_chunk_messages(
        &self,
        chunk_index: &ChunkIndex,
        wanted_channels: &Option<HashSet<u16>>,
        start_time: u64,
        end_time: u64,
    ) -> McapResult<Vec<Message>> {
        let record_bytes = self
            .source
            .read_at(chunk_index.chunk_start_offset, chunk_index.chunk_length)?;
        let (record, _) = read_one_record(&record_bytes, 0, chunk_index.chunk_start_offset)?;
        let chunk = match record {
            Record::Chunk(c) => c,
            other => {
                return Err(McapError::malformed(
                    other.opcode(),
                    chunk_index.chunk_start_offset,
                    "ChunkIndex pointed at a non-Chunk record",
                ))
            }
        };
        if chunk.compression != chunk_index.compression
            || chunk.uncompressed_size != chunk_index.uncompressed_size
        {
            warn!(
                "chunk at offset {} disagrees with its ChunkIndex (compression {:?} vs {:?}, size {} vs {})",
                chunk_index.chunk_start_offset,
                chunk.compression,
                chunk_index.compression,
                chunk.uncompressed_size,
                chunk_index.uncompressed_size
            );
        }

        let decompressed = if chunk.compression.is_empty() {
            chunk.records
        } else {
            let handler = self
                .decompress_handlers
                .get(&chunk.compression)
                .ok_or_else(|| McapError::UnsupportedCompression(chunk.compression.clone()))?;
            handler(&chunk.records, chunk.uncompressed_size)?
        };

        let computed_crc = crate::io_util::crc32(&decompressed);
        if chunk.uncompressed_crc != 0 && computed_crc != chunk.uncompressed_crc {
            return Err(McapError::CrcMismatch {
                expected: chunk.uncompressed_crc,
                computed: computed_crc,
            });
        }

        // A writer with message indexing disabled leaves this map empty; fall
        // back to a full scan rather than silently returning nothing.
        if chunk_index.message_index_offsets.is_empty() {
            return self.scan_chunk_linear(&decompressed, chunk_index, wanted_channels, start_time, end_time);
        }

        let mut messages = Vec::new();
        for (&channel_id, &mi_offset) in &chunk_index.message_index_offsets {
            if let Some(wanted) = wanted_channels {
                if !wanted.contains(&channel_id) {
                    continue;
                }
            }
            let index = self.read_message_index(mi_offset)?;
            for entry in &index.records {
                if entry.log_time < start_time || entry.log_time > end_time {
                    continue;
                }
                let (record, _) = read_one_record(
                    &decompressed,
                    entry.offset as usize,
                    chunk_index.chunk_start_offset,
                )?;
                let m = match record {
                    Record::Message(m) => m,
                    other => {
                        return Err(McapError::malformed(
                            other.opcode(),
                            chunk_index.chunk_start_offset + entry.offset,
                            "MessageIndex entry did not point at a Message record",
                        ))
                    }
                };
                let channel = self
                    .channels_by_id
                    .get(&m.channel_id)
                    .ok_or(McapError::UnknownChannel(m.sequence, m.channel_id))?
                    .clone();
                messages.push(Message {
                    channel,
                    sequence: m.sequence,
                    log_time: m.log_time,
                    publish_time: m.publish_time,
                    data: m.data,
                });
            }
        }
        Ok(messages)
    }

    /// Reads and decodes a channel's MessageIndex record directly via its
    /// recorded file offset (spec §4.5), instead of scanning the chunk to
    /// find it.
    fn read_message_index(&self, offset: u64) -> McapResult<crate::records::MessageIndex> {
        let envelope = self.source.read_at(offset, 9)?;
        if envelope[0] != op::MESSAGE_INDEX {
            return Err(McapError::malformed(
                envelope[0],
                offset,
                "message_index_offsets entry did not point at a MessageIndex record",
            ));
        }
        let len = u64::from_le_bytes(envelope[1..9].try_into().unwrap());
        let payload = self.source.read_at(offset + 9, len)?;
        codec::decode_message_index(&payload)
    }

    /// Falls back to a full linear scan of a chunk's decompressed inner
    /// stream for messages, used when its `ChunkIndex` carries no
    /// `message_index_offsets` (the writer had message indexing disabled).
    fn scan_chunk_linear(
        &self,
        decompressed: &[u8],
        chunk_index: &ChunkIndex,
        wanted_channels: &Option<HashSet<u16>>,
        start_time: u64,
        end_time: u64,
    ) -> McapResult<Vec<Message>> {
        let mut messages = Vec::new();
        let mut cursor = 0usize;
        while cursor < decompressed.len() {
            let (record, next) =
                read_one_record(decompressed, cursor, chunk_index.chunk_start_offset)?;
            cursor = next;
            if let Record::Message(m) = record {
                if m.log_time < start_time || m.log_time > end_time {
                    continue;
                }
                if let Some(wanted) = wanted_channels {
                    if !wanted.contains(&m.channel_id) {
                        continue;
                    }
                }
                let channel = self
                    .channels_by_id
                    .get(&m.channel_id)
                    .ok_or(McapError::UnknownChannel(m.sequence, m.channel_id))?
                    .clone();
                messages.push(Message {
                    channel,
                    sequence: m.sequence,
                    log_time: m.log_time,
                    publish_time: m.publish_time,
                    data: m.data,
                });
            }
        }
        Ok(messages)
    }
}

fn read_header<R: ReadAt>(source: &R) -> McapResult<Header> {
    let after_magic = source.read_at(MAGIC.len() as u64, 9)?;
    if after_magic[0] != op::HEADER {
        return Err(McapError::malformed(
            after_magic[0],
            MAGIC.len() as u64,
            "expected Header record after leading magic",
        ));
    }
    let len = u64::from_le_bytes(after_magic[1..9].try_into().unwrap());
    let payload = source.read_at(MAGIC.len() as u64 + 9, len)?;
    codec::decode_header(&payload)
}

/// Parses one `<opcode><length><payload>` record starting at `data[cursor..]`,
/// returning it and the cursor position just past it. `base_offset` is added
/// to `cursor` only for error messages.
fn read_one_record(data: &[u8], cursor: usize, base_offset: u64) -> McapResult<(Record, usize)> {
    if data.len() < cursor + 9 {
        return Err(McapError::malformed(
            0,
            base_offset + cursor as u64,
            "truncated record envelope",
        ));
    }
    let opcode = data[cursor];
    let len = u64::from_le_bytes(data[cursor + 1..cursor + 9].try_into().unwrap()) as usize;
    let payload_start = cursor + 9;
    let payload_end = payload_start
        .checked_add(len)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| {
            McapError::malformed(opcode, base_offset + cursor as u64, "record payload overruns buffer")
        })?;
    let record = codec::decode_record(opcode, &data[payload_start..payload_end])?;
    Ok((record, payload_end))
}

struct ChunkCandidate {
    key: u64,
    idx: usize,
    reverse: bool,
}

impl PartialEq for ChunkCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for ChunkCandidate {}
impl PartialOrd for ChunkCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ChunkCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; negate the comparison so the
        // earliest (or, reversed, latest) key pops first.
        if self.reverse {
            self.key.cmp(&other.key)
        } else {
            other.key.cmp(&self.key)
        }
    }
}

struct MsgCandidate {
    log_time: u64,
    channel_id: u16,
    sequence: u32,
    reverse: bool,
    message: Message,
}

impl PartialEq for MsgCandidate {
    fn eq(&self, other: &Self) -> bool {
        (self.log_time, self.channel_id, self.sequence)
            == (other.log_time, other.channel_id, other.sequence)
    }
}
impl Eq for MsgCandidate {}
impl PartialOrd for MsgCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MsgCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = (self.log_time, self.channel_id, self.sequence);
        let b = (other.log_time, other.channel_id, other.sequence);
        if self.reverse {
            a.cmp(&b)
        } else {
            b.cmp(&a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_read_at_rejects_out_of_bounds() {
        let data: &[u8] = b"hello world";
        assert!(data.read_at(6, 5).is_ok());
        assert!(data.read_at(6, 100).is_err());
    }

    #[test]
    fn new_rejects_too_small_buffer() {
        let data: Vec<u8> = vec![0; 10];
        let err = IndexedReader::new(data.as_slice()).unwrap_err();
        assert!(matches!(err, McapError::TruncatedTail));
    }
}
