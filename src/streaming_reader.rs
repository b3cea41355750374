//! The streaming reader (spec §4.4, component C4): a pull-based parser that
//! consumes appended byte slices and yields records as soon as they're fully
//! buffered, tolerating a truncated tail so partially-written files are still
//! readable up to the last complete record.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{trace, warn};

use crate::codec::{self, MAGIC};
use crate::compression::DecompressHandler;
use crate::records::{op, Record};
use crate::{Channel, McapError, McapResult, Message, Schema};

/// Construction-time choices for a [`StreamingReader`].
#[derive(Debug, Clone)]
pub struct StreamingReaderOptions {
    /// Skip expecting the 8-byte leading magic. Set this when reading a
    /// sub-stream that's known to start mid-file (e.g. a chunk's inner
    /// stream handed to a reader recursively) rather than a full MCAP file.
    pub no_magic_prefix: bool,
    /// Decompress Chunk records internally and yield the Schema/Channel/
    /// Message records inside them instead of the raw Chunk (spec §4.4,
    /// "chunk transparency").
    pub transparent_chunks: bool,
    /// Verify a transparent chunk's `uncompressed_crc` against its
    /// decompressed bytes. Only meaningful when `transparent_chunks` is set.
    pub validate_chunk_crcs: bool,
}

impl Default for StreamingReaderOptions {
    fn default() -> Self {
        Self {
            no_magic_prefix: false,
            transparent_chunks: true,
            validate_chunk_crcs: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Phase {
    BeforeMagic,
    Records,
    AfterFooter,
    Done,
}

/// Pull-based MCAP parser. Feed it bytes with [`StreamingReader::append`] as
/// they arrive (from a file, a socket, anywhere) and pull parsed records out
/// with [`StreamingReader::next_record`].
pub struct StreamingReader {
    options: StreamingReaderOptions,
    buf: Vec<u8>,
    pos: usize,
    phase: Phase,

    schemas: HashMap<u16, Arc<Schema>>,
    channels: HashMap<u16, Arc<Channel>>,
    decompress_handlers: HashMap<String, DecompressHandler>,
    pending: VecDeque<Record>,
}

impl StreamingReader {
    pub fn new() -> Self {
        Self::with_options(StreamingReaderOptions::default())
    }

    pub fn with_options(options: StreamingReaderOptions) -> Self {
        let phase = if options.no_magic_prefix {
            Phase::Records
        } else {
            Phase::BeforeMagic
        };
        Self {
            options,
            buf: Vec::new(),
            pos: 0,
            phase,
            schemas: HashMap::new(),
            channels: HashMap::new(),
            decompress_handlers: crate::compression::default_decompress_handlers(),
            pending: VecDeque::new(),
        }
    }

    pub fn decompress_handlers_mut(&mut self) -> &mut HashMap<String, DecompressHandler> {
        &mut self.decompress_handlers
    }

    /// Buffers more input. Call [`StreamingReader::next_record`] afterward to
    /// drain whatever records are now fully available.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.compact();
    }

    fn compact(&mut self) {
        if self.pos > 0 && self.pos * 2 > self.buf.len() {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Pulls the next fully-buffered record, or `None` if more input is
    /// needed (not an error: [`StreamingReader::finish`] distinguishes "need
    /// more bytes" from "the stream really did end here unexpectedly").
    pub fn next_record(&mut self) -> Option<McapResult<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(self.observe(record));
            }

            match self.phase {
                Phase::BeforeMagic => {
                    if self.remaining().len() < MAGIC.len() {
                        return None;
                    }
                    if self.remaining()[..MAGIC.len()] != MAGIC {
                        return Some(Err(McapError::InvalidMagic));
                    }
                    self.pos += MAGIC.len();
                    self.phase = Phase::Records;
                }
                Phase::Records => {
                    match self.try_parse_one() {
                        ParseOutcome::NeedMoreData => return None,
                        ParseOutcome::Error(e) => return Some(Err(e)),
                        ParseOutcome::Record(record) => {
                            if record.opcode() == op::FOOTER {
                                self.phase = Phase::AfterFooter;
                            }
                            if self.options.transparent_chunks {
                                if let Record::Chunk(chunk) = &record {
                                    match self.expand_chunk(chunk) {
                                        Ok(inner) => {
                                            self.pending.extend(inner);
                                            continue;
                                        }
                                        Err(e) => return Some(Err(e)),
                                    }
                                }
                            }
                            return Some(self.observe(record));
                        }
                    }
                }
                Phase::AfterFooter => {
                    if self.remaining().len() < MAGIC.len() {
                        return None;
                    }
                    if self.remaining()[..MAGIC.len()] != MAGIC {
                        return Some(Err(McapError::TruncatedTail));
                    }
                    self.pos += MAGIC.len();
                    self.phase = Phase::Done;
                }
                Phase::Done => return None,
            }
        }
    }

    /// Convenience wrapper over [`StreamingReader::next_record`] that skips
    /// non-Message records and resolves the channel, for callers that just
    /// want the message stream.
    pub fn next_message(&mut self) -> Option<McapResult<Message>> {
        loop {
            match self.next_record()? {
                Ok(Record::Message(m)) => {
                    let channel = match self.channels.get(&m.channel_id) {
                        Some(c) => c.clone(),
                        None => {
                            return Some(Err(McapError::UnknownChannel(m.sequence, m.channel_id)))
                        }
                    };
                    return Some(Ok(Message {
                        channel,
                        sequence: m.sequence,
                        log_time: m.log_time,
                        publish_time: m.publish_time,
                        data: m.data,
                    }));
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Signals that no more bytes are coming. Returns an error if a record
    /// was left partially buffered (spec §7, `TruncatedTail`) or if the
    /// trailing magic was never seen; returns `Ok` for a file that ended
    /// cleanly, or one that ended mid-data-section (spec's "streaming reader
    /// tolerates truncation" requirement) with at least a valid Header read.
    pub fn finish(&mut self) -> McapResult<()> {
        match self.phase {
            Phase::Done => Ok(()),
            Phase::BeforeMagic => Err(McapError::InvalidMagic),
            Phase::AfterFooter => Err(McapError::TruncatedTail),
            Phase::Records => {
                if self.remaining().is_empty() {
                    Ok(())
                } else {
                    warn!(
                        "stream ended with {} unconsumed trailing bytes",
                        self.remaining().len()
                    );
                    Err(McapError::TruncatedTail)
                }
            }
        }
    }

    fn try_parse_one(&mut self) -> ParseOutcome {
        let data = self.remaining();
        if data.len() < 9 {
            return ParseOutcome::NeedMoreData;
        }
        let opcode = data[0];
        let len = u64::from_le_bytes(data[1..9].try_into().unwrap()) as usize;
        if data.len() < 9 + len {
            return ParseOutcome::NeedMoreData;
        }
        let payload = &data[9..9 + len];
        let record = match codec::decode_record(opcode, payload) {
            Ok(r) => r,
            Err(e) => return ParseOutcome::Error(e),
        };
        self.pos += 9 + len;
        ParseOutcome::Record(record)
    }

    /// Applies consistency bookkeeping (spec §7: `UnknownChannel`,
    /// `UnknownSchema`, `InconsistentRecord` for conflicting duplicate ids)
    /// to a record about to be handed to the caller.
    fn observe(&mut self, record: Record) -> McapResult<Record> {
        match &record {
            Record::Schema(s) => {
                if let Some(existing) = self.schemas.get(&s.id) {
                    if existing.name != s.name || existing.encoding != s.encoding || existing.data != s.data
                    {
                        return Err(McapError::InconsistentRecord {
                            opcode: op::SCHEMA,
                            reason: format!("schema id {} redefined with different contents", s.id),
                        });
                    }
                } else {
                    self.schemas.insert(
                        s.id,
                        Arc::new(Schema {
                            id: s.id,
                            name: s.name.clone(),
                            encoding: s.encoding.clone(),
                            data: s.data.clone(),
                        }),
                    );
                }
            }
            Record::Channel(c) => {
                let schema = if c.schema_id == 0 {
                    None
                } else {
                    match self.schemas.get(&c.schema_id) {
                        Some(s) => Some(s.clone()),
                        None => return Err(McapError::UnknownSchema(c.topic.clone(), c.schema_id)),
                    }
                };
                if let Some(existing) = self.channels.get(&c.id) {
                    if existing.topic != c.topic
                        || existing.message_encoding != c.message_encoding
                        || existing.schema.as_ref().map(|s| s.id) != schema.as_ref().map(|s| s.id)
                    {
                        return Err(McapError::InconsistentRecord {
                            opcode: op::CHANNEL,
                            reason: format!("channel id {} redefined with different contents", c.id),
                        });
                    }
                } else {
                    self.channels.insert(
                        c.id,
                        Arc::new(Channel {
                            id: c.id,
                            schema,
                            topic: c.topic.clone(),
                            message_encoding: c.message_encoding.clone(),
                            metadata: c.metadata.clone(),
                        }),
                    );
                }
            }
            Record::Message(m) => {
                if !self.channels.contains_key(&m.channel_id) {
                    return Err(McapError::UnknownChannel(m.sequence, m.channel_id));
                }
            }
            _ => {}
        }
        Ok(record)
    }

    fn expand_chunk(&mut self, chunk: &crate::records::ChunkRecord) -> McapResult<Vec<Record>> {
        trace!(
            "expanding chunk ({} -> {} bytes, {})",
            chunk.records.len(),
            chunk.uncompressed_size,
            if chunk.compression.is_empty() {
                "uncompressed"
            } else {
                &chunk.compression
            }
        );
        let decompressed = if chunk.compression.is_empty() {
            chunk.records.clone()
        } else {
            let handler = self
                .decompress_handlers
                .get(&chunk.compression)
                .ok_or_else(|| McapError::UnsupportedCompression(chunk.compression.clone()))?;
            handler(&chunk.records, chunk.uncompressed_size)?
        };
        if self.options.validate_chunk_crcs && chunk.uncompressed_crc != 0 {
            let computed = crate::io_util::crc32(&decompressed);
            if computed != chunk.uncompressed_crc {
                return Err(McapError::CrcMismatch {
                    expected: chunk.uncompressed_crc,
                    computed,
                });
            }
        }
        let mut records = Vec::new();
        let mut cursor = 0usize;
        while cursor < decompressed.len() {
            if decompressed.len() < cursor + 9 {
                return Err(McapError::malformed(
                    0,
                    cursor as u64,
                    "truncated record envelope inside chunk",
                ));
            }
            let opcode = decompressed[cursor];
            let len =
                u64::from_le_bytes(decompressed[cursor + 1..cursor + 9].try_into().unwrap()) as usize;
            let payload_start = cursor + 9;
            let payload_end = payload_start
                .checked_add(len)
                .filter(|&e| e <= decompressed.len())
                .ok_or_else(|| {
                    McapError::malformed(opcode, cursor as u64, "record payload overruns chunk")
                })?;
            records.push(codec::decode_record(opcode, &decompressed[payload_start..payload_end])?);
            cursor = payload_end;
        }
        Ok(records)
    }
}

impl Default for StreamingReader {
    fn default() -> Self {
        Self::new()
    }
}

enum ParseOutcome {
    NeedMoreData,
    Record(Record),
    Error(McapError),
}
