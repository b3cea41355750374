//! The record codec (spec §4.1, component C1).
//!
//! Each record type gets a pair of free functions: `encode_*` appends the
//! record's payload bytes (without the opcode/length envelope) to a `Vec<u8>`,
//! and `decode_*` parses a payload slice back into the typed record,
//! tolerating trailing bytes (forward compatibility, spec §9) and rejecting
//! payloads shorter than the defined field set with a `MalformedRecord` error
//! that carries the opcode and the byte offset the short read happened at.
//!
//! [`encode_record`]/[`decode_record`] are the "single generic framer" spec §4.1
//! calls for: they dispatch to the per-type functions above and add/strip the
//! `<opcode:u8><length:u64_le><payload>` envelope.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian as LE};

use crate::records::*;
use crate::{McapError, McapResult};

/// Leading/trailing magic bytes (spec §3, §6).
pub const MAGIC: [u8; 8] = [0x89, b'M', b'C', b'A', b'P', 0x30, b'\r', b'\n'];

// ---- primitive field readers/writers -------------------------------------

/// Tracks how far into a record's payload decoding has progressed, so a
/// `MalformedRecord` raised on a short or truncated field carries the real
/// byte offset of the failure (spec §4.1) instead of a constant `0`.
struct Cursor<'a> {
    data: &'a [u8],
    offset: u64,
    opcode: u8,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], opcode: u8) -> Self {
        Self {
            data,
            offset: 0,
            opcode,
        }
    }

    fn need(&self, n: usize) -> McapResult<()> {
        if self.data.len() < n {
            return Err(McapError::malformed(
                self.opcode,
                self.offset,
                format!("expected {n} more bytes, found {}", self.data.len()),
            ));
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let (taken, rest) = self.data.split_at(n);
        self.data = rest;
        self.offset += n as u64;
        taken
    }

    fn u16(&mut self) -> McapResult<u16> {
        self.need(2)?;
        Ok(LE::read_u16(self.take(2)))
    }

    fn u32(&mut self) -> McapResult<u32> {
        self.need(4)?;
        Ok(LE::read_u32(self.take(4)))
    }

    fn u64(&mut self) -> McapResult<u64> {
        self.need(8)?;
        Ok(LE::read_u64(self.take(8)))
    }

    fn bytes(&mut self) -> McapResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.need(len)?;
        Ok(self.take(len))
    }

    fn long_bytes(&mut self) -> McapResult<&'a [u8]> {
        let len = self.u64()? as usize;
        self.need(len)?;
        Ok(self.take(len))
    }

    fn str(&mut self) -> McapResult<&'a str> {
        Ok(std::str::from_utf8(self.bytes()?)?)
    }

    fn str_map(&mut self) -> McapResult<BTreeMap<String, String>> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let start_offset = self.offset;
        let body = self.take(len);
        let mut sub = Cursor {
            data: body,
            offset: start_offset,
            opcode: self.opcode,
        };
        let mut map = BTreeMap::new();
        while !sub.data.is_empty() {
            let k = sub.str()?.to_string();
            let v = sub.str()?.to_string();
            map.insert(k, v);
        }
        Ok(map)
    }

    fn u16_u64_map(&mut self) -> McapResult<BTreeMap<u16, u64>> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let start_offset = self.offset;
        let body = self.take(len);
        let mut sub = Cursor {
            data: body,
            offset: start_offset,
            opcode: self.opcode,
        };
        let mut map = BTreeMap::new();
        while !sub.data.is_empty() {
            let k = sub.u16()?;
            let v = sub.u64()?;
            map.insert(k, v);
        }
        Ok(map)
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}
fn put_bytes(out: &mut Vec<u8>, data: &[u8]) {
    put_u32(out, data.len() as u32);
    out.extend_from_slice(data);
}
fn put_long_bytes(out: &mut Vec<u8>, data: &[u8]) {
    put_u64(out, data.len() as u64);
    out.extend_from_slice(data);
}
fn put_str_map(out: &mut Vec<u8>, map: &BTreeMap<String, String>) {
    let mut body = Vec::new();
    for (k, v) in map {
        put_str(&mut body, k);
        put_str(&mut body, v);
    }
    put_bytes(out, &body);
}
fn put_u16_u64_map(out: &mut Vec<u8>, map: &BTreeMap<u16, u64>) {
    let mut body = Vec::with_capacity(map.len() * 10);
    for (k, v) in map {
        put_u16(&mut body, *k);
        put_u64(&mut body, *v);
    }
    put_bytes(out, &body);
}

// ---- per-record encode/decode ---------------------------------------------

pub fn encode_header(out: &mut Vec<u8>, h: &Header) {
    put_str(out, &h.profile);
    put_str(out, &h.library);
}
pub fn decode_header(data: &[u8]) -> McapResult<Header> {
    let mut cur = Cursor::new(data, op::HEADER);
    let profile = cur.str()?.to_string();
    let library = cur.str()?.to_string();
    Ok(Header { profile, library })
}

pub fn encode_footer(out: &mut Vec<u8>, f: &Footer) {
    put_u64(out, f.summary_start);
    put_u64(out, f.summary_offset_start);
    put_u32(out, f.summary_crc);
}
pub fn decode_footer(data: &[u8]) -> McapResult<Footer> {
    let mut cur = Cursor::new(data, op::FOOTER);
    let summary_start = cur.u64()?;
    let summary_offset_start = cur.u64()?;
    let summary_crc = cur.u32()?;
    Ok(Footer {
        summary_start,
        summary_offset_start,
        summary_crc,
    })
}

pub fn encode_schema(out: &mut Vec<u8>, s: &SchemaRecord) {
    put_u16(out, s.id);
    put_str(out, &s.name);
    put_str(out, &s.encoding);
    put_bytes(out, &s.data);
}
pub fn decode_schema(data: &[u8]) -> McapResult<SchemaRecord> {
    let mut cur = Cursor::new(data, op::SCHEMA);
    let id = cur.u16()?;
    let name = cur.str()?.to_string();
    let encoding = cur.str()?.to_string();
    let data = cur.bytes()?.to_vec();
    Ok(SchemaRecord {
        id,
        name,
        encoding,
        data,
    })
}

pub fn encode_channel(out: &mut Vec<u8>, c: &ChannelRecord) {
    put_u16(out, c.id);
    put_u16(out, c.schema_id);
    put_str(out, &c.topic);
    put_str(out, &c.message_encoding);
    put_str_map(out, &c.metadata);
}
pub fn decode_channel(data: &[u8]) -> McapResult<ChannelRecord> {
    let mut cur = Cursor::new(data, op::CHANNEL);
    let id = cur.u16()?;
    let schema_id = cur.u16()?;
    let topic = cur.str()?.to_string();
    let message_encoding = cur.str()?.to_string();
    let metadata = cur.str_map()?;
    Ok(ChannelRecord {
        id,
        schema_id,
        topic,
        message_encoding,
        metadata,
    })
}

pub fn encode_message_header(out: &mut Vec<u8>, h: &MessageHeader) {
    put_u16(out, h.channel_id);
    put_u32(out, h.sequence);
    put_u64(out, h.log_time);
    put_u64(out, h.publish_time);
}
pub fn decode_message_header(data: &[u8]) -> McapResult<(MessageHeader, &[u8])> {
    let mut cur = Cursor::new(data, op::MESSAGE);
    let channel_id = cur.u16()?;
    let sequence = cur.u32()?;
    let log_time = cur.u64()?;
    let publish_time = cur.u64()?;
    Ok((
        MessageHeader {
            channel_id,
            sequence,
            log_time,
            publish_time,
        },
        cur.data,
    ))
}
pub fn encode_message(out: &mut Vec<u8>, m: &MessageRecord) {
    encode_message_header(
        out,
        &MessageHeader {
            channel_id: m.channel_id,
            sequence: m.sequence,
            log_time: m.log_time,
            publish_time: m.publish_time,
        },
    );
    out.extend_from_slice(&m.data);
}
pub fn decode_message(data: &[u8]) -> McapResult<MessageRecord> {
    let (h, rest) = decode_message_header(data)?;
    Ok(MessageRecord {
        channel_id: h.channel_id,
        sequence: h.sequence,
        log_time: h.log_time,
        publish_time: h.publish_time,
        data: rest.to_vec(),
    })
}

pub fn encode_chunk_header_fields(
    out: &mut Vec<u8>,
    message_start_time: u64,
    message_end_time: u64,
    uncompressed_size: u64,
    uncompressed_crc: u32,
    compression: &str,
    compressed_size: u64,
) {
    put_u64(out, message_start_time);
    put_u64(out, message_end_time);
    put_u64(out, uncompressed_size);
    put_u32(out, uncompressed_crc);
    put_str(out, compression);
    put_u64(out, compressed_size);
}
pub fn decode_chunk(data: &[u8]) -> McapResult<ChunkRecord> {
    let mut cur = Cursor::new(data, op::CHUNK);
    let message_start_time = cur.u64()?;
    let message_end_time = cur.u64()?;
    let uncompressed_size = cur.u64()?;
    let uncompressed_crc = cur.u32()?;
    let compression = cur.str()?.to_string();
    let records = cur.long_bytes()?.to_vec();
    Ok(ChunkRecord {
        message_start_time,
        message_end_time,
        uncompressed_size,
        uncompressed_crc,
        compression,
        records,
    })
}

pub fn encode_message_index(out: &mut Vec<u8>, idx: &MessageIndex) {
    put_u16(out, idx.channel_id);
    let mut body = Vec::with_capacity(idx.records.len() * 16);
    for entry in &idx.records {
        put_u64(&mut body, entry.log_time);
        put_u64(&mut body, entry.offset);
    }
    put_bytes(out, &body);
}
pub fn decode_message_index(data: &[u8]) -> McapResult<MessageIndex> {
    let mut cur = Cursor::new(data, op::MESSAGE_INDEX);
    let channel_id = cur.u16()?;
    let len = cur.u32()? as usize;
    cur.need(len)?;
    let start_offset = cur.offset;
    let body = cur.take(len);
    let mut sub = Cursor {
        data: body,
        offset: start_offset,
        opcode: op::MESSAGE_INDEX,
    };
    let mut records = Vec::new();
    while !sub.data.is_empty() {
        let log_time = sub.u64()?;
        let offset = sub.u64()?;
        records.push(MessageIndexEntry { log_time, offset });
    }
    Ok(MessageIndex {
        channel_id,
        records,
    })
}

pub fn encode_chunk_index(out: &mut Vec<u8>, c: &ChunkIndex) {
    put_u64(out, c.message_start_time);
    put_u64(out, c.message_end_time);
    put_u64(out, c.chunk_start_offset);
    put_u64(out, c.chunk_length);
    put_u16_u64_map(out, &c.message_index_offsets);
    put_u64(out, c.message_index_length);
    put_str(out, &c.compression);
    put_u64(out, c.compressed_size);
    put_u64(out, c.uncompressed_size);
}
pub fn decode_chunk_index(data: &[u8]) -> McapResult<ChunkIndex> {
    let mut cur = Cursor::new(data, op::CHUNK_INDEX);
    let message_start_time = cur.u64()?;
    let message_end_time = cur.u64()?;
    let chunk_start_offset = cur.u64()?;
    let chunk_length = cur.u64()?;
    let message_index_offsets = cur.u16_u64_map()?;
    let message_index_length = cur.u64()?;
    let compression = cur.str()?.to_string();
    let compressed_size = cur.u64()?;
    let uncompressed_size = cur.u64()?;
    Ok(ChunkIndex {
        message_start_time,
        message_end_time,
        chunk_start_offset,
        chunk_length,
        message_index_offsets,
        message_index_length,
        compression,
        compressed_size,
        uncompressed_size,
    })
}

pub fn encode_attachment_header(out: &mut Vec<u8>, h: &AttachmentHeader) {
    put_u64(out, h.log_time);
    put_u64(out, h.create_time);
    put_str(out, &h.name);
    put_str(out, &h.media_type);
}
pub fn decode_attachment(data: &[u8]) -> McapResult<AttachmentRecord> {
    let mut cur = Cursor::new(data, op::ATTACHMENT);
    let log_time = cur.u64()?;
    let create_time = cur.u64()?;
    let name = cur.str()?.to_string();
    let media_type = cur.str()?.to_string();
    let data = cur.long_bytes()?.to_vec();
    let crc = cur.u32()?;
    Ok(AttachmentRecord {
        log_time,
        create_time,
        name,
        media_type,
        data,
        crc,
    })
}

pub fn encode_attachment_index(out: &mut Vec<u8>, a: &AttachmentIndex) {
    put_u64(out, a.offset);
    put_u64(out, a.length);
    put_u64(out, a.log_time);
    put_u64(out, a.create_time);
    put_u64(out, a.data_size);
    put_str(out, &a.name);
    put_str(out, &a.media_type);
}
pub fn decode_attachment_index(data: &[u8]) -> McapResult<AttachmentIndex> {
    let mut cur = Cursor::new(data, op::ATTACHMENT_INDEX);
    let offset = cur.u64()?;
    let length = cur.u64()?;
    let log_time = cur.u64()?;
    let create_time = cur.u64()?;
    let data_size = cur.u64()?;
    let name = cur.str()?.to_string();
    let media_type = cur.str()?.to_string();
    Ok(AttachmentIndex {
        offset,
        length,
        log_time,
        create_time,
        data_size,
        name,
        media_type,
    })
}

pub fn encode_statistics(out: &mut Vec<u8>, s: &Statistics) {
    put_u64(out, s.message_count);
    put_u16(out, s.schema_count);
    put_u32(out, s.channel_count);
    put_u32(out, s.attachment_count);
    put_u32(out, s.metadata_count);
    put_u32(out, s.chunk_count);
    put_u64(out, s.message_start_time);
    put_u64(out, s.message_end_time);
    put_u16_u64_map(out, &s.channel_message_counts);
}
pub fn decode_statistics(data: &[u8]) -> McapResult<Statistics> {
    let mut cur = Cursor::new(data, op::STATISTICS);
    let message_count = cur.u64()?;
    let schema_count = cur.u16()?;
    let channel_count = cur.u32()?;
    let attachment_count = cur.u32()?;
    let metadata_count = cur.u32()?;
    let chunk_count = cur.u32()?;
    let message_start_time = cur.u64()?;
    let message_end_time = cur.u64()?;
    let channel_message_counts = cur.u16_u64_map()?;
    Ok(Statistics {
        message_count,
        schema_count,
        channel_count,
        attachment_count,
        metadata_count,
        chunk_count,
        message_start_time,
        message_end_time,
        channel_message_counts,
    })
}

pub fn encode_metadata(out: &mut Vec<u8>, m: &Metadata) {
    put_str(out, &m.name);
    put_str_map(out, &m.metadata);
}
pub fn decode_metadata(data: &[u8]) -> McapResult<Metadata> {
    let mut cur = Cursor::new(data, op::METADATA);
    let name = cur.str()?.to_string();
    let metadata = cur.str_map()?;
    Ok(Metadata { name, metadata })
}

pub fn encode_metadata_index(out: &mut Vec<u8>, m: &MetadataIndex) {
    put_u64(out, m.offset);
    put_u64(out, m.length);
    put_str(out, &m.name);
}
pub fn decode_metadata_index(data: &[u8]) -> McapResult<MetadataIndex> {
    let mut cur = Cursor::new(data, op::METADATA_INDEX);
    let offset = cur.u64()?;
    let length = cur.u64()?;
    let name = cur.str()?.to_string();
    Ok(MetadataIndex {
        offset,
        length,
        name,
    })
}

pub fn encode_summary_offset(out: &mut Vec<u8>, s: &SummaryOffset) {
    out.push(s.group_opcode);
    put_u64(out, s.group_start);
    put_u64(out, s.group_length);
}
pub fn decode_summary_offset(data: &[u8]) -> McapResult<SummaryOffset> {
    let mut cur = Cursor::new(data, op::SUMMARY_OFFSET);
    cur.need(1)?;
    let group_opcode = cur.take(1)[0];
    let group_start = cur.u64()?;
    let group_length = cur.u64()?;
    Ok(SummaryOffset {
        group_opcode,
        group_start,
        group_length,
    })
}

pub fn encode_data_end(out: &mut Vec<u8>, d: &DataEnd) {
    put_u32(out, d.data_section_crc);
}
pub fn decode_data_end(data: &[u8]) -> McapResult<DataEnd> {
    let mut cur = Cursor::new(data, op::DATA_END);
    let data_section_crc = cur.u32()?;
    Ok(DataEnd { data_section_crc })
}

/// Decodes a record payload given its opcode. Unknown opcodes (0x10-0xFF, or
/// 0x00) are returned as [`Record::Unknown`] rather than erroring, per spec §3
/// ("readers treat unknown opcodes as opaque pass-throughs").
pub fn decode_record(opcode: u8, data: &[u8]) -> McapResult<Record> {
    Ok(match opcode {
        op::HEADER => Record::Header(decode_header(data)?),
        op::FOOTER => Record::Footer(decode_footer(data)?),
        op::SCHEMA => Record::Schema(decode_schema(data)?),
        op::CHANNEL => Record::Channel(decode_channel(data)?),
        op::MESSAGE => Record::Message(decode_message(data)?),
        op::CHUNK => Record::Chunk(decode_chunk(data)?),
        op::MESSAGE_INDEX => Record::MessageIndex(decode_message_index(data)?),
        op::CHUNK_INDEX => Record::ChunkIndex(decode_chunk_index(data)?),
        op::ATTACHMENT => Record::Attachment(decode_attachment(data)?),
        op::ATTACHMENT_INDEX => Record::AttachmentIndex(decode_attachment_index(data)?),
        op::STATISTICS => Record::Statistics(decode_statistics(data)?),
        op::METADATA => Record::Metadata(decode_metadata(data)?),
        op::METADATA_INDEX => Record::MetadataIndex(decode_metadata_index(data)?),
        op::SUMMARY_OFFSET => Record::SummaryOffset(decode_summary_offset(data)?),
        op::DATA_END => Record::DataEnd(decode_data_end(data)?),
        other => Record::Unknown {
            opcode: other,
            data: data.to_vec(),
        },
    })
}

/// Encodes any record (except [`Record::Unknown`], which the caller re-frames
/// with its original opcode) into a payload buffer. Used by tests and by
/// callers re-serializing records they read; the writer and chunk builder
/// call the per-type `encode_*` functions directly since they interleave
/// encoding with CRC computation and offset bookkeeping.
pub fn encode_record_payload(record: &Record) -> Vec<u8> {
    let mut out = Vec::new();
    match record {
        Record::Header(h) => encode_header(&mut out, h),
        Record::Footer(f) => encode_footer(&mut out, f),
        Record::Schema(s) => encode_schema(&mut out, s),
        Record::Channel(c) => encode_channel(&mut out, c),
        Record::Message(m) => encode_message(&mut out, m),
        Record::Chunk(c) => {
            encode_chunk_header_fields(
                &mut out,
                c.message_start_time,
                c.message_end_time,
                c.uncompressed_size,
                c.uncompressed_crc,
                &c.compression,
                c.records.len() as u64,
            );
            out.extend_from_slice(&c.records);
        }
        Record::MessageIndex(i) => encode_message_index(&mut out, i),
        Record::ChunkIndex(i) => encode_chunk_index(&mut out, i),
        Record::Attachment(a) => {
            encode_attachment_header(
                &mut out,
                &AttachmentHeader {
                    log_time: a.log_time,
                    create_time: a.create_time,
                    name: a.name.clone(),
                    media_type: a.media_type.clone(),
                },
            );
            put_long_bytes(&mut out, &a.data);
            put_u32(&mut out, a.crc);
        }
        Record::AttachmentIndex(i) => encode_attachment_index(&mut out, i),
        Record::Statistics(s) => encode_statistics(&mut out, s),
        Record::Metadata(m) => encode_metadata(&mut out, m),
        Record::MetadataIndex(i) => encode_metadata_index(&mut out, i),
        Record::SummaryOffset(s) => encode_summary_offset(&mut out, s),
        Record::DataEnd(d) => encode_data_end(&mut out, d),
        Record::Unknown { data, .. } => out.extend_from_slice(data),
    }
    out
}

/// Writes the `<opcode:u8><length:u64_le>` envelope for a record of the given
/// payload length.
pub fn write_envelope(out: &mut Vec<u8>, opcode: u8, payload_len: u64) {
    out.push(opcode);
    put_u64(out, payload_len);
}

/// Frames and appends a full record (envelope + payload) to `out`.
pub fn encode_record(out: &mut Vec<u8>, record: &Record) {
    let payload = encode_record_payload(record);
    write_envelope(out, record.opcode(), payload.len() as u64);
    out.extend_from_slice(&payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn header_round_trip() {
        let h = Header {
            profile: "ros1".into(),
            library: "test".into(),
        };
        let mut buf = Vec::new();
        encode_header(&mut buf, &h);
        assert_eq!(decode_header(&buf).unwrap(), h);
    }

    #[test]
    fn schema_round_trip() {
        let s = SchemaRecord {
            id: 7,
            name: "Foo".into(),
            encoding: "protobuf".into(),
            data: vec![1, 2, 3, 4],
        };
        let mut buf = Vec::new();
        encode_schema(&mut buf, &s);
        assert_eq!(decode_schema(&buf).unwrap(), s);
    }

    #[test]
    fn channel_round_trip_with_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("a".to_string(), "1".to_string());
        metadata.insert("b".to_string(), "2".to_string());
        let c = ChannelRecord {
            id: 3,
            schema_id: 7,
            topic: "/t".into(),
            message_encoding: "json".into(),
            metadata,
        };
        let mut buf = Vec::new();
        encode_channel(&mut buf, &c);
        assert_eq!(decode_channel(&buf).unwrap(), c);
    }

    #[test]
    fn message_round_trip() {
        let m = MessageRecord {
            channel_id: 1,
            sequence: 9,
            log_time: 10,
            publish_time: 10,
            data: b"hello".to_vec(),
        };
        let mut buf = Vec::new();
        encode_message(&mut buf, &m);
        assert_eq!(decode_message(&buf).unwrap(), m);
    }

    #[test]
    fn chunk_index_round_trip() {
        let mut offsets = BTreeMap::new();
        offsets.insert(1u16, 100u64);
        offsets.insert(2u16, 250u64);
        let ci = ChunkIndex {
            message_start_time: 1,
            message_end_time: 6,
            chunk_start_offset: 50,
            chunk_length: 500,
            message_index_offsets: offsets,
            message_index_length: 40,
            compression: "zstd".into(),
            compressed_size: 200,
            uncompressed_size: 1000,
        };
        let mut buf = Vec::new();
        encode_chunk_index(&mut buf, &ci);
        assert_eq!(decode_chunk_index(&buf).unwrap(), ci);
    }

    #[test]
    fn footer_round_trip() {
        let f = Footer {
            summary_start: 1000,
            summary_offset_start: 2000,
            summary_crc: 0xDEADBEEF,
        };
        let mut buf = Vec::new();
        encode_footer(&mut buf, &f);
        assert_eq!(decode_footer(&buf).unwrap(), f);
    }

    #[test]
    fn chunk_record_round_trip() {
        let c = ChunkRecord {
            message_start_time: 1,
            message_end_time: 9,
            uncompressed_size: 123,
            uncompressed_crc: 0x1234,
            compression: "zstd".into(),
            records: vec![1, 2, 3, 4, 5],
        };
        let payload = encode_record_payload(&Record::Chunk(c.clone()));
        assert_eq!(decode_chunk(&payload).unwrap(), c);
    }

    #[test]
    fn message_index_round_trip() {
        let idx = MessageIndex {
            channel_id: 3,
            records: vec![
                MessageIndexEntry {
                    log_time: 1,
                    offset: 0,
                },
                MessageIndexEntry {
                    log_time: 5,
                    offset: 40,
                },
            ],
        };
        let mut buf = Vec::new();
        encode_message_index(&mut buf, &idx);
        assert_eq!(decode_message_index(&buf).unwrap(), idx);
    }

    #[test]
    fn attachment_round_trip() {
        let a = AttachmentRecord {
            log_time: 1,
            create_time: 2,
            name: "calibration.json".into(),
            media_type: "application/json".into(),
            data: b"{\"k\":1}".to_vec(),
            crc: 0xABCDEF01,
        };
        let payload = encode_record_payload(&Record::Attachment(a.clone()));
        assert_eq!(decode_attachment(&payload).unwrap(), a);
    }

    #[test]
    fn attachment_index_round_trip() {
        let a = AttachmentIndex {
            offset: 10,
            length: 50,
            log_time: 1,
            create_time: 2,
            data_size: 30,
            name: "calibration.json".into(),
            media_type: "application/json".into(),
        };
        let mut buf = Vec::new();
        encode_attachment_index(&mut buf, &a);
        assert_eq!(decode_attachment_index(&buf).unwrap(), a);
    }

    #[test]
    fn statistics_round_trip() {
        let mut channel_message_counts = BTreeMap::new();
        channel_message_counts.insert(1u16, 10u64);
        channel_message_counts.insert(2u16, 20u64);
        let s = Statistics {
            message_count: 30,
            schema_count: 2,
            channel_count: 2,
            attachment_count: 1,
            metadata_count: 1,
            chunk_count: 3,
            message_start_time: 0,
            message_end_time: 100,
            channel_message_counts,
        };
        let mut buf = Vec::new();
        encode_statistics(&mut buf, &s);
        assert_eq!(decode_statistics(&buf).unwrap(), s);
    }

    #[test]
    fn metadata_round_trip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("recorded_by".to_string(), "test-harness".to_string());
        let m = Metadata {
            name: "recording_info".into(),
            metadata,
        };
        let mut buf = Vec::new();
        encode_metadata(&mut buf, &m);
        assert_eq!(decode_metadata(&buf).unwrap(), m);
    }

    #[test]
    fn metadata_index_round_trip() {
        let m = MetadataIndex {
            offset: 10,
            length: 20,
            name: "recording_info".into(),
        };
        let mut buf = Vec::new();
        encode_metadata_index(&mut buf, &m);
        assert_eq!(decode_metadata_index(&buf).unwrap(), m);
    }

    #[test]
    fn summary_offset_round_trip() {
        let s = SummaryOffset {
            group_opcode: op::SCHEMA,
            group_start: 10,
            group_length: 100,
        };
        let mut buf = Vec::new();
        encode_summary_offset(&mut buf, &s);
        assert_eq!(decode_summary_offset(&buf).unwrap(), s);
    }

    #[test]
    fn data_end_round_trip() {
        let d = DataEnd {
            data_section_crc: 0x99887766,
        };
        let mut buf = Vec::new();
        encode_data_end(&mut buf, &d);
        assert_eq!(decode_data_end(&buf).unwrap(), d);
    }

    #[test]
    fn short_payload_is_malformed_not_panic() {
        // Channel record missing everything past `id`.
        let buf = vec![1, 0];
        let err = decode_channel(&buf).unwrap_err();
        assert!(matches!(err, McapError::MalformedRecord { .. }));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let h = Header {
            profile: "".into(),
            library: "lib".into(),
        };
        let mut buf = Vec::new();
        encode_header(&mut buf, &h);
        buf.extend_from_slice(&[0xAA; 16]);
        assert_eq!(decode_header(&buf).unwrap(), h);
    }

    #[test]
    fn duplicate_map_keys_last_writer_wins_on_decode() {
        // Encoding never produces duplicate keys (BTreeMap), but decode must
        // not panic on a hand-crafted payload that has one; last wins.
        let mut body = Vec::new();
        put_str(&mut body, "k");
        put_str(&mut body, "first");
        put_str(&mut body, "k");
        put_str(&mut body, "second");
        let mut payload = Vec::new();
        put_bytes(&mut payload, &body);
        let map = Cursor::new(&payload, op::METADATA).str_map().unwrap();
        assert_eq!(map.get("k").unwrap(), "second");
    }

    #[test]
    fn unknown_opcode_round_trips() {
        let data = vec![9, 9, 9];
        let record = Record::Unknown {
            opcode: 0x99,
            data: data.clone(),
        };
        let mut framed = Vec::new();
        encode_record(&mut framed, &record);
        assert_eq!(framed[0], 0x99);
        let decoded = decode_record(0x99, &data).unwrap();
        assert_eq!(decoded, record);
    }
}
