//! Chunk compression (spec §4.2, §6): the codecs a [`crate::writer::Writer`]
//! can compress chunks with, and the handler tables a
//! [`crate::streaming_reader::StreamingReader`]/[`crate::indexed_reader::IndexedReader`]
//! use to decompress them.
//!
//! Unlike the rest of this crate, which hand-rolls the wire codec, chunk
//! bodies are handed to off-the-shelf compression crates wholesale: `lz4`'s
//! frame `EncoderBuilder`/`Decoder` and `zstd`'s `encode_all`/`decode_all`.

use std::collections::HashMap;
use std::fmt;

use crate::{McapError, McapResult};

/// A compression scheme a chunk can be written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    #[cfg(feature = "lz4")]
    Lz4,
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Compression {
    /// The string stored in a Chunk/ChunkIndex record's `compression` field
    /// (spec §3). The empty string means "no compression".
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "",
            #[cfg(feature = "lz4")]
            Compression::Lz4 => "lz4",
            #[cfg(feature = "zstd")]
            Compression::Zstd => "zstd",
        }
    }

    pub fn compress(&self, data: &[u8]) -> McapResult<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            #[cfg(feature = "lz4")]
            Compression::Lz4 => compress_lz4(data),
            #[cfg(feature = "zstd")]
            Compression::Zstd => compress_zstd(data),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.as_str().is_empty() {
            "none"
        } else {
            self.as_str()
        })
    }
}

/// A decompression function: takes a chunk's compressed bytes and the
/// `uncompressed_size` declared in the Chunk record, and returns the
/// decompressed bytes (spec §6, "decompress_handlers").
///
/// `uncompressed_size` is a hint for pre-allocation, not a guarantee; callers
/// must not trust it blindly (spec §7, a corrupt or hostile file could declare
/// an enormous size), so built-in handlers cap the hint they act on.
pub type DecompressHandler = fn(&[u8], u64) -> McapResult<Vec<u8>>;

/// Maximum `uncompressed_size` hint a built-in handler will pre-allocate for,
/// regardless of what the file claims. Larger payloads still decompress, just
/// without the up-front `Vec::with_capacity`.
const MAX_PREALLOC_HINT: u64 = 256 * 1024 * 1024;

fn prealloc_hint(hint: u64) -> usize {
    hint.min(MAX_PREALLOC_HINT) as usize
}

#[cfg(feature = "lz4")]
fn compress_lz4(data: &[u8]) -> McapResult<Vec<u8>> {
    use std::io::Write;
    let mut out = Vec::new();
    {
        let mut encoder = lz4::EncoderBuilder::new()
            .build(&mut out)
            .map_err(|e| McapError::DecompressionError(e.to_string()))?;
        encoder
            .write_all(data)
            .map_err(|e| McapError::DecompressionError(e.to_string()))?;
        let (_, result) = encoder.finish();
        result.map_err(|e| McapError::DecompressionError(e.to_string()))?;
    }
    Ok(out)
}

#[cfg(feature = "lz4")]
pub fn decompress_lz4(compressed: &[u8], uncompressed_size: u64) -> McapResult<Vec<u8>> {
    use std::io::Read;
    let mut decoder =
        lz4::Decoder::new(compressed).map_err(|e| McapError::DecompressionError(e.to_string()))?;
    let mut out = Vec::with_capacity(prealloc_hint(uncompressed_size));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| McapError::DecompressionError(e.to_string()))?;
    Ok(out)
}

#[cfg(feature = "zstd")]
fn compress_zstd(data: &[u8]) -> McapResult<Vec<u8>> {
    zstd::encode_all(data, 0).map_err(|e| McapError::DecompressionError(e.to_string()))
}

#[cfg(feature = "zstd")]
pub fn decompress_zstd(compressed: &[u8], uncompressed_size: u64) -> McapResult<Vec<u8>> {
    let mut out = zstd::decode_all(compressed).map_err(|e| McapError::DecompressionError(e.to_string()))?;
    out.shrink_to(prealloc_hint(uncompressed_size).max(out.len()));
    Ok(out)
}

/// Builds the default decompression handler table: `lz4` and `zstd` when
/// their cargo features are enabled, nothing otherwise. Readers start from
/// this table and callers may add or override entries for custom schemes
/// (spec §6).
pub fn default_decompress_handlers() -> HashMap<String, DecompressHandler> {
    let mut handlers: HashMap<String, DecompressHandler> = HashMap::new();
    #[cfg(feature = "lz4")]
    handlers.insert("lz4".to_string(), decompress_lz4);
    #[cfg(feature = "zstd")]
    handlers.insert("zstd".to_string(), decompress_zstd);
    handlers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = Compression::Zstd.compress(&data).unwrap();
        let decompressed = decompress_zstd(&compressed, data.len() as u64).unwrap();
        assert_eq!(decompressed, data);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn lz4_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = Compression::Lz4.compress(&data).unwrap();
        let decompressed = decompress_lz4(&compressed, data.len() as u64).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn none_is_identity() {
        let data = b"raw bytes".to_vec();
        assert_eq!(Compression::None.compress(&data).unwrap(), data);
    }

    #[test]
    fn as_str_matches_wire_values() {
        assert_eq!(Compression::None.as_str(), "");
        #[cfg(feature = "lz4")]
        assert_eq!(Compression::Lz4.as_str(), "lz4");
        #[cfg(feature = "zstd")]
        assert_eq!(Compression::Zstd.as_str(), "zstd");
    }
}
