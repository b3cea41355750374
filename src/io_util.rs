//! A small `Write` wrapper used by the chunk builder to track byte counts and
//! a running CRC32 without an extra buffering pass (spec §4.6, component C6),
//! plus the one-shot `crc32` helper the readers use to validate a chunk's
//! `uncompressed_crc` once its bytes are already in memory.

use std::io::{self, Write};

use crc32fast::Hasher;

/// One-shot CRC32/IEEE over a full buffer (spec §6, "crc32").
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Wraps a `Write` sink, feeding every byte written through a running CRC32
/// and counting bytes written. Used while serializing a chunk's inner record
/// stream so the uncompressed CRC and size fall out without a second pass.
pub struct CountingCrcWriter<W> {
    inner: W,
    hasher: Hasher,
    count: u64,
}

impl<W: Write> CountingCrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.count
    }

    /// Consumes the wrapper, returning the inner writer and the final
    /// `(count, crc)`.
    pub fn finalize(self) -> (W, u64, u32) {
        (self.inner, self.count, self.hasher.finalize())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> Write for CountingCrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_value() {
        // CRC32/IEEE of "123456789" is the standard check value 0xCBF43926.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn counting_crc_writer_tracks_bytes_and_crc() {
        let mut w = CountingCrcWriter::new(Vec::new());
        w.write_all(b"123456789").unwrap();
        let (buf, count, crc) = w.finalize();
        assert_eq!(count, 9);
        assert_eq!(crc, 0xCBF4_3926);
        assert_eq!(buf, b"123456789");
    }
}
