//! Pipeline stages (C4): the CRC-validating pass-through and the
//! compress/decompress wrappers around the (out-of-scope) algorithm
//! vtable. Encrypt/decrypt live in `crate::crypto` since they also need
//! the primitive vtable boundary, but are plumbed the same way: as a
//! `std::io::Read` adaptor that stacks directly on top of another,
//! mirroring the teacher's `CrcCountingWriter` wrapping a `File`
//! (commit's write side computes an entry's CRC directly via
//! `crc32fast::hash` over the buffered plaintext instead, since it
//! already holds the whole entry in memory before compressing it).

pub mod compress;

use crc32fast::Hasher as Crc32;
use std::io::{self, Read};

/// CRC-validating pass-through reader. Accumulates CRC32 and byte
/// count as the lower reader is drained; at EOF, if `validate` and an
/// expected `(crc, size)` pair were given, a mismatch surfaces as an
/// `io::Error` (the caller maps it to `SZipError::Crc`).
///
/// Seeking is not exposed on this type on purpose: the data model
/// requires the running CRC stay monotone, and a consumer that needs
/// to seek should do so on the lower source *before* wrapping it here,
/// not through the CRC stage.
pub struct CrcReader<R> {
    inner: R,
    hasher: Crc32,
    count: u64,
    expected: Option<(u32, u64)>,
    validate: bool,
    checked: bool,
}

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R, expected: Option<(u32, u64)>, validate: bool) -> Self {
        CrcReader { inner, hasher: Crc32::new(), count: 0, expected, validate, checked: false }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !self.checked {
                self.checked = true;
                if self.validate {
                    if let Some((crc, size)) = self.expected {
                        if self.hasher.clone().finalize() != crc || self.count != size {
                            return Err(io::Error::new(io::ErrorKind::InvalidData, "crc32 or size mismatch at end of stream"));
                        }
                    }
                }
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p9_crc_reader_fails_on_mismatch_at_eof() {
        let data = b"hello".to_vec();
        let good_crc = crc32fast::hash(&data);
        let mut r = CrcReader::new(&data[..], Some((good_crc, data.len() as u64)), true);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();

        let mut r = CrcReader::new(&data[..], Some((good_crc.wrapping_add(1), data.len() as u64)), true);
        let mut out = Vec::new();
        assert!(r.read_to_end(&mut out).is_err());
    }
}
