//! PKWARE traditional ("ZipCrypto") stream cipher: three 32-bit keys
//! updated per byte via CRC32 and a multiplier (§4.4). No file in the
//! retrieval pack implements classic ZipCrypto; this is built directly
//! from the spec's description of the algorithm.

use crate::error::{Result, SZipError};
use std::io::{self, Read, Write};
use std::sync::OnceLock;

fn crc_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (n, slot) in table.iter_mut().enumerate() {
            let mut c = n as u32;
            for _ in 0..8 {
                c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            }
            *slot = c;
        }
        table
    })
}

fn crc32_update(crc: u32, byte: u8) -> u32 {
    let table = crc_table();
    (crc >> 8) ^ table[((crc ^ byte as u32) & 0xff) as usize]
}

/// The three running keys, re-derived from the password at the start
/// of every stream.
#[derive(Clone)]
struct Keys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl Keys {
    fn new(password: &[u8]) -> Self {
        let mut keys = Keys { key0: 0x1234_5678, key1: 0x2345_6789, key2: 0x3456_7890 };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    fn update(&mut self, plain_byte: u8) {
        self.key0 = crc32_update(self.key0, plain_byte);
        self.key1 = self.key1.wrapping_add(self.key0 & 0xff);
        self.key1 = self.key1.wrapping_mul(134_775_813).wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    fn keystream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        ((temp.wrapping_mul(temp ^ 1)) >> 8) as u8
    }

    fn decrypt_byte(&mut self, cipher_byte: u8) -> u8 {
        let plain = cipher_byte ^ self.keystream_byte();
        self.update(plain);
        plain
    }

    fn encrypt_byte(&mut self, plain_byte: u8) -> u8 {
        let cipher = plain_byte ^ self.keystream_byte();
        self.update(plain_byte);
        cipher
    }
}

/// 12-byte encryption header size, written before an entry's
/// ciphertext and consumed before decryption begins.
pub const HEADER_LEN: usize = 12;

/// Encrypt `plaintext` under `password`, returning the 12-byte header
/// followed by the ciphertext. `check_byte` is the DOS-time high byte
/// the header's last byte is tied to, per §4.4.
pub fn encrypt(password: &[u8], check_byte: u8, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut keys = Keys::new(password);
    let mut header = [0u8; HEADER_LEN];
    getrandom::getrandom(&mut header[..HEADER_LEN - 1])
        .map_err(|e| SZipError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
    header[HEADER_LEN - 1] = check_byte;

    let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len());
    for &b in &header {
        out.push(keys.encrypt_byte(b));
    }
    for &b in plaintext {
        out.push(keys.encrypt_byte(b));
    }
    Ok(out)
}

/// Decrypt `ciphertext` (header + data) under `password`; fails with
/// `SZipError::IncorrectPassword` if the header's last decrypted byte
/// does not match `check_byte`.
pub fn decrypt(password: &[u8], check_byte: u8, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < HEADER_LEN {
        return Err(SZipError::InvalidFormat("traditional-encryption stream shorter than its header".into()));
    }
    let mut keys = Keys::new(password);
    let mut last = 0u8;
    for &b in &ciphertext[..HEADER_LEN] {
        last = keys.decrypt_byte(b);
    }
    if last != check_byte {
        return Err(SZipError::IncorrectPassword);
    }
    let mut out = Vec::with_capacity(ciphertext.len() - HEADER_LEN);
    for &b in &ciphertext[HEADER_LEN..] {
        out.push(keys.decrypt_byte(b));
    }
    Ok(out)
}

/// Streaming decrypt reader for the read pipeline: consumes the
/// 12-byte header on first use, then decrypts bytes as they're pulled
/// through by the decompress stage above it.
pub struct DecryptReader<R> {
    inner: R,
    keys: Keys,
    header_consumed: bool,
    check_byte: u8,
}

impl<R: Read> DecryptReader<R> {
    pub fn new(inner: R, password: &[u8], check_byte: u8) -> Self {
        DecryptReader { inner, keys: Keys::new(password), header_consumed: false, check_byte }
    }

    fn consume_header(&mut self) -> io::Result<()> {
        let mut header = [0u8; HEADER_LEN];
        self.inner.read_exact(&mut header)?;
        let mut last = 0u8;
        for &b in &header {
            last = self.keys.decrypt_byte(b);
        }
        if last != self.check_byte {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "incorrect password"));
        }
        self.header_consumed = true;
        Ok(())
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.header_consumed {
            self.consume_header()?;
        }
        let n = self.inner.read(buf)?;
        for b in buf[..n].iter_mut() {
            *b = self.keys.decrypt_byte(*b);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_correct_password() {
        let plaintext = b"a traditionally encrypted payload";
        let ct = encrypt(b"hunter2", 0x42, plaintext).unwrap();
        let pt = decrypt(b"hunter2", 0x42, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn wrong_password_is_rejected_via_check_byte() {
        let ct = encrypt(b"right", 0x42, b"secret").unwrap();
        assert!(matches!(decrypt(b"wrong", 0x42, &ct), Err(SZipError::IncorrectPassword)));
    }

    #[test]
    fn streaming_reader_matches_buffer_decrypt() {
        let plaintext = b"streamed just the same";
        let ct = encrypt(b"pw", 7, plaintext).unwrap();
        let mut reader = DecryptReader::new(&ct[..], b"pw", 7);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);
    }
}
