//! Bounded byte buffer — a little-endian reader/writer cursor over
//! owned or borrowed bytes, with sticky overflow tracking.
//!
//! Every local/central header, EOCD record, and extra field in
//! `dirent.rs` is decoded and encoded through this type rather than
//! through ad hoc slice indexing, so that an out-of-bounds access is a
//! single `ok` flag check instead of a panic.

/// Backing storage for a [`Buffer`]: owned when the buffer was built to
/// be written into, borrowed when it wraps bytes someone else owns.
enum Storage<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a [u8]),
    BorrowedMut(&'a mut [u8]),
}

/// A bounded cursor over a byte slice or vector.
///
/// Any `get`/`peek`/`put` that would read or write past the end sets
/// `ok` to `false` and returns `None`/does nothing; once `ok` is
/// `false` it never becomes `true` again for that buffer.
pub struct Buffer<'a> {
    storage: Storage<'a>,
    offset: usize,
    ok: bool,
}

impl<'a> Buffer<'a> {
    /// A buffer that owns its backing memory, initially empty and
    /// growable only through `put`.
    pub fn new_owned() -> Self {
        Buffer { storage: Storage::Owned(Vec::new()), offset: 0, ok: true }
    }

    /// A buffer that owns a pre-sized zeroed backing vector.
    pub fn with_capacity(len: usize) -> Self {
        Buffer { storage: Storage::Owned(vec![0u8; len]), offset: 0, ok: true }
    }

    /// A buffer that borrows an immutable slice; `put` always fails.
    pub fn wrap(bytes: &'a [u8]) -> Self {
        Buffer { storage: Storage::Borrowed(bytes), offset: 0, ok: true }
    }

    /// A buffer that borrows a mutable slice for in-place `put`.
    pub fn wrap_mut(bytes: &'a mut [u8]) -> Self {
        Buffer { storage: Storage::BorrowedMut(bytes), offset: 0, ok: true }
    }

    fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s,
            Storage::BorrowedMut(s) => s,
        }
    }

    /// Whether every operation so far has stayed in bounds.
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Total length of the backing storage.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes remaining between the cursor and the end.
    pub fn left(&self) -> usize {
        self.len().saturating_sub(self.offset)
    }

    /// Whether the cursor has reached the end.
    pub fn eof(&self) -> bool {
        self.offset >= self.len()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Move the cursor to an absolute offset; fails (sets `ok=false`)
    /// if it is past the end.
    pub fn set_offset(&mut self, offset: usize) {
        if offset > self.len() {
            self.ok = false;
            return;
        }
        self.offset = offset;
    }

    /// Advance the cursor by `n` bytes without reading them.
    pub fn skip(&mut self, n: usize) {
        if !self.ok || n > self.left() {
            self.ok = false;
            return;
        }
        self.offset += n;
    }

    /// Return `n` bytes starting at the cursor without advancing it.
    pub fn peek(&mut self, n: usize) -> Option<&[u8]> {
        if !self.ok || n > self.left() {
            self.ok = false;
            return None;
        }
        Some(&self.as_slice()[self.offset..self.offset + n])
    }

    /// Return `n` bytes starting at the cursor and advance past them.
    pub fn get(&mut self, n: usize) -> Option<&[u8]> {
        if !self.ok || n > self.left() {
            self.ok = false;
            return None;
        }
        let start = self.offset;
        self.offset += n;
        Some(&self.as_slice()[start..start + n])
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        self.get(1).map(|b| b[0])
    }

    pub fn get_u16(&mut self) -> Option<u16> {
        self.get(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Option<u32> {
        self.get(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Option<u64> {
        self.get(8).map(|b| {
            u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })
    }

    /// Write `bytes` at the cursor and advance past them; no-ops (and
    /// sets `ok=false`) on a read-only or overflowing buffer.
    pub fn put(&mut self, bytes: &[u8]) {
        if !self.ok {
            return;
        }
        match &mut self.storage {
            Storage::Owned(v) => {
                if self.offset + bytes.len() > v.len() {
                    v.resize(self.offset + bytes.len(), 0);
                }
                v[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
                self.offset += bytes.len();
            }
            Storage::BorrowedMut(s) => {
                if bytes.len() > self.left() {
                    self.ok = false;
                    return;
                }
                s[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
                self.offset += bytes.len();
            }
            Storage::Borrowed(_) => {
                self.ok = false;
            }
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }

    /// Consume the buffer, returning the owned backing vector. Only
    /// meaningful for buffers built with `new_owned`/`with_capacity`.
    pub fn into_vec(self) -> Vec<u8> {
        match self.storage {
            Storage::Owned(v) => v,
            Storage::Borrowed(s) => s.to_vec(),
            Storage::BorrowedMut(s) => s.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_little_endian_integers() {
        let mut buf = Buffer::new_owned();
        buf.put_u16(0x1234);
        buf.put_u32(0xdead_beef);
        buf.put_u64(0x0123_4567_89ab_cdef);
        let bytes = buf.into_vec();

        let mut r = Buffer::wrap(&bytes);
        assert_eq!(r.get_u16(), Some(0x1234));
        assert_eq!(r.get_u32(), Some(0xdead_beef));
        assert_eq!(r.get_u64(), Some(0x0123_4567_89ab_cdef));
        assert!(r.eof());
        assert!(r.is_ok());
    }

    #[test]
    fn overflow_is_sticky() {
        let bytes = [1u8, 2, 3];
        let mut r = Buffer::wrap(&bytes);
        assert_eq!(r.get_u32(), None);
        assert!(!r.is_ok());
        // Further reads keep failing even though offset never advanced.
        assert_eq!(r.get_u8(), None);
    }

    #[test]
    fn peek_does_not_advance() {
        let bytes = [9u8, 8, 7];
        let mut r = Buffer::wrap(&bytes);
        assert_eq!(r.peek(1), Some(&[9u8][..]));
        assert_eq!(r.offset(), 0);
        assert_eq!(r.get_u8(), Some(9));
        assert_eq!(r.offset(), 1);
    }

    #[test]
    fn wrap_mut_allows_in_place_patch() {
        let mut bytes = [0u8; 4];
        {
            let mut w = Buffer::wrap_mut(&mut bytes);
            w.put_u32(0x1020_3040);
        }
        assert_eq!(bytes, 0x1020_3040u32.to_le_bytes());
    }
}
