//! In-memory sources: a single contiguous buffer, and a buffer spread
//! across non-contiguous fragments (so a caller can expose one logical
//! entry without a contiguous allocation).

use super::{Commands, Source, Stat, Whence};
use crate::error::{Result, SZipError};

/// A source backed by one `Vec<u8>`, seekable, EOF-aware. Mirrors
/// `FileSource`'s split between a read-side view of the committed
/// bytes and a write-side staging buffer, so a commit can splice
/// unchanged bytes out of `data` while composing the replacement in
/// `write_buf` — committing the old buffer into itself would destroy
/// the source a splice still needs to read from.
pub struct BufferSource {
    data: Vec<u8>,
    pos: usize,
    write_buf: Option<Vec<u8>>,
    write_pos: usize,
    deleted: bool,
}

impl BufferSource {
    pub fn new(data: Vec<u8>) -> Self {
        BufferSource { data, pos: 0, write_buf: None, write_pos: 0, deleted: false }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl Source for BufferSource {
    fn open(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos as i64,
            Whence::End => self.data.len() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(SZipError::InvalidArgument("seek before start of buffer"));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn stat(&mut self) -> Result<Stat> {
        Ok(Stat { size: Some(self.data.len() as u64), ..Default::default() })
    }

    fn supports(&self) -> Commands {
        Commands::READ.union(Commands::SEEK).union(Commands::WRITE).union(Commands::BEGIN_WRITE_CLONING).union(Commands::REMOVE)
    }

    fn accept_empty(&self) -> bool {
        true
    }

    fn begin_write(&mut self) -> Result<()> {
        self.begin_write_cloning(0)
    }

    fn begin_write_cloning(&mut self, keep_bytes: u64) -> Result<()> {
        let keep = (keep_bytes as usize).min(self.data.len());
        self.write_buf = Some(self.data[..keep].to_vec());
        self.write_pos = keep;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let staged = self.write_buf.as_mut().ok_or(SZipError::NotSupported("write before begin_write"))?;
        if self.write_pos + buf.len() > staged.len() {
            staged.resize(self.write_pos + buf.len(), 0);
        }
        staged[self.write_pos..self.write_pos + buf.len()].copy_from_slice(buf);
        self.write_pos += buf.len();
        Ok(buf.len())
    }

    fn seek_write(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let staged = self.write_buf.as_ref().ok_or(SZipError::NotSupported("seek_write before begin_write"))?;
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => self.write_pos as i64,
            Whence::End => staged.len() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(SZipError::InvalidArgument("seek before start of buffer"));
        }
        self.write_pos = target as usize;
        Ok(self.write_pos as u64)
    }

    fn tell_write(&mut self) -> Result<u64> {
        if self.write_buf.is_none() {
            return Err(SZipError::NotSupported("tell_write before begin_write"));
        }
        Ok(self.write_pos as u64)
    }

    fn commit_write(&mut self) -> Result<()> {
        let staged = self.write_buf.take().ok_or(SZipError::NotSupported("commit_write before begin_write"))?;
        self.data = staged;
        self.pos = 0;
        self.write_pos = 0;
        Ok(())
    }

    fn rollback_write(&mut self) -> Result<()> {
        self.write_buf = None;
        self.write_pos = 0;
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        self.data.clear();
        self.deleted = true;
        Ok(())
    }
}

/// One fragment of a `FragmentSource`'s logical byte stream.
struct Fragment {
    bytes: Vec<u8>,
}

/// A source whose logical bytes are the concatenation of several
/// non-contiguous buffers. Seek resolves an absolute offset to a
/// `(fragment_index, offset_within_fragment)` pair each time.
pub struct FragmentSource {
    fragments: Vec<Fragment>,
    total_len: usize,
    pos: usize,
}

impl FragmentSource {
    pub fn new(fragments: Vec<Vec<u8>>) -> Self {
        let total_len = fragments.iter().map(Vec::len).sum();
        FragmentSource {
            fragments: fragments.into_iter().map(|bytes| Fragment { bytes }).collect(),
            total_len,
            pos: 0,
        }
    }

    fn locate(&self, mut offset: usize) -> Option<(usize, usize)> {
        for (i, frag) in self.fragments.iter().enumerate() {
            if offset < frag.bytes.len() {
                return Some((i, offset));
            }
            offset -= frag.bytes.len();
        }
        if offset == 0 {
            Some((self.fragments.len(), 0))
        } else {
            None
        }
    }
}

impl Source for FragmentSource {
    fn open(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.total_len || buf.is_empty() {
            return Ok(0);
        }
        let Some((mut frag_idx, mut frag_off)) = self.locate(self.pos) else {
            return Ok(0);
        };
        let mut written = 0;
        while written < buf.len() && frag_idx < self.fragments.len() {
            let frag = &self.fragments[frag_idx].bytes;
            let n = (buf.len() - written).min(frag.len() - frag_off);
            buf[written..written + n].copy_from_slice(&frag[frag_off..frag_off + n]);
            written += n;
            frag_off += n;
            if frag_off >= frag.len() {
                frag_idx += 1;
                frag_off = 0;
            }
        }
        self.pos += written;
        Ok(written)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos as i64,
            Whence::End => self.total_len as i64,
        };
        let target = base + offset;
        if target < 0 || target as usize > self.total_len {
            return Err(SZipError::InvalidArgument("seek out of range for fragment source"));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn stat(&mut self) -> Result<Stat> {
        Ok(Stat { size: Some(self.total_len as u64), ..Default::default() })
    }

    fn supports(&self) -> Commands {
        Commands::READ.union(Commands::SEEK)
    }

    fn accept_empty(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_source_reads_back_what_it_wrote() {
        let mut s = BufferSource::new(Vec::new());
        s.begin_write().unwrap();
        s.write(b"hello").unwrap();
        s.commit_write().unwrap();
        s.open().unwrap();
        let mut out = [0u8; 5];
        assert_eq!(s.read(&mut out).unwrap(), 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn fragment_source_reads_across_fragment_boundary() {
        let mut s = FragmentSource::new(vec![b"ab".to_vec(), b"cd".to_vec(), b"ef".to_vec()]);
        s.open().unwrap();
        let mut out = [0u8; 6];
        assert_eq!(s.read(&mut out).unwrap(), 6);
        assert_eq!(&out, b"abcdef");
    }

    #[test]
    fn fragment_source_seek_lands_mid_fragment() {
        let mut s = FragmentSource::new(vec![b"abcd".to_vec(), b"efgh".to_vec()]);
        s.open().unwrap();
        s.seek(3, Whence::Set).unwrap();
        let mut out = [0u8; 3];
        assert_eq!(s.read(&mut out).unwrap(), 3);
        assert_eq!(&out, b"def");
    }
}
