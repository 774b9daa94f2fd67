//! Window source — restricts a lower source to `[start, start+length)`.
//! The workhorse for exposing one archive entry as a standalone
//! `Source`: the archive installs one over its own file/buffer source
//! at the entry's local-data offset, sized by `comp_size`, then layers
//! decrypt/decompress/CRC-check pipeline stages on top of it (see
//! `crate::archive::read_entry`).

use super::{Commands, Invalidated, Source, SourceHandle, Stat, Whence};
use crate::error::Result;

pub struct WindowSource {
    lower: SourceHandle,
    start: u64,
    length: Option<u64>,
    pos: u64,
    lower_is_seekable: bool,
    invalidated: Option<Invalidated>,
}

impl WindowSource {
    /// `length = None` means "to the end of the lower source".
    pub fn new(lower: SourceHandle, start: u64, length: Option<u64>) -> Self {
        let lower_is_seekable = lower.borrow().supports().contains(Commands::SEEK);
        WindowSource { lower, start, length, pos: 0, lower_is_seekable, invalidated: None }
    }

    pub fn with_invalidation(mut self, flag: Invalidated) -> Self {
        self.invalidated = Some(flag);
        self
    }

    fn remaining(&self) -> Option<u64> {
        self.length.map(|len| len.saturating_sub(self.pos))
    }

    fn check_alive(&self) -> Result<()> {
        match &self.invalidated {
            Some(flag) => flag.check(),
            None => Ok(()),
        }
    }
}

impl Source for WindowSource {
    fn open(&mut self) -> Result<()> {
        self.check_alive()?;
        self.lower.borrow_mut().open()?;
        self.pos = 0;
        if self.lower_is_seekable {
            self.lower.borrow_mut().seek(self.start as i64, Whence::Set)?;
        } else {
            let mut discard = vec![0u8; 64 * 1024];
            let mut left = self.start;
            while left > 0 {
                let n = left.min(discard.len() as u64) as usize;
                let got = self.lower.borrow_mut().read(&mut discard[..n])?;
                if got == 0 {
                    break;
                }
                left -= got as u64;
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_alive()?;
        let cap = match self.remaining() {
            Some(r) if r == 0 => return Ok(0),
            Some(r) => (r as usize).min(buf.len()),
            None => buf.len(),
        };
        let n = self.lower.borrow_mut().read(&mut buf[..cap])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.check_alive()?;
        if !self.lower_is_seekable {
            return Err(crate::error::SZipError::NotSupported("seek on a window over a non-seekable source"));
        }
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos as i64,
            Whence::End => self.length.map(|l| l as i64).unwrap_or(0),
        };
        let target = base + offset;
        if target < 0 {
            return Err(crate::error::SZipError::InvalidArgument("seek before start of window"));
        }
        self.lower.borrow_mut().seek((self.start as i64) + target, Whence::Set)?;
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn tell(&mut self) -> Result<u64> {
        self.check_alive()?;
        Ok(self.pos)
    }

    fn stat(&mut self) -> Result<Stat> {
        self.check_alive()?;
        let mut stat = self.lower.borrow_mut().stat()?;
        if let Some(len) = self.length {
            stat.size = Some(len);
        }
        Ok(stat)
    }

    fn supports(&self) -> Commands {
        let mut c = Commands::READ;
        if self.lower_is_seekable {
            c = c.union(Commands::SEEK);
        }
        c
    }
}
