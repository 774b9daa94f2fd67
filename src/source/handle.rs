//! File-by-handle source — wraps an already-open file the caller still
//! owns. Read-only, seekable, no temp-file machinery: reopening or
//! removing a handle-backed source makes no sense, so both are refused.

use super::{Commands, Source, Stat, Whence};
use crate::error::{Result, SZipError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

pub struct HandleSource {
    file: File,
}

impl HandleSource {
    pub fn new(file: File) -> Self {
        HandleSource { file }
    }
}

impl Source for HandleSource {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf).map_err(SZipError::Io)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let pos = match whence {
            Whence::Set => SeekFrom::Start(offset as u64),
            Whence::Cur => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        self.file.seek(pos).map_err(SZipError::Io)
    }

    fn tell(&mut self) -> Result<u64> {
        self.file.stream_position().map_err(SZipError::Io)
    }

    fn stat(&mut self) -> Result<Stat> {
        let mut stat = Stat::default();
        if let Ok(meta) = self.file.metadata() {
            stat.size = Some(meta.len());
        }
        Ok(stat)
    }

    fn supports(&self) -> Commands {
        Commands::READ.union(Commands::SEEK)
    }

    fn supports_reopen(&self) -> bool {
        false
    }
}
