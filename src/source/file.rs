//! File-by-name source — the generic file adapter from §3, collapsed
//! onto `std::fs` directly rather than a platform vtable (the vtable's
//! job — open/close/read/write/seek/stat/create_temp_output/commit/
//! rollback/remove — is exactly what `std::fs::File` + `std::fs::rename`
//! already give a hosted Rust build).

use super::{random_temp_name, Commands, FileAttributes, Source, Stat, Whence};
use crate::error::{Result, SZipError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A source bound to a path on disk. Supports read (if the file
/// exists) and the two-phase write protocol (temp file + atomic
/// rename) unconditionally.
pub struct FileSource {
    path: PathBuf,
    create_if_missing: bool,
    handle: Option<File>,
    write_temp_path: Option<PathBuf>,
    write_handle: Option<File>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into(), create_if_missing: false, handle: None, write_temp_path: None, write_handle: None }
    }

    /// Like `new`, but a missing file is not an error on `open`: the
    /// source simply reports empty stat, matching the "create" open
    /// flag's ENOENT sentinel.
    pub fn new_or_create(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into(), create_if_missing: true, handle: None, write_temp_path: None, write_handle: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl Source for FileSource {
    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        match File::open(&self.path) {
            Ok(f) => {
                self.handle = Some(f);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && self.create_if_missing => Ok(()),
            Err(e) => Err(SZipError::Io(e)),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(f) = self.handle.as_mut() else {
            return Ok(0);
        };
        f.read(buf).map_err(SZipError::Io)
    }

    fn close(&mut self) -> Result<()> {
        self.handle = None;
        Ok(())
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let f = self.handle.as_mut().ok_or(SZipError::NotSupported("seek on unopened file"))?;
        let pos = match whence {
            Whence::Set => SeekFrom::Start(offset as u64),
            Whence::Cur => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        f.seek(pos).map_err(SZipError::Io)
    }

    fn tell(&mut self) -> Result<u64> {
        let f = self.handle.as_mut().ok_or(SZipError::NotSupported("tell on unopened file"))?;
        f.stream_position().map_err(SZipError::Io)
    }

    fn stat(&mut self) -> Result<Stat> {
        let mut stat = Stat::default();
        if let Ok(meta) = std::fs::metadata(&self.path) {
            stat.size = Some(meta.len());
        }
        Ok(stat)
    }

    fn supports(&self) -> Commands {
        Commands::READ.union(Commands::SEEK).union(Commands::WRITE).union(Commands::BEGIN_WRITE_CLONING).union(Commands::REMOVE).union(Commands::REOPEN)
    }

    fn accept_empty(&self) -> bool {
        true
    }

    fn get_file_attributes(&mut self) -> Result<FileAttributes> {
        let mut attrs = FileAttributes::default();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&self.path) {
                attrs.external_attributes = (meta.permissions().mode() as u32) << 16;
                attrs.version_made_by_host = 3; // Unix
            }
        }
        Ok(attrs)
    }

    fn begin_write(&mut self) -> Result<()> {
        self.begin_write_cloning(0)
    }

    fn begin_write_cloning(&mut self, keep_bytes: u64) -> Result<()> {
        let temp_path = random_temp_name(&self.path)?;
        let mut temp = File::create(&temp_path).map_err(SZipError::Io)?;
        if keep_bytes > 0 {
            let mut src = File::open(&self.path).map_err(SZipError::Io)?;
            let mut remaining = keep_bytes;
            let mut buf = [0u8; 64 * 1024];
            while remaining > 0 {
                let n = src.read(&mut buf[..remaining.min(buf.len() as u64) as usize]).map_err(SZipError::Io)?;
                if n == 0 {
                    break;
                }
                temp.write_all(&buf[..n]).map_err(SZipError::Io)?;
                remaining -= n as u64;
            }
        }
        self.write_temp_path = Some(temp_path);
        self.write_handle = Some(temp);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let f = self.write_handle.as_mut().ok_or(SZipError::NotSupported("write before begin_write"))?;
        f.write(buf).map_err(SZipError::Io)
    }

    fn seek_write(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let f = self.write_handle.as_mut().ok_or(SZipError::NotSupported("seek_write before begin_write"))?;
        let pos = match whence {
            Whence::Set => SeekFrom::Start(offset as u64),
            Whence::Cur => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        f.seek(pos).map_err(SZipError::Io)
    }

    fn tell_write(&mut self) -> Result<u64> {
        let f = self.write_handle.as_mut().ok_or(SZipError::NotSupported("tell_write before begin_write"))?;
        f.stream_position().map_err(SZipError::Io)
    }

    fn commit_write(&mut self) -> Result<()> {
        let Some(mut f) = self.write_handle.take() else {
            return Err(SZipError::NotSupported("commit_write before begin_write"));
        };
        let temp_path = self.write_temp_path.take().ok_or(SZipError::NotSupported("commit_write before begin_write"))?;
        f.sync_all().map_err(SZipError::Io)?;
        drop(f);
        std::fs::rename(&temp_path, &self.path).map_err(SZipError::Io)?;
        self.handle = None;
        Ok(())
    }

    fn rollback_write(&mut self) -> Result<()> {
        self.write_handle = None;
        if let Some(temp_path) = self.write_temp_path.take() {
            let _ = std::fs::remove_file(&temp_path);
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        std::fs::remove_file(&self.path).map_err(SZipError::Io)
    }
}
