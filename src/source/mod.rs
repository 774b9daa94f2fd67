//! Source — the polymorphic, stackable I/O object every byte that
//! enters or leaves an archive flows through.
//!
//! The original command-dispatch-callback protocol (`Open`/`Read`/
//! `Seek`/`Stat`/`Supports`/...) becomes a plain trait here: each verb
//! is a method, `pass_to_lower_layer` becomes the trait's default
//! implementation (return "not supported" / forward nothing, since a
//! leaf source has no lower layer), and a layered source overrides only
//! the methods it actually transforms, inheriting the rest by holding
//! and delegating to its lower `SourceHandle`.
//!
//! Refcounting/invalidation (§5, §9): sources are shared via
//! `Rc<RefCell<dyn Source>>`; `keep` is `Rc::clone`. A source bound to
//! an archive additionally holds `Invalidated`, a flag the archive sets
//! on discard so that any outstanding command fails with
//! `SZipError::ArchiveClosed` instead of touching freed state.

pub mod file;
pub mod function;
pub mod handle;
pub mod mem;
pub mod window;

use crate::dirent::DosTime;
use crate::error::{Result, SZipError};
use crate::method::{CompressionMethod, EncryptionMethod};
use std::cell::Cell;
use std::rc::Rc;

/// Shared, reference-counted handle to a [`Source`]. Cloning bumps the
/// refcount; the wrapped source is freed when the last clone drops.
pub type SourceHandle = Rc<std::cell::RefCell<dyn Source>>;

pub fn wrap<S: Source + 'static>(source: S) -> SourceHandle {
    Rc::new(std::cell::RefCell::new(source))
}

/// Shared "has the owning archive been discarded" flag. Every source
/// created while resolving an archive entry holds a clone; `Archive`'s
/// `Discard` sets it once for all of them at once.
#[derive(Clone, Default)]
pub struct Invalidated(Rc<Cell<bool>>);

impl Invalidated {
    pub fn new() -> Self {
        Invalidated(Rc::new(Cell::new(false)))
    }

    pub fn set(&self) {
        self.0.set(true);
    }

    pub fn check(&self) -> Result<()> {
        if self.0.get() {
            Err(SZipError::ArchiveClosed)
        } else {
            Ok(())
        }
    }
}

/// `Seek`'s whence argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Bitmask of commands a source supports, returned by `Source::supports`
/// and cached by callers that query it repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Commands {
    bits: u16,
}

impl Commands {
    pub const READ: Commands = Commands { bits: 1 << 0 };
    pub const SEEK: Commands = Commands { bits: 1 << 1 };
    pub const WRITE: Commands = Commands { bits: 1 << 2 };
    pub const BEGIN_WRITE_CLONING: Commands = Commands { bits: 1 << 3 };
    pub const REMOVE: Commands = Commands { bits: 1 << 4 };
    pub const REOPEN: Commands = Commands { bits: 1 << 5 };

    pub const NONE: Commands = Commands { bits: 0 };

    pub fn union(self, other: Commands) -> Commands {
        Commands { bits: self.bits | other.bits }
    }

    pub fn contains(self, other: Commands) -> bool {
        self.bits & other.bits == other.bits
    }
}

/// Result of `Source::stat`: whatever fields the source can answer
/// without reading the whole stream. Fields it cannot answer stay
/// `None` rather than being guessed.
#[derive(Debug, Clone, Default)]
pub struct Stat {
    pub size: Option<u64>,
    pub comp_size: Option<u64>,
    pub mtime: Option<DosTime>,
    pub crc: Option<u32>,
    pub comp_method: Option<CompressionMethod>,
    pub encryption_method: Option<EncryptionMethod>,
}

/// Host file-attribute record, as `GetFileAttributes` would fill it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileAttributes {
    pub external_attributes: u32,
    pub version_made_by_host: u8,
}

/// A stackable I/O pipeline node.
///
/// Every method has a default that returns `NotSupported`; a leaf
/// source (file/buffer/fragment/function) implements the handful it
/// actually backs. A layered source implements only the methods its
/// transform cares about and forwards everything else to its lower
/// source via its own default impls reaching into `self.lower()`
/// (see `window::WindowSource` for the canonical example).
pub trait Source {
    fn open(&mut self) -> Result<()>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, _offset: i64, _whence: Whence) -> Result<u64> {
        Err(SZipError::NotSupported("seek"))
    }

    fn tell(&mut self) -> Result<u64> {
        Err(SZipError::NotSupported("tell"))
    }

    fn stat(&mut self) -> Result<Stat> {
        Ok(Stat::default())
    }

    fn supports(&self) -> Commands {
        Commands::READ
    }

    /// Whether a zero-byte instance of this source is a valid (empty)
    /// archive container, vs. "file doesn't exist yet".
    fn accept_empty(&self) -> bool {
        false
    }

    fn supports_reopen(&self) -> bool {
        true
    }

    fn get_file_attributes(&mut self) -> Result<FileAttributes> {
        Ok(FileAttributes::default())
    }

    fn begin_write(&mut self) -> Result<()> {
        Err(SZipError::NotSupported("begin_write"))
    }

    /// Start a write that preserves the first `keep_bytes` of the
    /// existing file content (used to splice a torrent-prefix or avoid
    /// rewriting an unchanged leading run of entries).
    fn begin_write_cloning(&mut self, _keep_bytes: u64) -> Result<()> {
        Err(SZipError::NotSupported("begin_write_cloning"))
    }

    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(SZipError::NotSupported("write"))
    }

    fn seek_write(&mut self, _offset: i64, _whence: Whence) -> Result<u64> {
        Err(SZipError::NotSupported("seek_write"))
    }

    fn tell_write(&mut self) -> Result<u64> {
        Err(SZipError::NotSupported("tell_write"))
    }

    fn commit_write(&mut self) -> Result<()> {
        Err(SZipError::NotSupported("commit_write"))
    }

    fn rollback_write(&mut self) -> Result<()> {
        Err(SZipError::NotSupported("rollback_write"))
    }

    fn remove(&mut self) -> Result<()> {
        Err(SZipError::NotSupported("remove"))
    }
}

/// Adapts a [`SourceHandle`] to `std::io::Read` so it can sit at the
/// bottom of a pipeline built from `io::Read` stages (see
/// `crate::pipeline`). The source must already be open.
pub struct SourceReader {
    source: SourceHandle,
}

impl SourceReader {
    pub fn new(source: SourceHandle) -> Self {
        SourceReader { source }
    }
}

impl std::io::Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.source
            .borrow_mut()
            .read(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Generate a temp-file name the way the file-source platform vtable's
/// `create_temp_output` is specified to (§3, §5): a 6-character suffix
/// drawn from a 36-symbol alphabet, retried up to 1024 times on
/// collision.
pub fn random_temp_name(base: &std::path::Path) -> Result<std::path::PathBuf> {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let dir = base.parent().unwrap_or_else(|| std::path::Path::new("."));
    let stem = base.file_name().and_then(|n| n.to_str()).unwrap_or("archive");
    for _ in 0..1024 {
        let mut suffix = [0u8; 6];
        getrandom::getrandom(&mut suffix).map_err(|e| {
            SZipError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        let name: String = suffix.iter().map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char).collect();
        let candidate = dir.join(format!(".{}.{}.tmp", stem, name));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(SZipError::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "could not allocate a unique temp file name after 1024 attempts",
    )))
}
