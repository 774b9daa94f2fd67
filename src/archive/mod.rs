//! Archive object (C8): holds every entry as an `(orig, changes,
//! source)` triple, the name index, and the flags that steer how
//! `open`/`close` behave. `open.rs` populates an `Archive` from a
//! source; `commit.rs` writes one back out; `read_entry.rs` composes
//! the read pipeline for a single entry.

pub mod commit;
pub mod open;
pub mod read_entry;

use crate::dirent::{CentralHeader, DosTime, LocalHeader};
use crate::error::{Result, SZipError};
use crate::extra::{ExtraField, Scope};
use crate::method::{CompressionMethod, EncryptionMethod};
use crate::namehash::{NameHash, Which};
use crate::source::{wrap, Invalidated, Source, SourceHandle};

/// In-memory directory entry: the union of everything a `CentralHeader`
/// carries plus the two fields that only matter while an archive is
/// open (`compression_level`, `password`) and have no wire
/// representation of their own.
#[derive(Debug, Clone)]
pub struct Dirent {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub gp_flags: u16,
    pub method: CompressionMethod,
    pub mtime: DosTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub filename: Vec<u8>,
    pub extra: crate::extra::ExtraFieldList,
    pub comment: Vec<u8>,
    pub disk_number: u32,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u64,
    pub encryption_method: EncryptionMethod,
    pub compression_level: u32,
    pub password: Option<String>,
}

impl Dirent {
    pub fn new_file(filename: Vec<u8>) -> Self {
        Dirent {
            version_made_by: (3 << 8) | 20,
            version_needed: 20,
            gp_flags: 0,
            method: CompressionMethod::Deflate,
            mtime: DosTime::EPOCH,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            filename,
            extra: crate::extra::ExtraFieldList::new(),
            comment: Vec::new(),
            disk_number: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            encryption_method: EncryptionMethod::None,
            compression_level: 6,
            password: None,
        }
    }

    pub fn from_central(c: &CentralHeader) -> Self {
        Dirent {
            version_made_by: c.version_made_by,
            version_needed: c.version_needed,
            gp_flags: c.gp_flags,
            method: c.method,
            mtime: c.mtime,
            crc32: c.crc32,
            compressed_size: c.compressed_size,
            uncompressed_size: c.uncompressed_size,
            filename: c.filename.clone(),
            extra: c.extra.clone(),
            comment: c.comment.clone(),
            disk_number: c.disk_number,
            internal_attributes: c.internal_attributes,
            external_attributes: c.external_attributes,
            local_header_offset: c.local_header_offset,
            encryption_method: c.encryption_method,
            compression_level: 6,
            password: None,
        }
    }

    pub fn to_central(&self) -> CentralHeader {
        CentralHeader {
            version_made_by: self.version_made_by,
            version_needed: self.version_needed,
            gp_flags: self.gp_flags,
            method: self.method,
            mtime: self.mtime,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            filename: self.filename.clone(),
            extra: self.extra.clone(),
            comment: self.comment.clone(),
            disk_number: self.disk_number,
            internal_attributes: self.internal_attributes,
            external_attributes: self.external_attributes,
            local_header_offset: self.local_header_offset,
            encryption_method: self.encryption_method,
        }
    }

    pub fn to_local(&self) -> LocalHeader {
        LocalHeader {
            version_needed: self.version_needed,
            gp_flags: self.gp_flags,
            method: self.method,
            mtime: self.mtime,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            filename: self.filename.clone(),
            extra: self.extra.clone(),
            encryption_method: self.encryption_method,
        }
    }

    pub fn is_directory(&self) -> bool {
        crate::dirent::is_directory_name(&self.filename)
    }
}

/// An archive slot. `orig` is what was read from disk (absent for a
/// newly added entry); `changes` is present once any mutator has
/// touched the entry; `source` supplies replacement bytes when the
/// entry's data (not just its metadata) changed.
///
/// Unlike the data model's per-field `changed` bitmask, dirtiness here
/// is tracked at the whole-`Dirent` level: `changes.is_some()` means
/// "something changed". `Dirent` is cheap to clone and commit only
/// needs a yes/no per entry to choose splice-vs-recompose, so the
/// finer-grained bitmask buys nothing here — see DESIGN.md.
pub struct Entry {
    pub orig: Option<Dirent>,
    pub changes: Option<Dirent>,
    pub source: Option<SourceHandle>,
    pub deleted: bool,
}

impl Entry {
    pub fn current(&self) -> Option<&Dirent> {
        self.changes.as_ref().or(self.orig.as_ref())
    }

    fn current_mut(&mut self) -> &mut Dirent {
        if self.changes.is_none() {
            let base = self.orig.clone().expect("entry with neither orig nor changes");
            self.changes = Some(base);
        }
        self.changes.as_mut().unwrap()
    }

    pub fn is_changed(&self) -> bool {
        self.changes.is_some() || self.source.is_some() || self.deleted
    }
}

macro_rules! bitmask {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name {
            bits: u32,
        }
        impl $name {
            pub const NONE: $name = $name { bits: 0 };
            pub fn union(self, other: $name) -> $name {
                $name { bits: self.bits | other.bits }
            }
            pub fn contains(self, other: $name) -> bool {
                self.bits & other.bits == other.bits
            }
        }
    };
}

bitmask!(OpenFlags);
impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags { bits: 1 << 0 };
    pub const CREATE: OpenFlags = OpenFlags { bits: 1 << 1 };
    pub const CHECKCONS: OpenFlags = OpenFlags { bits: 1 << 2 };
    pub const TRUNCATE: OpenFlags = OpenFlags { bits: 1 << 3 };
    /// Reject archives relying on the InfoZip 64k entry-count
    /// wraparound instead of silently tolerating it (see DESIGN.md's
    /// Open Question resolution).
    pub const STRICT_ENTRY_COUNT: OpenFlags = OpenFlags { bits: 1 << 4 };
}

bitmask!(ChangeFlags);
impl ChangeFlags {
    pub const WANT_TORRENTZIP: ChangeFlags = ChangeFlags { bits: 1 << 0 };
    pub const KEEP_FILE_FOR_EMPTY_ARCHIVE: ChangeFlags = ChangeFlags { bits: 1 << 1 };
    pub const FORCE_ZIP64: ChangeFlags = ChangeFlags { bits: 1 << 2 };
}

/// The handful of stat fields exposed to callers without handing out
/// the whole internal `Dirent`.
#[derive(Debug, Clone)]
pub struct EntryStat {
    pub name: Vec<u8>,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    pub method: CompressionMethod,
    pub encryption_method: EncryptionMethod,
    pub mtime: DosTime,
}

/// The in-memory archive: entries, the name index, pending comment
/// changes, flags, and the source every unchanged byte is read back
/// from on commit.
pub struct Archive {
    pub(crate) src: SourceHandle,
    pub(crate) open_flags: OpenFlags,
    pub(crate) ch_flags: ChangeFlags,
    pub(crate) default_password: Option<String>,
    pub(crate) comment_orig: Vec<u8>,
    pub(crate) comment_changes: Option<Vec<u8>>,
    pub(crate) entries: Vec<Entry>,
    pub(crate) names: NameHash,
    pub(crate) invalidated: Invalidated,
    pub(crate) is_torrentzip: bool,
    progress: Option<Box<dyn FnMut(u64, u64)>>,
    cancel: Option<Box<dyn FnMut() -> bool>>,
}

impl Archive {
    /// A fresh, empty in-memory archive (no backing file until the
    /// caller commits it to one via `open_from_source`'s sink).
    pub fn create_in_memory() -> Archive {
        Archive {
            src: wrap(crate::source::mem::BufferSource::new(Vec::new())),
            open_flags: OpenFlags::NONE,
            ch_flags: ChangeFlags::NONE,
            default_password: None,
            comment_orig: Vec::new(),
            comment_changes: None,
            entries: Vec::new(),
            names: NameHash::new(),
            invalidated: Invalidated::new(),
            is_torrentzip: false,
            progress: None,
            cancel: None,
        }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Archive> {
        open::open_path(path.as_ref(), OpenFlags::NONE)
    }

    pub fn open_with_flags(path: impl AsRef<std::path::Path>, flags: OpenFlags) -> Result<Archive> {
        open::open_path(path.as_ref(), flags)
    }

    pub fn open_from_source(src: SourceHandle, flags: OpenFlags) -> Result<Archive> {
        open::open_from_source(src, flags)
    }

    /// Discard the archive: every outstanding `Source` derived from it
    /// (entry readers still open) starts failing with `ArchiveClosed`.
    pub fn discard(self) {
        self.invalidated.set();
    }

    pub fn close(&mut self) -> Result<()> {
        commit::commit(self)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.deleted).count()
    }

    fn live_entry(&self, index: usize) -> Result<&Entry> {
        let entry = self.entries.get(index).ok_or_else(|| SZipError::InvalidArgument("entry index out of range"))?;
        if entry.deleted {
            return Err(SZipError::EntryDeleted);
        }
        Ok(entry)
    }

    fn live_entry_mut(&mut self, index: usize) -> Result<&mut Entry> {
        let entry = self.entries.get_mut(index).ok_or_else(|| SZipError::InvalidArgument("entry index out of range"))?;
        if entry.deleted {
            return Err(SZipError::EntryDeleted);
        }
        Ok(entry)
    }

    pub fn name(&self, index: usize) -> Result<Vec<u8>> {
        Ok(self.live_entry(index)?.current().expect("live entry has data").filename.clone())
    }

    pub fn locate_name(&self, name: &[u8]) -> Option<usize> {
        self.names.lookup(name, Which::Current)
    }

    pub fn stat(&self, index: usize) -> Result<EntryStat> {
        let d = self.live_entry(index)?.current().expect("live entry has data");
        Ok(EntryStat {
            name: d.filename.clone(),
            size: d.uncompressed_size,
            compressed_size: d.compressed_size,
            crc32: d.crc32,
            method: d.method,
            encryption_method: d.encryption_method,
            mtime: d.mtime,
        })
    }

    /// Read an entire entry's decompressed, decrypted, CRC-verified
    /// bytes.
    pub fn read(&self, index: usize, password: Option<&str>) -> Result<Vec<u8>> {
        let mut reader = read_entry::open_entry(self, index, password, None, None)?;
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut out).map_err(SZipError::Io)?;
        Ok(out)
    }

    /// Read `[start, start+len)` of an entry stored with `Store`
    /// (uncompressed, unencrypted); any other method fails with
    /// `InvalidArgument`, per §4.10's partial-range restriction.
    pub fn read_range(&self, index: usize, start: u64, len: u64) -> Result<Vec<u8>> {
        let d = self.live_entry(index)?.current().expect("live entry has data");
        if d.method != CompressionMethod::Store || d.encryption_method != EncryptionMethod::None {
            return Err(SZipError::InvalidArgument("partial read requires an uncompressed, unencrypted entry"));
        }
        let mut reader = read_entry::open_entry(self, index, None, Some(start), Some(len))?;
        let mut out = vec![0u8; len as usize];
        std::io::Read::read_exact(&mut reader, &mut out).map_err(SZipError::Io)?;
        Ok(out)
    }

    pub fn add(&mut self, name: &[u8], source: SourceHandle) -> Result<usize> {
        if self.names.lookup(name, Which::Current).is_some() {
            return Err(SZipError::InvalidArgument("an entry with that name already exists"));
        }
        let idx = self.entries.len();
        self.entries.push(Entry {
            orig: None,
            changes: Some(Dirent::new_file(name.to_vec())),
            source: Some(source),
            deleted: false,
        });
        self.names.add(name, idx, false).map_err(|_| SZipError::InvalidArgument("name already in use"))?;
        Ok(idx)
    }

    pub fn replace(&mut self, index: usize, source: SourceHandle) -> Result<()> {
        let entry = self.live_entry_mut(index)?;
        entry.source = Some(source);
        let _ = entry.current_mut();
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<()> {
        let name = self.live_entry(index)?.current().expect("live entry has data").filename.clone();
        self.names.delete(&name).map_err(|_| SZipError::InvalidArgument("name not found"))?;
        self.entries.get_mut(index).unwrap().deleted = true;
        Ok(())
    }

    pub fn rename(&mut self, index: usize, new_name: &[u8]) -> Result<()> {
        let old_name = self.live_entry(index)?.current().expect("live entry has data").filename.clone();
        self.names
            .rename(&old_name, new_name, index)
            .map_err(|_| SZipError::InvalidArgument("new name already in use"))?;
        self.live_entry_mut(index)?.current_mut().filename = new_name.to_vec();
        Ok(())
    }

    pub fn set_comment(&mut self, index: usize, comment: Vec<u8>) -> Result<()> {
        self.live_entry_mut(index)?.current_mut().comment = comment;
        Ok(())
    }

    pub fn archive_comment(&self) -> &[u8] {
        self.comment_changes.as_deref().unwrap_or(&self.comment_orig)
    }

    pub fn set_archive_comment(&mut self, comment: Vec<u8>) {
        self.comment_changes = Some(comment);
    }

    pub fn set_compression(&mut self, index: usize, method: CompressionMethod, level: u32) -> Result<()> {
        let d = self.live_entry_mut(index)?.current_mut();
        d.method = method;
        d.compression_level = level;
        Ok(())
    }

    pub fn set_encryption(&mut self, index: usize, method: EncryptionMethod, password: Option<String>) -> Result<()> {
        let d = self.live_entry_mut(index)?.current_mut();
        d.encryption_method = method;
        d.password = password;
        Ok(())
    }

    pub fn set_mtime(&mut self, index: usize, mtime: DosTime) -> Result<()> {
        self.live_entry_mut(index)?.current_mut().mtime = mtime;
        Ok(())
    }

    pub fn set_external_attributes(&mut self, index: usize, attrs: u32) -> Result<()> {
        self.live_entry_mut(index)?.current_mut().external_attributes = attrs;
        Ok(())
    }

    pub fn extra_count(&self, index: usize, scope: Scope) -> Result<usize> {
        Ok(self
            .live_entry(index)?
            .current()
            .expect("live entry has data")
            .extra
            .remove_internal()
            .iter()
            .filter(|f| f.scope.contains(scope))
            .count())
    }

    pub fn get_extra(&self, index: usize, id: u16, occurrence: usize, scope: Scope) -> Result<Option<ExtraField>> {
        Ok(self
            .live_entry(index)?
            .current()
            .expect("live entry has data")
            .extra
            .remove_internal()
            .get(id, occurrence, scope)
            .cloned())
    }

    pub fn set_extra(&mut self, index: usize, field: ExtraField) -> Result<()> {
        self.live_entry_mut(index)?.current_mut().extra.push(field);
        Ok(())
    }

    pub fn delete_extra(&mut self, index: usize, id: u16, occurrence: usize, scope: Scope) -> Result<()> {
        self.live_entry_mut(index)?.current_mut().extra.delete_by_id(id, occurrence, scope);
        Ok(())
    }

    pub fn flags(&self) -> ChangeFlags {
        self.ch_flags
    }

    pub fn set_flags(&mut self, flags: ChangeFlags) {
        self.ch_flags = flags;
    }

    pub fn is_torrentzip(&self) -> bool {
        self.is_torrentzip
    }

    pub fn set_default_password(&mut self, password: Option<String>) {
        self.default_password = password;
    }

    pub fn on_progress(&mut self, f: impl FnMut(u64, u64) + 'static) {
        self.progress = Some(Box::new(f));
    }

    pub fn on_cancel(&mut self, f: impl FnMut() -> bool + 'static) {
        self.cancel = Some(Box::new(f));
    }

    pub(crate) fn report_progress(&mut self, done: u64, total: u64) {
        if let Some(cb) = self.progress.as_mut() {
            cb(done, total);
        }
    }

    pub(crate) fn check_cancelled(&mut self) -> Result<()> {
        if let Some(cb) = self.cancel.as_mut() {
            if cb() {
                return Err(SZipError::Cancelled);
            }
        }
        Ok(())
    }
}
