//! Directory-entry codec — bit-exact parse/serialize of local headers,
//! central-directory headers, EOCD/EOCD64/EOCD64-locator records, data
//! descriptors, and the ZIP64 promotion / TorrentZip normalization
//! rules that sit on top of them.

use crate::buffer::Buffer;
use crate::error::{Result, SZipError};
use crate::extra::{ExtraFieldList, Scope, ID_UTF8_COMMENT, ID_UTF8_NAME, ID_WINZIP_AES, ID_ZIP64};
use crate::method::{CompressionMethod, EncryptionMethod};
use crate::string::ZipString;

pub const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
pub const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
pub const EOCD_SIG: u32 = 0x0605_4b50;
pub const EOCD64_SIG: u32 = 0x0606_4b50;
pub const EOCD64_LOCATOR_SIG: u32 = 0x0607_4b50;
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;

pub const SENTINEL_U32: u32 = 0xFFFF_FFFF;
pub const SENTINEL_U16: u16 = 0xFFFF;

/// WinZip-AES "compression method" written in the outer header when an
/// entry is AES-encrypted; the real method lives inside the 0x9901
/// extra field's 2-byte tail.
const AES_PLACEHOLDER_METHOD: u16 = 99;

/// General-purpose bit flags used by this codec.
pub mod gp_flag {
    pub const ENCRYPTED: u16 = 1 << 0;
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    pub const STRONG_ENCRYPTION: u16 = 1 << 6;
    pub const UTF8: u16 = 1 << 11;
}

/// DOS date/time pair, as stored in local/central headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosTime {
    pub time: u16,
    pub date: u16,
}

impl DosTime {
    pub const EPOCH: DosTime = DosTime { time: 0, date: 0x21 };
    /// The fixed timestamp TorrentZip mandates: 1996-12-24 23:32:00.
    pub const TORRENTZIP: DosTime = DosTime { time: 0xbc00, date: 0x2198 };

    /// Build from calendar fields (1980-2107 range, 2-second resolution).
    pub fn from_parts(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16) -> Self {
        let date = ((year.saturating_sub(1980)) << 9) | (month << 5) | day;
        let time = (hour << 11) | (minute << 5) | (second / 2);
        DosTime { time, date }
    }

    pub fn year(&self) -> u16 {
        1980 + (self.date >> 9)
    }
}

/// A single-occurrence local file header, used for writing and for
/// the local-header consistency re-check during open.
#[derive(Debug, Clone)]
pub struct LocalHeader {
    pub version_needed: u16,
    pub gp_flags: u16,
    pub method: CompressionMethod,
    pub mtime: DosTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub filename: Vec<u8>,
    pub extra: ExtraFieldList,
    pub encryption_method: EncryptionMethod,
}

impl LocalHeader {
    pub fn parse(buf: &mut Buffer) -> Result<Self> {
        let sig = buf.get_u32().ok_or_else(eof)?;
        if sig != LOCAL_HEADER_SIG {
            return Err(SZipError::InvalidFormat(format!(
                "bad local file header signature: {:#010x}",
                sig
            )));
        }
        let version_needed = buf.get_u16().ok_or_else(eof)?;
        let gp_flags = buf.get_u16().ok_or_else(eof)?;
        let method_raw = buf.get_u16().ok_or_else(eof)?;
        let time = buf.get_u16().ok_or_else(eof)?;
        let date = buf.get_u16().ok_or_else(eof)?;
        let crc32 = buf.get_u32().ok_or_else(eof)?;
        let comp_size_32 = buf.get_u32().ok_or_else(eof)?;
        let uncomp_size_32 = buf.get_u32().ok_or_else(eof)?;
        let filename_len = buf.get_u16().ok_or_else(eof)? as usize;
        let extra_len = buf.get_u16().ok_or_else(eof)? as usize;
        let mut filename = buf.get(filename_len).ok_or_else(eof)?.to_vec();
        let extra_bytes = buf.get(extra_len).ok_or_else(eof)?.to_vec();
        let extra = ExtraFieldList::parse(&extra_bytes, Scope::LOCAL);
        if let Some(replacement) = resolve_utf8_extra(&extra, ID_UTF8_NAME, &filename) {
            filename = replacement.into_bytes();
        }

        let mut compressed_size = comp_size_32 as u64;
        let mut uncompressed_size = uncomp_size_32 as u64;
        overlay_zip64(&extra, comp_size_32, uncomp_size_32, None, &mut compressed_size, &mut uncompressed_size, &mut None);

        let (method, encryption_method) = resolve_method_and_encryption(method_raw, gp_flags, &extra);

        Ok(LocalHeader {
            version_needed,
            gp_flags,
            method,
            mtime: DosTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            filename,
            extra,
            encryption_method,
        })
    }

    /// Serialize; `force_zip64` writes sentinels and a ZIP64 extra
    /// unconditionally (used when the archive-wide forced-ZIP64 change
    /// flag is set) even if the sizes would otherwise fit in 32 bits.
    pub fn serialize(&self, force_zip64: bool) -> Vec<u8> {
        let needs64 = force_zip64 || needs_zip64_sizes(self.compressed_size, self.uncompressed_size);
        let mut extra = self.extra.clone();
        if needs64 {
            let mut data = Vec::with_capacity(16);
            data.extend_from_slice(&self.uncompressed_size.to_le_bytes());
            data.extend_from_slice(&self.compressed_size.to_le_bytes());
            extra.push(crate::extra::ExtraField::new(ID_ZIP64, data, Scope::LOCAL));
        }
        let gp_flags = encode_utf8_name(&self.filename, self.gp_flags, &mut extra);
        let (method_field, gp_flags) = outer_method_and_flags(self.method, self.encryption_method, gp_flags, &mut extra);

        let mut buf = Buffer::new_owned();
        buf.put_u32(LOCAL_HEADER_SIG);
        buf.put_u16(self.version_needed);
        buf.put_u16(gp_flags);
        buf.put_u16(method_field);
        buf.put_u16(self.mtime.time);
        buf.put_u16(self.mtime.date);
        buf.put_u32(self.crc32);
        buf.put_u32(if needs64 { SENTINEL_U32 } else { self.compressed_size as u32 });
        buf.put_u32(if needs64 { SENTINEL_U32 } else { self.uncompressed_size as u32 });
        buf.put_u16(self.filename.len() as u16);
        buf.put_u16(extra.encoded_len(Scope::LOCAL) as u16);
        buf.put(&self.filename);
        buf.put(&extra.encode(Scope::LOCAL));
        buf.into_vec()
    }
}

/// A parsed central-directory entry, with ZIP64/WinZip-AES overlay
/// already applied.
#[derive(Debug, Clone)]
pub struct CentralHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub gp_flags: u16,
    pub method: CompressionMethod,
    pub mtime: DosTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub filename: Vec<u8>,
    pub extra: ExtraFieldList,
    pub comment: Vec<u8>,
    pub disk_number: u32,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u64,
    pub encryption_method: EncryptionMethod,
}

impl CentralHeader {
    pub fn parse(buf: &mut Buffer) -> Result<Self> {
        let sig = buf.get_u32().ok_or_else(eof)?;
        if sig != CENTRAL_HEADER_SIG {
            return Err(SZipError::InvalidFormat(format!(
                "bad central directory header signature: {:#010x}",
                sig
            )));
        }
        let version_made_by = buf.get_u16().ok_or_else(eof)?;
        let version_needed = buf.get_u16().ok_or_else(eof)?;
        let gp_flags = buf.get_u16().ok_or_else(eof)?;
        let method_raw = buf.get_u16().ok_or_else(eof)?;
        let time = buf.get_u16().ok_or_else(eof)?;
        let date = buf.get_u16().ok_or_else(eof)?;
        let crc32 = buf.get_u32().ok_or_else(eof)?;
        let comp_size_32 = buf.get_u32().ok_or_else(eof)?;
        let uncomp_size_32 = buf.get_u32().ok_or_else(eof)?;
        let filename_len = buf.get_u16().ok_or_else(eof)? as usize;
        let extra_len = buf.get_u16().ok_or_else(eof)? as usize;
        let comment_len = buf.get_u16().ok_or_else(eof)? as usize;
        let disk_number_16 = buf.get_u16().ok_or_else(eof)?;
        let internal_attributes = buf.get_u16().ok_or_else(eof)?;
        let external_attributes = buf.get_u32().ok_or_else(eof)?;
        let offset_32 = buf.get_u32().ok_or_else(eof)?;
        let mut filename = buf.get(filename_len).ok_or_else(eof)?.to_vec();
        let extra_bytes = buf.get(extra_len).ok_or_else(eof)?.to_vec();
        let extra = ExtraFieldList::parse(&extra_bytes, Scope::CENTRAL);
        let mut comment = buf.get(comment_len).ok_or_else(eof)?.to_vec();
        if let Some(replacement) = resolve_utf8_extra(&extra, ID_UTF8_NAME, &filename) {
            filename = replacement.into_bytes();
        }
        if let Some(replacement) = resolve_utf8_extra(&extra, ID_UTF8_COMMENT, &comment) {
            comment = replacement.into_bytes();
        }

        let overlay = Zip64Overlay {
            uncompressed_size: uncomp_size_32 == SENTINEL_U32,
            compressed_size: comp_size_32 == SENTINEL_U32,
            offset: offset_32 == SENTINEL_U32,
            disk: disk_number_16 == SENTINEL_U16,
        };
        let resolved = overlay.apply(&extra, uncomp_size_32 as u64, comp_size_32 as u64, offset_32 as u64, disk_number_16 as u32);
        let (uncompressed_size, compressed_size, offset, disk_number) = resolved;

        let (method, encryption_method) = resolve_method_and_encryption(method_raw, gp_flags, &extra);

        Ok(CentralHeader {
            version_made_by,
            version_needed,
            gp_flags,
            method,
            mtime: DosTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            filename,
            extra,
            comment,
            disk_number,
            internal_attributes,
            external_attributes,
            local_header_offset: offset,
            encryption_method,
        })
    }

    pub fn serialize(&self, force_zip64: bool) -> Vec<u8> {
        let uncomp64 = force_zip64 || self.uncompressed_size >= SENTINEL_U32 as u64;
        let comp64 = force_zip64 || self.compressed_size >= SENTINEL_U32 as u64;
        let offset64 = force_zip64 || self.local_header_offset >= SENTINEL_U32 as u64;
        let needs64 = uncomp64 || comp64 || offset64;

        let mut extra = self.extra.clone();
        if needs64 {
            let mut data = Vec::new();
            if uncomp64 {
                data.extend_from_slice(&self.uncompressed_size.to_le_bytes());
            }
            if comp64 {
                data.extend_from_slice(&self.compressed_size.to_le_bytes());
            }
            if offset64 {
                data.extend_from_slice(&self.local_header_offset.to_le_bytes());
            }
            extra.push(crate::extra::ExtraField::new(ID_ZIP64, data, Scope::CENTRAL));
        }
        let gp_flags = encode_utf8_name(&self.filename, self.gp_flags, &mut extra);
        if !self.comment.is_empty() {
            if let Ok(s) = std::str::from_utf8(&self.comment) {
                if !self.comment.is_ascii() {
                    attach_utf8_extra(&mut extra, ID_UTF8_COMMENT, &self.comment, s);
                }
            }
        }
        let (method_field, gp_flags) = outer_method_and_flags(self.method, self.encryption_method, gp_flags, &mut extra);

        let mut buf = Buffer::new_owned();
        buf.put_u32(CENTRAL_HEADER_SIG);
        buf.put_u16(self.version_made_by);
        buf.put_u16(self.version_needed);
        buf.put_u16(gp_flags);
        buf.put_u16(method_field);
        buf.put_u16(self.mtime.time);
        buf.put_u16(self.mtime.date);
        buf.put_u32(self.crc32);
        buf.put_u32(if comp64 { SENTINEL_U32 } else { self.compressed_size as u32 });
        buf.put_u32(if uncomp64 { SENTINEL_U32 } else { self.uncompressed_size as u32 });
        buf.put_u16(self.filename.len() as u16);
        buf.put_u16(extra.encoded_len(Scope::CENTRAL) as u16);
        buf.put_u16(self.comment.len() as u16);
        buf.put_u16(if self.disk_number >= SENTINEL_U16 as u32 { SENTINEL_U16 } else { self.disk_number as u16 });
        buf.put_u16(self.internal_attributes);
        buf.put_u32(self.external_attributes);
        buf.put_u32(if offset64 { SENTINEL_U32 } else { self.local_header_offset as u32 });
        buf.put(&self.filename);
        buf.put(&extra.encode(Scope::CENTRAL));
        buf.put(&self.comment);
        buf.into_vec()
    }
}

/// ZIP64 end-of-central-directory locator.
#[derive(Debug, Clone, Copy)]
pub struct Eocd64Locator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Eocd64Locator {
    pub fn parse(buf: &mut Buffer) -> Result<Self> {
        let sig = buf.get_u32().ok_or_else(eof)?;
        if sig != EOCD64_LOCATOR_SIG {
            return Err(SZipError::InvalidFormat("bad ZIP64 EOCD locator signature".into()));
        }
        Ok(Eocd64Locator {
            disk_with_eocd64: buf.get_u32().ok_or_else(eof)?,
            eocd64_offset: buf.get_u64().ok_or_else(eof)?,
            total_disks: buf.get_u32().ok_or_else(eof)?,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Buffer::new_owned();
        buf.put_u32(EOCD64_LOCATOR_SIG);
        buf.put_u32(self.disk_with_eocd64);
        buf.put_u64(self.eocd64_offset);
        buf.put_u32(self.total_disks);
        buf.into_vec()
    }
}

/// ZIP64 end-of-central-directory record.
#[derive(Debug, Clone, Copy)]
pub struct Eocd64 {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cdir: u32,
    pub entries_on_disk: u64,
    pub total_entries: u64,
    pub cdir_size: u64,
    pub cdir_offset: u64,
}

impl Eocd64 {
    pub fn parse(buf: &mut Buffer) -> Result<Self> {
        let sig = buf.get_u32().ok_or_else(eof)?;
        if sig != EOCD64_SIG {
            return Err(SZipError::InvalidFormat("bad ZIP64 EOCD signature".into()));
        }
        let _record_size = buf.get_u64().ok_or_else(eof)?;
        let version_made_by = buf.get_u16().ok_or_else(eof)?;
        let version_needed = buf.get_u16().ok_or_else(eof)?;
        let disk_number = buf.get_u32().ok_or_else(eof)?;
        let disk_with_cdir = buf.get_u32().ok_or_else(eof)?;
        let entries_on_disk = buf.get_u64().ok_or_else(eof)?;
        let total_entries = buf.get_u64().ok_or_else(eof)?;
        let cdir_size = buf.get_u64().ok_or_else(eof)?;
        let cdir_offset = buf.get_u64().ok_or_else(eof)?;
        Ok(Eocd64 {
            version_made_by,
            version_needed,
            disk_number,
            disk_with_cdir,
            entries_on_disk,
            total_entries,
            cdir_size,
            cdir_offset,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        // record size = everything after the signature+size fields themselves (56 total - 12).
        let record_size: u64 = 44;
        let mut buf = Buffer::new_owned();
        buf.put_u32(EOCD64_SIG);
        buf.put_u64(record_size);
        buf.put_u16(self.version_made_by);
        buf.put_u16(self.version_needed);
        buf.put_u32(self.disk_number);
        buf.put_u32(self.disk_with_cdir);
        buf.put_u64(self.entries_on_disk);
        buf.put_u64(self.total_entries);
        buf.put_u64(self.cdir_size);
        buf.put_u64(self.cdir_offset);
        buf.into_vec()
    }
}

/// Classic (32-bit) end-of-central-directory record.
#[derive(Debug, Clone)]
pub struct Eocd {
    pub disk_number: u16,
    pub disk_with_cdir: u16,
    pub entries_on_disk: u16,
    pub total_entries: u16,
    pub cdir_size: u32,
    pub cdir_offset: u32,
    pub comment: Vec<u8>,
}

impl Eocd {
    pub fn parse(buf: &mut Buffer) -> Result<Self> {
        let sig = buf.get_u32().ok_or_else(eof)?;
        if sig != EOCD_SIG {
            return Err(SZipError::InvalidFormat("bad EOCD signature".into()));
        }
        let disk_number = buf.get_u16().ok_or_else(eof)?;
        let disk_with_cdir = buf.get_u16().ok_or_else(eof)?;
        let entries_on_disk = buf.get_u16().ok_or_else(eof)?;
        let total_entries = buf.get_u16().ok_or_else(eof)?;
        let cdir_size = buf.get_u32().ok_or_else(eof)?;
        let cdir_offset = buf.get_u32().ok_or_else(eof)?;
        let comment_len = buf.get_u16().ok_or_else(eof)? as usize;
        let comment = buf.get(comment_len).ok_or_else(eof)?.to_vec();
        Ok(Eocd { disk_number, disk_with_cdir, entries_on_disk, total_entries, cdir_size, cdir_offset, comment })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Buffer::new_owned();
        buf.put_u32(EOCD_SIG);
        buf.put_u16(self.disk_number);
        buf.put_u16(self.disk_with_cdir);
        buf.put_u16(self.entries_on_disk);
        buf.put_u16(self.total_entries);
        buf.put_u32(self.cdir_size);
        buf.put_u32(self.cdir_offset);
        buf.put_u16(self.comment.len() as u16);
        buf.put(&self.comment);
        buf.into_vec()
    }
}

/// Data descriptor, written after an entry's data when the streaming
/// (gp-flag bit 3) path was used because the size wasn't known up front.
#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Serialize with the (optional but recommended) signature, using
    /// 8-byte sizes when either size needs ZIP64.
    pub fn serialize(&self) -> Vec<u8> {
        let zip64 = needs_zip64_sizes(self.compressed_size, self.uncompressed_size);
        let mut buf = Buffer::new_owned();
        buf.put_u32(DATA_DESCRIPTOR_SIG);
        buf.put_u32(self.crc32);
        if zip64 {
            buf.put_u64(self.compressed_size);
            buf.put_u64(self.uncompressed_size);
        } else {
            buf.put_u32(self.compressed_size as u32);
            buf.put_u32(self.uncompressed_size as u32);
        }
        buf.into_vec()
    }

    /// Parse, given whether the caller already knows sizes are ZIP64
    /// width (from the local header's own ZIP64 extra, if present).
    pub fn parse(buf: &mut Buffer, zip64: bool) -> Result<Self> {
        let mut first = buf.get_u32().ok_or_else(eof)?;
        if first == DATA_DESCRIPTOR_SIG {
            first = buf.get_u32().ok_or_else(eof)?;
        }
        let crc32 = first;
        let (compressed_size, uncompressed_size) = if zip64 {
            (buf.get_u64().ok_or_else(eof)?, buf.get_u64().ok_or_else(eof)?)
        } else {
            (buf.get_u32().ok_or_else(eof)? as u64, buf.get_u32().ok_or_else(eof)? as u64)
        };
        Ok(DataDescriptor { crc32, compressed_size, uncompressed_size })
    }
}

fn eof() -> SZipError {
    SZipError::InvalidFormat("unexpected end of data while parsing header".into())
}

/// Whether `comp_size`/`uncomp_size` alone force ZIP64 (offset and
/// entry-count triggers are evaluated by the archive layer, which has
/// the context those need).
pub fn needs_zip64_sizes(comp_size: u64, uncomp_size: u64) -> bool {
    comp_size >= SENTINEL_U32 as u64 || uncomp_size >= SENTINEL_U32 as u64
}

/// Version-needed table from the write algorithm.
pub fn version_needed(
    method: CompressionMethod,
    encryption: EncryptionMethod,
    zip64: bool,
    is_directory: bool,
) -> u16 {
    let mut v = if encryption.is_aes() {
        51
    } else if matches!(method, CompressionMethod::Lzma) {
        63
    } else if matches!(method, CompressionMethod::Bzip2) {
        46
    } else if zip64 {
        45
    } else if matches!(method, CompressionMethod::Deflate) || encryption == EncryptionMethod::Traditional {
        20
    } else if is_directory {
        20
    } else {
        10
    };
    if zip64 && v < 45 {
        v = 45;
    }
    v
}

/// Overlay ZIP64 extra-field values onto sentinel-valued standard
/// fields, consuming exactly the fields present (uncompressed,
/// compressed, offset, disk — in that fixed order, skipping any field
/// whose standard slot wasn't actually a sentinel).
fn overlay_zip64(
    extra: &ExtraFieldList,
    comp_size_32: u32,
    uncomp_size_32: u32,
    offset_32: Option<u32>,
    compressed_size: &mut u64,
    uncompressed_size: &mut u64,
    offset: &mut Option<&mut u64>,
) {
    if comp_size_32 != SENTINEL_U32 && uncomp_size_32 != SENTINEL_U32 && offset_32 != Some(SENTINEL_U32) {
        return;
    }
    let Some(field) = extra.get(ID_ZIP64, 0, Scope::BOTH) else { return };
    let data = &field.data;
    let mut cursor = 0usize;
    if uncomp_size_32 == SENTINEL_U32 && cursor + 8 <= data.len() {
        *uncompressed_size = read_u64(data, cursor);
        cursor += 8;
    }
    if comp_size_32 == SENTINEL_U32 && cursor + 8 <= data.len() {
        *compressed_size = read_u64(data, cursor);
        cursor += 8;
    }
    if offset_32 == Some(SENTINEL_U32) {
        if let Some(off) = offset.as_deref_mut() {
            if cursor + 8 <= data.len() {
                *off = read_u64(data, cursor);
            }
        }
    }
}

/// Which standard central-directory fields were sentinel-valued and so
/// must be overlaid from the ZIP64 extra, in its fixed field order:
/// uncompressed size, compressed size, offset, disk start — consuming
/// exactly the fields present, per §4.5's read algorithm.
struct Zip64Overlay {
    uncompressed_size: bool,
    compressed_size: bool,
    offset: bool,
    disk: bool,
}

impl Zip64Overlay {
    fn apply(
        &self,
        extra: &ExtraFieldList,
        uncomp32: u64,
        comp32: u64,
        offset32: u64,
        disk16: u32,
    ) -> (u64, u64, u64, u32) {
        let mut uncompressed_size = uncomp32;
        let mut compressed_size = comp32;
        let mut offset = offset32;
        let mut disk = disk16;
        if !(self.uncompressed_size || self.compressed_size || self.offset || self.disk) {
            return (uncompressed_size, compressed_size, offset, disk);
        }
        let Some(field) = extra.get(ID_ZIP64, 0, Scope::BOTH) else {
            return (uncompressed_size, compressed_size, offset, disk);
        };
        let data = &field.data;
        let mut cursor = 0usize;
        if self.uncompressed_size && cursor + 8 <= data.len() {
            uncompressed_size = read_u64(data, cursor);
            cursor += 8;
        }
        if self.compressed_size && cursor + 8 <= data.len() {
            compressed_size = read_u64(data, cursor);
            cursor += 8;
        }
        if self.offset && cursor + 8 <= data.len() {
            offset = read_u64(data, cursor);
            cursor += 8;
        }
        if self.disk && cursor + 4 <= data.len() {
            disk = u32::from_le_bytes([data[cursor], data[cursor + 1], data[cursor + 2], data[cursor + 3]]);
        }
        (uncompressed_size, compressed_size, offset, disk)
    }
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    u64::from_le_bytes([
        data[at], data[at + 1], data[at + 2], data[at + 3], data[at + 4], data[at + 5], data[at + 6], data[at + 7],
    ])
}

/// Decode the outer method field plus any WinZip-AES extra into the
/// pair of (real compression method, encryption method) the rest of
/// the core operates on.
fn resolve_method_and_encryption(
    method_raw: u16,
    gp_flags: u16,
    extra: &ExtraFieldList,
) -> (CompressionMethod, EncryptionMethod) {
    if let Some(aes) = extra.get(ID_WINZIP_AES, 0, Scope::BOTH) {
        if aes.data.len() >= 7 {
            let strength = aes.data[4];
            let real_method = u16::from_le_bytes([aes.data[5], aes.data[6]]);
            let enc = EncryptionMethod::from_winzip_strength_code(strength).unwrap_or(EncryptionMethod::Aes256);
            return (CompressionMethod::from_u16(real_method), enc);
        }
    }
    let encryption = if gp_flags & gp_flag::ENCRYPTED != 0 {
        EncryptionMethod::Traditional
    } else {
        EncryptionMethod::None
    };
    (CompressionMethod::from_u16(method_raw), encryption)
}

/// Compute the outer wire method field and gp-flags, prepending a
/// WinZip-AES extra when the entry is AES-encrypted and setting the
/// encrypted bit for any encryption method.
fn outer_method_and_flags(
    method: CompressionMethod,
    encryption: EncryptionMethod,
    mut gp_flags: u16,
    extra: &mut ExtraFieldList,
) -> (u16, u16) {
    if encryption != EncryptionMethod::None {
        gp_flags |= gp_flag::ENCRYPTED;
    } else {
        gp_flags &= !gp_flag::ENCRYPTED;
    }
    if encryption.is_aes() {
        let mut data = Vec::with_capacity(7);
        data.extend_from_slice(&2u16.to_le_bytes()); // AE-2
        data.extend_from_slice(b"AE");
        data.push(encryption.winzip_strength_code().unwrap());
        data.extend_from_slice(&method.to_u16().to_le_bytes());
        extra.push(crate::extra::ExtraField::new(ID_WINZIP_AES, data, Scope::BOTH));
        (AES_PLACEHOLDER_METHOD, gp_flags)
    } else {
        (method.to_u16(), gp_flags)
    }
}

/// Decide whether `filename` should be emitted under the UTF-8 gp-flag
/// (per the write algorithm's "derive name/comment encoding" step) and
/// attach a legacy UTF-8 name extra alongside it for readers that don't
/// honor the flag. ASCII names need neither.
fn encode_utf8_name(filename: &[u8], mut gp_flags: u16, extra: &mut ExtraFieldList) -> u16 {
    let zs = ZipString::detect(filename.to_vec(), false);
    if zs.should_set_utf8_flag() {
        gp_flags |= gp_flag::UTF8;
        if let Ok(s) = std::str::from_utf8(filename) {
            attach_utf8_extra(extra, ID_UTF8_NAME, filename, s);
        }
    }
    gp_flags
}

/// Attach UTF-8 name/comment extras carrying the CRC32 of the raw
/// (non-UTF-8) bytes, per the write algorithm, when the UTF-8 gp-flag
/// path was not taken for this string.
pub fn attach_utf8_extra(extra: &mut ExtraFieldList, id: u16, raw: &[u8], utf8: &str) {
    let crc = crc32fast::hash(raw);
    let mut data = Vec::with_capacity(5 + utf8.len());
    data.push(1); // version
    data.extend_from_slice(&crc.to_le_bytes());
    data.extend_from_slice(utf8.as_bytes());
    extra.push(crate::extra::ExtraField::new(id, data, Scope::BOTH));
}

/// Look up a UTF-8 name/comment extra and return its decoded string if
/// its CRC matches the raw bytes it is attached to (replacement only
/// happens on an exact CRC match, per the read algorithm).
pub fn resolve_utf8_extra(extra: &ExtraFieldList, id: u16, raw: &[u8]) -> Option<String> {
    let field = extra.get(id, 0, Scope::BOTH)?;
    if field.data.len() < 5 {
        return None;
    }
    let stored_crc = u32::from_le_bytes([field.data[1], field.data[2], field.data[3], field.data[4]]);
    if stored_crc != crc32fast::hash(raw) {
        return None;
    }
    std::str::from_utf8(&field.data[5..]).ok().map(|s| s.to_string())
}

/// Build the `TORRENTZIPPED-XXXXXXXX` archive comment carrying the
/// uppercase-hex CRC32 of the just-written central directory.
pub fn torrentzip_comment(cdir_crc: u32) -> Vec<u8> {
    format!("TORRENTZIPPED-{:08X}", cdir_crc).into_bytes()
}

/// Parse a `TORRENTZIPPED-XXXXXXXX` comment, returning the CRC it claims.
pub fn parse_torrentzip_comment(comment: &[u8]) -> Option<u32> {
    let s = std::str::from_utf8(comment).ok()?;
    let hex = s.strip_prefix("TORRENTZIPPED-")?;
    u32::from_str_radix(hex, 16).ok()
}

/// Apply TorrentZip's fixed-field normalization to a central header in
/// place (the paired local header is rebuilt from the normalized
/// central header by the caller, since every field TorrentZip fixes is
/// shared between the two forms).
pub fn normalize_for_torrentzip(central: &mut CentralHeader, is_directory: bool) {
    central.version_made_by = 0;
    central.version_needed = 20;
    central.gp_flags = 2;
    central.method = if is_directory { CompressionMethod::Store } else { CompressionMethod::Deflate };
    central.disk_number = 0;
    central.internal_attributes = 0;
    central.external_attributes = 0;
    central.mtime = DosTime::TORRENTZIP;
    central.extra = ExtraFieldList::new();
    central.comment.clear();
}

/// The fixed compression level TorrentZip normalization uses (maximum;
/// see DESIGN.md's Open Question resolution).
pub const TORRENT_LEVEL: u32 = 9;

/// The UTF-8 name/comment extra ids, re-exported here for callers that
/// only import `dirent`.
pub const UTF8_NAME_ID: u16 = ID_UTF8_NAME;
pub const UTF8_COMMENT_ID: u16 = ID_UTF8_COMMENT;

/// Helper used by consistency checks: a trailing `/` marks a directory entry.
pub fn is_directory_name(name: &[u8]) -> bool {
    name.last() == Some(&b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra::ExtraField;

    fn sample_central(comp: u64, uncomp: u64, offset: u64) -> CentralHeader {
        CentralHeader {
            version_made_by: 20,
            version_needed: 20,
            gp_flags: 0,
            method: CompressionMethod::Deflate,
            mtime: DosTime::EPOCH,
            crc32: 0xdead_beef,
            compressed_size: comp,
            uncompressed_size: uncomp,
            filename: b"hello.txt".to_vec(),
            extra: ExtraFieldList::new(),
            comment: Vec::new(),
            disk_number: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: offset,
            encryption_method: EncryptionMethod::None,
        }
    }

    #[test]
    fn central_header_round_trips() {
        let central = sample_central(10, 20, 0);
        let bytes = central.serialize(false);
        let mut buf = Buffer::wrap(&bytes);
        let parsed = CentralHeader::parse(&mut buf).unwrap();
        assert_eq!(parsed.filename, central.filename);
        assert_eq!(parsed.compressed_size, 10);
        assert_eq!(parsed.uncompressed_size, 20);
        assert_eq!(parsed.crc32, central.crc32);
    }

    #[test]
    fn local_header_round_trips() {
        let local = LocalHeader {
            version_needed: 20,
            gp_flags: 0,
            method: CompressionMethod::Store,
            mtime: DosTime::EPOCH,
            crc32: 42,
            compressed_size: 6,
            uncompressed_size: 6,
            filename: b"a.txt".to_vec(),
            extra: ExtraFieldList::new(),
            encryption_method: EncryptionMethod::None,
        };
        let bytes = local.serialize(false);
        let mut buf = Buffer::wrap(&bytes);
        let parsed = LocalHeader::parse(&mut buf).unwrap();
        assert_eq!(parsed.crc32, 42);
        assert_eq!(parsed.filename, b"a.txt");
    }

    #[test]
    fn p3_zip64_promotion_round_trips_oversized_sizes() {
        let big = SENTINEL_U32 as u64 + 1000;
        let central = sample_central(big, big, 0);
        let bytes = central.serialize(false);
        // 32-bit fields must read the sentinel exactly.
        assert_eq!(&bytes[20..24], &SENTINEL_U32.to_le_bytes());
        assert_eq!(&bytes[24..28], &SENTINEL_U32.to_le_bytes());

        let mut buf = Buffer::wrap(&bytes);
        let parsed = CentralHeader::parse(&mut buf).unwrap();
        assert_eq!(parsed.compressed_size, big);
        assert_eq!(parsed.uncompressed_size, big);
    }

    #[test]
    fn zip64_local_extra_always_carries_both_sizes() {
        // Only compressed_size overflows; local extra must still carry both.
        let local = LocalHeader {
            version_needed: 45,
            gp_flags: 0,
            method: CompressionMethod::Deflate,
            mtime: DosTime::EPOCH,
            crc32: 1,
            compressed_size: SENTINEL_U32 as u64 + 5,
            uncompressed_size: 123,
            filename: b"big.bin".to_vec(),
            extra: ExtraFieldList::new(),
            encryption_method: EncryptionMethod::None,
        };
        let bytes = local.serialize(false);
        let mut buf = Buffer::wrap(&bytes);
        let parsed = LocalHeader::parse(&mut buf).unwrap();
        assert_eq!(parsed.compressed_size, SENTINEL_U32 as u64 + 5);
        assert_eq!(parsed.uncompressed_size, 123);
    }

    #[test]
    fn eocd64_and_locator_round_trip() {
        let locator = Eocd64Locator { disk_with_eocd64: 0, eocd64_offset: 999_999_999_999, total_disks: 1 };
        let bytes = locator.serialize();
        let mut buf = Buffer::wrap(&bytes);
        let parsed = Eocd64Locator::parse(&mut buf).unwrap();
        assert_eq!(parsed.eocd64_offset, 999_999_999_999);

        let eocd64 = Eocd64 {
            version_made_by: 45,
            version_needed: 45,
            disk_number: 0,
            disk_with_cdir: 0,
            entries_on_disk: 70_000,
            total_entries: 70_000,
            cdir_size: 12345,
            cdir_offset: 6789,
        };
        let bytes = eocd64.serialize();
        let mut buf = Buffer::wrap(&bytes);
        let parsed = Eocd64::parse(&mut buf).unwrap();
        assert_eq!(parsed.total_entries, 70_000);
    }

    #[test]
    fn eocd_round_trips_with_max_comment() {
        let eocd = Eocd {
            disk_number: 0,
            disk_with_cdir: 0,
            entries_on_disk: 1,
            total_entries: 1,
            cdir_size: 100,
            cdir_offset: 0,
            comment: vec![b'x'; 65535],
        };
        let bytes = eocd.serialize();
        let mut buf = Buffer::wrap(&bytes);
        let parsed = Eocd::parse(&mut buf).unwrap();
        assert_eq!(parsed.comment.len(), 65535);
    }

    #[test]
    fn winzip_aes_extra_round_trips_real_method() {
        let mut central = sample_central(10, 20, 0);
        central.encryption_method = EncryptionMethod::Aes256;
        central.method = CompressionMethod::Deflate;
        let bytes = central.serialize(false);
        let mut buf = Buffer::wrap(&bytes);
        let parsed = CentralHeader::parse(&mut buf).unwrap();
        assert_eq!(parsed.method, CompressionMethod::Deflate);
        assert_eq!(parsed.encryption_method, EncryptionMethod::Aes256);
        assert_eq!(parsed.gp_flags & gp_flag::ENCRYPTED, gp_flag::ENCRYPTED);
    }

    #[test]
    fn torrentzip_comment_round_trips() {
        let comment = torrentzip_comment(0xDEAD_BEEF);
        assert_eq!(comment, b"TORRENTZIPPED-DEADBEEF");
        assert_eq!(parse_torrentzip_comment(&comment), Some(0xDEAD_BEEF));
    }

    #[test]
    fn p10_normalizing_twice_is_a_fixed_point() {
        let mut central = sample_central(10, 20, 0);
        central.extra.push(ExtraField::new(0xABCD, vec![1], Scope::BOTH));
        central.comment = b"junk".to_vec();
        normalize_for_torrentzip(&mut central, false);
        let first = central.clone();
        normalize_for_torrentzip(&mut central, false);
        assert_eq!(central.version_made_by, first.version_made_by);
        assert_eq!(central.mtime, first.mtime);
        assert!(central.extra.is_empty());
        assert!(central.comment.is_empty());
    }

    #[test]
    fn version_needed_table_matches_spec() {
        assert_eq!(version_needed(CompressionMethod::Deflate, EncryptionMethod::None, false, false), 20);
        assert_eq!(version_needed(CompressionMethod::Store, EncryptionMethod::Traditional, false, false), 20);
        assert_eq!(version_needed(CompressionMethod::Bzip2, EncryptionMethod::None, false, false), 46);
        assert_eq!(version_needed(CompressionMethod::Lzma, EncryptionMethod::None, false, false), 63);
        assert_eq!(version_needed(CompressionMethod::Store, EncryptionMethod::Aes256, false, false), 51);
        assert_eq!(version_needed(CompressionMethod::Store, EncryptionMethod::None, true, false), 45);
        assert_eq!(version_needed(CompressionMethod::Store, EncryptionMethod::None, false, true), 20);
        assert_eq!(version_needed(CompressionMethod::Store, EncryptionMethod::None, false, false), 10);
    }

    #[test]
    fn data_descriptor_round_trips_with_signature() {
        let dd = DataDescriptor { crc32: 7, compressed_size: 8, uncompressed_size: 9 };
        let bytes = dd.serialize();
        let mut buf = Buffer::wrap(&bytes);
        let parsed = DataDescriptor::parse(&mut buf, false).unwrap();
        assert_eq!(parsed.crc32, 7);
        assert_eq!(parsed.compressed_size, 8);
        assert_eq!(parsed.uncompressed_size, 9);
    }
}
