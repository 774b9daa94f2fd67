//! Archive open (C9): locate the EOCD by trailing scan, follow the
//! ZIP64 locator if present, decode the central directory, and
//! populate the name hash. Implements §4.8's seven steps.

use super::{Archive, ChangeFlags, Dirent, Entry, OpenFlags};
use crate::buffer::Buffer;
use crate::dirent::{parse_torrentzip_comment, CentralHeader, Eocd, Eocd64, Eocd64Locator, CENTRAL_HEADER_SIG, EOCD_SIG};
use crate::error::{Result, SZipError};
use crate::namehash::NameHash;
use crate::source::file::FileSource;
use crate::source::{wrap, Invalidated, Source, SourceHandle, Whence};
use std::path::Path;

/// Largest trailing window worth scanning: a 64k comment plus the
/// fixed EOCD (22 bytes) and EOCD64-locator (20 bytes) sizes.
const MAX_TAIL: u64 = 0xFFFF + 22 + 20;

pub fn open_path(path: &Path, flags: OpenFlags) -> Result<Archive> {
    let source = if flags.contains(OpenFlags::CREATE) {
        FileSource::new_or_create(path)
    } else {
        FileSource::new(path)
    };
    open_from_source(wrap(source), flags)
}

pub fn open_from_source(src: SourceHandle, flags: OpenFlags) -> Result<Archive> {
    src.borrow_mut().open()?;

    // Step 1: stat, tolerate a zero-length accept-empty source as an
    // empty archive (matching `AcceptEmpty`).
    let stat = src.borrow_mut().stat()?;
    let size = stat.size.unwrap_or(0);
    if size == 0 {
        if src.borrow().accept_empty() {
            return Ok(empty_archive(src, flags));
        }
        if flags.contains(OpenFlags::CREATE) {
            return Ok(empty_archive(src, flags));
        }
        return Err(SZipError::InvalidFormat("empty source is not a valid archive".into()));
    }

    // Step 2: read the trailing window and scan for the EOCD magic.
    let tail_len = size.min(MAX_TAIL);
    let tail_start = size - tail_len;
    let mut tail = vec![0u8; tail_len as usize];
    {
        let mut s = src.borrow_mut();
        s.seek(tail_start as i64, Whence::Set)?;
        read_exact_from_source(&mut *s, &mut tail)?;
    }

    let eocd_rel_offset = find_eocd(&tail, flags.contains(OpenFlags::CHECKCONS))
        .ok_or_else(|| SZipError::InvalidFormat("end-of-central-directory record not found".into()))?;
    let mut buf = Buffer::wrap(&tail[eocd_rel_offset..]);
    let eocd = Eocd::parse(&mut buf).map_err(|_| SZipError::inconsistent("malformed EOCD record", None))?;

    // Step 3: an EOCD64 locator sits immediately before the EOCD, if present.
    let eocd64 = if eocd_rel_offset >= 20 {
        let mut locator_buf = Buffer::wrap(&tail[eocd_rel_offset - 20..eocd_rel_offset]);
        match Eocd64Locator::parse(&mut locator_buf) {
            Ok(locator) => Some(read_eocd64(&src, locator.eocd64_offset)?),
            Err(_) => None,
        }
    } else {
        None
    };

    let (total_entries, cdir_size, cdir_offset) = match &eocd64 {
        Some(e64) => (e64.total_entries, e64.cdir_size, e64.cdir_offset),
        None => (eocd.total_entries as u64, eocd.cdir_size as u64, eocd.cdir_offset as u64),
    };

    // Step 4: decode the central directory, tolerating the InfoZip
    // 64k-entry-count wraparound unless strict mode is requested.
    let mut cdir_bytes = vec![0u8; cdir_size as usize];
    {
        let mut s = src.borrow_mut();
        s.seek(cdir_offset as i64, Whence::Set)?;
        read_exact_from_source(&mut *s, &mut cdir_bytes)?;
    }
    let mut names = NameHash::new();
    let mut entries = Vec::new();
    let mut cdir_buf = Buffer::wrap(&cdir_bytes);
    loop {
        if cdir_buf.eof() {
            break;
        }
        let peek = cdir_buf.peek(4);
        match peek {
            Some(sig) if u32::from_le_bytes([sig[0], sig[1], sig[2], sig[3]]) == CENTRAL_HEADER_SIG => {}
            _ => break,
        }
        let central = CentralHeader::parse(&mut cdir_buf)
            .map_err(|_| SZipError::inconsistent("malformed central directory entry", Some(entries.len())))?;
        let idx = entries.len();
        names.insert_original(&central.filename, idx);
        entries.push(Entry { orig: Some(Dirent::from_central(&central)), changes: None, source: None, deleted: false });
    }
    if flags.contains(OpenFlags::STRICT_ENTRY_COUNT) && (entries.len() as u64) % 0x1_0000 != total_entries % 0x1_0000 {
        return Err(SZipError::inconsistent("central directory entry count mismatch", None));
    }

    // Step 5: optional per-entry local-header consistency re-check.
    if flags.contains(OpenFlags::CHECKCONS) {
        for (idx, entry) in entries.iter().enumerate() {
            let d = entry.orig.as_ref().unwrap();
            check_local_header_consistency(&src, d, idx)?;
        }
    }

    // Step 6: TorrentZip comment detection.
    let is_torrentzip = parse_torrentzip_comment(&eocd.comment)
        .map(|claimed_crc| claimed_crc == crc32fast::hash(&cdir_bytes))
        .unwrap_or(false);
    let comment_orig = if is_torrentzip { Vec::new() } else { eocd.comment.clone() };

    Ok(Archive {
        src,
        open_flags: flags,
        ch_flags: ChangeFlags::NONE,
        default_password: None,
        comment_orig,
        comment_changes: None,
        entries,
        names,
        invalidated: Invalidated::new(),
        is_torrentzip,
        progress: None,
        cancel: None,
    })
}

fn empty_archive(src: SourceHandle, flags: OpenFlags) -> Archive {
    Archive {
        src,
        open_flags: flags,
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

fn read_eocd64(src: &SourceHandle, offset: u64) -> Result<Eocd64> {
    let mut header = vec![0u8; 56];
    let mut s = src.borrow_mut();
    s.seek(offset as i64, Whence::Set)?;
    read_exact_from_source(&mut *s, &mut header)?;
    drop(s);
    let mut buf = Buffer::wrap(&header);
    Eocd64::parse(&mut buf).map_err(|_| SZipError::inconsistent("malformed ZIP64 EOCD record", None))
}

fn read_exact_from_source(src: &mut dyn Source, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(SZipError::InvalidFormat("premature end of file while reading archive structure".into()));
        }
        filled += n;
    }
    Ok(())
}

/// Scan `tail` from the front for `PK\5\6`. With `checkcons`, prefer
/// the candidate closest to the end of the buffer whose declared
/// comment length exactly accounts for the remaining bytes (the
/// consistency check); without it, take the last (closest-to-EOF)
/// match outright, per the Open Question resolution in DESIGN.md.
fn find_eocd(tail: &[u8], checkcons: bool) -> Option<usize> {
    let mut candidates = Vec::new();
    let sig = EOCD_SIG.to_le_bytes();
    let mut i = 0;
    while i + 4 <= tail.len() {
        if tail[i..i + 4] == sig {
            candidates.push(i);
        }
        i += 1;
    }
    if candidates.is_empty() {
        return None;
    }
    if !checkcons {
        return candidates.last().copied();
    }
    for &cand in candidates.iter().rev() {
        if cand + 22 > tail.len() {
            continue;
        }
        let comment_len = u16::from_le_bytes([tail[cand + 20], tail[cand + 21]]) as usize;
        if cand + 22 + comment_len == tail.len() {
            return Some(cand);
        }
    }
    candidates.last().copied()
}

fn check_local_header_consistency(src: &SourceHandle, central: &Dirent, idx: usize) -> Result<()> {
    use crate::dirent::LocalHeader;
    let mut s = src.borrow_mut();
    s.seek(central.local_header_offset as i64, Whence::Set)?;
    let mut fixed = vec![0u8; 30];
    read_exact_from_source(&mut *s, &mut fixed)?;
    let name_len = u16::from_le_bytes([fixed[26], fixed[27]]) as usize;
    let extra_len = u16::from_le_bytes([fixed[28], fixed[29]]) as usize;
    let mut rest = vec![0u8; name_len + extra_len];
    read_exact_from_source(&mut *s, &mut rest)?;
    drop(s);

    let mut all = fixed;
    all.extend_from_slice(&rest);
    let mut buf = Buffer::wrap(&all);
    let local = LocalHeader::parse(&mut buf)
        .map_err(|_| SZipError::inconsistent("malformed local header", Some(idx)))?;

    if local.filename != central.filename {
        return Err(SZipError::inconsistent("local/central filename mismatch", Some(idx)));
    }
    let has_data_descriptor = local.gp_flags & crate::dirent::gp_flag::DATA_DESCRIPTOR != 0;
    if !has_data_descriptor
        && (local.crc32 != central.crc32
            || local.compressed_size != central.compressed_size
            || local.uncompressed_size != central.uncompressed_size)
    {
        return Err(SZipError::inconsistent("local/central size or CRC mismatch", Some(idx)));
    }
    Ok(())
}
