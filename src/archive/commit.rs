//! Archive close/commit (C10): plan the output, splice unchanged
//! entries, recompose changed ones, write the central directory and
//! EOCD(64), and atomically replace the original via the sink's
//! two-phase write protocol. Implements §4.9's seven steps.

use super::{read_entry, Archive, ChangeFlags, Dirent};
use crate::dirent::{torrentzip_comment, version_needed, CentralHeader, Eocd, Eocd64, Eocd64Locator, TORRENT_LEVEL};
use crate::error::{Result, SZipError};
use crate::method::{CompressionMethod, EncryptionMethod};
use crate::pipeline::compress::{compress_bytes, compress_with_store_fallback};
use crate::source::{Source, Whence};
use std::io::Read;

const ZIP64_ENTRY_COUNT_SENTINEL: u64 = 0xFFFF;

pub fn commit(archive: &mut Archive) -> Result<()> {
    let survivor_indices: Vec<usize> = archive
        .entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.deleted)
        .map(|(i, _)| i)
        .collect();

    archive.src.borrow_mut().begin_write()?;

    match write_body(archive, &survivor_indices) {
        Ok(()) => {
            let result = archive.src.borrow_mut().commit_write();
            if result.is_ok() {
                archive.invalidated.set();
            }
            result
        }
        Err(e) => {
            let _ = archive.src.borrow_mut().rollback_write();
            Err(e)
        }
    }
}

fn write_body(archive: &mut Archive, survivors: &[usize]) -> Result<()> {
    let total = survivors.len() as u64;
    let mut final_headers: Vec<CentralHeader> = Vec::with_capacity(survivors.len());

    for (done, &idx) in survivors.iter().enumerate() {
        archive.check_cancelled()?;

        let offset = archive.src.borrow_mut().tell_write()?;
        let is_unchanged = {
            let entry = &archive.entries[idx];
            entry.changes.is_none() && entry.source.is_none() && entry.orig.is_some()
        };

        let central = if is_unchanged {
            splice_unchanged(archive, idx, offset)?
        } else {
            recompose_changed(archive, idx, offset)?
        };
        final_headers.push(central);

        archive.report_progress(done as u64 + 1, total);
    }

    write_central_directory_and_eocd(archive, final_headers)
}

/// Copy an unchanged entry's local header + data bytes verbatim from
/// the archive's original source to the sink, byte for byte (P2).
fn splice_unchanged(archive: &mut Archive, idx: usize, sink_offset: u64) -> Result<CentralHeader> {
    let dirent = archive.entries[idx].orig.clone().expect("unchanged entry has orig");

    let mut fixed = [0u8; 30];
    {
        let mut s = archive.src.borrow_mut();
        s.seek(dirent.local_header_offset as i64, Whence::Set)?;
        read_exact(&mut *s, &mut fixed)?;
    }
    let name_len = u16::from_le_bytes([fixed[26], fixed[27]]) as u64;
    let extra_len = u16::from_le_bytes([fixed[28], fixed[29]]) as u64;
    let header_len = 30 + name_len + extra_len;
    let total_len = header_len + dirent.compressed_size;

    {
        let mut s = archive.src.borrow_mut();
        s.seek(dirent.local_header_offset as i64, Whence::Set)?;
    }
    copy_bytes(archive, total_len)?;

    let mut central = dirent.to_central();
    central.local_header_offset = sink_offset;
    Ok(central)
}

/// Copy `len` bytes from the archive's backing source (already
/// positioned) to the write sink, in 64kB chunks.
fn copy_bytes(archive: &mut Archive, mut len: u64) -> Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    while len > 0 {
        let n = (len.min(buf.len() as u64)) as usize;
        let got = {
            let mut s = archive.src.borrow_mut();
            s.read(&mut buf[..n])?
        };
        if got == 0 {
            return Err(SZipError::InvalidFormat("archive source ended before an entry's declared length".into()));
        }
        archive.src.borrow_mut().write(&buf[..got])?;
        len -= got as u64;
    }
    Ok(())
}

/// Recompose an entry whose metadata or data changed: pull plaintext
/// (from its replacement source, or by decoding the original if only
/// metadata changed), compute CRC/size, compress, optionally encrypt,
/// and write a fresh local header + data.
fn recompose_changed(archive: &mut Archive, idx: usize, sink_offset: u64) -> Result<CentralHeader> {
    let mut plaintext = Vec::new();
    {
        let mut reader = read_entry::open_entry(archive, idx, None, None, None)?;
        reader.read_to_end(&mut plaintext).map_err(SZipError::Io)?;
    }

    let mut dirent = archive.entries[idx].current().expect("live entry has data").clone();
    let uncompressed_size = plaintext.len() as u64;
    let crc32 = crc32fast::hash(&plaintext);

    let want_torrentzip = archive.ch_flags.contains(ChangeFlags::WANT_TORRENTZIP);
    let compressed = if want_torrentzip {
        // Canonical form must be in place before compressing: the
        // central header built below is derived from this same dirent,
        // so the declared method always matches the bytes actually
        // written, and there is no `Store` fallback to disagree with it.
        let is_directory = dirent.is_directory();
        dirent.method = if is_directory { CompressionMethod::Store } else { CompressionMethod::Deflate };
        dirent.compression_level = TORRENT_LEVEL;
        dirent.gp_flags = 2;
        dirent.version_made_by = 0;
        dirent.disk_number = 0;
        dirent.internal_attributes = 0;
        dirent.external_attributes = 0;
        dirent.mtime = crate::dirent::DosTime::TORRENTZIP;
        dirent.extra = crate::extra::ExtraFieldList::new();
        dirent.comment.clear();
        compress_bytes(dirent.method, dirent.compression_level, &plaintext)?
    } else {
        let (actual_method, compressed) = compress_with_store_fallback(dirent.method, dirent.compression_level, &plaintext)?;
        dirent.method = actual_method;
        compressed
    };

    let final_bytes = encrypt_if_requested(archive, &dirent, compressed)?;

    dirent.crc32 = crc32;
    dirent.uncompressed_size = uncompressed_size;
    dirent.compressed_size = final_bytes.len() as u64;
    dirent.version_needed = if want_torrentzip {
        20
    } else {
        let zip64 = archive.ch_flags.contains(ChangeFlags::FORCE_ZIP64) || crate::dirent::needs_zip64_sizes(dirent.compressed_size, dirent.uncompressed_size);
        version_needed(dirent.method, dirent.encryption_method, zip64, dirent.is_directory())
    };
    dirent.local_header_offset = sink_offset;

    let local = dirent.to_local();
    let local_bytes = local.serialize(archive.ch_flags.contains(ChangeFlags::FORCE_ZIP64));
    archive.src.borrow_mut().write(&local_bytes)?;
    archive.src.borrow_mut().write(&final_bytes)?;

    archive.entries[idx].changes = Some(dirent.clone());
    Ok(dirent.to_central())
}

#[cfg(feature = "encryption")]
fn encrypt_if_requested(archive: &Archive, dirent: &Dirent, compressed: Vec<u8>) -> Result<Vec<u8>> {
    if dirent.encryption_method == EncryptionMethod::None {
        return Ok(compressed);
    }
    let password = dirent
        .password
        .clone()
        .or_else(|| archive.default_password.clone())
        .ok_or(SZipError::NoPassword)?;

    match dirent.encryption_method {
        EncryptionMethod::Traditional => {
            let check_byte = (dirent.mtime.time >> 8) as u8;
            crate::crypto::traditional::encrypt(password.as_bytes(), check_byte, &compressed)
        }
        EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256 => {
            let enc = crate::crypto::winzip_aes::encrypt(dirent.encryption_method, &password, &compressed)?;
            let mut out = Vec::with_capacity(enc.salt.len() + 2 + enc.ciphertext.len() + enc.trailer.len());
            out.extend_from_slice(&enc.salt);
            out.extend_from_slice(&enc.password_verify);
            out.extend_from_slice(&enc.ciphertext);
            out.extend_from_slice(&enc.trailer);
            Ok(out)
        }
        EncryptionMethod::None => unreachable!(),
    }
}

#[cfg(not(feature = "encryption"))]
fn encrypt_if_requested(_archive: &Archive, dirent: &Dirent, compressed: Vec<u8>) -> Result<Vec<u8>> {
    if dirent.encryption_method == EncryptionMethod::None {
        Ok(compressed)
    } else {
        Err(SZipError::UnsupportedEncryption(0))
    }
}

fn write_central_directory_and_eocd(archive: &mut Archive, mut headers: Vec<CentralHeader>) -> Result<()> {
    let want_torrentzip = archive.ch_flags.contains(ChangeFlags::WANT_TORRENTZIP);
    if want_torrentzip {
        // `recompose_changed` already normalized every header it produced
        // before compressing; this is a no-op fixed point for those and
        // the only normalization spliced-unchanged headers (copied
        // verbatim from a prior archive state) get.
        for header in headers.iter_mut() {
            let is_dir = crate::dirent::is_directory_name(&header.filename);
            crate::dirent::normalize_for_torrentzip(header, is_dir);
        }
    }

    let cdir_offset = archive.src.borrow_mut().tell_write()?;
    let force_zip64 = archive.ch_flags.contains(ChangeFlags::FORCE_ZIP64);
    let mut cdir_bytes = Vec::new();
    for header in &headers {
        cdir_bytes.extend_from_slice(&header.serialize(force_zip64));
    }
    archive.src.borrow_mut().write(&cdir_bytes)?;
    let cdir_size = cdir_bytes.len() as u64;

    let total_entries = headers.len() as u64;
    let needs_zip64 = force_zip64
        || cdir_offset >= u32::MAX as u64
        || cdir_size >= u32::MAX as u64
        || total_entries >= ZIP64_ENTRY_COUNT_SENTINEL
        || headers.iter().any(|h| h.compressed_size >= u32::MAX as u64 || h.uncompressed_size >= u32::MAX as u64 || h.local_header_offset >= u32::MAX as u64);

    if needs_zip64 {
        let eocd64_offset = archive.src.borrow_mut().tell_write()?;
        let eocd64 = Eocd64 {
            version_made_by: (3 << 8) | 45,
            version_needed: 45,
            disk_number: 0,
            disk_with_cdir: 0,
            entries_on_disk: total_entries,
            total_entries,
            cdir_size,
            cdir_offset,
        };
        archive.src.borrow_mut().write(&eocd64.serialize())?;
        let locator = Eocd64Locator { disk_with_eocd64: 0, eocd64_offset, total_disks: 1 };
        archive.src.borrow_mut().write(&locator.serialize())?;
    }

    let comment = archive.comment_changes.clone().unwrap_or_else(|| archive.comment_orig.clone());
    let comment = if want_torrentzip {
        torrentzip_comment(crc32fast::hash(&cdir_bytes))
    } else {
        comment
    };

    let eocd = Eocd {
        disk_number: 0,
        disk_with_cdir: 0,
        entries_on_disk: if needs_zip64 { ZIP64_ENTRY_COUNT_SENTINEL as u16 } else { total_entries as u16 },
        total_entries: if needs_zip64 { ZIP64_ENTRY_COUNT_SENTINEL as u16 } else { total_entries as u16 },
        cdir_size: if needs_zip64 { u32::MAX } else { cdir_size as u32 },
        cdir_offset: if needs_zip64 { u32::MAX } else { cdir_offset as u32 },
        comment,
    };
    archive.src.borrow_mut().write(&eocd.serialize())?;
    Ok(())
}

fn read_exact(src: &mut dyn Source, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(SZipError::InvalidFormat("premature EOF while splicing an unchanged entry".into()));
        }
        filled += n;
    }
    Ok(())
}
