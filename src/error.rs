//! Error types for zipcore
//!
//! Every fallible operation returns `(zip_code, system_code)`-shaped
//! information through [`SZipError::code_pair`], mirroring the wire
//! form a `Source` callback reports through the `Error` command.

use std::fmt;
use std::io;

/// Result type for zipcore operations
pub type Result<T> = std::result::Result<T, SZipError>;

/// Coarse classification of an error, independent of the specific
/// condition. Used by callers that want to branch on category rather
/// than match every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Invalid argument, operation not supported, archive already closed.
    Programmer,
    /// Memory, open/read/write/seek/tell/rename/remove/close failures.
    Resource,
    /// Not a zip, inconsistent central directory, premature EOF, length mismatch.
    Format,
    /// Unsupported compression/encryption method, multi-disk archive.
    Capability,
    /// No password, wrong password, CRC/HMAC mismatch.
    Crypto,
    /// Entry changed/deleted, read-only archive, resource in use, cancelled, not-allowed.
    State,
}

/// System-side detail attached to an error, interpreted according to a
/// type tag as described in the error-taxonomy transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemDetail {
    /// No further detail.
    None,
    /// Wraps a `std::io::ErrorKind`.
    Sys(io::ErrorKind),
    /// A message from the compression backend.
    Zlib(String),
    /// An internal subcode, with the entry index it applies to if any.
    Internal { subcode: u32, entry_index: Option<usize> },
}

/// Error types that can occur during ZIP operations
#[derive(Debug)]
pub enum SZipError {
    /// I/O error
    Io(io::Error),
    /// Invalid ZIP format or structure
    InvalidFormat(String),
    /// Entry not found in ZIP archive
    EntryNotFound(String),
    /// Unsupported compression method
    UnsupportedCompression(u16),
    /// Unsupported encryption method
    UnsupportedEncryption(u16),
    /// Multi-disk archives are not supported
    MultiDisk,
    /// Archive (or a source derived from it) has already been discarded
    ArchiveClosed,
    /// Operation not supported by this source/archive configuration
    NotSupported(&'static str),
    /// Invalid argument passed to an API
    InvalidArgument(&'static str),
    /// Archive is read-only
    ReadOnly,
    /// Entry is currently open for reading/writing elsewhere
    InUse,
    /// Entry was deleted and can no longer be addressed
    EntryDeleted,
    /// Operation not allowed because the archive wants TorrentZip form
    NotAllowedTorrentZip,
    /// Commit or long-running operation was cancelled by the user callback
    Cancelled,
    /// Central directory or local header failed a consistency check
    Inconsistent { detail: String, entry_index: Option<usize> },
    /// Encryption/decryption error
    #[cfg(feature = "encryption")]
    EncryptionError(String),
    /// Incorrect password
    #[cfg(feature = "encryption")]
    IncorrectPassword,
    /// No password was supplied for an encrypted entry
    #[cfg(feature = "encryption")]
    NoPassword,
    /// CRC32 (or, for AE-2, HMAC) of decompressed/decrypted data did not match
    Crc,
}

impl SZipError {
    /// Coarse error kind.
    pub fn kind(&self) -> Kind {
        match self {
            SZipError::ArchiveClosed | SZipError::NotSupported(_) | SZipError::InvalidArgument(_) => {
                Kind::Programmer
            }
            SZipError::Io(_) => Kind::Resource,
            SZipError::InvalidFormat(_) | SZipError::Inconsistent { .. } => Kind::Format,
            SZipError::EntryNotFound(_) => Kind::Format,
            SZipError::UnsupportedCompression(_)
            | SZipError::UnsupportedEncryption(_)
            | SZipError::MultiDisk => Kind::Capability,
            #[cfg(feature = "encryption")]
            SZipError::EncryptionError(_)
            | SZipError::IncorrectPassword
            | SZipError::NoPassword => Kind::Crypto,
            SZipError::Crc => Kind::Crypto,
            SZipError::ReadOnly
            | SZipError::InUse
            | SZipError::EntryDeleted
            | SZipError::NotAllowedTorrentZip
            | SZipError::Cancelled => Kind::State,
        }
    }

    /// The `(zip_code, system_code)` transport pair described by the
    /// error-taxonomy transport: `zip_code` is a stable small integer
    /// identifying the condition, `system_code` carries the errno-ish
    /// detail (0 when there is none).
    pub fn code_pair(&self) -> (i32, i32) {
        let zip_code = match self {
            SZipError::Io(_) => 1,
            SZipError::InvalidFormat(_) => 2,
            SZipError::EntryNotFound(_) => 3,
            SZipError::UnsupportedCompression(_) => 4,
            SZipError::UnsupportedEncryption(_) => 5,
            SZipError::MultiDisk => 6,
            SZipError::ArchiveClosed => 7,
            SZipError::NotSupported(_) => 8,
            SZipError::InvalidArgument(_) => 9,
            SZipError::ReadOnly => 10,
            SZipError::InUse => 11,
            SZipError::EntryDeleted => 12,
            SZipError::NotAllowedTorrentZip => 13,
            SZipError::Cancelled => 14,
            SZipError::Inconsistent { .. } => 15,
            #[cfg(feature = "encryption")]
            SZipError::EncryptionError(_) => 16,
            #[cfg(feature = "encryption")]
            SZipError::IncorrectPassword => 17,
            #[cfg(feature = "encryption")]
            SZipError::NoPassword => 18,
            SZipError::Crc => 19,
        };
        let system_code = match self {
            SZipError::Io(e) => e.raw_os_error().unwrap_or(-1),
            SZipError::Inconsistent { entry_index, .. } => {
                entry_index.map(|i| i as i32).unwrap_or(-1)
            }
            _ => 0,
        };
        (zip_code, system_code)
    }

    pub(crate) fn inconsistent(detail: impl Into<String>, entry_index: Option<usize>) -> Self {
        SZipError::Inconsistent { detail: detail.into(), entry_index }
    }
}

impl fmt::Display for SZipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SZipError::Io(e) => write!(f, "I/O error: {}", e),
            SZipError::InvalidFormat(msg) => write!(f, "invalid ZIP format: {}", msg),
            SZipError::EntryNotFound(name) => write!(f, "entry not found: {}", name),
            SZipError::UnsupportedCompression(method) => {
                write!(f, "unsupported compression method: {}", method)
            }
            SZipError::UnsupportedEncryption(method) => {
                write!(f, "unsupported encryption method: {}", method)
            }
            SZipError::MultiDisk => write!(f, "multi-disk archives are not supported"),
            SZipError::ArchiveClosed => write!(f, "archive closed"),
            SZipError::NotSupported(what) => write!(f, "operation not supported: {}", what),
            SZipError::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            SZipError::ReadOnly => write!(f, "archive is read-only"),
            SZipError::InUse => write!(f, "entry is in use"),
            SZipError::EntryDeleted => write!(f, "entry has been deleted"),
            SZipError::NotAllowedTorrentZip => write!(f, "not allowed in TorrentZip archive"),
            SZipError::Cancelled => write!(f, "operation cancelled"),
            SZipError::Inconsistent { detail, entry_index } => match entry_index {
                Some(idx) => write!(f, "inconsistent archive (entry {}): {}", idx, detail),
                None => write!(f, "inconsistent archive: {}", detail),
            },
            #[cfg(feature = "encryption")]
            SZipError::EncryptionError(msg) => write!(f, "encryption error: {}", msg),
            #[cfg(feature = "encryption")]
            SZipError::IncorrectPassword => write!(f, "incorrect password"),
            #[cfg(feature = "encryption")]
            SZipError::NoPassword => write!(f, "no password set for encrypted entry"),
            SZipError::Crc => write!(f, "CRC/authentication check failed"),
        }
    }
}

impl std::error::Error for SZipError {}

impl From<io::Error> for SZipError {
    fn from(err: io::Error) -> Self {
        SZipError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carries_errno_as_system_code() {
        let err = SZipError::Io(io::Error::from_raw_os_error(2));
        assert_eq!(err.code_pair(), (1, 2));
        assert_eq!(err.kind(), Kind::Resource);
    }

    #[test]
    fn inconsistent_carries_entry_index() {
        let err = SZipError::inconsistent("bad crc", Some(7));
        assert_eq!(err.code_pair(), (15, 7));
        assert_eq!(err.kind(), Kind::Format);
    }
}
