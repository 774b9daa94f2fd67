//! Compression and encryption method codes shared between the dirent
//! codec, the pipeline stages, and the crypto primitives.
//!
//! These are the "algorithm vtable" selectors the spec keeps external:
//! the method code is core state, the algorithm behind it is a
//! collaborator reached through `pipeline::CompressionAlgorithm` /
//! `pipeline::EncryptionAlgorithm`.

/// ZIP compression method, as stored in the 2-byte method field of
/// local and central headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Store,
    Deflate,
    Bzip2,
    Lzma,
    Zstd,
    Ppmd,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Store => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Ppmd => 98,
            CompressionMethod::Unknown(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            93 => CompressionMethod::Zstd,
            98 => CompressionMethod::Ppmd,
            other => CompressionMethod::Unknown(other),
        }
    }

    /// Whether this core has a concrete `CompressionAlgorithm` for the
    /// method (vs. only knowing its wire code).
    pub fn is_implemented(self) -> bool {
        match self {
            CompressionMethod::Store | CompressionMethod::Deflate => true,
            CompressionMethod::Zstd => cfg!(feature = "zstd-support"),
            _ => false,
        }
    }
}

/// ZIP encryption method. `None` is not a wire value; it means "this
/// entry is not encrypted" (gp-flag bit 0 clear, no WinZip-AES extra).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    None,
    Traditional,
    Aes128,
    Aes192,
    Aes256,
}

impl EncryptionMethod {
    /// WinZip AES strength code carried in the WinZip-AES extra field.
    pub fn winzip_strength_code(self) -> Option<u8> {
        match self {
            EncryptionMethod::Aes128 => Some(0x01),
            EncryptionMethod::Aes192 => Some(0x02),
            EncryptionMethod::Aes256 => Some(0x03),
            _ => None,
        }
    }

    pub fn from_winzip_strength_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(EncryptionMethod::Aes128),
            0x02 => Some(EncryptionMethod::Aes192),
            0x03 => Some(EncryptionMethod::Aes256),
            _ => None,
        }
    }

    pub fn is_aes(self) -> bool {
        matches!(self, EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256)
    }

    pub fn key_size(self) -> usize {
        match self {
            EncryptionMethod::Aes128 => 16,
            EncryptionMethod::Aes192 => 24,
            EncryptionMethod::Aes256 => 32,
            _ => 0,
        }
    }

    pub fn salt_size(self) -> usize {
        match self {
            EncryptionMethod::Aes128 => 8,
            EncryptionMethod::Aes192 => 12,
            EncryptionMethod::Aes256 => 16,
            _ => 0,
        }
    }
}
