//! String helper — encoding detection and CP437/UTF-8 conversion for
//! filenames and comments, isolated from the codec per the spec's
//! "external collaborator" boundary for character encoding.

/// Detected (or asserted) encoding of a raw byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Unknown,
    Ascii,
    Utf8Known,
    Utf8Guessed,
    Cp437,
    Error,
}

/// Raw bytes plus the encoding zipcore believes they are in, and a
/// cached UTF-8 conversion when one was needed.
///
/// Once `encoding` is `Utf8Known` or `Ascii` the raw bytes are emitted
/// as-is on write; `Cp437` bytes are converted to UTF-8 lazily via
/// `as_str`.
#[derive(Debug, Clone)]
pub struct ZipString {
    raw: Vec<u8>,
    encoding: Encoding,
    converted: Option<String>,
}

impl ZipString {
    /// Build from raw bytes, detecting ASCII/UTF-8/CP437 in that
    /// preference order. `utf8_flagged` corresponds to general-purpose
    /// bit 11 in the header this string was read from.
    pub fn detect(raw: Vec<u8>, utf8_flagged: bool) -> Self {
        if raw.is_ascii() {
            return ZipString { raw, encoding: Encoding::Ascii, converted: None };
        }
        if let Ok(s) = std::str::from_utf8(&raw) {
            let encoding = if utf8_flagged { Encoding::Utf8Known } else { Encoding::Utf8Guessed };
            return ZipString { raw, encoding, converted: Some(s.to_string()) };
        }
        // Not ASCII, not valid UTF-8: decode as CP437 (total, every byte maps).
        let converted = decode_cp437(&raw);
        ZipString { raw, encoding: Encoding::Cp437, converted: Some(converted) }
    }

    /// Build directly from a Rust string (always UTF-8/ASCII known).
    pub fn from_str(s: &str) -> Self {
        let encoding = if s.is_ascii() { Encoding::Ascii } else { Encoding::Utf8Known };
        ZipString { raw: s.as_bytes().to_vec(), encoding, converted: None }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// UTF-8 view of this string, converting from CP437 on first use.
    pub fn as_str(&mut self) -> &str {
        if self.converted.is_none() {
            self.converted = Some(match self.encoding {
                Encoding::Cp437 => decode_cp437(&self.raw),
                _ => String::from_utf8_lossy(&self.raw).into_owned(),
            });
        }
        self.converted.as_deref().unwrap()
    }

    /// Whether the general-purpose UTF-8 bit should be set when this
    /// string is written as a local/central filename or comment.
    pub fn should_set_utf8_flag(&self) -> bool {
        matches!(self.encoding, Encoding::Utf8Known | Encoding::Utf8Guessed)
    }
}

/// CP437 code page, positions 0x80..=0xFF (0x00..=0x7F is plain ASCII).
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', 'É', 'æ', 'Æ',
    'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', 'á', 'í', 'ó', 'ú', 'ñ', 'Ñ',
    'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕',
    '╣', '║', '╗', '╝', '╜', '╛', '┐', '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦',
    '╠', '═', '╬', '╧', '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐',
    '▀', 'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', '≡', '±',
    '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00a0}',
];

/// CP437 is a total mapping over all 256 byte values: decode never fails.
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b < 0x80 { b as char } else { CP437_HIGH[(b - 0x80) as usize] })
        .collect()
}
