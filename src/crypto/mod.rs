//! Encryption pipeline stages (the crypto half of C4): PKWARE
//! traditional ("ZipCrypto") and WinZip-AES (AE-2). Both primitive
//! sets (stream cipher keys, AES-CTR/HMAC-SHA1) are the out-of-scope
//! "primitive interfaces" the spec keeps external; this module is the
//! pipeline stage that drives them, gated by the `encryption` feature
//! the teacher already carries for exactly this purpose.

#![cfg(feature = "encryption")]

pub mod traditional;
pub mod winzip_aes;
