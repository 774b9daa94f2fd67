//! # zipcore: a general-purpose ZIP archive library
//!
//! `zipcore` reads, creates, and modifies ZIP archives in place, with
//! bit-accurate preservation of the ZIP/ZIP64 on-disk format: opening
//! and re-closing an archive without changes reproduces it byte for
//! byte (including TorrentZip's canonical form), and any entry you
//! don't touch is spliced through unchanged rather than recompressed.
//!
//! ## Quick start
//!
//! ### Reading an archive
//!
//! ```no_run
//! use zipcore::Archive;
//!
//! let archive = Archive::open("archive.zip")?;
//! for i in 0..archive.entry_count() {
//!     let stat = archive.stat(i)?;
//!     println!("{}: {} bytes", String::from_utf8_lossy(&stat.name), stat.size);
//! }
//! let data = archive.read(0, None)?;
//! # Ok::<(), zipcore::SZipError>(())
//! ```
//!
//! ### Building an archive
//!
//! ```no_run
//! use zipcore::{source::wrap, source::mem::BufferSource, Archive};
//!
//! let mut archive = Archive::create_in_memory();
//! archive.add(b"hello.txt", wrap(BufferSource::new(b"Hello, World!".to_vec())))?;
//! archive.close()?;
//! # Ok::<(), zipcore::SZipError>(())
//! ```
//!
//! The crate is intentionally single-threaded: an [`Archive`] and the
//! [`source::SourceHandle`]s it hands out are `Rc`-based, matching the
//! reference implementation's one-archive-per-thread model.

pub mod archive;
pub mod buffer;
pub mod dirent;
pub mod error;
pub mod extra;
pub mod method;
pub mod namehash;
pub mod pipeline;
pub mod source;
pub mod string;

#[cfg(feature = "encryption")]
pub mod crypto;

pub use archive::{Archive, ChangeFlags, Dirent as ArchiveDirent, EntryStat, OpenFlags};
pub use error::{Result, SZipError};
pub use extra::{ExtraField, Scope};
pub use method::{CompressionMethod, EncryptionMethod};
