//! # rencfs — EncFS 1.x read-path decoder
//!
//! Turns an encrypted on-disk EncFS file into a plaintext byte stream.
//!
//! Guarantees:
//! - Cipher is fixed to AES-256 (CBC for full blocks, CFB dual-pass for the
//!   final short block and the 8-byte file header); no cipher negotiation
//! - Every non-hole block's MAC is verified before its plaintext is handed
//!   to the caller; a mismatch aborts the stream, never silently ignored
//! - Sparse (all-zero ciphertext) blocks decode to all-zero plaintext
//!   without running the cipher, matching EncFS's hole-preserving layout
//! - A `FileStream` is single-threaded and not safe for concurrent use, but
//!   independent streams over the same `VolumeConfig`/`VolumeKeys` may run
//!   on independent threads, since both are immutable
//! - This crate reads; it does not write, seek backward, or decode EncFS 2.x
//!   extensions or external-IV-chained file data (see [`config::ConfigError`])

pub mod config;
pub mod crypto;
pub mod diagnostics;
pub mod iv;
pub mod parallel;
pub mod provider;
pub mod stream;
pub mod volume;

pub use config::{ConfigError, VolumeConfig, VolumeKeys};
pub use crypto::CryptoError;
pub use diagnostics::{scan_file, BlockHealth, ScanReport, ScannedBlock};
pub use provider::{ByteSink, ByteSource, FileMeta, FileProvider, LocalFsProvider, MemoryProvider, ProviderError};
pub use stream::{FileStream, StreamError};
pub use volume::{Volume, VolumeError};
