//! The crate's embedding surface: a volume of configuration + key material
//! + provider, opened once and used to mint [`FileStream`]s.
//!
//! Plays the role the teacher's `Archive` plays for its container format —
//! a facade gluing the core decoder to a concrete provider, so the core
//! itself never has to know what it's reading from.

use crate::config::{VolumeConfig, VolumeKeys};
use crate::provider::{FileProvider, ProviderError};
use crate::stream::{FileStream, StreamError};

#[derive(thiserror::Error, Debug)]
pub enum VolumeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// An opened EncFS volume: its configuration, key material, and a provider
/// for the raw (encrypted) directory tree.
pub struct Volume<P: FileProvider> {
    config: VolumeConfig,
    keys: VolumeKeys,
    provider: P,
}

impl<P: FileProvider> Volume<P> {
    pub fn new(config: VolumeConfig, keys: VolumeKeys, provider: P) -> Self {
        Self { config, keys, provider }
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Open an encrypted file by its raw (ciphertext-tree) path and return
    /// a decrypting [`FileStream`] over it.
    ///
    /// The returned stream borrows this volume's config and keys, so it
    /// cannot outlive the `Volume` that created it.
    pub fn open_file(&self, raw_path: &str) -> Result<FileStream<'_>, VolumeError> {
        let source = self.provider.open_input(raw_path)?;
        Ok(FileStream::open(&self.config, &self.keys, source)?)
    }

    /// Convenience: open and fully decode a file into memory.
    ///
    /// Decodes via [`FileStream::decode_to_end`] rather than
    /// `std::io::Read::read_to_end` so a `BlockMacMismatch` or corrupt-block
    /// failure surfaces as the real `StreamError` variant instead of being
    /// laundered through `io::Error` first.
    pub fn read_file(&self, raw_path: &str) -> Result<Vec<u8>, VolumeError> {
        let mut stream = self.open_file(raw_path)?;
        let mut out = Vec::new();
        stream.decode_to_end(&mut out)?;
        Ok(out)
    }
}
