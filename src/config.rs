//! Immutable per-volume parameters and key material.
//!
//! `VolumeConfig` is validated once, at construction, rather than deep
//! inside block decode — the same fail-fast-at-open shape the teacher uses
//! for its own container header.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("blockSize must be positive, got {0}")]
    NonPositiveBlockSize(u32),
    #[error("blockMACBytes must be 0 or 8, got {0}")]
    InvalidMacBytes(u32),
    #[error("blockHeaderSize ({header}) exceeds blockSize ({block})")]
    HeaderLargerThanBlock { header: u32, block: u32 },
    #[error("external IV chaining for file data is not supported by this decoder")]
    ExternalIvChainingUnsupported,
}

/// Immutable parameters of an EncFS volume, as read from its (out-of-scope)
/// configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeConfig {
    block_size: u32,
    unique_iv: bool,
    block_mac_bytes: u32,
    block_mac_rand_bytes: u32,
    holes_allowed: bool,
}

impl VolumeConfig {
    /// Validate and construct a volume configuration.
    ///
    /// `external_iv_chaining` models the on-disk flag of the same name;
    /// this decoder has no implementation for it, so any volume requesting
    /// it is rejected rather than silently decoded wrong.
    pub fn new(
        block_size: u32,
        unique_iv: bool,
        block_mac_bytes: u32,
        block_mac_rand_bytes: u32,
        holes_allowed: bool,
        external_iv_chaining: bool,
    ) -> Result<Self, ConfigError> {
        if external_iv_chaining {
            return Err(ConfigError::ExternalIvChainingUnsupported);
        }
        if block_size == 0 {
            return Err(ConfigError::NonPositiveBlockSize(block_size));
        }
        if block_mac_bytes != 0 && block_mac_bytes != 8 {
            return Err(ConfigError::InvalidMacBytes(block_mac_bytes));
        }
        let header = block_mac_bytes + block_mac_rand_bytes;
        if header > block_size {
            return Err(ConfigError::HeaderLargerThanBlock {
                header,
                block: block_size,
            });
        }
        Ok(Self {
            block_size,
            unique_iv,
            block_mac_bytes,
            block_mac_rand_bytes,
            holes_allowed,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn unique_iv(&self) -> bool {
        self.unique_iv
    }

    pub fn block_mac_bytes(&self) -> u32 {
        self.block_mac_bytes
    }

    pub fn block_mac_rand_bytes(&self) -> u32 {
        self.block_mac_rand_bytes
    }

    pub fn holes_allowed(&self) -> bool {
        self.holes_allowed
    }

    /// `blockMACBytes + blockMACRandBytes`: bytes of header prepended to
    /// every block's plaintext, ahead of the payload.
    pub fn block_header_size(&self) -> u32 {
        self.block_mac_bytes + self.block_mac_rand_bytes
    }
}

/// Key material derived from password + salt during volume open.
///
/// Bound to the volume for its lifetime; the decoder only ever reads these
/// fields, never mutates or regenerates them.
#[derive(Clone, Copy)]
pub struct VolumeKeys {
    pub cipher_key: [u8; 32],
    pub iv_seed: [u8; 16],
    pub mac_key: [u8; 20],
}

impl std::fmt::Debug for VolumeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeKeys").field("cipher_key", &"[redacted]").finish()
    }
}
