//! Forward-only block-health scan, independent of sequential decode.
//!
//! Unlike a self-describing container where a scanner resyncs on header
//! CRCs, EncFS blocks are not self-describing — their boundaries are
//! `blockSize`-derived, not discoverable from the bytes themselves. The
//! scan here is purely size-driven: it walks the ciphertext in
//! `blockSize` strides and reports, for each stride, whether it is a full
//! block, the final short block, or a sparse hole, and whether its MAC
//! verifies — all without buffering a running plaintext cursor the way
//! `FileStream` does.

use crate::config::{VolumeConfig, VolumeKeys};
use crate::crypto;
use crate::iv;
use crate::provider::{FileProvider, ProviderError};

/// Health verdict for one scanned block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHealth {
    /// Decoded and, if applicable, MAC-verified successfully.
    Healthy,
    /// All-zero ciphertext, decoded as a sparse hole (MAC not checked).
    SparseHole,
    /// Cipher rejected the ciphertext (bad padding / length).
    CorruptCiphertext(String),
    /// Decoded, but the stored MAC does not match the computed one.
    MacMismatch,
}

impl BlockHealth {
    pub fn is_usable(&self) -> bool {
        matches!(self, BlockHealth::Healthy | BlockHealth::SparseHole)
    }
}

/// Diagnostic record for one scanned ciphertext block.
#[derive(Debug, Clone)]
pub struct ScannedBlock {
    pub block_index: u64,
    pub ciphertext_offset: u64,
    pub ciphertext_len: usize,
    pub health: BlockHealth,
}

/// Aggregate result of scanning one file.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub blocks: Vec<ScannedBlock>,
}

impl ScanReport {
    pub fn healthy_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.health.is_usable()).count()
    }

    pub fn is_fully_healthy(&self) -> bool {
        self.healthy_count() == self.blocks.len()
    }
}

/// Scan one encrypted file's blocks for MAC/hole/corruption status,
/// without requiring a successful sequential decode first.
pub fn scan_file(
    config: &VolumeConfig,
    keys: &VolumeKeys,
    provider: &dyn FileProvider,
    raw_path: &str,
) -> Result<ScanReport, ProviderError> {
    let mut source = provider.open_input(raw_path)?;
    let block_size = config.block_size() as usize;

    let file_iv = if config.unique_iv() {
        let mut header = [0u8; crypto::IV_LEN];
        let n = read_fully(&mut *source, &mut header)?;
        if n < crypto::IV_LEN {
            return Ok(ScanReport { blocks: Vec::new() });
        }
        match iv::file_iv(config, keys, &header) {
            Ok(v) => v,
            Err(_) => return Ok(ScanReport { blocks: Vec::new() }),
        }
    } else {
        [0u8; crypto::IV_LEN]
    };

    let mut blocks = Vec::new();
    let mut offset = if config.unique_iv() {
        crypto::IV_LEN as u64
    } else {
        0
    };
    let mut block_index: u64 = 0;
    loop {
        let mut buf = vec![0u8; block_size];
        let n = read_fully(&mut *source, &mut buf)?;
        if n == 0 {
            break;
        }
        let health = classify_block(config, keys, &file_iv, block_index, &buf[..n]);
        log::debug!("scan: block {block_index} at offset {offset} -> {health:?}");
        blocks.push(ScannedBlock {
            block_index,
            ciphertext_offset: offset,
            ciphertext_len: n,
            health,
        });
        offset += n as u64;
        block_index += 1;
        if n < block_size {
            break;
        }
    }
    Ok(ScanReport { blocks })
}

fn classify_block(
    config: &VolumeConfig,
    keys: &VolumeKeys,
    file_iv: &[u8; crypto::IV_LEN],
    block_index: u64,
    cipher_bytes: &[u8],
) -> BlockHealth {
    let block_size = config.block_size() as usize;
    if cipher_bytes.len() == block_size && config.holes_allowed() && cipher_bytes.iter().all(|&b| b == 0) {
        return BlockHealth::SparseHole;
    }

    let biv = iv::block_iv(file_iv, block_index);
    let plain = if cipher_bytes.len() == block_size {
        crypto::block_decode(keys, &biv, cipher_bytes)
    } else {
        crypto::stream_decode(keys, &biv, cipher_bytes)
    };
    let plain = match plain {
        Ok(p) => p,
        Err(e) => return BlockHealth::CorruptCiphertext(e.to_string()),
    };

    let mac_bytes = config.block_mac_bytes() as usize;
    let header_size = config.block_header_size() as usize;
    if mac_bytes == 0 || plain.len() < header_size {
        return BlockHealth::Healthy;
    }
    let expected = crypto::mac64(keys, &plain[header_size..], 0);
    if crypto::mac_matches(&expected, &plain[..mac_bytes], mac_bytes) {
        BlockHealth::Healthy
    } else {
        BlockHealth::MacMismatch
    }
}

fn read_fully(source: &mut dyn std::io::Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = source.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
