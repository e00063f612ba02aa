//! Per-file and per-block IV derivation.

use crate::config::{VolumeConfig, VolumeKeys};
use crate::crypto::{self, CryptoError, IV_LEN};

#[derive(thiserror::Error, Debug)]
pub enum IvError {
    #[error("corrupt header: {0}")]
    CorruptHeader(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Derive the per-file IV from the encrypted 8-byte header, if the volume
/// uses unique-IV mode; otherwise the file IV is all-zero.
///
/// `header_bytes` must be the raw bytes read from the start of the file
/// (exactly 8, iff `config.unique_iv()`). The zero IV used here is the
/// file-level "outer" IV that would, in a build with external IV chaining,
/// vary per directory; this decoder does not implement that chain, so a
/// fixed zero IV is correct for every volume this decoder accepts.
pub fn file_iv(
    config: &VolumeConfig,
    keys: &VolumeKeys,
    header_bytes: &[u8],
) -> Result<[u8; IV_LEN], IvError> {
    if !config.unique_iv() {
        return Ok([0u8; IV_LEN]);
    }
    if header_bytes.len() < IV_LEN {
        return Err(IvError::CorruptHeader(format!(
            "header read {} bytes, need {IV_LEN}",
            header_bytes.len()
        )));
    }
    let zero_iv = [0u8; IV_LEN];
    let plain = crypto::stream_decode(keys, &zero_iv, &header_bytes[..IV_LEN])?;
    let mut out = [0u8; IV_LEN];
    out.copy_from_slice(&plain[..IV_LEN]);
    Ok(out)
}

/// Derive the IV for ciphertext block `block_index`: the file IV, read as a
/// big-endian `u64`, XOR'd with `block_index` and re-encoded big-endian.
pub fn block_iv(file_iv: &[u8; IV_LEN], block_index: u64) -> [u8; IV_LEN] {
    let f = u64::from_be_bytes(*file_iv);
    (f ^ block_index).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> VolumeKeys {
        VolumeKeys {
            cipher_key: [7u8; 32],
            iv_seed: [3u8; 16],
            mac_key: [9u8; 20],
        }
    }

    #[test]
    fn file_iv_is_zero_when_not_unique() {
        let config = VolumeConfig::new(1024, false, 8, 0, true, false).unwrap();
        let keys = test_keys();
        assert_eq!(file_iv(&config, &keys, &[]).unwrap(), [0u8; IV_LEN]);
    }

    #[test]
    fn file_iv_rejects_short_header() {
        let config = VolumeConfig::new(1024, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let err = file_iv(&config, &keys, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, IvError::CorruptHeader(_)));
    }

    #[test]
    fn block_iv_xors_index_into_file_iv() {
        let fiv = [0, 0, 0, 0, 0, 0, 0, 5];
        assert_eq!(block_iv(&fiv, 0), fiv);
        assert_eq!(block_iv(&fiv, 5), [0u8; IV_LEN]);
        assert_eq!(block_iv(&fiv, 1), [0, 0, 0, 0, 0, 0, 0, 4]);
    }
}
