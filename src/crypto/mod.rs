//! AES-256 block/stream decryption and the block MAC used by EncFS 1.x.
//!
//! Block decode:  AES-256-CBC, IV = `ivSeed XOR extend(iv8)`.
//! Stream decode: CFB over AES-256 with EncFS's dual-pass IV mangling — a
//!                single plaintext-byte change must propagate through the
//!                entire short block, which plain CFB does not guarantee on
//!                its own. The second pass's IV is folded from the block IV,
//!                not from either pass's intermediate buffer, so the scheme
//!                stays invertible by a forward encoder.
//! Block MAC:     HMAC-SHA1, folded 20 bytes -> 8 by XOR, compared
//!                byte-reversed against the stored MAC.

use aes::Aes256;
use aes::cipher::{block_padding::NoPadding, AsyncStreamCipher, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::VolumeKeys;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;
type HmacSha1 = Hmac<Sha1>;

/// Length of an EncFS file/block IV, in bytes.
pub const IV_LEN: usize = 8;

/// Length of the AES block (and thus the CBC/CFB IV), in bytes.
const CIPHER_BLOCK_LEN: usize = 16;

/// Length of a folded block MAC, in bytes.
pub const MAC_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum CryptoError {
    /// Cipher rejected the ciphertext: bad padding, or length not a multiple
    /// of the cipher block size.
    #[error("corrupt block: {0}")]
    CorruptBlock(String),
    /// IV or key material had the wrong length for the cipher. This is a
    /// programmer error distinct from data corruption — it indicates a bug
    /// in the caller, not a tampered or damaged file.
    #[error("invalid cipher parameters: {0}")]
    InvalidParameters(String),
}

/// Expand an 8-byte EncFS IV to a full 16-byte cipher IV and XOR it with
/// `ivSeed`, per the EncFS convention of repeating the 8 bytes to fill the
/// cipher's IV length.
fn expand_iv(iv_seed: &[u8; 16], iv8: &[u8; IV_LEN]) -> [u8; CIPHER_BLOCK_LEN] {
    let mut out = [0u8; CIPHER_BLOCK_LEN];
    for i in 0..CIPHER_BLOCK_LEN {
        out[i] = iv8[i % IV_LEN] ^ iv_seed[i];
    }
    out
}

/// Decrypt one full ciphertext block with AES-256-CBC.
///
/// `cipher_bytes.len()` must be a positive multiple of 16. Returns
/// `CorruptBlock` on bad padding or a misaligned length — both indicate a
/// damaged or tampered file, never a programmer error.
pub fn block_decode(
    keys: &VolumeKeys,
    iv8: &[u8; IV_LEN],
    cipher_bytes: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if cipher_bytes.is_empty() || cipher_bytes.len() % CIPHER_BLOCK_LEN != 0 {
        return Err(CryptoError::CorruptBlock(format!(
            "block length {} is not a positive multiple of {CIPHER_BLOCK_LEN}",
            cipher_bytes.len()
        )));
    }

    let iv = expand_iv(&keys.iv_seed, iv8);
    let decryptor = Aes256CbcDec::new_from_slices(&keys.cipher_key, &iv)
        .map_err(|e| CryptoError::InvalidParameters(e.to_string()))?;

    let mut buf = cipher_bytes.to_vec();
    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| CryptoError::CorruptBlock(e.to_string()))?;
    Ok(buf)
}

/// Decrypt the final, short (`< blockSize`) ciphertext block (or the 8-byte
/// file header) with EncFS's dual-pass CFB stream decode.
///
/// The dual pass exists so a single plaintext-byte change propagates through
/// the entire short block: plain CFB only propagates an error forward within
/// one cipher-block window, so EncFS decrypts once, reverses the byte order,
/// decrypts again under a second IV, then reverses again — the second
/// reversal is what turns CFB's one-directional propagation into coverage of
/// the whole block.
///
/// The second IV is folded from `iv8` alone (`mac64(keys, iv8, 0)`), not from
/// either pass's ciphertext/plaintext intermediate: an IV derived from a
/// buffer that one direction must produce *by running the very pass that IV
/// gates* can never be reconstructed by the other direction without already
/// knowing it. Pinning it to `iv8` — fixed input both decode and the
/// forward encoder have before either CFB pass runs — keeps the two
/// reversals' avalanche property while making the transform invertible.
pub fn stream_decode(
    keys: &VolumeKeys,
    iv8: &[u8; IV_LEN],
    cipher_bytes: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if cipher_bytes.is_empty() {
        return Err(CryptoError::CorruptBlock("empty stream block".into()));
    }

    let iv1 = expand_iv(&keys.iv_seed, iv8);
    let mut buf = cipher_bytes.to_vec();
    cfb_decrypt(&keys.cipher_key, &iv1, &mut buf)?;
    buf.reverse();

    let iv2 = expand_iv(&keys.iv_seed, &mac64(keys, iv8, 0));
    cfb_decrypt(&keys.cipher_key, &iv2, &mut buf)?;
    buf.reverse();

    Ok(buf)
}

fn cfb_decrypt(key: &[u8; 32], iv: &[u8; CIPHER_BLOCK_LEN], buf: &mut [u8]) -> Result<(), CryptoError> {
    let decryptor = Aes256CfbDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::InvalidParameters(e.to_string()))?;
    decryptor.decrypt(buf);
    Ok(())
}

/// HMAC-SHA1(macKey, data), folded 20 -> 8 bytes by XOR in 8-byte chunks:
/// `digest[0..8] XOR digest[8..16]`, then the final 4 bytes of the digest
/// (`digest[16..20]`) XOR into the low 4 bytes of that result.
///
/// `chained_iv` is mixed into the hash before `data` when non-zero.
/// [`stream_decode`] calls this with `data = iv8` and `chained_iv = 0` to
/// fold its second CFB IV; most other callers pass `0`.
pub fn mac64(keys: &VolumeKeys, data: &[u8], chained_iv: u64) -> [u8; IV_LEN] {
    let mut mac = HmacSha1::new_from_slice(&keys.mac_key).expect("HMAC accepts any key length");
    if chained_iv != 0 {
        mac.update(&chained_iv.to_be_bytes());
    }
    mac.update(data);
    let digest = mac.finalize().into_bytes();

    let mut folded = [0u8; MAC_LEN];
    for i in 0..MAC_LEN {
        folded[i] = digest[i] ^ digest[MAC_LEN + i];
    }
    for i in 0..4 {
        folded[i] ^= digest[16 + i];
    }
    folded
}

/// Compare a block's stored MAC bytes against the expected MAC, using the
/// byte-reversed ordering EncFS stores MACs in (`stored[i] == expected[7-i]`
/// for `i` in `0..mac_len`), in constant time.
pub fn mac_matches(expected: &[u8; MAC_LEN], stored: &[u8], mac_len: usize) -> bool {
    if stored.len() < mac_len || mac_len > MAC_LEN {
        return false;
    }
    let mut reversed = [0u8; MAC_LEN];
    for i in 0..mac_len {
        reversed[i] = expected[MAC_LEN - 1 - i];
    }
    reversed[..mac_len].ct_eq(&stored[..mac_len]).into()
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
    fn block_decode_rejects_misaligned_length() {
        let keys = test_keys();
        let err = block_decode(&keys, &[0; IV_LEN], &[0u8; 15]).unwrap_err();
        assert!(matches!(err, CryptoError::CorruptBlock(_)));
    }

    #[test]
    fn stream_decode_rejects_empty_input() {
        let keys = test_keys();
        let err = stream_decode(&keys, &[0; IV_LEN], &[]).unwrap_err();
        assert!(matches!(err, CryptoError::CorruptBlock(_)));
    }

    #[test]
    fn mac64_is_deterministic() {
        let keys = test_keys();
        let a = mac64(&keys, b"hello world", 0);
        let b = mac64(&keys, b"hello world", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn mac64_differs_with_chained_iv() {
        let keys = test_keys();
        let a = mac64(&keys, b"hello world", 0);
        let b = mac64(&keys, b"hello world", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn mac_matches_is_reversed_and_constant_time() {
        let keys = test_keys();
        let expected = mac64(&keys, b"payload", 0);
        let mut stored = [0u8; MAC_LEN];
        for i in 0..MAC_LEN {
            stored[i] = expected[MAC_LEN - 1 - i];
        }
        assert!(mac_matches(&expected, &stored, MAC_LEN));
        stored[0] ^= 0xFF;
        assert!(!mac_matches(&expected, &stored, MAC_LEN));
    }
}
