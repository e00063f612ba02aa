//! The block-reader state machine and the byte-stream facade over it.

use std::io::{self, Read};

use thiserror::Error;

use crate::config::{VolumeConfig, VolumeKeys};
use crate::crypto::{self, CryptoError, IV_LEN, MAC_LEN};
use crate::iv;
use crate::provider::ByteSource;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("corrupt header: {0}")]
    CorruptHeader(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("block MAC mismatch at block {block_index}")]
    BlockMacMismatch { block_index: u64 },
    #[error("unsupported volume config: {0}")]
    UnsupportedConfig(String),
    #[error(transparent)]
    Provider(#[from] io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<iv::IvError> for StreamError {
    fn from(e: iv::IvError) -> Self {
        match e {
            iv::IvError::CorruptHeader(msg) => StreamError::CorruptHeader(msg),
            iv::IvError::Crypto(c) => StreamError::Crypto(c),
        }
    }
}

/// Outcome of reading and decoding one ciphertext block.
enum BlockOutcome {
    Eof,
    Decoded { plain: Vec<u8>, consumed: usize },
}

/// Per-open-file decryption state. Not `Send`/`Sync` by design — a stream is
/// single-threaded and must be externally synchronized if shared, matching
/// the single no-concurrent-readers contract.
pub struct FileStream<'a> {
    config: &'a VolumeConfig,
    keys: &'a VolumeKeys,
    source: Box<dyn ByteSource>,
    file_iv: [u8; IV_LEN],
    block_index: u64,
    plain_buf: Vec<u8>,
    cursor: usize,
    eof: bool,
}

impl<'a> FileStream<'a> {
    /// Open a stream over `source`, reading and decrypting the 8-byte
    /// header first if `config.unique_iv()`.
    pub fn open(
        config: &'a VolumeConfig,
        keys: &'a VolumeKeys,
        mut source: Box<dyn ByteSource>,
    ) -> Result<Self, StreamError> {
        let file_iv = if config.unique_iv() {
            let mut header = [0u8; IV_LEN];
            let n = read_fully(&mut source, &mut header)?;
            if n < IV_LEN {
                return Err(StreamError::CorruptHeader(format!(
                    "header read {n} bytes, need {IV_LEN}"
                )));
            }
            iv::file_iv(config, keys, &header)?
        } else {
            [0u8; IV_LEN]
        };

        Ok(Self {
            config,
            keys,
            source,
            file_iv,
            block_index: 0,
            plain_buf: Vec::new(),
            cursor: 0,
            eof: false,
        })
    }

    /// Pull and decode the next ciphertext block, updating `plain_buf` and
    /// `cursor`. Returns `true` if a non-empty block was buffered, `false`
    /// at EOF.
    fn read_block(&mut self) -> Result<bool, StreamError> {
        let block_size = self.config.block_size() as usize;
        let mut cipher_buf = vec![0u8; block_size];
        let n = read_fully(&mut self.source, &mut cipher_buf)?;

        let outcome = match n {
            0 => BlockOutcome::Eof,
            n if n == block_size => self.decode_full_block(&cipher_buf)?,
            n => self.decode_short_block(&cipher_buf[..n])?,
        };

        match outcome {
            BlockOutcome::Eof => {
                self.eof = true;
                Ok(false)
            }
            BlockOutcome::Decoded { plain, consumed } => {
                log::debug!(
                    "block {} decoded: {} ciphertext bytes -> {} plaintext bytes",
                    self.block_index,
                    consumed,
                    plain.len()
                );
                let header_size = self.config.block_header_size() as usize;
                self.cursor = header_size.min(plain.len());
                self.plain_buf = plain;
                self.block_index += 1;
                Ok(true)
            }
        }
    }

    fn decode_full_block(&self, cipher_buf: &[u8]) -> Result<BlockOutcome, StreamError> {
        if self.config.holes_allowed() && cipher_buf.iter().all(|&b| b == 0) {
            log::debug!("block {} is a sparse hole", self.block_index);
            return Ok(BlockOutcome::Decoded {
                plain: vec![0u8; cipher_buf.len()],
                consumed: cipher_buf.len(),
            });
        }
        let biv = iv::block_iv(&self.file_iv, self.block_index);
        let plain = crypto::block_decode(self.keys, &biv, cipher_buf)?;
        self.verify_mac(&plain)?;
        Ok(BlockOutcome::Decoded {
            plain,
            consumed: cipher_buf.len(),
        })
    }

    fn decode_short_block(&self, cipher_buf: &[u8]) -> Result<BlockOutcome, StreamError> {
        let biv = iv::block_iv(&self.file_iv, self.block_index);
        let plain = crypto::stream_decode(self.keys, &biv, cipher_buf)?;
        self.verify_mac(&plain)?;
        Ok(BlockOutcome::Decoded {
            plain,
            consumed: cipher_buf.len(),
        })
    }

    fn verify_mac(&self, plain: &[u8]) -> Result<(), StreamError> {
        let mac_bytes = self.config.block_mac_bytes() as usize;
        if mac_bytes == 0 {
            return Ok(());
        }
        let header_size = self.config.block_header_size() as usize;
        if plain.len() < header_size {
            return Ok(());
        }
        let expected = crypto::mac64(self.keys, &plain[header_size..], 0);
        if !crypto::mac_matches(&expected, &plain[..mac_bytes], mac_bytes) {
            log::warn!(
                "block {} failed MAC verification — tampering, wrong key, or disk corruption",
                self.block_index
            );
            return Err(StreamError::BlockMacMismatch {
                block_index: self.block_index,
            });
        }
        Ok(())
    }

    /// Spec-literal sentinel read: fills `dst` and returns `-1` if EOF was
    /// reached before any byte was produced, otherwise the number of bytes
    /// actually produced (which may be less than `dst.len()` only at EOF).
    pub fn read_legacy(&mut self, dst: &mut [u8]) -> Result<i64, StreamError> {
        if dst.is_empty() {
            return Ok(0);
        }
        let mut total = 0usize;
        while total < dst.len() {
            if self.cursor >= self.plain_buf.len() {
                if self.eof || !self.read_block()? {
                    break;
                }
            }
            let available = &self.plain_buf[self.cursor..];
            let take = available.len().min(dst.len() - total);
            dst[total..total + take].copy_from_slice(&available[..take]);
            self.cursor += take;
            total += take;
        }
        if total == 0 && self.eof {
            Ok(-1)
        } else {
            Ok(total as i64)
        }
    }

    /// Forward-only skip of up to `n` bytes. Returns `-1` if already at EOF,
    /// otherwise the number of bytes actually skipped. Rejects negative `n`.
    pub fn skip(&mut self, n: i64) -> Result<i64, StreamError> {
        if n < 0 {
            return Err(StreamError::InvalidArgument(format!("skip count must be non-negative, got {n}")));
        }
        let mut discard = vec![0u8; self.config.block_size() as usize];
        let mut remaining = n as u64;
        let mut skipped: u64 = 0;
        while remaining > 0 {
            let want = remaining.min(discard.len() as u64) as usize;
            let got = self.read_legacy(&mut discard[..want])?;
            if got < 0 {
                break;
            }
            skipped += got as u64;
            remaining -= got as u64;
            if (got as usize) < want {
                break;
            }
        }
        if skipped == 0 && self.eof {
            Ok(-1)
        } else {
            Ok(skipped as i64)
        }
    }

    /// Decode every remaining block into `out`, preserving the real
    /// `StreamError` kind. Unlike the `Read` impl below, this never bridges
    /// through `std::io::Error` — callers that need to distinguish
    /// `BlockMacMismatch` from a provider I/O failure should use this
    /// instead of `std::io::Read::read_to_end`.
    pub fn decode_to_end(&mut self, out: &mut Vec<u8>) -> Result<(), StreamError> {
        loop {
            if self.cursor < self.plain_buf.len() {
                out.extend_from_slice(&self.plain_buf[self.cursor..]);
                self.cursor = self.plain_buf.len();
                continue;
            }
            if self.eof || !self.read_block()? {
                return Ok(());
            }
        }
    }

    /// Releases the underlying provider source. Idempotent.
    pub fn close(&mut self) {
        self.source = Box::new(io::empty());
        self.eof = true;
    }
}

impl<'a> Read for FileStream<'a> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        loop {
            if self.cursor < self.plain_buf.len() {
                let available = &self.plain_buf[self.cursor..];
                let take = available.len().min(dst.len());
                dst[..take].copy_from_slice(&available[..take]);
                self.cursor += take;
                return Ok(take);
            }
            if self.eof {
                return Ok(0);
            }
            if !self
                .read_block()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                return Ok(0);
            }
        }
    }
}

/// Loop a provider read until `buf` is filled or EOF, tolerating the
/// partial mid-block reads §4.5 requires the decoder to cope with.
fn read_fully(source: &mut Box<dyn ByteSource>, buf: &mut [u8]) -> io::Result<usize> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use crate::provider::FileProvider;

    fn test_keys() -> VolumeKeys {
        VolumeKeys {
            cipher_key: [7u8; 32],
            iv_seed: [3u8; 16],
            mac_key: [9u8; 20],
        }
    }

    /// Test-only encoder mirroring block_decode/mac64 exactly, used because
    /// no real EncFS sample volumes are available as fixtures here.
    fn encode_volume(
        config: &VolumeConfig,
        keys: &VolumeKeys,
        file_iv: [u8; IV_LEN],
        plaintext: &[u8],
    ) -> Vec<u8> {
        use aes::cipher::{BlockEncryptMut, KeyIvInit};
        type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

        let block_size = config.block_size() as usize;
        let header_size = config.block_header_size() as usize;
        let payload_cap = block_size - header_size;

        let mut out = Vec::new();
        if config.unique_iv() {
            out.extend_from_slice(&encode_header(keys, file_iv));
        }

        let mut block_index: u64 = 0;
        let mut offset = 0;
        while offset < plaintext.len() {
            let take = (plaintext.len() - offset).min(payload_cap);
            let payload = &plaintext[offset..offset + take];
            let mut block = vec![0u8; header_size + payload.len()];
            block[header_size..].copy_from_slice(payload);
            if config.block_mac_bytes() > 0 {
                let mac = crypto::mac64(keys, payload, 0);
                for i in 0..config.block_mac_bytes() as usize {
                    block[i] = mac[MAC_LEN - 1 - i];
                }
            }

            let f = u64::from_be_bytes(file_iv);
            let biv = (f ^ block_index).to_be_bytes();
            let iv = expand_iv_for_test(&keys.iv_seed, &biv);

            if block.len() == block_size {
                let encryptor = Aes256CbcEnc::new_from_slices(&keys.cipher_key, &iv).unwrap();
                let mut buf = block.clone();
                buf.resize(block_size + 16, 0);
                let ct = encryptor
                    .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, block.len())
                    .unwrap();
                out.extend_from_slice(ct);
            } else {
                out.extend_from_slice(&stream_encode_for_test(keys, &biv, &block));
            }
            offset += take;
            block_index += 1;
        }
        out
    }

    fn expand_iv_for_test(iv_seed: &[u8; 16], iv8: &[u8; IV_LEN]) -> [u8; 16] {
        let mut out = [0u8; 16];
        for i in 0..16 {
            out[i] = iv8[i % IV_LEN] ^ iv_seed[i];
        }
        out
    }

    /// Mirrors `crypto::stream_decode` exactly: the second-pass IV is folded
    /// from `iv8` alone, not from either pass's intermediate buffer, so this
    /// encoder and the decoder it mirrors are provably inverse.
    fn stream_encode_for_test(keys: &VolumeKeys, iv8: &[u8; IV_LEN], plain: &[u8]) -> Vec<u8> {
        use aes::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes256Cfb = cfb_mode::Encryptor<aes::Aes256>;

        let mut buf = plain.to_vec();
        buf.reverse();

        let iv2_full = expand_iv_for_test(&keys.iv_seed, &crypto::mac64(keys, iv8, 0));
        let enc = Aes256Cfb::new_from_slices(&keys.cipher_key, &iv2_full).unwrap();
        enc.encrypt(&mut buf);
        buf.reverse();

        let iv1 = expand_iv_for_test(&keys.iv_seed, iv8);
        let enc = Aes256Cfb::new_from_slices(&keys.cipher_key, &iv1).unwrap();
        enc.encrypt(&mut buf);
        buf
    }

    fn encode_header(keys: &VolumeKeys, file_iv: [u8; IV_LEN]) -> Vec<u8> {
        stream_encode_for_test(keys, &[0u8; IV_LEN], &file_iv)
    }

    #[test]
    fn reads_exact_plaintext_for_single_short_block() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let file_iv = [1u8; IV_LEN];
        let plaintext = b"hello world";
        let cipher = encode_volume(&config, &keys, file_iv, plaintext);

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn reads_multi_block_file() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let file_iv = [2u8; IV_LEN];
        let plaintext: Vec<u8> = (0u8..40).collect();
        let cipher = encode_volume(&config, &keys, file_iv, &plaintext);

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn eof_then_read_returns_ok_zero_repeatedly() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let cipher = encode_volume(&config, &keys, [0u8; IV_LEN], b"x");

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let mut buf = [0u8; 16];
        let _ = stream.read(&mut buf).unwrap();
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_legacy_returns_negative_one_at_eof() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let cipher = encode_volume(&config, &keys, [0u8; IV_LEN], b"x");

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let mut buf = [0u8; 16];
        let _ = stream.read_legacy(&mut buf).unwrap();
        assert_eq!(stream.read_legacy(&mut buf).unwrap(), -1);
    }

    #[test]
    fn tampered_mac_byte_is_detected() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let mut cipher = encode_volume(&config, &keys, [0u8; IV_LEN], b"0123456789abcdef");
        let last = cipher.len() - 1;
        cipher[last] ^= 0xFF;

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let mut buf = [0u8; 16];
        let err = stream.read_legacy(&mut buf).unwrap_err();
        assert!(matches!(err, StreamError::BlockMacMismatch { .. }));
    }

    #[test]
    fn sparse_hole_decodes_to_zero_without_mac_check() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let mut cipher = encode_header(&keys, [0u8; IV_LEN]);
        cipher.extend_from_slice(&[0u8; 16]);

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![0u8; 8]);
    }

    #[test]
    fn skip_then_read_matches_full_read_dropped_prefix() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let plaintext: Vec<u8> = (0u8..40).collect();

        let make_stream = |provider: &MemoryProvider| {
            let cipher = encode_volume(&config, &keys, [9u8; IV_LEN], &plaintext);
            provider.insert("f", cipher);
            FileStream::open(&config, &keys, provider.open_input("f").unwrap()).unwrap()
        };

        let provider_a = MemoryProvider::new();
        let mut skip_then_read = make_stream(&provider_a);
        skip_then_read.skip(5).unwrap();
        let mut via_skip = Vec::new();
        skip_then_read.read_to_end(&mut via_skip).unwrap();

        let provider_b = MemoryProvider::new();
        let mut full = make_stream(&provider_b);
        let mut via_full = Vec::new();
        full.read_to_end(&mut via_full).unwrap();

        assert_eq!(via_skip, via_full[5..]);
    }

    #[test]
    fn skip_rejects_negative_count() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let cipher = encode_volume(&config, &keys, [0u8; IV_LEN], b"x");

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let err = stream.skip(-1).unwrap_err();
        assert!(matches!(err, StreamError::InvalidArgument(_)));
    }

    #[test]
    fn decode_to_end_preserves_block_mac_mismatch() {
        let config = VolumeConfig::new(16, true, 8, 0, true, false).unwrap();
        let keys = test_keys();
        let mut cipher = encode_volume(&config, &keys, [0u8; IV_LEN], b"0123456789abcdef");
        let last = cipher.len() - 1;
        cipher[last] ^= 0xFF;

        let provider = MemoryProvider::new();
        provider.insert("f", cipher);
        let source = provider.open_input("f").unwrap();
        let mut stream = FileStream::open(&config, &keys, source).unwrap();

        let mut out = Vec::new();
        let err = stream.decode_to_end(&mut out).unwrap_err();
        assert!(matches!(err, StreamError::BlockMacMismatch { .. }));
    }
}
