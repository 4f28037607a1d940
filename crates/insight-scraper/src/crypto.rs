//! Credential encryption at rest.
//!
//! Tokens are stored as `base64(iv || AES-256-CBC(pkcs7(plaintext)))` with a
//! fresh random IV per call. Each user's key is picked from a pool of ten by
//! sharding their `group_id`.

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// Number of keys in the pool.
pub const KEY_POOL_SIZE: usize = 10;

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// Errors raised by the credential codec.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key is not exactly 32 bytes.
    #[error("key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Ciphertext is malformed or its padding does not check out.
    #[error("invalid padding: {0}")]
    InvalidPadding(&'static str),

    /// Decrypted bytes are not UTF-8.
    #[error("decrypted token is not valid UTF-8")]
    InvalidUtf8,

    /// No key is configured for a shard.
    #[error("no key configured for shard {shard}")]
    MissingKey {
        /// Shard index.
        shard: usize,
    },
}

/// AES-256-CBC codec bound to one key.
#[derive(Clone)]
pub struct CredentialCodec {
    key: [u8; KEY_LEN],
}

impl CredentialCodec {
    /// Create a codec.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` unless `key` is 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        Ok(Self { key })
    }

    /// Encrypt a token. Two calls with the same input never return the same
    /// output.
    #[must_use]
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut sealed = Vec::with_capacity(IV_LEN + ciphertext.len());
        sealed.extend_from_slice(&iv);
        sealed.extend_from_slice(&ciphertext);
        STANDARD.encode(sealed)
    }

    /// Decrypt a token produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidPadding` for bad base64, truncated input
    /// or inconsistent padding, and `CryptoError::InvalidUtf8` if the
    /// plaintext is not UTF-8.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidPadding("not valid base64"))?;

        if sealed.len() < IV_LEN + BLOCK_LEN || (sealed.len() - IV_LEN) % BLOCK_LEN != 0 {
            return Err(CryptoError::InvalidPadding(
                "ciphertext is not a whole number of blocks",
            ));
        }

        let (iv, ciphertext) = sealed.split_at(IV_LEN);
        let plaintext = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| CryptoError::InvalidPadding("bad initialization vector"))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::InvalidPadding("padding bytes are inconsistent"))?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialCodec(<redacted>)")
    }
}

/// The process-wide pool of credential keys.
#[derive(Clone)]
pub struct KeyRing {
    codecs: Vec<CredentialCodec>,
}

impl KeyRing {
    /// Load `AES_KEY_0` through `AES_KEY_9` from the environment.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MissingKey` for an unset variable and
    /// `CryptoError::InvalidKeyLength` for a key that is not 32 bytes.
    pub fn from_env() -> Result<Self, CryptoError> {
        let keys = (0..KEY_POOL_SIZE)
            .map(|shard| {
                std::env::var(format!("AES_KEY_{shard}"))
                    .map_err(|_| CryptoError::MissingKey { shard })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_keys(keys)
    }

    /// Build a ring from explicit keys, shard 0 first.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MissingKey` if no key is given, or
    /// `CryptoError::InvalidKeyLength` for any key that is not 32 bytes.
    pub fn from_keys<I, K>(keys: I) -> Result<Self, CryptoError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let codecs = keys
            .into_iter()
            .map(|key| CredentialCodec::new(key.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        if codecs.is_empty() {
            return Err(CryptoError::MissingKey { shard: 0 });
        }

        Ok(Self { codecs })
    }

    /// The shard a group's key lives in: `(group_id mod 100) mod pool size`.
    #[must_use]
    pub fn shard_for(&self, group_id: i32) -> usize {
        let bucket = usize::try_from(group_id.rem_euclid(100)).unwrap_or_default();
        bucket % self.codecs.len()
    }

    /// The codec for a group.
    #[must_use]
    pub fn codec_for(&self, group_id: i32) -> &CredentialCodec {
        &self.codecs[self.shard_for(group_id)]
    }

    /// Number of keys in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Always false; a ring holds at least one key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.codecs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::block_padding::NoPadding;
    use proptest::prelude::*;

    const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> CredentialCodec {
        CredentialCodec::new(KEY).unwrap()
    }

    /// Seal one raw block without padding, so tests control the pad bytes.
    fn seal_raw_block(block: [u8; 16]) -> String {
        let iv = [7u8; IV_LEN];
        let ciphertext = Aes256CbcEnc::new(&(*KEY).into(), &iv.into())
            .encrypt_padded_vec_mut::<NoPadding>(&block);
        let mut sealed = iv.to_vec();
        sealed.extend_from_slice(&ciphertext);
        STANDARD.encode(sealed)
    }

    #[test]
    fn round_trips_edge_cases() {
        let codec = codec();
        let long = "x".repeat(10_000);
        for plaintext in ["", "a", "exactly sixteen!", "토큰 🔐 emoji", long.as_str()] {
            assert_eq!(codec.decrypt(&codec.encrypt(plaintext)).unwrap(), plaintext);
        }
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let codec = codec();
        assert_ne!(codec.encrypt("token"), codec.encrypt("token"));
    }

    #[test]
    fn output_carries_iv_and_whole_blocks() {
        let sealed = STANDARD.decode(codec().encrypt("exactly sixteen!")).unwrap();
        // A full block of plaintext gains a full block of padding.
        assert_eq!(sealed.len(), IV_LEN + 2 * BLOCK_LEN);
    }

    #[test]
    fn rejects_wrong_key_lengths() {
        for len in [0, 16, 31, 33, 64] {
            let key = vec![1u8; len];
            assert!(matches!(
                CredentialCodec::new(&key),
                Err(CryptoError::InvalidKeyLength(n)) if n == len
            ));
        }
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            codec().decrypt("not base64!!"),
            Err(CryptoError::InvalidPadding(_))
        ));
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let mut sealed = STANDARD.decode(codec().encrypt("some token")).unwrap();
        sealed.truncate(sealed.len() - 3);
        assert!(matches!(
            codec().decrypt(&STANDARD.encode(sealed)),
            Err(CryptoError::InvalidPadding(_))
        ));
    }

    #[test]
    fn rejects_iv_only_input() {
        assert!(matches!(
            codec().decrypt(&STANDARD.encode([0u8; IV_LEN])),
            Err(CryptoError::InvalidPadding(_))
        ));
    }

    #[test]
    fn rejects_zero_pad_byte() {
        let mut block = [b'a'; 16];
        block[15] = 0;
        assert!(matches!(
            codec().decrypt(&seal_raw_block(block)),
            Err(CryptoError::InvalidPadding(_))
        ));
    }

    #[test]
    fn rejects_pad_byte_above_block_size() {
        let mut block = [b'a'; 16];
        block[15] = 17;
        assert!(matches!(
            codec().decrypt(&seal_raw_block(block)),
            Err(CryptoError::InvalidPadding(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_padding() {
        let mut block = [b'a'; 16];
        block[13] = 9;
        block[14] = 3;
        block[15] = 3;
        assert!(matches!(
            codec().decrypt(&seal_raw_block(block)),
            Err(CryptoError::InvalidPadding(_))
        ));
    }

    #[test]
    fn accepts_well_formed_raw_padding() {
        let mut block = [b'a'; 16];
        block[14] = 2;
        block[15] = 2;
        assert_eq!(codec().decrypt(&seal_raw_block(block)).unwrap(), "a".repeat(14));
    }

    #[test]
    fn wrong_key_does_not_yield_original() {
        let sealed = codec().encrypt("secret token");
        let other = CredentialCodec::new(&[9u8; 32]).unwrap();
        assert!(other.decrypt(&sealed).map_or(true, |plain| plain != "secret token"));
    }

    #[test]
    fn debug_output_hides_key() {
        let shown = format!("{:?}", codec());
        assert!(!shown.contains("0123456789"));
    }

    #[test]
    fn shards_by_group_id() {
        let keys: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 32]).collect();
        let ring = KeyRing::from_keys(keys).unwrap();
        assert_eq!(ring.len(), 10);
        assert_eq!(ring.shard_for(7), 7);
        assert_eq!(ring.shard_for(123), 3);
        assert_eq!(ring.shard_for(1000), 0);
        assert_eq!(ring.shard_for(-3), 7);
    }

    #[test]
    fn ring_codecs_are_independent() {
        let ring = KeyRing::from_keys([[1u8; 32], [2u8; 32]]).unwrap();
        let sealed = ring.codec_for(0).encrypt("token");
        assert_eq!(ring.codec_for(2).decrypt(&sealed).unwrap(), "token");
    }

    #[test]
    fn empty_ring_is_rejected() {
        let keys: Vec<Vec<u8>> = Vec::new();
        assert!(matches!(
            KeyRing::from_keys(keys),
            Err(CryptoError::MissingKey { shard: 0 })
        ));
    }

    #[test]
    fn ring_rejects_short_key() {
        assert!(matches!(
            KeyRing::from_keys([vec![1u8; 32], vec![1u8; 8]]),
            Err(CryptoError::InvalidKeyLength(8))
        ));
    }

    proptest! {
        #[test]
        fn prop_round_trip(plaintext in any::<String>()) {
            let codec = codec();
            prop_assert_eq!(codec.decrypt(&codec.encrypt(&plaintext)).unwrap(), plaintext);
        }
    }
}
