//! Per-bundle content key: AES-256-GCM per entry, RSA-OAEP-SHA256 wrapping.

use crate::{BundleError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// AES-256 key length in bytes.
pub const CONTENT_KEY_LEN: usize = 32;
/// AES-GCM nonce length in bytes.
pub const IV_LEN: usize = 12;
/// AES-GCM tag length in bytes, appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Symmetric key shared by every encrypted entry of one bundle.
///
/// Zeroized on drop; only ever leaves memory wrapped to an RSA key.
pub struct ContentKey(Zeroizing<[u8; CONTENT_KEY_LEN]>);

impl ContentKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; CONTENT_KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        Self(key)
    }

    /// RSA-OAEP (SHA-256, MGF1-SHA-256) wrap of the raw key bytes.
    pub fn wrap(&self, recipient: &RsaPublicKey) -> Result<Vec<u8>> {
        recipient
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &self.0[..])
            .map_err(|e| BundleError::CryptoBackend(e.to_string()))
    }

    /// Inverse of [`wrap`](Self::wrap). `entry` names the key entry in errors.
    pub fn unwrap_with(wrapped: &[u8], private_key: &RsaPrivateKey, entry: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            private_key
                .decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|_| BundleError::AuthenticationFailed {
                    name: entry.to_string(),
                })?,
        );
        if raw.len() != CONTENT_KEY_LEN {
            return Err(BundleError::AuthenticationFailed {
                name: entry.to_string(),
            });
        }
        let mut key = Zeroizing::new([0u8; CONTENT_KEY_LEN]);
        key.copy_from_slice(&raw);
        Ok(Self(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0[..]))
    }

    /// Encrypt under a fresh random IV. Returns `(iv, ciphertext || tag)`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<([u8; IV_LEN], Vec<u8>)> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = self.cipher().encrypt(Nonce::from_slice(&iv), plaintext)?;
        Ok((iv, ciphertext))
    }

    /// Verify and decrypt one entry. `name` is reported on failure.
    pub fn open(&self, name: &str, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != IV_LEN || ciphertext.len() < TAG_LEN {
            return Err(BundleError::AuthenticationFailed {
                name: name.to_string(),
            });
        }
        self.cipher()
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| BundleError::AuthenticationFailed {
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlog_keys::generate_key_pair;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = ContentKey::generate();
        let (iv, ct) = key.seal(b"hello bundle").unwrap();
        assert_eq!(ct.len(), b"hello bundle".len() + TAG_LEN);
        assert_eq!(key.open("x", &iv, &ct).unwrap(), b"hello bundle");
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let key = ContentKey::generate();
        let (iv1, ct1) = key.seal(b"same").unwrap();
        let (iv2, ct2) = key.seal(b"same").unwrap();
        assert_ne!(iv1, iv2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_open_rejects_tampering() {
        let key = ContentKey::generate();
        let (mut iv, mut ct) = key.seal(b"payload").unwrap();

        ct[0] ^= 0x01;
        assert!(matches!(
            key.open("debug.txt", &iv, &ct),
            Err(BundleError::AuthenticationFailed { name }) if name == "debug.txt"
        ));
        ct[0] ^= 0x01;

        iv[11] ^= 0x80;
        assert!(key.open("debug.txt", &iv, &ct).is_err());
        iv[11] ^= 0x80;

        assert!(key.open("debug.txt", &iv[..8], &ct).is_err());
        assert!(key.open("debug.txt", &iv, &ct[..4]).is_err());
        assert!(key.open("debug.txt", &iv, &ct).is_ok());
    }

    #[test]
    fn test_wrong_content_key_fails() {
        let (iv, ct) = ContentKey::generate().seal(b"payload").unwrap();
        assert!(ContentKey::generate().open("x", &iv, &ct).is_err());
    }

    #[test]
    fn test_wrap_unwrap() {
        let pair = generate_key_pair().unwrap();
        let key = ContentKey::generate();
        let (iv, ct) = key.seal(b"wrapped").unwrap();

        let wrapped = key.wrap(&pair.public_key).unwrap();
        assert_eq!(wrapped.len(), 256);

        let unwrapped = ContentKey::unwrap_with(&wrapped, &pair.private_key, "k.key").unwrap();
        assert_eq!(unwrapped.open("x", &iv, &ct).unwrap(), b"wrapped");
    }

    #[test]
    fn test_unwrap_with_wrong_private_key() {
        let recipient = generate_key_pair().unwrap();
        let other = generate_key_pair().unwrap();
        let wrapped = ContentKey::generate().wrap(&recipient.public_key).unwrap();

        let result = ContentKey::unwrap_with(&wrapped, &other.private_key, "k/k.key");
        assert!(matches!(
            result,
            Err(BundleError::AuthenticationFailed { name }) if name == "k/k.key"
        ));
    }

    #[test]
    fn test_debug_redacts() {
        assert_eq!(format!("{:?}", ContentKey::generate()), "ContentKey(..)");
    }
}
