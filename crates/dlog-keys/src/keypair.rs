//! RSA key pair generation and on-disk layout.
//!
//! The public half is written as an SPKI PEM that producers embed; the private
//! half is only ever written in protected form (see [`crate::protect`]).

use crate::protect::{protect_private_key, protect_private_key_pem};
use crate::{KeyError, Result};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

/// Modulus size for generated keys.
pub const RSA_MODULUS_BITS: usize = 2048;

/// A freshly generated RSA key pair.
pub struct KeyPair {
    pub public_key: RsaPublicKey,
    pub private_key: RsaPrivateKey,
    pub modulus_bits: usize,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("modulus_bits", &self.modulus_bits)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// SPKI PEM encoding of the public key.
    pub fn public_key_pem(&self) -> Result<String> {
        public_key_to_pem(&self.public_key)
    }

    /// PKCS#8 PEM encoding of the private key.
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        private_key_to_pem(&self.private_key)
    }
}

/// Generate a 2048-bit RSA key pair.
pub fn generate_key_pair() -> Result<KeyPair> {
    let private_key = RsaPrivateKey::new(&mut OsRng, RSA_MODULUS_BITS)?;
    let public_key = RsaPublicKey::from(&private_key);
    Ok(KeyPair {
        public_key,
        private_key,
        modulus_bits: RSA_MODULUS_BITS,
    })
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::CryptoBackend(e.to_string()))
}

pub fn private_key_to_pem(key: &RsaPrivateKey) -> Result<Zeroizing<String>> {
    key.to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyError::CryptoBackend(e.to_string()))
}

/// Parse an SPKI PEM public key.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem.trim())
        .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

/// Persisted format of the protected private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFileFormat {
    /// PBKDF2 + AES-256-GCM JSON envelope (`.pem.json`).
    #[default]
    Json,
    /// Passphrase-encrypted PKCS#8 PEM (`.pem`).
    EncryptedPem,
}

impl KeyFileFormat {
    /// Required file name suffix for the private key file.
    pub fn private_suffix(&self) -> &'static str {
        match self {
            KeyFileFormat::Json => ".pem.json",
            KeyFileFormat::EncryptedPem => ".pem",
        }
    }
}

impl std::str::FromStr for KeyFileFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(KeyFileFormat::Json),
            "pem" | "pkcs8" => Ok(KeyFileFormat::EncryptedPem),
            _ => Err(format!("unknown key file format: {}", s)),
        }
    }
}

/// Options for [`write_key_pair`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub format: KeyFileFormat,
    /// Overwrite existing key files.
    pub replace: bool,
}

/// Write the public key and the passphrase-protected private key.
///
/// Paths are checked before anything is written: the public key must end in
/// `.pem`, the private key in the suffix of the chosen format, and neither may
/// exist unless `replace` is set.
pub fn write_key_pair(
    pair: &KeyPair,
    public_path: &Path,
    private_path: &Path,
    passphrase: &str,
    options: &WriteOptions,
) -> Result<()> {
    check_target(public_path, ".pem", options.replace)?;
    check_target(private_path, options.format.private_suffix(), options.replace)?;
    if public_path == private_path {
        return Err(KeyError::InvalidKeyPath {
            path: private_path.to_path_buf(),
            reason: "public and private key paths must differ".to_string(),
        });
    }
    if passphrase.is_empty() {
        return Err(KeyError::EmptyPassphrase);
    }

    let protected = match options.format {
        KeyFileFormat::Json => {
            let envelope = protect_private_key(&pair.private_key, passphrase)?;
            Zeroizing::new(serde_json::to_string_pretty(&envelope)?)
        }
        KeyFileFormat::EncryptedPem => protect_private_key_pem(&pair.private_key, passphrase)?,
    };

    write_private(private_path, protected.as_bytes())?;
    info!(path = %private_path.display(), format = ?options.format, "Encrypted private key saved");

    fs::write(public_path, pair.public_key_pem()?)?;
    info!(path = %public_path.display(), "Public key saved");

    Ok(())
}

fn check_target(path: &Path, suffix: &str, replace: bool) -> Result<()> {
    let name = path.to_string_lossy();
    if !name.ends_with(suffix) {
        return Err(KeyError::InvalidKeyPath {
            path: path.to_path_buf(),
            reason: format!("file name must end with {}", suffix),
        });
    }
    if path.exists() && !replace {
        return Err(KeyError::AlreadyExists(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protect::PrivateKeyFile;
    use tempfile::TempDir;

    #[test]
    fn test_generate_key_pair_is_2048_bits() {
        use rsa::traits::PublicKeyParts;

        let pair = generate_key_pair().unwrap();
        assert_eq!(pair.modulus_bits, 2048);
        assert_eq!(pair.public_key.size(), 256);
    }

    #[test]
    fn test_public_key_pem_roundtrip() {
        let pair = generate_key_pair().unwrap();
        let pem = pair.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let parsed = parse_public_key_pem(&pem).unwrap();
        assert_eq!(parsed, pair.public_key);
    }

    #[test]
    fn test_parse_public_key_rejects_garbage() {
        let result = parse_public_key_pem("not a key");
        assert!(matches!(result, Err(KeyError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_key_file_format_from_str() {
        assert_eq!("json".parse::<KeyFileFormat>().unwrap(), KeyFileFormat::Json);
        assert_eq!(
            "PEM".parse::<KeyFileFormat>().unwrap(),
            KeyFileFormat::EncryptedPem
        );
        assert!("der".parse::<KeyFileFormat>().is_err());
    }

    #[test]
    fn test_write_key_pair_json() {
        let dir = TempDir::new().unwrap();
        let public_path = dir.path().join("public.pem");
        let private_path = dir.path().join("private.pem.json");
        let pair = generate_key_pair().unwrap();

        write_key_pair(
            &pair,
            &public_path,
            &private_path,
            "hunter2",
            &WriteOptions::default(),
        )
        .unwrap();

        let public = fs::read_to_string(&public_path).unwrap();
        assert_eq!(parse_public_key_pem(&public).unwrap(), pair.public_key);

        let file = PrivateKeyFile::load(&private_path).unwrap();
        let unlocked = file.unlock("hunter2").unwrap();
        assert_eq!(unlocked, pair.private_key);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let private_path = dir.path().join("private.pem.json");
        let pair = generate_key_pair().unwrap();
        write_key_pair(
            &pair,
            &dir.path().join("public.pem"),
            &private_path,
            "pw",
            &WriteOptions::default(),
        )
        .unwrap();

        let mode = fs::metadata(&private_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_write_key_pair_rejects_bad_suffixes() {
        let dir = TempDir::new().unwrap();
        let pair = generate_key_pair().unwrap();

        let result = write_key_pair(
            &pair,
            &dir.path().join("public.key"),
            &dir.path().join("private.pem.json"),
            "pw",
            &WriteOptions::default(),
        );
        assert!(matches!(result, Err(KeyError::InvalidKeyPath { .. })));

        let result = write_key_pair(
            &pair,
            &dir.path().join("public.pem"),
            &dir.path().join("private.json"),
            "pw",
            &WriteOptions::default(),
        );
        assert!(matches!(result, Err(KeyError::InvalidKeyPath { .. })));
        assert!(!dir.path().join("public.pem").exists());
    }

    #[test]
    fn test_write_key_pair_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let public_path = dir.path().join("public.pem");
        let private_path = dir.path().join("private.pem.json");
        fs::write(&public_path, "existing").unwrap();
        let pair = generate_key_pair().unwrap();

        let result = write_key_pair(
            &pair,
            &public_path,
            &private_path,
            "pw",
            &WriteOptions::default(),
        );
        assert!(matches!(result, Err(KeyError::AlreadyExists(_))));
        assert_eq!(fs::read_to_string(&public_path).unwrap(), "existing");

        let options = WriteOptions {
            replace: true,
            ..Default::default()
        };
        write_key_pair(&pair, &public_path, &private_path, "pw", &options).unwrap();
        assert!(fs::read_to_string(&public_path)
            .unwrap()
            .starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn test_write_key_pair_requires_passphrase() {
        let dir = TempDir::new().unwrap();
        let pair = generate_key_pair().unwrap();
        let result = write_key_pair(
            &pair,
            &dir.path().join("public.pem"),
            &dir.path().join("private.pem.json"),
            "",
            &WriteOptions::default(),
        );
        assert!(matches!(result, Err(KeyError::EmptyPassphrase)));
    }
}
