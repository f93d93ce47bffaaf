//! Error types for key management.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while generating, protecting or unlocking keys.
#[derive(Error, Debug)]
pub enum KeyError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A platform cipher primitive failed or is unavailable
    #[error("crypto backend error: {0}")]
    CryptoBackend(String),

    /// Wrong passphrase or a tampered/corrupted key file
    #[error("authentication failed: wrong passphrase or corrupted private key")]
    AuthenticationFailed,

    /// The key file names a KDF or cipher this build does not implement
    #[error("unsupported key protection algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key file could not be parsed
    #[error("malformed key file: {0}")]
    MalformedKeyFile(String),

    /// A public key could not be parsed
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Key output path rejected before anything was written
    #[error("invalid key path '{path}': {reason}")]
    InvalidKeyPath { path: PathBuf, reason: String },

    /// Existing key file would be overwritten
    #[error("will not overwrite existing file: {0}")]
    AlreadyExists(PathBuf),

    /// No passphrase was entered
    #[error("a passphrase is required")]
    EmptyPassphrase,

    /// Platform credential store failure
    #[error("credential store error: {0}")]
    CredentialStore(String),

    /// Interactive prompt failed (no terminal, interrupted, ...)
    #[error("passphrase prompt failed: {0}")]
    Prompt(String),
}

impl From<rsa::Error> for KeyError {
    fn from(err: rsa::Error) -> Self {
        KeyError::CryptoBackend(err.to_string())
    }
}

/// Result type alias for key operations.
pub type Result<T> = std::result::Result<T, KeyError>;
