//! Error types for bundle operations.

use thiserror::Error;

/// Errors that can occur while building, identifying or reading bundles.
#[derive(Error, Debug)]
pub enum BundleError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A platform cipher primitive failed
    #[error("crypto backend error: {0}")]
    CryptoBackend(String),

    /// The recipient public key could not be parsed
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Bundle id does not match `key-host-remote[.tag]*`
    #[error("malformed bundle id '{id}': {reason}")]
    MalformedBundleId { id: String, reason: &'static str },

    /// Bundle id names a host with no registered provider
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// Provider endpoints are unusable
    #[error("invalid provider '{tag}': {reason}")]
    InvalidProvider { tag: String, reason: String },

    /// Upload succeeded but the response carried no recognisable reference
    #[error("unexpected upload response: {body}")]
    UnexpectedUploadResponse { body: String },

    /// Bundle key or file name rejected by the bundler
    #[error("invalid entry name '{name}': {reason}")]
    InvalidEntryName { name: String, reason: &'static str },

    /// Ciphertext without IV or IV without ciphertext
    #[error("incomplete entry '{name}': missing {missing}")]
    IncompleteEntry { name: String, missing: &'static str },

    /// Crypto entries in a bundle whose id does not carry `enc`
    #[error("unexpected encrypted content '{name}' in a plaintext bundle")]
    UnexpectedEncryptedContent { name: String },

    /// Plaintext entries in a bundle whose id carries `enc`
    #[error("unexpected plaintext content '{name}' in an encrypted bundle")]
    UnexpectedPlaintextContent { name: String },

    /// Entry outside the bundle namespace or with an unsafe path
    #[error("foreign entry '{name}' in bundle")]
    ForeignEntry { name: String },

    /// Restored names where one is a directory prefix of another
    #[error("entry '{name}' conflicts with file '{parent}'")]
    ConflictingEntries { name: String, parent: String },

    /// Entry decompresses past the per-entry limit
    #[error("entry '{name}' exceeds {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },

    /// Entries together decompress past the container limit
    #[error("bundle contents exceed {limit} bytes")]
    ContainerTooLarge { limit: u64 },

    /// More archive entries than a bundle may hold
    #[error("bundle has {count} entries, limit is {limit}")]
    TooManyEntries { count: usize, limit: usize },

    /// Encrypted entries but no wrapped content key
    #[error("bundle has encrypted entries but no content key")]
    MissingContentKey,

    /// More than one wrapped content key
    #[error("bundle has more than one content key")]
    DuplicateContentKey,

    /// Encrypted bundle opened without a private key
    #[error("a private key is required to decrypt this bundle")]
    PrivateKeyRequired,

    /// Key unwrap or entry tag verification failed
    #[error("authentication failed for '{name}': wrong key or tampered bundle")]
    AuthenticationFailed { name: String },
}

impl From<aes_gcm::Error> for BundleError {
    fn from(err: aes_gcm::Error) -> Self {
        BundleError::CryptoBackend(err.to_string())
    }
}

/// Longest excerpt of untrusted text kept in an error message.
const EXCERPT_MAX_CHARS: usize = 120;

/// First non-empty line of `text`, cut to a bounded length, for messages
/// that must stay on one line.
pub(crate) fn excerpt(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let mut out: String = line
        .chars()
        .filter(|c| !c.is_control())
        .take(EXCERPT_MAX_CHARS)
        .collect();
    if line.chars().count() > EXCERPT_MAX_CHARS {
        out.push_str("...");
    }
    out
}

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
