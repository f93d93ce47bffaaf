//! Container entry naming.
//!
//! Every entry lives under `{bundle_key}/`:
//!
//! - `{bundle_key}/{bundle_key}.key`: content key wrapped to the recipient
//! - `{bundle_key}/{name}.iv`: AES-GCM nonce for `name`
//! - `{bundle_key}/{name}.enc`: AES-GCM ciphertext with appended tag
//! - `{bundle_key}/{name}`: plaintext entry (unencrypted bundles only)

use rand::Rng;

pub const KEY_SUFFIX: &str = ".key";
pub const IV_SUFFIX: &str = ".iv";
pub const ENC_SUFFIX: &str = ".enc";

/// Length of generated bundle keys.
pub const BUNDLE_KEY_LEN: usize = 8;

/// Largest decompressed size of a single entry.
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Largest decompressed size of all entries together.
pub const MAX_TOTAL_BYTES: u64 = 1024 * 1024 * 1024;

/// Most archive entries a container may hold.
pub const MAX_ENTRIES: usize = 10_000;

/// Bounds applied while reading an untrusted container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub max_entry_bytes: u64,
    pub max_total_bytes: u64,
    pub max_entries: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_entry_bytes: MAX_ENTRY_BYTES,
            max_total_bytes: MAX_TOTAL_BYTES,
            max_entries: MAX_ENTRIES,
        }
    }
}

const BUNDLE_KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random bundle key. Not secret; it only namespaces entries.
pub fn generate_bundle_key() -> String {
    let mut rng = rand::thread_rng();
    (0..BUNDLE_KEY_LEN)
        .map(|_| BUNDLE_KEY_ALPHABET[rng.gen_range(0..BUNDLE_KEY_ALPHABET.len())] as char)
        .collect()
}

/// Whether `key` is a valid bundle key (ASCII alphanumeric, any case).
pub fn is_valid_bundle_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Archive name of the wrapped content key.
pub fn key_entry(bundle_key: &str) -> String {
    format!("{bundle_key}/{bundle_key}{KEY_SUFFIX}")
}

pub fn iv_entry(bundle_key: &str, name: &str) -> String {
    format!("{bundle_key}/{name}{IV_SUFFIX}")
}

pub fn enc_entry(bundle_key: &str, name: &str) -> String {
    format!("{bundle_key}/{name}{ENC_SUFFIX}")
}

pub fn plain_entry(bundle_key: &str, name: &str) -> String {
    format!("{bundle_key}/{name}")
}

/// Role of an archive entry, with the crypto suffix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind<'a> {
    ContentKey(&'a str),
    Iv(&'a str),
    Ciphertext(&'a str),
    Plain(&'a str),
}

impl<'a> EntryKind<'a> {
    /// Classify a name relative to the bundle namespace.
    pub fn classify(relative: &'a str) -> Self {
        if let Some(name) = relative.strip_suffix(KEY_SUFFIX) {
            EntryKind::ContentKey(name)
        } else if let Some(name) = relative.strip_suffix(IV_SUFFIX) {
            EntryKind::Iv(name)
        } else if let Some(name) = relative.strip_suffix(ENC_SUFFIX) {
            EntryKind::Ciphertext(name)
        } else {
            EntryKind::Plain(relative)
        }
    }

    pub fn is_crypto(&self) -> bool {
        !matches!(self, EntryKind::Plain(_))
    }
}

/// Check that `name` is a safe relative path for a bundled file.
///
/// Returns the reason on rejection.
pub fn check_file_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.starts_with('/') {
        return Err("absolute path");
    }
    if name.contains('\\') {
        return Err("backslash in path");
    }
    if name.contains('\0') {
        return Err("NUL in path");
    }
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return Err("drive prefix");
    }
    for segment in name.split('/') {
        match segment {
            "" => return Err("empty path segment"),
            "." | ".." => return Err("relative path segment"),
            _ => {}
        }
    }
    Ok(())
}

/// Like [`check_file_name`], additionally rejecting names that would be
/// misread as crypto entries.
pub fn check_new_file_name(name: &str) -> Result<(), &'static str> {
    check_file_name(name)?;
    if EntryKind::classify(name).is_crypto() {
        return Err("reserved suffix (.key, .iv, .enc)");
    }
    Ok(())
}
