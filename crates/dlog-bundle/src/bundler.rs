//! Producer side: collects files, encrypts them and builds the container.

use crate::bundle_id::{BundleId, TAG_ENC, TAG_REFS};
use crate::crypto::{ContentKey, IV_LEN};
use crate::layout::{self, check_new_file_name, is_valid_bundle_key};
use crate::{BundleError, Result};
use rsa::RsaPublicKey;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime};

/// Recorded payload for one bundled file.
#[derive(Clone)]
enum Entry {
    Plain(Vec<u8>),
    Sealed { iv: [u8; IV_LEN], ciphertext: Vec<u8> },
}

/// Content key plus its wrapped form, created on the first encrypted add.
struct Encryption {
    recipient: RsaPublicKey,
    content_key: Option<ContentKey>,
    wrapped_key: Option<Vec<u8>>,
}

/// Builder for one diagnostic bundle.
///
/// With a recipient public key every file is encrypted; without one files are
/// stored as plaintext and no content key is ever created.
pub struct Bundler {
    bundle_key: String,
    encryption: Option<Encryption>,
    entries: BTreeMap<String, Entry>,
    has_refs: bool,
    plain_bytes: u64,
}

impl Bundler {
    /// New bundle with a random key, encrypting to `public_key_pem` if given.
    pub fn new(public_key_pem: Option<&str>) -> Result<Self> {
        let recipient = public_key_pem
            .map(|pem| {
                dlog_keys::parse_public_key_pem(pem)
                    .map_err(|e| BundleError::InvalidPublicKey(e.to_string()))
            })
            .transpose()?;
        Ok(Self::with_recipient(recipient))
    }

    /// New bundle with a random key and an already-parsed recipient.
    pub fn with_recipient(recipient: Option<RsaPublicKey>) -> Self {
        Self {
            bundle_key: layout::generate_bundle_key(),
            encryption: recipient.map(|recipient| Encryption {
                recipient,
                content_key: None,
                wrapped_key: None,
            }),
            entries: BTreeMap::new(),
            has_refs: false,
            plain_bytes: 0,
        }
    }

    /// Use an explicit bundle key instead of the generated one.
    pub fn with_key(mut self, bundle_key: &str) -> Result<Self> {
        if !is_valid_bundle_key(bundle_key) {
            return Err(BundleError::InvalidEntryName {
                name: bundle_key.to_string(),
                reason: "bundle key must be ASCII alphanumeric",
            });
        }
        self.bundle_key = bundle_key.to_string();
        Ok(self)
    }

    pub fn bundle_key(&self) -> &str {
        &self.bundle_key
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Whether any file was added as reference data.
    pub fn has_refs(&self) -> bool {
        self.has_refs
    }

    /// Number of files added.
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// Total plaintext size of added files.
    pub fn total_bytes(&self) -> u64 {
        self.plain_bytes
    }

    /// Add a text file.
    pub fn add(&mut self, path: &str, data: &str, is_reference: bool) -> Result<()> {
        self.add_bytes(path, data.as_bytes(), is_reference)
    }

    /// Add a binary file.
    pub fn add_bytes(&mut self, path: &str, data: &[u8], is_reference: bool) -> Result<()> {
        check_new_file_name(path).map_err(|reason| BundleError::InvalidEntryName {
            name: path.to_string(),
            reason,
        })?;
        self.check_collision(path)?;

        let entry = match &mut self.encryption {
            Some(encryption) => {
                if encryption.content_key.is_none() {
                    let content_key = ContentKey::generate();
                    encryption.wrapped_key = Some(content_key.wrap(&encryption.recipient)?);
                    encryption.content_key = Some(content_key);
                    debug!(bundle_key = %self.bundle_key, "Generated content key");
                }
                let content_key = encryption
                    .content_key
                    .as_ref()
                    .ok_or(BundleError::MissingContentKey)?;
                let (iv, ciphertext) = content_key.seal(data)?;
                Entry::Sealed { iv, ciphertext }
            }
            None => Entry::Plain(data.to_vec()),
        };

        self.has_refs |= is_reference;
        self.plain_bytes += data.len() as u64;
        self.entries.insert(path.to_string(), entry);

        debug!(
            path,
            bytes = data.len(),
            encrypted = self.is_encrypted(),
            is_reference,
            "Added file to bundle"
        );
        Ok(())
    }

    /// Reject exact duplicates and file/directory clashes (`a` vs `a/b`).
    fn check_collision(&self, path: &str) -> Result<()> {
        let clash = |reason| {
            Err(BundleError::InvalidEntryName {
                name: path.to_string(),
                reason,
            })
        };
        if self.entries.contains_key(path) {
            return clash("already added");
        }
        for existing in self.entries.keys() {
            let nested = |outer: &str, inner: &str| {
                inner.len() > outer.len()
                    && inner.starts_with(outer)
                    && inner.as_bytes()[outer.len()] == b'/'
            };
            if nested(existing, path) || nested(path, existing) {
                return clash("conflicts with a file/directory of the same name");
            }
        }
        Ok(())
    }

    /// Tags describing this bundle, in canonical order.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        if self.has_refs {
            tags.push(TAG_REFS.to_string());
        }
        if self.is_encrypted() {
            tags.push(TAG_ENC.to_string());
        }
        tags
    }

    /// `{bundle_key}-{remote_ref}{.refs}{.enc}`, where `remote_ref` is
    /// `{provider}-{remote}`.
    pub fn id(&self, remote_ref: &str) -> String {
        format_id(&self.bundle_key, remote_ref, &self.tags())
    }

    /// Upload file name.
    pub fn file_name(&self) -> String {
        format!("{}.zip", self.bundle_key)
    }

    /// Archive entries in name order.
    fn archive_entries(&self) -> BTreeMap<String, &[u8]> {
        let key = &self.bundle_key;
        let mut out: BTreeMap<String, &[u8]> = BTreeMap::new();
        if let Some(wrapped) = self.encryption.as_ref().and_then(|e| e.wrapped_key.as_ref()) {
            out.insert(layout::key_entry(key), wrapped);
        }
        for (name, entry) in &self.entries {
            match entry {
                Entry::Plain(data) => {
                    out.insert(layout::plain_entry(key, name), data);
                }
                Entry::Sealed { iv, ciphertext } => {
                    out.insert(layout::iv_entry(key, name), iv);
                    out.insert(layout::enc_entry(key, name), ciphertext);
                }
            }
        }
        out
    }

    /// Build the container.
    ///
    /// Entries are written in sorted order with a fixed timestamp, so calling
    /// this twice without adding files yields identical bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let entries = self.archive_entries();

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        for (name, data) in &entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }

        let bytes = zip.finish()?.into_inner();

        info!(
            bundle_key = %self.bundle_key,
            files = self.entries.len(),
            entries = entries.len(),
            compressed_bytes = bytes.len(),
            uncompressed_bytes = self.plain_bytes,
            encrypted = self.is_encrypted(),
            "Bundle serialized"
        );

        Ok(bytes)
    }

    /// Serialize once and drop the content key.
    pub fn finish(self) -> Result<SealedBundle> {
        let bytes = self.serialize()?;
        Ok(SealedBundle {
            tags: self.tags(),
            file_count: self.entries.len(),
            bundle_key: self.bundle_key,
            bytes,
        })
    }
}

impl fmt::Debug for Bundler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundler")
            .field("bundle_key", &self.bundle_key)
            .field("encrypted", &self.is_encrypted())
            .field("files", &self.entries.keys().collect::<Vec<_>>())
            .field("has_refs", &self.has_refs)
            .finish()
    }
}

fn format_id(bundle_key: &str, remote_ref: &str, tags: &[String]) -> String {
    let mut id = format!("{bundle_key}-{remote_ref}");
    for tag in tags {
        id.push('.');
        id.push_str(tag);
    }
    id
}

/// A finished container, ready for upload.
#[derive(Debug, Clone)]
pub struct SealedBundle {
    bundle_key: String,
    tags: Vec<String>,
    file_count: usize,
    bytes: Vec<u8>,
}

impl SealedBundle {
    pub fn bundle_key(&self) -> &str {
        &self.bundle_key
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_encrypted(&self) -> bool {
        self.tags.iter().any(|t| t == TAG_ENC)
    }

    pub fn has_refs(&self) -> bool {
        self.tags.iter().any(|t| t == TAG_REFS)
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Container bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Upload file name.
    pub fn file_name(&self) -> String {
        format!("{}.zip", self.bundle_key)
    }

    /// See [`Bundler::id`].
    pub fn id(&self, remote_ref: &str) -> String {
        format_id(&self.bundle_key, remote_ref, &self.tags)
    }

    /// Typed id for an upload stored by `provider` under `remote`.
    pub fn bundle_id(&self, provider: &str, remote: &str) -> Result<BundleId> {
        BundleId::new(self.bundle_key.as_str(), provider, remote, self.tags.iter().cloned())
    }

    /// Write the container to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        info!(path = %path.display(), bytes = self.bytes.len(), "Bundle written");
        Ok(())
    }
}
