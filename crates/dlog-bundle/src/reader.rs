//! Consumer side: validates a container against its bundle id and restores
//! the original files.

use crate::bundle_id::BundleId;
use crate::crypto::ContentKey;
use crate::layout::{check_file_name, EntryKind, ExtractLimits};
use crate::{BundleError, Result};
use rsa::RsaPrivateKey;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;

/// A restored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredFile {
    /// Relative path inside the bundle.
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct SealedParts {
    iv: Option<Vec<u8>>,
    ciphertext: Option<Vec<u8>>,
}

/// Entries of a container, classified and checked against the bundle id.
pub struct BundleContents {
    bundle_key: String,
    encrypted: bool,
    wrapped_key: Option<(String, Vec<u8>)>,
    sealed: BTreeMap<String, SealedParts>,
    plain: BTreeMap<String, Vec<u8>>,
}

/// Reader for downloaded bundle containers.
pub struct BundleReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    id: BundleId,
    limits: ExtractLimits,
}

impl BundleReader<File> {
    /// Open a container from a file path.
    pub fn open(path: &Path, id: &BundleId) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, id)
    }
}

impl BundleReader<Cursor<Vec<u8>>> {
    /// Open a container from bytes.
    pub fn from_bytes(bytes: Vec<u8>, id: &BundleId) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes), id)
    }
}

impl<R: Read + Seek> BundleReader<R> {
    /// Create a reader from any Read + Seek source.
    pub fn from_reader(reader: R, id: &BundleId) -> Result<Self> {
        let archive = ZipArchive::new(reader)?;
        info!(
            bundle_key = %id.key(),
            entries = archive.len(),
            encrypted = id.is_encrypted(),
            "Bundle opened"
        );
        Ok(Self {
            archive,
            id: id.clone(),
            limits: ExtractLimits::default(),
        })
    }

    /// Replace the default extraction bounds.
    pub fn with_limits(mut self, limits: ExtractLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Number of archive entries, including crypto entries.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Read and classify every entry.
    ///
    /// Sizes declared by the archive are not trusted: every entry is read
    /// through a bounded reader and the container fails as a whole once a
    /// limit in [`ExtractLimits`] is crossed.
    pub fn contents(mut self) -> Result<BundleContents> {
        let limits = self.limits;
        if self.archive.len() > limits.max_entries {
            return Err(BundleError::TooManyEntries {
                count: self.archive.len(),
                limit: limits.max_entries,
            });
        }

        let key = self.id.key().to_string();
        let encrypted = self.id.is_encrypted();
        let prefix = format!("{key}/");

        let mut contents = BundleContents {
            bundle_key: key,
            encrypted,
            wrapped_key: None,
            sealed: BTreeMap::new(),
            plain: BTreeMap::new(),
        };
        let mut total_bytes: u64 = 0;

        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index)?;
            let name = file.name().to_string();

            // Some zip tools add directory entries; they carry no data.
            if file.is_dir() {
                if !name.starts_with(&prefix) {
                    return Err(BundleError::ForeignEntry { name });
                }
                continue;
            }

            let relative = name
                .strip_prefix(&prefix)
                .ok_or_else(|| BundleError::ForeignEntry { name: name.clone() })?;
            let kind = EntryKind::classify(relative);

            if !encrypted && kind.is_crypto() {
                return Err(BundleError::UnexpectedEncryptedContent { name });
            }
            if encrypted && !kind.is_crypto() {
                return Err(BundleError::UnexpectedPlaintextContent { name });
            }

            let target = match &kind {
                EntryKind::ContentKey(_) => None,
                EntryKind::Iv(n) | EntryKind::Ciphertext(n) | EntryKind::Plain(n) => Some(*n),
            };
            if let Some(target) = target {
                if check_file_name(target).is_err() {
                    return Err(BundleError::ForeignEntry { name });
                }
            }

            // A declared size past the budget fails without reading; an
            // understated one is caught by the bounded read.
            let declared = file.size();
            if declared > limits.max_entry_bytes {
                return Err(BundleError::EntryTooLarge {
                    name,
                    limit: limits.max_entry_bytes,
                });
            }
            if declared > limits.max_total_bytes.saturating_sub(total_bytes) {
                return Err(BundleError::ContainerTooLarge {
                    limit: limits.max_total_bytes,
                });
            }
            let data = read_bounded(&mut file, &name, &limits, total_bytes)?;
            total_bytes += data.len() as u64;
            debug!(entry = %name, bytes = data.len(), "Read bundle entry");

            match kind {
                EntryKind::ContentKey(_) => {
                    if contents.wrapped_key.is_some() {
                        return Err(BundleError::DuplicateContentKey);
                    }
                    contents.wrapped_key = Some((name, data));
                }
                EntryKind::Iv(n) => {
                    let parts = contents.sealed.entry(n.to_string()).or_default();
                    parts.iv = Some(data);
                }
                EntryKind::Ciphertext(n) => {
                    let parts = contents.sealed.entry(n.to_string()).or_default();
                    parts.ciphertext = Some(data);
                }
                EntryKind::Plain(n) => {
                    contents.plain.insert(n.to_string(), data);
                }
            }
        }

        if encrypted && contents.wrapped_key.is_none() && !contents.sealed.is_empty() {
            return Err(BundleError::MissingContentKey);
        }
        check_name_conflicts(&contents.file_names())?;

        Ok(contents)
    }

    /// Classify, verify and decrypt. See [`BundleContents::decrypt`].
    pub fn extract(self, private_key: Option<&RsaPrivateKey>) -> Result<Vec<RestoredFile>> {
        self.contents()?.decrypt(private_key)
    }
}

/// Read one entry, failing once it passes the per-entry or remaining total
/// budget.
fn read_bounded(
    file: &mut impl Read,
    name: &str,
    limits: &ExtractLimits,
    total_so_far: u64,
) -> Result<Vec<u8>> {
    let remaining = limits.max_total_bytes.saturating_sub(total_so_far);
    let budget = limits.max_entry_bytes.min(remaining);

    let mut data = Vec::new();
    file.take(budget.saturating_add(1)).read_to_end(&mut data)?;

    let len = data.len() as u64;
    if len > limits.max_entry_bytes {
        return Err(BundleError::EntryTooLarge {
            name: name.to_string(),
            limit: limits.max_entry_bytes,
        });
    }
    if len > remaining {
        return Err(BundleError::ContainerTooLarge {
            limit: limits.max_total_bytes,
        });
    }
    Ok(data)
}

/// Reject a restored name that sits below another restored file, e.g.
/// `a` next to `a/b`.
fn check_name_conflicts(names: &[&str]) -> Result<()> {
    let files: BTreeSet<&str> = names.iter().copied().collect();
    for name in names {
        for (slash, _) in name.match_indices('/') {
            let parent = &name[..slash];
            if files.contains(parent) {
                return Err(BundleError::ConflictingEntries {
                    name: name.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
    }
    Ok(())
}

impl BundleContents {
    pub fn bundle_key(&self) -> &str {
        &self.bundle_key
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Names of the files the bundle restores to.
    pub fn file_names(&self) -> Vec<&str> {
        if self.encrypted {
            self.sealed.keys().map(String::as_str).collect()
        } else {
            self.plain.keys().map(String::as_str).collect()
        }
    }

    /// Verify and decrypt every file.
    ///
    /// All files are checked before any is returned: one incomplete entry or
    /// failed tag fails the whole bundle. The content key is dropped before
    /// this returns.
    pub fn decrypt(self, private_key: Option<&RsaPrivateKey>) -> Result<Vec<RestoredFile>> {
        if !self.encrypted {
            return Ok(self
                .plain
                .into_iter()
                .map(|(name, data)| RestoredFile { name, data })
                .collect());
        }

        for (name, parts) in &self.sealed {
            if parts.iv.is_none() {
                return Err(BundleError::IncompleteEntry {
                    name: name.clone(),
                    missing: "iv",
                });
            }
            if parts.ciphertext.is_none() {
                return Err(BundleError::IncompleteEntry {
                    name: name.clone(),
                    missing: "ciphertext",
                });
            }
        }

        let Some((key_entry, wrapped)) = &self.wrapped_key else {
            return Ok(Vec::new());
        };
        let private_key = private_key.ok_or(BundleError::PrivateKeyRequired)?;
        let content_key = ContentKey::unwrap_with(wrapped, private_key, key_entry)?;

        let mut restored = Vec::with_capacity(self.sealed.len());
        for (name, parts) in self.sealed {
            let (Some(iv), Some(ciphertext)) = (parts.iv, parts.ciphertext) else {
                return Err(BundleError::IncompleteEntry {
                    name,
                    missing: "iv",
                });
            };
            let data = content_key.open(&name, &iv, &ciphertext)?;
            debug!(name = %name, bytes = data.len(), "Decrypted entry");
            restored.push(RestoredFile { name, data });
        }

        info!(
            bundle_key = %self.bundle_key,
            files = restored.len(),
            "Bundle decrypted"
        );
        Ok(restored)
    }
}
