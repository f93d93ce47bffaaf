//! Consumer pipeline: bundle id in, restored files on disk out.
//!
//! Stages run strictly in order and each transition is logged. Nothing is
//! written to the target directory until every entry has been decrypted and
//! authenticated; the downloaded container lives in a temp file that is
//! removed on every exit path unless the caller asks to keep it.

use crate::error::{Error, Result};
use crate::transport::Downloader;
use dlog_bundle::{BundleId, BundleReader, ExtractLimits, ProviderRegistry, RestoredFile};
use dlog_keys::{KeyError, PassphraseSource, PrivateKeyFile, RsaPrivateKey};
use serde::Serialize;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Pipeline stage, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    ParseId,
    Download,
    LoadPrivateKey,
    ExtractEntries,
    PerEntryDecrypt,
    Write,
    Cleanup,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FetchStage::ParseId => "parse_id",
            FetchStage::Download => "download",
            FetchStage::LoadPrivateKey => "load_private_key",
            FetchStage::ExtractEntries => "extract_entries",
            FetchStage::PerEntryDecrypt => "decrypt",
            FetchStage::Write => "write",
            FetchStage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Files land in `{output_root}/{bundle_key}/`.
    pub output_root: PathBuf,
    /// Protected private key file; required for encrypted bundles.
    pub private_key: Option<PathBuf>,
    /// Keep the downloaded container as `{output_root}/{bundle_key}.zip`.
    pub keep: bool,
    pub registry: ProviderRegistry,
    /// Bounds on the downloaded container's decompressed contents.
    pub limits: ExtractLimits,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("logs"),
            private_key: None,
            keep: false,
            registry: ProviderRegistry::builtin(),
            limits: ExtractLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub bundle_id: String,
    pub encrypted: bool,
    pub target_dir: PathBuf,
    /// Written files, in bundle order.
    pub files: Vec<PathBuf>,
    pub downloaded_bytes: u64,
    pub kept_container: Option<PathBuf>,
}

fn stage(stage: FetchStage, bundle_key: &str) {
    info!(stage = %stage, bundle_key, "Fetch stage");
}

/// Download, verify, decrypt and restore the bundle named by `bundle_id`.
pub fn fetch(
    bundle_id: &str,
    options: &FetchOptions,
    downloader: &dyn Downloader,
    passphrase: &dyn PassphraseSource,
) -> Result<FetchReport> {
    let id = BundleId::parse_with(bundle_id, &options.registry)?;
    let key = id.key().to_string();
    stage(FetchStage::ParseId, &key);
    let provider = options.registry.get(id.provider())?;
    for tag in id.unknown_tags() {
        debug!(tag, "Ignoring unknown bundle tag");
    }

    let key_path = match (&options.private_key, id.is_encrypted()) {
        (Some(path), true) => Some(path.as_path()),
        (None, true) => return Err(Error::MissingPrivateKey),
        (_, false) => None,
    };

    stage(FetchStage::Download, &key);
    std::fs::create_dir_all(&options.output_root)?;
    let mut container = NamedTempFile::new_in(&options.output_root)?;
    let url = provider.download_url(id.remote());
    let downloaded_bytes = downloader.download(&url, container.as_file_mut())?;
    container.as_file_mut().flush()?;
    container.as_file_mut().seek(SeekFrom::Start(0))?;
    debug!(url = %url, bytes = downloaded_bytes, "Container downloaded");

    let private_key = match key_path {
        Some(path) => {
            stage(FetchStage::LoadPrivateKey, &key);
            Some(load_private_key(path, passphrase)?)
        }
        None => None,
    };

    stage(FetchStage::ExtractEntries, &key);
    let contents = BundleReader::from_reader(container.as_file_mut(), &id)?
        .with_limits(options.limits)
        .contents()?;
    debug!(entries = ?contents.file_names(), "Classified entries");

    stage(FetchStage::PerEntryDecrypt, &key);
    let restored = contents.decrypt(private_key.as_ref())?;
    drop(private_key);

    stage(FetchStage::Write, &key);
    let target_dir = options.output_root.join(&key);
    let files = write_files(&target_dir, &restored)?;

    stage(FetchStage::Cleanup, &key);
    let kept_container = if options.keep {
        let kept = options.output_root.join(format!("{key}.zip"));
        container.persist(&kept).map_err(|e| Error::Io(e.error))?;
        info!(path = %kept.display(), "Kept container");
        Some(kept)
    } else {
        if let Err(e) = container.close() {
            warn!(error = %e, "Could not remove downloaded container");
        }
        None
    };

    info!(
        bundle_id = %id,
        files = files.len(),
        target = %target_dir.display(),
        "Bundle restored"
    );
    Ok(FetchReport {
        bundle_id: id.encode(),
        encrypted: id.is_encrypted(),
        target_dir,
        files,
        downloaded_bytes,
        kept_container,
    })
}

/// Unlock the private key, evicting a cached passphrase that fails.
fn load_private_key(path: &Path, passphrase: &dyn PassphraseSource) -> Result<RsaPrivateKey> {
    let file = PrivateKeyFile::load(path)?;
    let secret = passphrase.passphrase()?;
    match file.unlock(&secret) {
        Ok(key) => Ok(key),
        Err(KeyError::AuthenticationFailed) => {
            if let Err(e) = passphrase.forget() {
                warn!(error = %e, "Could not forget rejected passphrase");
            }
            Err(KeyError::AuthenticationFailed.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Check every directory a restored file will pass through, before anything
/// is written. Existing components must be real directories.
fn check_targets(target_dir: &Path, restored: &[RestoredFile]) -> Result<()> {
    let mut checked = std::collections::BTreeSet::new();
    for file in restored {
        let path = target_dir.join(&file.name);
        let mut dir = path.parent();
        while let Some(current) = dir {
            if !current.starts_with(target_dir) || !checked.insert(current.to_path_buf()) {
                break;
            }
            match std::fs::symlink_metadata(current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(Error::UnsafeTarget {
                        path: current.to_path_buf(),
                        reason: "is a symlink",
                    });
                }
                Ok(meta) if !meta.is_dir() => {
                    return Err(Error::UnsafeTarget {
                        path: current.to_path_buf(),
                        reason: "is not a directory",
                    });
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            dir = current.parent();
        }

        if let Ok(meta) = std::fs::symlink_metadata(&path) {
            if meta.is_dir() {
                return Err(Error::UnsafeTarget {
                    path,
                    reason: "is a directory",
                });
            }
        }
    }
    Ok(())
}

/// Write each file through a temp sibling and an atomic rename.
///
/// The rename replaces an existing file or symlink at the final path rather
/// than writing through it.
fn write_files(target_dir: &Path, restored: &[RestoredFile]) -> Result<Vec<PathBuf>> {
    check_targets(target_dir, restored)?;
    let mut written = Vec::with_capacity(restored.len());
    for file in restored {
        let path = target_dir.join(&file.name);
        let parent = path.parent().unwrap_or(target_dir);
        std::fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&file.data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        debug!(path = %path.display(), bytes = file.data.len(), "Wrote file");
        written.push(path);
    }
    Ok(written)
}
