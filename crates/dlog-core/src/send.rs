//! Producer pipeline: collect, seal, upload, report the bundle id.

use crate::error::Result;
use crate::host::{DiagnosticReport, HostEnvironment};
use crate::transport::Uploader;
use dlog_bundle::{Bundler, Provider, SealedBundle};
use serde::Serialize;
use tracing::info;

/// Name of the diagnostic report inside a bundle.
pub const REPORT_FILE: &str = "debug.txt";
/// Name of the reference export inside a bundle.
pub const REFERENCES_FILE: &str = "items.rdf";

/// What to put in a bundle and how long the host should keep it.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Recipient SPKI PEM; `None` produces a plaintext bundle.
    pub public_key_pem: Option<String>,
    /// Preference names to record (see [`crate::host::expand_preferences`]).
    pub preferences: Vec<String>,
    pub preference_root: String,
    /// Additional files as `(name, contents)`.
    pub files: Vec<(String, Vec<u8>)>,
    pub expire_days: u32,
}

impl Default for SendRequest {
    fn default() -> Self {
        Self {
            public_key_pem: None,
            preferences: Vec::new(),
            preference_root: "extensions.zotero.".to_string(),
            files: Vec::new(),
            expire_days: 7,
        }
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    /// The id to hand to the consumer.
    pub bundle_id: String,
    pub bundle_key: String,
    pub remote: String,
    pub file_count: usize,
    pub encrypted: bool,
    pub refs: bool,
}

/// Build and seal the bundle for `request` without uploading it.
pub fn build_bundle(host: &dyn HostEnvironment, request: &SendRequest) -> Result<SealedBundle> {
    let mut bundler = Bundler::new(request.public_key_pem.as_deref())?;

    let report = DiagnosticReport::collect(host, &request.preferences, &request.preference_root);
    bundler.add(REPORT_FILE, &report.render(), false)?;

    if let Some(references) = host.reference_export().filter(|r| !r.is_empty()) {
        bundler.add(REFERENCES_FILE, &references, true)?;
    }

    for (name, data) in &request.files {
        bundler.add_bytes(name, data, false)?;
    }

    let sealed = bundler.finish()?;
    info!(
        bundle_key = sealed.bundle_key(),
        files = sealed.file_count(),
        bytes = sealed.bytes().len(),
        encrypted = sealed.is_encrypted(),
        "Sealed bundle"
    );
    Ok(sealed)
}

/// Build, upload, and return the bundle id the consumer will fetch.
pub fn send_bundle(
    host: &dyn HostEnvironment,
    request: &SendRequest,
    provider: &Provider,
    uploader: &dyn Uploader,
) -> Result<SendReceipt> {
    let sealed = build_bundle(host, request)?;

    let body = uploader.upload(
        provider.upload_url(),
        &sealed.file_name(),
        sealed.bytes(),
        request.expire_days.saturating_mul(24),
    )?;
    let remote = provider.parse_upload_response(&body)?;
    let id = sealed.bundle_id(provider.tag(), &remote)?;

    info!(bundle_id = %id, "Bundle uploaded");
    Ok(SendReceipt {
        bundle_id: id.encode(),
        bundle_key: sealed.bundle_key().to_string(),
        remote,
        file_count: sealed.file_count(),
        encrypted: sealed.is_encrypted(),
        refs: sealed.has_refs(),
    })
}
