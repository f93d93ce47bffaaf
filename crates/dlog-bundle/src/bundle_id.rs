//! Bundle identifiers and the anonymous-host provider registry.
//!
//! A bundle id is the short string a user pastes into a support thread:
//!
//! ```text
//! key-host-remote[.tag]*
//! abc123-0x0-XYZ.refs.enc
//! ```
//!
//! `key` namespaces the container entries, `host` names the provider that
//! stores the upload, `remote` is the provider's reference and the tags
//! describe the content (`enc`: encrypted, `refs`: reference data present).

use crate::error::excerpt;
use crate::layout::is_valid_bundle_key;
use crate::{BundleError, Result};
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tag marking an encrypted bundle.
pub const TAG_ENC: &str = "enc";
/// Tag marking a bundle that carries reference data.
pub const TAG_REFS: &str = "refs";

/// Parsed bundle id. Tags are kept in canonical order: `refs`, `enc`, then
/// unrecognised tags in the order first seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BundleId {
    key: String,
    provider: String,
    remote: String,
    tags: Vec<String>,
}

impl BundleId {
    /// Build an id from parts, validating each.
    pub fn new(
        key: impl Into<String>,
        provider: impl Into<String>,
        remote: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let id = Self {
            key: key.into(),
            provider: provider.into(),
            remote: remote.into(),
            tags: canonical_tags(tags.into_iter().map(Into::into)),
        };
        let encoded = id.encode();
        if !is_valid_bundle_key(&id.key) {
            return Err(malformed(&encoded, "key must be ASCII alphanumeric"));
        }
        if !is_valid_provider_tag(&id.provider) {
            return Err(malformed(&encoded, "invalid host"));
        }
        if !is_valid_remote(&id.remote) {
            return Err(malformed(&encoded, "invalid remote reference"));
        }
        if let Some(reason) = id.tags.iter().find_map(|t| check_tag(t).err()) {
            return Err(malformed(&encoded, reason));
        }
        Ok(id)
    }

    /// Parse against the built-in providers.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_with(s, &ProviderRegistry::builtin())
    }

    /// Parse against `registry`. Structure is checked before the host, so a
    /// garbled id is reported as malformed rather than as an unknown host.
    pub fn parse_with(s: &str, registry: &ProviderRegistry) -> Result<Self> {
        let input = s.trim();

        let (key, rest) = input
            .split_once('-')
            .ok_or_else(|| malformed(input, "expected key-host-remote"))?;
        let (host, rest) = rest
            .split_once('-')
            .ok_or_else(|| malformed(input, "expected key-host-remote"))?;
        let (remote, tags) = match rest.split_once('.') {
            Some((remote, tags)) => (remote, Some(tags)),
            None => (rest, None),
        };

        if !is_valid_bundle_key(key) {
            return Err(malformed(input, "key must be ASCII alphanumeric"));
        }
        if !is_valid_provider_tag(host) {
            return Err(malformed(input, "invalid host"));
        }
        if !is_valid_remote(remote) {
            return Err(malformed(input, "invalid remote reference"));
        }
        let mut parsed_tags = Vec::new();
        if let Some(tags) = tags {
            for tag in tags.split('.') {
                check_tag(tag).map_err(|reason| malformed(input, reason))?;
                parsed_tags.push(tag.to_string());
            }
        }

        registry.get(host)?;

        Ok(Self {
            key: key.to_string(),
            provider: host.to_string(),
            remote: remote.to_string(),
            tags: canonical_tags(parsed_tags.into_iter()),
        })
    }

    /// Canonical string form.
    pub fn encode(&self) -> String {
        let mut out = format!("{}-{}-{}", self.key, self.provider, self.remote);
        for tag in &self.tags {
            out.push('.');
            out.push_str(tag);
        }
        out
    }

    /// Bundle key; namespace of every container entry.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Provider tag, e.g. `0x0`.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Provider-side reference.
    pub fn remote(&self) -> &str {
        &self.remote
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

    /// Tags this version does not interpret.
    pub fn unknown_tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|t| *t != TAG_ENC && *t != TAG_REFS)
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for BundleId {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn malformed(id: &str, reason: &'static str) -> BundleError {
    BundleError::MalformedBundleId {
        id: excerpt(id),
        reason,
    }
}

fn is_valid_provider_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn is_valid_remote(remote: &str) -> bool {
    !remote.is_empty()
        && remote
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn check_tag(tag: &str) -> std::result::Result<(), &'static str> {
    if tag.is_empty() {
        return Err("empty tag");
    }
    if !tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err("invalid tag");
    }
    Ok(())
}

/// `refs`, `enc`, then the rest in input order, without duplicates.
/// Known tags match case-insensitively and are stored lowercase.
fn canonical_tags(tags: impl Iterator<Item = String>) -> Vec<String> {
    let mut refs = false;
    let mut enc = false;
    let mut unknown: Vec<String> = Vec::new();
    for tag in tags {
        if tag.eq_ignore_ascii_case(TAG_REFS) {
            refs = true;
        } else if tag.eq_ignore_ascii_case(TAG_ENC) {
            enc = true;
        } else if !unknown.contains(&tag) {
            unknown.push(tag);
        }
    }

    let mut out = Vec::with_capacity(unknown.len() + 2);
    if refs {
        out.push(TAG_REFS.to_string());
    }
    if enc {
        out.push(TAG_ENC.to_string());
    }
    out.extend(unknown);
    out
}

/// An anonymous file host bundles are uploaded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    tag: String,
    upload_url: String,
    download_url: String,
}

/// Placeholder for the remote reference in download URL templates.
pub const REMOTE_PLACEHOLDER: &str = "{remote}";

impl Provider {
    /// Tag of the built-in 0x0.st provider.
    pub const ZERO_X_ZERO: &'static str = "0x0";

    /// `download_url` is a template containing `{remote}` exactly once.
    pub fn new(
        tag: impl Into<String>,
        upload_url: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Result<Self> {
        let provider = Self {
            tag: tag.into(),
            upload_url: upload_url.into(),
            download_url: download_url.into(),
        };
        if !is_valid_provider_tag(&provider.tag) {
            return Err(BundleError::InvalidProvider {
                tag: provider.tag,
                reason: "tag must be alphanumeric".to_string(),
            });
        }
        if provider.download_url.matches(REMOTE_PLACEHOLDER).count() != 1 {
            return Err(BundleError::InvalidProvider {
                tag: provider.tag,
                reason: format!("download URL must contain {REMOTE_PLACEHOLDER} once"),
            });
        }
        Ok(provider)
    }

    /// 0x0.st, the default host.
    pub fn zero_x_zero() -> Self {
        Self {
            tag: Self::ZERO_X_ZERO.to_string(),
            upload_url: "https://0x0.st".to_string(),
            download_url: "https://0x0.st/{remote}.zip".to_string(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Multipart POST endpoint.
    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub fn download_url_template(&self) -> &str {
        &self.download_url
    }

    /// Copy with a different upload endpoint.
    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = url.into();
        self
    }

    /// Copy with a different download template.
    pub fn with_download_url(self, template: impl Into<String>) -> Result<Self> {
        Self::new(self.tag, self.upload_url, template)
    }

    /// Where the container for `remote` can be downloaded.
    pub fn download_url(&self, remote: &str) -> String {
        self.download_url.replacen(REMOTE_PLACEHOLDER, remote, 1)
    }

    /// Extract the remote reference from an upload response body.
    ///
    /// The body is searched (case-insensitively) for the download URL
    /// template with an alphanumeric reference in place of `{remote}`.
    pub fn parse_upload_response(&self, body: &str) -> Result<String> {
        let (prefix, suffix) = self
            .download_url
            .split_once(REMOTE_PLACEHOLDER)
            .ok_or_else(|| BundleError::InvalidProvider {
                tag: self.tag.clone(),
                reason: format!("download URL must contain {REMOTE_PLACEHOLDER}"),
            })?;
        let pattern = format!(
            "{}([A-Z0-9]+){}",
            regex::escape(prefix),
            regex::escape(suffix)
        );
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| BundleError::InvalidProvider {
                tag: self.tag.clone(),
                reason: e.to_string(),
            })?;

        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| BundleError::UnexpectedUploadResponse {
                body: excerpt(body),
            })
    }

    /// `{tag}-{remote}`, the host half of a bundle id.
    pub fn remote_ref(&self, remote: &str) -> String {
        format!("{}-{}", self.tag, remote)
    }
}

/// Known providers by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    /// Registry with no providers.
    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Registry with the built-in providers.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(Provider::zero_x_zero());
        registry
    }

    /// Add or replace a provider.
    pub fn insert(&mut self, provider: Provider) {
        self.providers.insert(provider.tag.clone(), provider);
    }

    pub fn get(&self, tag: &str) -> Result<&Provider> {
        self.providers
            .get(tag)
            .ok_or_else(|| BundleError::UnknownProvider(tag.to_string()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
