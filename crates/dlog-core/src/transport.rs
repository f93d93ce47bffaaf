//! Upload and download of bundle containers.
//!
//! The bundle core never talks to the network; these traits are the seam.
//! [`HttpTransport`] is the production implementation (blocking reqwest over
//! rustls), [`MemoryTransport`] keeps everything in process.

use crate::error::{Error, Result};
use dlog_bundle::Provider;
use reqwest::blocking::{multipart, Client};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// MIME type of uploaded containers.
pub const CONTAINER_MIME: &str = "application/zip";

/// Sends a sealed container to a file host.
pub trait Uploader {
    /// POST `bytes` as `file_name` to `endpoint`; returns the raw response body.
    fn upload(&self, endpoint: &str, file_name: &str, bytes: &[u8], expire_hours: u32)
        -> Result<String>;
}

/// Retrieves a container from a file host.
pub trait Downloader {
    /// GET `url` into `dest`; returns the number of bytes written.
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> Error {
    let body = body.trim();
    if body.is_empty() {
        Error::Network(status.to_string())
    } else {
        let first_line = body.lines().next().unwrap_or_default();
        Error::Network(format!("{status}: {first_line}"))
    }
}

impl Uploader for HttpTransport {
    fn upload(
        &self,
        endpoint: &str,
        file_name: &str,
        bytes: &[u8],
        expire_hours: u32,
    ) -> Result<String> {
        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(CONTAINER_MIME)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("expire", expire_hours.to_string());

        info!(endpoint, file_name, size = bytes.len(), expire_hours, "Uploading bundle");
        let response = self.client.post(endpoint).multipart(form).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        debug!(status = %status, "Upload accepted");
        Ok(body)
    }
}

impl Downloader for HttpTransport {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        info!(url, "Downloading bundle");
        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }
        let written = response.copy_to(dest)?;
        debug!(bytes = written, "Download complete");
        Ok(written)
    }
}

/// In-process file host that answers uploads the way `provider` does.
///
/// Uploads are stored under the provider's download URL, so a container
/// uploaded through it can be fetched back through it.
#[derive(Debug)]
pub struct MemoryTransport {
    provider: Provider,
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    uploads: Cell<usize>,
}

impl MemoryTransport {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            files: RefCell::new(BTreeMap::new()),
            uploads: Cell::new(0),
        }
    }

    /// Serve `bytes` at `url`.
    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.files.borrow_mut().insert(url.into(), bytes);
    }

    /// Number of successful uploads.
    pub fn upload_count(&self) -> usize {
        self.uploads.get()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.files.borrow().contains_key(url)
    }
}

impl Uploader for MemoryTransport {
    fn upload(
        &self,
        endpoint: &str,
        _file_name: &str,
        bytes: &[u8],
        _expire_hours: u32,
    ) -> Result<String> {
        if endpoint != self.provider.upload_url() {
            return Err(Error::Network(format!("404 Not Found: {endpoint}")));
        }
        let n = self.uploads.get() + 1;
        self.uploads.set(n);
        let url = self.provider.download_url(&format!("M{n:04}"));
        self.insert(url.clone(), bytes.to_vec());
        Ok(format!("{url}\n"))
    }
}

impl Downloader for MemoryTransport {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        let files = self.files.borrow();
        let bytes = files
            .get(url)
            .ok_or_else(|| Error::Network("404 Not Found".to_string()))?;
        dest.write_all(bytes)?;
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_upload_then_download() {
        let provider = Provider::zero_x_zero();
        let transport = MemoryTransport::new(provider.clone());

        let body = transport
            .upload("https://0x0.st", "abcd1234.zip", b"PK\x03\x04", 168)
            .unwrap();
        let remote = provider.parse_upload_response(&body).unwrap();
        assert_eq!(remote, "M0001");
        assert_eq!(transport.upload_count(), 1);

        let mut out = Vec::new();
        let n = transport
            .download(&provider.download_url(&remote), &mut out)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, b"PK\x03\x04");
    }

    #[test]
    fn test_memory_missing_is_network_error() {
        let transport = MemoryTransport::new(Provider::zero_x_zero());
        let mut out = Vec::new();
        let err = transport
            .download("https://0x0.st/NOPE.zip", &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::Network(ref m) if m.contains("404")));
    }

    #[test]
    fn test_memory_wrong_endpoint() {
        let transport = MemoryTransport::new(Provider::zero_x_zero());
        assert!(matches!(
            transport.upload("https://example.org", "a.zip", b"", 1),
            Err(Error::Network(_))
        ));
    }

    #[test]
    fn test_status_error_uses_first_line() {
        let err = status_error(reqwest::StatusCode::NOT_FOUND, "gone\nmore detail");
        assert_eq!(err.to_string(), "network error: 404 Not Found: gone");
        let err = status_error(reqwest::StatusCode::BAD_GATEWAY, "  ");
        assert_eq!(err.to_string(), "network error: 502 Bad Gateway");
    }

    #[test]
    fn test_http_transport_builds() {
        HttpTransport::new("dlog/test", Duration::from_secs(5)).unwrap();
    }
}
