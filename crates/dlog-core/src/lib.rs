//! dlog core library.
//!
//! Ties the key and bundle crates to the outside world:
//! - Exit codes for CLI operations
//! - Configuration loading
//! - Structured logging setup
//! - Upload/download transport
//! - The producer (`send`) and consumer (`fetch`) pipelines
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fetch;
pub mod host;
pub mod logging;
pub mod send;
pub mod transport;

pub use error::{Error, Result};
pub use exit_codes::ExitCode;
pub use fetch::{fetch, FetchOptions, FetchReport, FetchStage};
pub use host::{DiagnosticReport, HostEnvironment, PlatformInfo, StaticHost};
pub use send::{build_bundle, send_bundle, SendReceipt, SendRequest};
pub use transport::{Downloader, HttpTransport, MemoryTransport, Uploader};
