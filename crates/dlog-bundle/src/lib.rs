//! Encrypted diagnostic bundles.
//!
//! A bundle is a ZIP container whose entries all live under a random
//! `bundle_key/` namespace. When the producer has the consumer's RSA public
//! key, each file is encrypted with AES-256-GCM under a per-bundle content
//! key, and that key is wrapped once with RSA-OAEP-SHA256.
//!
//! # Container layout
//!
//! - `{key}/{key}.key`: wrapped content key (encrypted bundles)
//! - `{key}/{name}.iv` + `{key}/{name}.enc`: one pair per encrypted file
//! - `{key}/{name}`: one entry per plaintext file
//!
//! # Example
//!
//! ```no_run
//! use dlog_bundle::{BundleId, BundleReader, Bundler};
//!
//! # let public_pem = "";
//! # let private_key: dlog_keys::RsaPrivateKey = unimplemented!();
//! let mut bundler = Bundler::new(Some(public_pem)).unwrap();
//! bundler.add("debug.txt", "log output", false).unwrap();
//! let sealed = bundler.finish().unwrap();
//! let id = sealed.bundle_id("0x0", "AbC123").unwrap();
//!
//! let files = BundleReader::from_bytes(sealed.into_bytes(), &id)
//!     .unwrap()
//!     .extract(Some(&private_key))
//!     .unwrap();
//! ```

pub mod bundle_id;
pub mod bundler;
pub mod crypto;
pub mod error;
pub mod layout;
pub mod reader;

pub use bundle_id::{BundleId, Provider, ProviderRegistry, TAG_ENC, TAG_REFS};
pub use bundler::{Bundler, SealedBundle};
pub use crypto::ContentKey;
pub use error::{BundleError, Result};
pub use layout::{ExtractLimits, MAX_ENTRIES, MAX_ENTRY_BYTES, MAX_TOTAL_BYTES};
pub use reader::{BundleContents, BundleReader, RestoredFile};
