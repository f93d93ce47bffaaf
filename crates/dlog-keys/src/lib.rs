//! RSA key management for dlog diagnostic bundles.
//!
//! Producers encrypt bundles to an RSA public key; the consumer holds the
//! matching private key, which never touches disk unencrypted.
//!
//! # Key files
//!
//! - `public.pem`: SPKI PEM, embedded by producers
//! - `private.pem.json`: PBKDF2-HMAC-SHA256 + AES-256-GCM envelope (default)
//! - `private.pem`: passphrase-encrypted PKCS#8 PEM (alternative)
//!
//! # Passphrases
//!
//! The passphrase is looked up in a [`CredentialStore`] (OS keychain by
//! default) and prompted for on a miss, then cached for the next run.
//!
//! # Example
//!
//! ```no_run
//! use dlog_keys::{generate_key_pair, write_key_pair, PrivateKeyFile, WriteOptions};
//! use std::path::Path;
//!
//! let pair = generate_key_pair().unwrap();
//! write_key_pair(
//!     &pair,
//!     Path::new("public.pem"),
//!     Path::new("private.pem.json"),
//!     "correct horse battery staple",
//!     &WriteOptions::default(),
//! )
//! .unwrap();
//!
//! let key = PrivateKeyFile::load(Path::new("private.pem.json"))
//!     .unwrap()
//!     .unlock("correct horse battery staple")
//!     .unwrap();
//! ```

pub mod credential;
pub mod error;
pub mod keypair;
pub mod passphrase;
pub mod protect;

pub use credential::{CredentialStore, EnvStore, KeyringStore, MemoryStore};
pub use error::{KeyError, Result};
pub use keypair::{
    generate_key_pair, parse_public_key_pem, write_key_pair, KeyFileFormat, KeyPair, WriteOptions,
    RSA_MODULUS_BITS,
};
pub use passphrase::{
    get_or_prompt_passphrase, CachedPassphrase, NewPassphrasePrompter, NoPrompt, PassphraseOrigin,
    PassphraseSource, Prompter, StaticPassphrase, TerminalPrompter,
};
pub use protect::{
    protect_private_key, protect_private_key_pem, unprotect_private_key,
    unprotect_private_key_pem, PrivateKeyFile, ProtectedPrivateKey,
};
pub use rsa::{RsaPrivateKey, RsaPublicKey};
