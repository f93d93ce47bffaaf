//! Credential store abstraction for cached passphrases.
//!
//! Entries are keyed by `(service, account)` and hold the passphrase that
//! unlocks the private key. The OS keychain is the default; an environment
//! variable store covers CI and an in-memory store covers tests.

use crate::{KeyError, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use zeroize::Zeroizing;

/// Environment variable read by [`EnvStore::default`].
pub const PASSPHRASE_ENV: &str = "DLOG_PASSPHRASE";

/// Storage for cached passphrases.
pub trait CredentialStore: Send + Sync {
    /// Cached passphrase, if any.
    fn get(&self, service: &str, account: &str) -> Result<Option<Zeroizing<String>>>;

    /// Cache a passphrase.
    fn set(&self, service: &str, account: &str, passphrase: &str) -> Result<()>;

    /// Drop a cached passphrase. Missing entries are not an error.
    fn delete(&self, service: &str, account: &str) -> Result<()>;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str;
}

/// OS keychain (macOS Keychain, Windows Credential Manager, Linux keyutils).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, service: &str, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, account)
            .map_err(|e| KeyError::CredentialStore(format!("keyring error: {e}")))
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<Zeroizing<String>>> {
        match self.entry(service, account)?.get_password() {
            Ok(passphrase) => Ok(Some(Zeroizing::new(passphrase))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeyError::CredentialStore(format!("keyring error: {e}"))),
        }
    }

    fn set(&self, service: &str, account: &str, passphrase: &str) -> Result<()> {
        self.entry(service, account)?
            .set_password(passphrase)
            .map_err(|e| KeyError::CredentialStore(format!("failed to store passphrase: {e}")))
    }

    fn delete(&self, service: &str, account: &str) -> Result<()> {
        match self.entry(service, account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeyError::CredentialStore(format!(
                "failed to clear passphrase: {e}"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        #[cfg(target_os = "macos")]
        {
            "macOS Keychain"
        }
        #[cfg(target_os = "windows")]
        {
            "Windows Credential Manager"
        }
        #[cfg(target_os = "linux")]
        {
            "Linux keyutils"
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        {
            "Keyring"
        }
    }
}

/// Read-only store backed by an environment variable.
///
/// The same passphrase is returned for every `(service, account)`; `set` and
/// `delete` succeed without effect.
#[derive(Debug, Clone)]
pub struct EnvStore {
    var_name: String,
}

impl EnvStore {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

impl Default for EnvStore {
    fn default() -> Self {
        Self::new(PASSPHRASE_ENV)
    }
}

impl CredentialStore for EnvStore {
    fn get(&self, _service: &str, _account: &str) -> Result<Option<Zeroizing<String>>> {
        match std::env::var(&self.var_name) {
            Ok(value) if !value.is_empty() => Ok(Some(Zeroizing::new(value))),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(KeyError::CredentialStore(format!(
                "failed to read {}: {e}",
                self.var_name
            ))),
        }
    }

    fn set(&self, _service: &str, _account: &str, _passphrase: &str) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _service: &str, _account: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Environment Variable"
    }
}

/// In-memory store for tests. Lives for the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(String, String), Zeroizing<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one entry.
    pub fn with_entry(service: &str, account: &str, passphrase: &str) -> Self {
        let store = Self::new();
        store.insert(service, account, passphrase);
        store
    }

    fn insert(&self, service: &str, account: &str, passphrase: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            (service.to_string(), account.to_string()),
            Zeroizing::new(passphrase.to_string()),
        );
    }

    /// Whether an entry exists.
    pub fn contains(&self, service: &str, account: &str) -> bool {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.contains_key(&(service.to_string(), account.to_string()))
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<Zeroizing<String>>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, account: &str, passphrase: &str) -> Result<()> {
        self.insert(service, account, passphrase);
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(&(service.to_string(), account.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
