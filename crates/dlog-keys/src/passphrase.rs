//! Passphrase acquisition: credential store first, interactive prompt second.

use crate::credential::CredentialStore;
use crate::{KeyError, Result};
use std::cell::Cell;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Asks the user for a passphrase.
pub trait Prompter {
    fn prompt(&self, message: &str) -> Result<Zeroizing<String>>;
}

/// Hidden-input terminal prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&self, message: &str) -> Result<Zeroizing<String>> {
        dialoguer::Password::new()
            .with_prompt(message)
            .interact()
            .map(Zeroizing::new)
            .map_err(|e| KeyError::Prompt(e.to_string()))
    }
}

/// Hidden-input prompt that asks twice, for choosing a new passphrase.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewPassphrasePrompter;

impl Prompter for NewPassphrasePrompter {
    fn prompt(&self, message: &str) -> Result<Zeroizing<String>> {
        dialoguer::Password::new()
            .with_prompt(message)
            .with_confirmation("Repeat passphrase", "Passphrases do not match")
            .interact()
            .map(Zeroizing::new)
            .map_err(|e| KeyError::Prompt(e.to_string()))
    }
}

/// Prompter that refuses to ask; for non-interactive runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt(&self, _message: &str) -> Result<Zeroizing<String>> {
        Err(KeyError::Prompt(
            "no passphrase cached and prompting is disabled".to_string(),
        ))
    }
}

/// Where a passphrase came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassphraseOrigin {
    Store,
    Prompt,
}

/// Supplies the passphrase for a single operation.
pub trait PassphraseSource {
    /// Obtain the passphrase.
    fn passphrase(&self) -> Result<Zeroizing<String>>;

    /// Evict any cached copy, e.g. after it failed to authenticate.
    fn forget(&self) -> Result<()> {
        Ok(())
    }
}

/// Fixed passphrase, e.g. read from a CLI flag or used in tests.
pub struct StaticPassphrase(Zeroizing<String>);

impl StaticPassphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(passphrase.into()))
    }
}

impl PassphraseSource for StaticPassphrase {
    fn passphrase(&self) -> Result<Zeroizing<String>> {
        if self.0.is_empty() {
            return Err(KeyError::EmptyPassphrase);
        }
        Ok(self.0.clone())
    }
}

/// Credential-store backed passphrase with interactive fallback.
pub struct CachedPassphrase<'a> {
    store: &'a dyn CredentialStore,
    prompter: &'a dyn Prompter,
    service: String,
    account: String,
    origin: Cell<Option<PassphraseOrigin>>,
}

impl<'a> CachedPassphrase<'a> {
    pub fn new(
        store: &'a dyn CredentialStore,
        prompter: &'a dyn Prompter,
        service: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            store,
            prompter,
            service: service.into(),
            account: account.into(),
            origin: Cell::new(None),
        }
    }

    /// Origin of the last passphrase handed out.
    pub fn origin(&self) -> Option<PassphraseOrigin> {
        self.origin.get()
    }
}

impl PassphraseSource for CachedPassphrase<'_> {
    fn passphrase(&self) -> Result<Zeroizing<String>> {
        let (passphrase, origin) =
            get_or_prompt_passphrase(self.store, self.prompter, &self.service, &self.account)?;
        self.origin.set(Some(origin));
        Ok(passphrase)
    }

    fn forget(&self) -> Result<()> {
        warn!(
            service = %self.service,
            account = %self.account,
            store = self.store.name(),
            "Forgetting cached passphrase"
        );
        self.store.delete(&self.service, &self.account)
    }
}

/// Look up `(service, account)` in `store`; prompt and cache on a miss.
///
/// A failure to write the cache is logged and otherwise ignored.
pub fn get_or_prompt_passphrase(
    store: &dyn CredentialStore,
    prompter: &dyn Prompter,
    service: &str,
    account: &str,
) -> Result<(Zeroizing<String>, PassphraseOrigin)> {
    match store.get(service, account) {
        Ok(Some(passphrase)) if !passphrase.is_empty() => {
            debug!(service, account, store = store.name(), "Using cached passphrase");
            return Ok((passphrase, PassphraseOrigin::Store));
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, store = store.name(), "Credential store unavailable, prompting");
        }
    }

    let message = format!(
        "Enter the passphrase to decrypt your private key for {} {}",
        service, account
    );
    let passphrase = prompter.prompt(&message)?;
    if passphrase.is_empty() {
        return Err(KeyError::EmptyPassphrase);
    }

    if let Err(e) = store.set(service, account, &passphrase) {
        warn!(error = %e, store = store.name(), "Could not cache passphrase");
    }

    Ok((passphrase, PassphraseOrigin::Prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MemoryStore;
    use std::cell::RefCell;

    struct ScriptedPrompter {
        answers: RefCell<Vec<&'static str>>,
        asked: Cell<usize>,
    }

    impl ScriptedPrompter {
        fn new(answers: Vec<&'static str>) -> Self {
            Self {
                answers: RefCell::new(answers),
                asked: Cell::new(0),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn prompt(&self, _message: &str) -> Result<Zeroizing<String>> {
            self.asked.set(self.asked.get() + 1);
            let answer = self.answers.borrow_mut().remove(0);
            Ok(Zeroizing::new(answer.to_string()))
        }
    }

    #[test]
    fn test_cache_hit_skips_prompt() {
        let store = MemoryStore::with_entry("svc", "acct", "cached");
        let prompter = ScriptedPrompter::new(vec![]);

        let (passphrase, origin) =
            get_or_prompt_passphrase(&store, &prompter, "svc", "acct").unwrap();
        assert_eq!(passphrase.as_str(), "cached");
        assert_eq!(origin, PassphraseOrigin::Store);
        assert_eq!(prompter.asked.get(), 0);
    }

    #[test]
    fn test_cache_miss_prompts_and_stores() {
        let store = MemoryStore::new();
        let prompter = ScriptedPrompter::new(vec!["typed"]);

        let (passphrase, origin) =
            get_or_prompt_passphrase(&store, &prompter, "svc", "acct").unwrap();
        assert_eq!(passphrase.as_str(), "typed");
        assert_eq!(origin, PassphraseOrigin::Prompt);
        assert_eq!(store.get("svc", "acct").unwrap().unwrap().as_str(), "typed");
    }

    #[test]
    fn test_empty_prompt_is_rejected_and_not_cached() {
        let store = MemoryStore::new();
        let prompter = ScriptedPrompter::new(vec![""]);

        let result = get_or_prompt_passphrase(&store, &prompter, "svc", "acct");
        assert!(matches!(result, Err(KeyError::EmptyPassphrase)));
        assert!(!store.contains("svc", "acct"));
    }

    #[test]
    fn test_no_prompt_fails_on_miss() {
        let store = MemoryStore::new();
        let result = get_or_prompt_passphrase(&store, &NoPrompt, "svc", "acct");
        assert!(matches!(result, Err(KeyError::Prompt(_))));
    }

    #[test]
    fn test_cached_source_forget_evicts_entry() {
        let store = MemoryStore::with_entry("svc", "acct", "stale");
        let prompter = ScriptedPrompter::new(vec!["fresh"]);
        let source = CachedPassphrase::new(&store, &prompter, "svc", "acct");

        assert_eq!(source.passphrase().unwrap().as_str(), "stale");
        assert_eq!(source.origin(), Some(PassphraseOrigin::Store));

        source.forget().unwrap();
        assert!(!store.contains("svc", "acct"));

        assert_eq!(source.passphrase().unwrap().as_str(), "fresh");
        assert_eq!(source.origin(), Some(PassphraseOrigin::Prompt));
    }

    #[test]
    fn test_static_passphrase() {
        assert_eq!(
            StaticPassphrase::new("pw").passphrase().unwrap().as_str(),
            "pw"
        );
        assert!(matches!(
            StaticPassphrase::new("").passphrase(),
            Err(KeyError::EmptyPassphrase)
        ));
    }
}
