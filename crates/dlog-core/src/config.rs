//! Configuration loading for the dlog CLI.
//!
//! A single `config.toml` is looked up in the config directory. Resolution
//! order for the directory (highest priority first):
//! 1. Explicit `--config <dir>`
//! 2. `DLOG_CONFIG_DIR`
//! 3. `$XDG_CONFIG_HOME/dlog` (or `~/.config/dlog`)
//!
//! A missing file means built-in defaults. Key paths may also come from
//! `DLOG_PRIVATE_KEY` / `DLOG_PUBLIC_KEY`, which beat the file; CLI flags beat
//! both. Relative paths inside the file are resolved against its directory.

use dlog_bundle::{BundleError, Provider, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// XDG config directory name.
const CONFIG_DIR_NAME: &str = "dlog";

const ENV_CONFIG_DIR: &str = "DLOG_CONFIG_DIR";
const ENV_PRIVATE_KEY: &str = "DLOG_PRIVATE_KEY";
const ENV_PUBLIC_KEY: &str = "DLOG_PUBLIC_KEY";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Passphrase cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialConfig {
    pub service: String,
    pub account: String,
    /// Use the OS keychain; otherwise only `DLOG_PASSPHRASE` is consulted.
    pub use_keyring: bool,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            service: "dlog debug-log".to_string(),
            account: "debug-log".to_string(),
            use_keyring: true,
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Retention requested from the host on upload.
    pub expire_days: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("dlog/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 60,
            expire_days: 7,
        }
    }
}

/// Endpoint overrides for one provider tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub upload_url: Option<String>,
    /// Template containing `{remote}`.
    pub download_url: Option<String>,
}

/// Host environment settings used when producing bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Root prepended to relative preference names.
    pub preference_root: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            preference_root: "extensions.zotero.".to_string(),
        }
    }
}

/// Output root used when neither the config nor `--out` names one.
pub const DEFAULT_OUTPUT_DIR: &str = "logs";

/// Contents of `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub private_key: Option<PathBuf>,
    pub public_key: Option<PathBuf>,
    /// Root under which fetched bundles are restored. Relative paths set in
    /// the file are anchored at the config dir; unset means
    /// [`DEFAULT_OUTPUT_DIR`] under the working directory.
    pub output_dir: Option<PathBuf>,
    pub credential: CredentialConfig,
    pub transport: TransportConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub host: HostConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            private_key: None,
            public_key: None,
            output_dir: None,
            credential: CredentialConfig::default(),
            transport: TransportConfig::default(),
            providers: BTreeMap::new(),
            host: HostConfig::default(),
        }
    }
}

impl Config {
    /// Root under which fetched bundles are restored.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Built-in providers with configured endpoint overrides applied.
    pub fn provider_registry(&self) -> Result<ProviderRegistry, BundleError> {
        let mut registry = ProviderRegistry::builtin();
        for (tag, overrides) in &self.providers {
            let mut provider = match registry.get(tag) {
                Ok(existing) => existing.clone(),
                Err(_) => {
                    let (Some(upload), Some(download)) =
                        (&overrides.upload_url, &overrides.download_url)
                    else {
                        return Err(BundleError::InvalidProvider {
                            tag: tag.clone(),
                            reason: "new providers need upload_url and download_url".to_string(),
                        });
                    };
                    Provider::new(tag.as_str(), upload.as_str(), download.as_str())?
                }
            };
            if let Some(url) = &overrides.upload_url {
                provider = provider.with_upload_url(url.as_str());
            }
            if let Some(template) = &overrides.download_url {
                provider = provider.with_download_url(template.as_str())?;
            }
            registry.insert(provider);
        }
        Ok(registry)
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    CliArgument,
    Environment,
    XdgConfig,
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config directory (highest priority).
    pub config_dir: Option<PathBuf>,
    /// Explicit private key path.
    pub private_key: Option<PathBuf>,
    /// Explicit public key path.
    pub public_key: Option<PathBuf>,
}

/// Loaded configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    /// Path of the file that was read (None if using defaults).
    pub config_path: Option<PathBuf>,
    pub config_dir: PathBuf,
    pub source: ConfigSource,
}

/// Load configuration with the standard resolution order.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    load_config_with(options, |name| std::env::var(name).ok())
}

/// [`load_config`] with an injectable environment lookup.
pub fn load_config_with(
    options: &ConfigOptions,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let (config_dir, dir_source) = resolve_config_dir(options, &env);
    let path = config_dir.join(CONFIG_FILE_NAME);

    let (mut config, config_path, source) = if path.is_file() {
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            source: e,
        })?;
        anchor_paths(&mut config, &config_dir);
        validate(&config, &path)?;
        debug!(path = %path.display(), source = %dir_source, "Loaded config");
        (config, Some(path), dir_source)
    } else {
        debug!(dir = %config_dir.display(), "No config file, using defaults");
        (Config::default(), None, ConfigSource::BuiltinDefault)
    };

    if let Some(value) = env(ENV_PRIVATE_KEY).filter(|v| !v.is_empty()) {
        config.private_key = Some(PathBuf::from(value));
    }
    if let Some(value) = env(ENV_PUBLIC_KEY).filter(|v| !v.is_empty()) {
        config.public_key = Some(PathBuf::from(value));
    }
    if let Some(path) = &options.private_key {
        config.private_key = Some(path.clone());
    }
    if let Some(path) = &options.public_key {
        config.public_key = Some(path.clone());
    }

    Ok(ResolvedConfig {
        config,
        config_path,
        config_dir,
        source,
    })
}

fn resolve_config_dir(
    options: &ConfigOptions,
    env: &impl Fn(&str) -> Option<String>,
) -> (PathBuf, ConfigSource) {
    if let Some(dir) = &options.config_dir {
        return (dir.clone(), ConfigSource::CliArgument);
    }

    if let Some(dir) = env(ENV_CONFIG_DIR).filter(|v| !v.is_empty()) {
        return (PathBuf::from(dir), ConfigSource::Environment);
    }

    let xdg_config = env("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });

    (xdg_config.join(CONFIG_DIR_NAME), ConfigSource::XdgConfig)
}

fn anchor_paths(config: &mut Config, base: &Path) {
    let anchor = |path: &mut PathBuf| {
        if path.is_relative() {
            *path = base.join(&*path);
        }
    };
    if let Some(path) = config.private_key.as_mut() {
        anchor(path);
    }
    if let Some(path) = config.public_key.as_mut() {
        anchor(path);
    }
    if let Some(path) = config.output_dir.as_mut() {
        anchor(path);
    }
}

fn validate(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        path: path.to_path_buf(),
        message,
    };
    if config.transport.timeout_secs == 0 {
        return Err(invalid("transport.timeout_secs must be positive".into()));
    }
    if config.transport.expire_days == 0 {
        return Err(invalid("transport.expire_days must be positive".into()));
    }
    if config.credential.service.is_empty() || config.credential.account.is_empty() {
        return Err(invalid(
            "credential.service and credential.account must not be empty".into(),
        ));
    }
    config
        .provider_registry()
        .map_err(|e| invalid(e.to_string()))?;
    Ok(())
}
