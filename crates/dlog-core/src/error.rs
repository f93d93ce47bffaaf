//! Top-level error type; every failure maps to one exit code.

use crate::config::ConfigError;
use crate::exit_codes::ExitCode;
use dlog_bundle::BundleError;
use dlog_keys::KeyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Non-2xx response or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Encrypted bundle but no private key configured
    #[error("bundle is encrypted but no private key is configured (use --private or DLOG_PRIVATE_KEY)")]
    MissingPrivateKey,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Restore path passes through a symlink or a non-directory
    #[error("refusing to write through '{}': {reason}", path.display())]
    UnsafeTarget {
        path: std::path::PathBuf,
        reason: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl Error {
    /// Exit code the CLI reports for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Key(e) => match e {
                KeyError::AuthenticationFailed | KeyError::EmptyPassphrase => ExitCode::AuthError,
                KeyError::Io(_) => ExitCode::IoError,
                KeyError::CryptoBackend(_) => ExitCode::InternalError,
                KeyError::InvalidKeyPath { .. } | KeyError::AlreadyExists(_) => {
                    ExitCode::ArgsError
                }
                KeyError::Json(_)
                | KeyError::UnsupportedAlgorithm(_)
                | KeyError::MalformedKeyFile(_)
                | KeyError::InvalidPublicKey(_)
                | KeyError::CredentialStore(_)
                | KeyError::Prompt(_) => ExitCode::KeyError,
            },
            Error::Bundle(e) => match e {
                BundleError::MalformedBundleId { .. } | BundleError::UnknownProvider(_) => {
                    ExitCode::BundleIdError
                }
                BundleError::AuthenticationFailed { .. } => ExitCode::AuthError,
                BundleError::IncompleteEntry { .. }
                | BundleError::UnexpectedEncryptedContent { .. }
                | BundleError::UnexpectedPlaintextContent { .. }
                | BundleError::ForeignEntry { .. }
                | BundleError::ConflictingEntries { .. }
                | BundleError::EntryTooLarge { .. }
                | BundleError::ContainerTooLarge { .. }
                | BundleError::TooManyEntries { .. }
                | BundleError::MissingContentKey
                | BundleError::DuplicateContentKey
                | BundleError::Zip(_) => ExitCode::ContainerError,
                BundleError::UnexpectedUploadResponse { .. } => ExitCode::NetworkError,
                BundleError::InvalidPublicKey(_) | BundleError::PrivateKeyRequired => {
                    ExitCode::KeyError
                }
                BundleError::InvalidEntryName { .. } | BundleError::InvalidProvider { .. } => {
                    ExitCode::ArgsError
                }
                BundleError::Io(_) => ExitCode::IoError,
                BundleError::CryptoBackend(_) => ExitCode::InternalError,
            },
            Error::Config(e) => match e {
                ConfigError::Io { .. } => ExitCode::IoError,
                _ => ExitCode::ArgsError,
            },
            Error::Network(_) => ExitCode::NetworkError,
            Error::MissingPrivateKey => ExitCode::KeyError,
            Error::InvalidArgument(_) => ExitCode::ArgsError,
            Error::UnsafeTarget { .. } => ExitCode::IoError,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
