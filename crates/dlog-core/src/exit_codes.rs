//! Exit codes for the dlog CLI.
//!
//! Exit codes communicate the failure class without requiring stderr
//! parsing. They are a stable contract for scripts.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors (bugs, should be reported)

/// Exit codes for dlog operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Ok = 0,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or configuration
    ArgsError = 10,

    /// Bundle id malformed or names an unknown host
    BundleIdError = 11,

    /// Wrong passphrase, wrong key, or tampered bundle
    AuthError = 12,

    /// Container does not match its id or is incomplete
    ContainerError = 13,

    /// Upload or download failed
    NetworkError = 14,

    /// Key file missing, malformed, or credential store unavailable
    KeyError = 15,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the error code name as a string constant.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::BundleIdError => "ERR_BUNDLE_ID",
            ExitCode::AuthError => "ERR_AUTH",
            ExitCode::ContainerError => "ERR_CONTAINER",
            ExitCode::NetworkError => "ERR_NETWORK",
            ExitCode::KeyError => "ERR_KEY",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::BundleIdError.as_i32(), 11);
        assert_eq!(ExitCode::AuthError.as_i32(), 12);
        assert_eq!(ExitCode::ContainerError.as_i32(), 13);
        assert_eq!(ExitCode::NetworkError.as_i32(), 14);
        assert_eq!(ExitCode::KeyError.as_i32(), 15);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
        assert_eq!(ExitCode::IoError.as_i32(), 21);
    }

    #[test]
    fn test_classification() {
        assert!(ExitCode::Ok.is_success());
        assert!(!ExitCode::Ok.is_error());
        assert!(ExitCode::AuthError.is_user_error());
        assert!(!ExitCode::AuthError.is_internal_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert!(ExitCode::IoError.is_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::NetworkError.to_string(), "ERR_NETWORK (14)");
    }
}
