//! Fuzz target for protected private key file parsing.
//!
//! Only classification is fuzzed; unlocking runs the KDF, whose cost the
//! file itself chooses.

#![no_main]

use dlog_keys::PrivateKeyFile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = PrivateKeyFile::parse(s);
    }
});
