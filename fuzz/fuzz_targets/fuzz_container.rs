//! Fuzz target for downloaded container reading.
//!
//! Containers come from an anonymous host and are untrusted. Reading them
//! must fail with an error, never panic or write outside the bundle.

#![no_main]

use arbitrary::Arbitrary;
use dlog_bundle::{BundleId, BundleReader};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    encrypted: bool,
    container: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let tags: &[&str] = if input.encrypted { &["enc"] } else { &[] };
    let Ok(id) = BundleId::new("abcd1234", "0x0", "FUZZ", tags.iter().copied()) else {
        return;
    };
    let Ok(reader) = BundleReader::from_bytes(input.container, &id) else {
        return;
    };
    // No private key: encrypted bundles stop at PrivateKeyRequired
    if let Ok(files) = reader.extract(None) {
        for file in files {
            assert!(!file.name.starts_with('/'));
            assert!(!file.name.split('/').any(|s| s == ".." || s.is_empty()));
        }
    }
});
