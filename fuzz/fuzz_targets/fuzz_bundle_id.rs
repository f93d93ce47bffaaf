//! Fuzz target for bundle id parsing.
//!
//! Ids are pasted in by users, so parsing must reject garbage with an error.
//! Anything that parses must re-encode to a string that parses to the same id.

#![no_main]

use dlog_bundle::BundleId;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(id) = BundleId::parse(s) {
        let again = BundleId::parse(&id.encode()).expect("canonical id must parse");
        assert_eq!(id, again);
    }
});
