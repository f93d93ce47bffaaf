//! Property-based tests for bundle ids and container round trips.

use dlog_bundle::{BundleError, BundleId, BundleReader, Bundler};
use dlog_keys::{generate_key_pair, KeyPair};
use proptest::collection::btree_map;
use proptest::prelude::*;
use std::sync::OnceLock;

fn key_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_key_pair().expect("keygen"))
}

fn tags_strategy() -> impl Strategy<Value = Vec<String>> {
    (
        any::<bool>(),
        any::<bool>(),
        proptest::collection::vec("[a-z][a-z0-9_]{0,5}", 0..3),
    )
        .prop_map(|(refs, enc, extra)| {
            let mut tags = Vec::new();
            if refs {
                tags.push("refs".to_string());
            }
            if enc {
                tags.push("enc".to_string());
            }
            tags.extend(extra);
            tags
        })
}

fn id_strategy() -> impl Strategy<Value = BundleId> {
    ("[a-zA-Z0-9]{1,12}", "[A-Za-z0-9_-]{1,16}", tags_strategy()).prop_map(
        |(key, remote, tags)| BundleId::new(key, "0x0", remote, tags).expect("valid parts"),
    )
}

fn file_name_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,8}(/[a-z0-9_]{1,8}){0,2}\\.(txt|log|rdf)"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10_000))]

    #[test]
    fn bundle_id_roundtrips(id in id_strategy()) {
        let encoded = id.encode();
        let decoded = BundleId::parse(&encoded).expect("parse encoded id");
        prop_assert_eq!(&decoded, &id);
        prop_assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn bundle_id_parse_never_panics(s in "\\PC{0,40}") {
        let _ = BundleId::parse(&s);
    }

    #[test]
    fn parsed_ids_are_path_safe(s in "[a-z0-9./_-]{1,30}") {
        if let Ok(id) = BundleId::parse(&s) {
            prop_assert!(!id.key().contains('/') && !id.key().contains('.'));
            prop_assert!(!id.remote().contains('/') && !id.remote().contains('.'));
        }
    }

    #[test]
    fn unknown_hosts_are_rejected(host in "[a-z][a-z0-9]{0,8}") {
        prop_assume!(host != "0x0");
        let result = BundleId::parse(&format!("abc-{host}-XYZ.enc"));
        prop_assert!(matches!(result, Err(BundleError::UnknownProvider(h)) if h == host));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn container_roundtrips(
        files in btree_map(file_name_strategy(), proptest::collection::vec(any::<u8>(), 0..512), 0..6),
        encrypted in any::<bool>(),
    ) {
        let recipient = encrypted.then(|| key_pair().public_key.clone());
        let mut bundler = Bundler::with_recipient(recipient);
        let mut added = Vec::new();
        for (name, data) in &files {
            // Generated names may clash as file vs directory; skip those.
            if bundler.add_bytes(name, data, false).is_ok() {
                added.push((name.clone(), data.clone()));
            }
        }

        let sealed = bundler.finish().expect("finish");
        let id = sealed.bundle_id("0x0", "R").expect("id");
        let restored = BundleReader::from_bytes(sealed.into_bytes(), &id)
            .expect("open")
            .extract(Some(&key_pair().private_key))
            .expect("extract");

        let restored: Vec<_> = restored.into_iter().map(|f| (f.name, f.data)).collect();
        prop_assert_eq!(restored, added);
    }
}
