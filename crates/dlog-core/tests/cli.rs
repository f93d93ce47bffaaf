//! CLI tests for the dlog binary.
//!
//! Every test runs against an isolated config directory and never touches
//! the network or the OS keychain.

use assert_cmd::Command;
use dlog_bundle::{BundleId, BundleReader};
use dlog_keys::PrivateKeyFile;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// A dlog Command isolated from the caller's environment.
fn dlog(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dlog").expect("dlog binary should exist");
    cmd.env("DLOG_CONFIG_DIR", config_dir)
        .env_remove("DLOG_PASSPHRASE")
        .env_remove("DLOG_PRIVATE_KEY")
        .env_remove("DLOG_PUBLIC_KEY")
        .env_remove("DLOG_LOG")
        .env_remove("DLOG_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, content: &str) {
    std::fs::write(dir.join("config.toml"), content).expect("write config");
}

// ============================================================================
// Argument handling
// ============================================================================

mod arguments {
    use super::*;

    #[test]
    fn help_succeeds() {
        let dir = TempDir::new().unwrap();
        dlog(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("fetch").and(predicate::str::contains("keygen")));
    }

    #[test]
    fn unknown_command_is_args_error() {
        let dir = TempDir::new().unwrap();
        dlog(dir.path())
            .arg("nonexistent-command")
            .assert()
            .code(10)
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn malformed_file_argument_is_args_error() {
        let dir = TempDir::new().unwrap();
        dlog(dir.path())
            .args(["send", "--file", "no-equals-sign"])
            .assert()
            .code(10);
    }

    #[test]
    fn broken_config_is_args_error() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "output_dir = [\n");
        dlog(dir.path())
            .args(["inspect", "abcd1234-0x0-XyZ1"])
            .assert()
            .code(10)
            .stderr(predicate::str::contains("config.toml"));
    }
}

// ============================================================================
// inspect
// ============================================================================

mod inspect {
    use super::*;

    #[test]
    fn prints_decoded_id_as_json() {
        let dir = TempDir::new().unwrap();
        let output = dlog(dir.path())
            .args(["inspect", "abcd1234-0x0-XyZ1.enc.refs"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let json: serde_json::Value = serde_json::from_slice(&output).expect("stdout is JSON");
        assert_eq!(json["key"], "abcd1234");
        assert_eq!(json["provider"], "0x0");
        assert_eq!(json["remote"], "XyZ1");
        assert_eq!(json["tags"], serde_json::json!(["refs", "enc"]));
        assert_eq!(json["encrypted"], true);
        assert_eq!(json["download_url"], "https://0x0.st/XyZ1.zip");
    }

    #[test]
    fn malformed_id_exits_with_bundle_id_code() {
        let dir = TempDir::new().unwrap();
        dlog(dir.path())
            .args(["inspect", "not-a-valid-id-at-all!"])
            .assert()
            .code(11)
            .stderr(predicate::str::starts_with("dlog: malformed bundle id"));
    }

    #[test]
    fn unknown_provider_exits_with_bundle_id_code() {
        let dir = TempDir::new().unwrap();
        dlog(dir.path())
            .args(["inspect", "abcd1234-dropbox-XyZ1"])
            .assert()
            .code(11)
            .stderr(predicate::str::contains("unknown provider 'dropbox'"));
    }

    #[test]
    fn configured_provider_is_known() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            "[providers.mirror]\nupload_url = \"https://files.example.org\"\ndownload_url = \"https://files.example.org/{remote}.zip\"\n",
        );
        dlog(dir.path())
            .args(["inspect", "abcd1234-mirror-XyZ1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("https://files.example.org/XyZ1.zip"));
    }
}

// ============================================================================
// fetch
// ============================================================================

mod fetch {
    use super::*;

    #[test]
    fn encrypted_without_private_key_is_key_error() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        dlog(dir.path())
            .args(["fetch", "abcd1234-0x0-XyZ1.enc", "--out"])
            .arg(&out)
            .assert()
            .code(15)
            .stderr(predicate::str::contains("no private key"));
        assert!(!out.exists());
    }

    #[test]
    fn unreachable_host_is_network_error() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            "[transport]\ntimeout_secs = 5\n\n[providers.0x0]\ndownload_url = \"http://127.0.0.1:9/{remote}.zip\"\n",
        );
        let out = dir.path().join("out");
        dlog(dir.path())
            .args(["fetch", "abcd1234-0x0-XyZ1", "--out"])
            .arg(&out)
            .assert()
            .code(14)
            .stderr(predicate::str::starts_with("dlog: network error"));

        // The temporary container is gone
        let leftovers = std::fs::read_dir(&out).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }
}

// ============================================================================
// keygen + send
// ============================================================================

mod keygen_and_send {
    use super::*;

    #[test]
    fn keygen_writes_keys_and_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public.pem");
        let private = dir.path().join("private.pem.json");

        dlog(dir.path())
            .env("DLOG_PASSPHRASE", "cli-secret")
            .args(["keygen", "--public"])
            .arg(&public)
            .arg("--private")
            .arg(&private)
            .assert()
            .success()
            .stdout(predicate::str::contains("BEGIN PUBLIC KEY"));

        let key_file = PrivateKeyFile::load(&private).expect("load private key");
        key_file.unlock("cli-secret").expect("unlock");

        dlog(dir.path())
            .env("DLOG_PASSPHRASE", "cli-secret")
            .args(["keygen", "--public"])
            .arg(&public)
            .arg("--private")
            .arg(&private)
            .assert()
            .code(10)
            .stderr(predicate::str::contains("will not overwrite"));
    }

    #[test]
    fn plaintext_dry_run_contains_report_and_files() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "some notes").unwrap();
        let console = dir.path().join("console.log");
        std::fs::write(&console, "first\nsecond\n").unwrap();
        let zip = dir.path().join("bundle.zip");

        let output = dlog(dir.path())
            .arg("send")
            .arg("--file")
            .arg(format!("notes.txt={}", notes.display()))
            .arg("--console")
            .arg(&console)
            .arg("--dry-run")
            .arg(&zip)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let json: serde_json::Value = serde_json::from_slice(&output).expect("stdout is JSON");
        assert_eq!(json["encrypted"], false);
        assert_eq!(json["files"], 2);
        let key = json["bundle_key"].as_str().unwrap();

        let id = BundleId::new(key, "0x0", "DRYRUN", Vec::<String>::new()).unwrap();
        let files = BundleReader::open(&zip, &id).unwrap().extract(None).unwrap();
        assert_eq!(files.len(), 2);
        let report = String::from_utf8(files[0].data.clone()).unwrap();
        assert!(report.starts_with("Application: dlog "));
        assert!(report.ends_with("first\nsecond"));
        assert_eq!(files[1].data, b"some notes");
    }

    #[test]
    fn encrypted_dry_run_decrypts_with_generated_key() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public.pem");
        let private = dir.path().join("private.pem.json");
        dlog(dir.path())
            .env("DLOG_PASSPHRASE", "round-trip")
            .args(["keygen", "--public"])
            .arg(&public)
            .arg("--private")
            .arg(&private)
            .assert()
            .success();

        let refs = dir.path().join("items.rdf");
        std::fs::write(&refs, "<rdf:RDF/>").unwrap();
        let zip = dir.path().join("bundle.zip");
        let output = dlog(dir.path())
            .args(["send", "--public"])
            .arg(&public)
            .arg("--refs")
            .arg(&refs)
            .arg("--dry-run")
            .arg(&zip)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["encrypted"], true);
        assert_eq!(json["tags"], serde_json::json!(["refs", "enc"]));

        let key = json["bundle_key"].as_str().unwrap();
        let id = BundleId::new(key, "0x0", "DRYRUN", ["refs", "enc"]).unwrap();
        let private_key = PrivateKeyFile::load(&private)
            .unwrap()
            .unlock("round-trip")
            .unwrap();
        let files = BundleReader::open(&zip, &id)
            .unwrap()
            .extract(Some(&private_key))
            .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["debug.txt", "items.rdf"]);
        assert_eq!(files[1].data, b"<rdf:RDF/>");
    }
}
