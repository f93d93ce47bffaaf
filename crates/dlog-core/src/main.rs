//! dlog - encrypted diagnostic bundles over anonymous file hosts.
//!
//! Commands:
//! - `fetch`: download, verify and decrypt a bundle by id
//! - `keygen`: create the consumer key pair
//! - `send`: collect a diagnostic report, seal it and upload it
//! - `inspect`: decode a bundle id

use clap::{Args, Parser, Subcommand};
use dlog_bundle::{BundleId, ProviderRegistry};
use dlog_core::config::{load_config, ConfigOptions, ResolvedConfig};
use dlog_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use dlog_core::{
    build_bundle, fetch, send_bundle, Error, ExitCode, FetchOptions, HttpTransport, PlatformInfo,
    Result, SendRequest, StaticHost,
};
use dlog_keys::credential::PASSPHRASE_ENV;
use dlog_keys::{
    generate_key_pair, write_key_pair, CachedPassphrase, CredentialStore, EnvStore,
    KeyFileFormat, KeyringStore, NewPassphrasePrompter, NoPrompt, Prompter, TerminalPrompter,
    WriteOptions,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Encrypted diagnostic bundles over anonymous file hosts
#[derive(Parser)]
#[command(name = "dlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Override config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, verify and decrypt a bundle
    Fetch(FetchArgs),
    /// Generate the RSA key pair bundles are encrypted to
    Keygen(KeygenArgs),
    /// Collect a diagnostic report and upload it as a bundle
    Send(SendArgs),
    /// Decode a bundle id
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Bundle id, e.g. abcd1234-0x0-XyZ1.enc
    bundle_id: String,

    /// Protected private key file
    #[arg(long = "private")]
    private_key: Option<PathBuf>,

    /// Keep the downloaded container next to the restored files
    #[arg(long)]
    keep: bool,

    /// Output root; files land in <out>/<bundle key>/
    #[arg(long)]
    out: Option<PathBuf>,

    /// Fail instead of prompting for a passphrase
    #[arg(long)]
    no_prompt: bool,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    /// Public key output path
    #[arg(long = "public", default_value = "public.pem")]
    public_key: PathBuf,

    /// Private key output path [default: private.pem.json, or private.pem with --format pem]
    #[arg(long = "private")]
    private_key: Option<PathBuf>,

    /// Private key file format (json, pem)
    #[arg(long, default_value = "json")]
    format: KeyFileFormat,

    /// Overwrite existing key files
    #[arg(long)]
    replace: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Recipient public key (PEM); without one the bundle is not encrypted
    #[arg(long = "public")]
    public_key: Option<PathBuf>,

    /// Extra file to include, as name=path
    #[arg(long = "file", value_parser = parse_named_file)]
    files: Vec<(String, PathBuf)>,

    /// Reference export to include as items.rdf
    #[arg(long)]
    refs: Option<PathBuf>,

    /// Preference to record; `:name` is absolute, a trailing `.` takes a branch
    #[arg(long = "pref")]
    preferences: Vec<String>,

    /// TOML file with preference values
    #[arg(long)]
    prefs: Option<PathBuf>,

    /// Console log to include (last lines kept)
    #[arg(long)]
    console: Option<PathBuf>,

    /// Error log to include, one error per paragraph
    #[arg(long)]
    errors: Option<PathBuf>,

    /// Provider tag to upload to
    #[arg(long, default_value = "0x0")]
    provider: String,

    /// Days the host should keep the bundle
    #[arg(long)]
    expire_days: Option<u32>,

    /// Write the container here instead of uploading it
    #[arg(long, value_name = "ZIP")]
    dry_run: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Bundle id to decode
    bundle_id: String,
}

fn parse_named_file(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected name=path, got '{s}'")),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Ok
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else if cli.global.verbose > 0 {
        let mut level = LogLevel::Warn;
        for _ in 0..cli.global.verbose {
            level = level.more_verbose();
        }
        Some(level)
    } else {
        None
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let result = match &cli.command {
        Commands::Fetch(args) => run_fetch(&cli.global, args),
        Commands::Keygen(args) => run_keygen(args),
        Commands::Send(args) => run_send(&cli.global, args),
        Commands::Inspect(args) => run_inspect(&cli.global, args),
    };

    let exit_code = match result {
        Ok(()) => ExitCode::Ok,
        Err(e) => {
            let code = e.exit_code();
            debug!(error = ?e, code = %code, "Command failed");
            eprintln!("dlog: {e}");
            code
        }
    };
    std::process::exit(exit_code.as_i32());
}

fn load(
    global: &GlobalOpts,
    private_key: Option<&Path>,
    public_key: Option<&Path>,
) -> Result<ResolvedConfig> {
    let resolved = load_config(&ConfigOptions {
        config_dir: global.config.clone(),
        private_key: private_key.map(Path::to_path_buf),
        public_key: public_key.map(Path::to_path_buf),
    })?;
    debug!(
        source = %resolved.source,
        dir = %resolved.config_dir.display(),
        "Configuration resolved"
    );
    Ok(resolved)
}

fn registry(resolved: &ResolvedConfig) -> Result<ProviderRegistry> {
    Ok(resolved.config.provider_registry()?)
}

fn credential_store(resolved: &ResolvedConfig) -> Box<dyn CredentialStore> {
    let env_set = std::env::var(PASSPHRASE_ENV).is_ok_and(|v| !v.is_empty());
    if env_set || !resolved.config.credential.use_keyring {
        Box::new(EnvStore::default())
    } else {
        Box::new(KeyringStore::new())
    }
}

fn run_fetch(global: &GlobalOpts, args: &FetchArgs) -> Result<()> {
    let resolved = load(global, args.private_key.as_deref(), None)?;
    let config = &resolved.config;

    let options = FetchOptions {
        output_root: args.out.clone().unwrap_or_else(|| config.output_dir()),
        private_key: config.private_key.clone(),
        keep: args.keep,
        registry: registry(&resolved)?,
        ..Default::default()
    };

    let store = credential_store(&resolved);
    let prompter: Box<dyn Prompter> = if args.no_prompt {
        Box::new(NoPrompt)
    } else {
        Box::new(TerminalPrompter)
    };
    let passphrase = CachedPassphrase::new(
        store.as_ref(),
        prompter.as_ref(),
        config.credential.service.as_str(),
        config.credential.account.as_str(),
    );
    let transport = HttpTransport::new(
        &config.transport.user_agent,
        Duration::from_secs(config.transport.timeout_secs),
    )?;

    let report = fetch(&args.bundle_id, &options, &transport, &passphrase)?;
    for file in &report.files {
        println!("{}", file.display());
    }
    if let Some(kept) = &report.kept_container {
        info!(path = %kept.display(), "Container kept");
    }
    Ok(())
}

fn run_keygen(args: &KeygenArgs) -> Result<()> {
    let private_key = args.private_key.clone().unwrap_or_else(|| {
        PathBuf::from(format!("private{}", args.format.private_suffix()))
    });
    let options = WriteOptions {
        format: args.format,
        replace: args.replace,
    };

    let store = EnvStore::default();
    let passphrase = match store.get("", "")? {
        Some(passphrase) => passphrase,
        None => NewPassphrasePrompter.prompt("Passphrase for the new private key")?,
    };

    info!("Generating RSA key pair");
    let pair = generate_key_pair()?;
    write_key_pair(&pair, &args.public_key, &private_key, &passphrase, &options)?;
    info!(
        public = %args.public_key.display(),
        private = %private_key.display(),
        "Key pair written"
    );

    print!("{}", pair.public_key_pem()?);
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidArgument(format!("cannot read {}: {e}", path.display())))
}

fn run_send(global: &GlobalOpts, args: &SendArgs) -> Result<()> {
    let resolved = load(global, None, args.public_key.as_deref())?;
    let config = &resolved.config;
    let registry = registry(&resolved)?;
    let provider = registry.get(&args.provider)?;

    let public_key_pem = match &config.public_key {
        Some(path) => Some(read_text(path)?),
        None => {
            warn!("No public key configured; the bundle will not be encrypted");
            None
        }
    };

    let mut host = StaticHost::new(PlatformInfo::current());
    if let Some(path) = &args.prefs {
        host = host
            .with_preferences_file(path)
            .map_err(|e| Error::InvalidArgument(format!("cannot read preferences: {e}")))?;
    }
    if let Some(path) = &args.console {
        host = host.with_console_lines(read_text(path)?.lines());
    }
    if let Some(path) = &args.errors {
        for error in read_text(path)?.split("\n\n").filter(|e| !e.trim().is_empty()) {
            host = host.with_error(error.trim());
        }
    }
    if let Some(path) = &args.refs {
        host = host.with_reference_export(read_text(path)?);
    }

    let mut files = Vec::with_capacity(args.files.len());
    for (name, path) in &args.files {
        let data = std::fs::read(path)
            .map_err(|e| Error::InvalidArgument(format!("cannot read {}: {e}", path.display())))?;
        files.push((name.clone(), data));
    }

    let request = SendRequest {
        public_key_pem,
        preferences: args.preferences.clone(),
        preference_root: config.host.preference_root.clone(),
        files,
        expire_days: args.expire_days.unwrap_or(config.transport.expire_days),
    };

    if let Some(zip_path) = &args.dry_run {
        let sealed = build_bundle(&host, &request)?;
        sealed.write_to(zip_path)?;
        let summary = serde_json::json!({
            "bundle_key": sealed.bundle_key(),
            "file_name": sealed.file_name(),
            "path": zip_path,
            "files": sealed.file_count(),
            "encrypted": sealed.is_encrypted(),
            "refs": sealed.has_refs(),
            "tags": sealed.tags(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let transport = HttpTransport::new(
        &config.transport.user_agent,
        Duration::from_secs(config.transport.timeout_secs),
    )?;
    let receipt = send_bundle(&host, &request, provider, &transport)?;
    println!("{}", receipt.bundle_id);
    Ok(())
}

fn run_inspect(global: &GlobalOpts, args: &InspectArgs) -> Result<()> {
    let resolved = load(global, None, None)?;
    let registry = registry(&resolved)?;
    let id = BundleId::parse_with(&args.bundle_id, &registry)?;
    let provider = registry.get(id.provider())?;

    let mut value = serde_json::to_value(&id)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("encrypted".into(), id.is_encrypted().into());
        object.insert("refs".into(), id.has_refs().into());
        object.insert(
            "download_url".into(),
            provider.download_url(id.remote()).into(),
        );
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
