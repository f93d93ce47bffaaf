//! Host environment capability and the diagnostic report built from it.
//!
//! Everything a producer knows about the application it runs in comes
//! through [`HostEnvironment`]; nothing here reads process globals.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Console lines kept in a report (most recent last).
pub const CONSOLE_TAIL_LINES: usize = 250_000;

/// Marks a preference name as absolute (not under the root).
const ABSOLUTE_PREFIX: char = ':';

/// Application and platform identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub app_name: String,
    pub app_version: String,
    pub locale: String,
    pub platform: String,
    pub arch: String,
}

impl PlatformInfo {
    /// Describe the running dlog binary.
    pub fn current() -> Self {
        let locale = ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.is_empty())
            .map(|v| v.split('.').next().unwrap_or_default().replace('_', "-"))
            .unwrap_or_else(|| "en-US".to_string());
        let platform = match std::env::consts::OS {
            "windows" => "Win",
            "macos" => "Mac",
            "linux" => "Linux",
            _ => "Unknown",
        };
        Self {
            app_name: "dlog".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            locale,
            platform: platform.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// What the producer can ask of its host application.
pub trait HostEnvironment {
    fn platform_info(&self) -> PlatformInfo;

    fn installed_addons(&self) -> Vec<String>;

    /// Value of a fully-qualified preference, `None` if unset.
    fn preference(&self, name: &str) -> Option<Value>;

    /// Child names under `branch` (which ends with `.`), relative to it.
    fn preference_children(&self, branch: &str) -> Vec<String>;

    /// Whether debug logging was enabled when the host started.
    fn debug_logging_at_start(&self) -> bool {
        false
    }

    /// Whether debug logging is enabled now.
    fn debug_logging_now(&self) -> bool {
        self.debug_logging_at_start()
    }

    fn error_log(&self) -> Vec<String> {
        Vec::new()
    }

    fn console_log(&self) -> Vec<String> {
        Vec::new()
    }

    /// Export of the user's selected references, if any.
    fn reference_export(&self) -> Option<String> {
        None
    }
}

/// Resolve requested preference names to fully-qualified, sorted names.
///
/// `:name` is absolute; other names are placed under `root` unless they
/// already start with it. A name ending in `.` expands to its children.
pub fn expand_preferences(
    requested: &[String],
    root: &str,
    host: &dyn HostEnvironment,
) -> Vec<String> {
    let mut names = BTreeSet::new();
    for pref in requested {
        let pref = if let Some(absolute) = pref.strip_prefix(ABSOLUTE_PREFIX) {
            absolute.to_string()
        } else if pref.starts_with(root) {
            pref.clone()
        } else {
            format!("{root}{pref}")
        };

        if pref.ends_with('.') {
            for child in host.preference_children(&pref) {
                names.insert(format!("{pref}{child}"));
            }
        } else {
            names.insert(pref);
        }
    }
    names.into_iter().collect()
}

/// Snapshot of the host state that goes into `debug.txt`.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub platform: PlatformInfo,
    pub addons: Vec<String>,
    pub debug_logging_at_start: bool,
    pub debug_logging_now: bool,
    /// Missing preferences are recorded as `null`.
    pub preferences: BTreeMap<String, Value>,
    pub errors: Vec<String>,
    pub console: Vec<String>,
}

impl DiagnosticReport {
    pub fn collect(host: &dyn HostEnvironment, preferences: &[String], root: &str) -> Self {
        let preferences = expand_preferences(preferences, root, host)
            .into_iter()
            .map(|name| {
                let value = host.preference(&name).unwrap_or(Value::Null);
                (name, value)
            })
            .collect();

        let mut console = host.console_log();
        if console.len() > CONSOLE_TAIL_LINES {
            console.drain(..console.len() - CONSOLE_TAIL_LINES);
        }

        Self {
            platform: host.platform_info(),
            addons: host.installed_addons(),
            debug_logging_at_start: host.debug_logging_at_start(),
            debug_logging_now: host.debug_logging_now(),
            preferences,
            errors: host.error_log(),
            console,
        }
    }

    /// Header block: application, platform, addons, logging state, prefs.
    pub fn summary(&self) -> String {
        let p = &self.platform;
        let mut lines = vec![
            format!("Application: {} {} {}", p.app_name, p.app_version, p.locale),
            format!("Platform: {} {}", p.platform, p.arch),
        ];
        if !self.addons.is_empty() {
            lines.push("Addons:".to_string());
            lines.extend(self.addons.iter().map(|addon| format!("  {addon}")));
        }
        lines.push(format!(
            "Debug logging on at start: {}",
            self.debug_logging_at_start
        ));
        lines.push(format!(
            "Debug logging on at submit: {}",
            self.debug_logging_now
        ));
        lines.extend(
            self.preferences
                .iter()
                .map(|(name, value)| format!("{name} = {value}")),
        );
        lines.join("\n")
    }

    /// Full `debug.txt` text.
    pub fn render(&self) -> String {
        let sections = [
            self.summary(),
            self.errors.join("\n\n"),
            self.console.join("\n"),
        ];
        sections
            .iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_string()
    }
}

/// Fixed host state, assembled from files or built in code.
#[derive(Debug, Clone)]
pub struct StaticHost {
    platform: PlatformInfo,
    addons: Vec<String>,
    preferences: BTreeMap<String, Value>,
    debug_at_start: bool,
    debug_now: bool,
    errors: Vec<String>,
    console: Vec<String>,
    references: Option<String>,
}

impl StaticHost {
    pub fn new(platform: PlatformInfo) -> Self {
        Self {
            platform,
            addons: Vec::new(),
            preferences: BTreeMap::new(),
            debug_at_start: false,
            debug_now: false,
            errors: Vec::new(),
            console: Vec::new(),
            references: None,
        }
    }

    pub fn with_addon(mut self, addon: impl Into<String>) -> Self {
        self.addons.push(addon.into());
        self
    }

    pub fn with_preference(mut self, name: impl Into<String>, value: Value) -> Self {
        self.preferences.insert(name.into(), value);
        self
    }

    pub fn with_debug_logging(mut self, at_start: bool, now: bool) -> Self {
        self.debug_at_start = at_start;
        self.debug_now = now;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn with_console_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.console.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn with_reference_export(mut self, export: impl Into<String>) -> Self {
        self.references = Some(export.into());
        self
    }

    /// Load preferences from a TOML file; nested tables become dotted names.
    pub fn with_preferences_file(mut self, path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table: toml::Table = toml::from_str(&content).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {e}", path.display()),
            )
        })?;
        flatten_toml("", &table, &mut self.preferences);
        Ok(self)
    }
}

fn flatten_toml(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, Value>) {
    for (key, value) in table {
        let name = format!("{prefix}{key}");
        let json = match value {
            toml::Value::Table(inner) => {
                flatten_toml(&format!("{name}."), inner, out);
                continue;
            }
            toml::Value::String(s) => Value::String(s.clone()),
            toml::Value::Integer(i) => Value::from(*i),
            toml::Value::Float(f) => Value::from(*f),
            toml::Value::Boolean(b) => Value::Bool(*b),
            other => Value::String(other.to_string()),
        };
        out.insert(name, json);
    }
}

impl HostEnvironment for StaticHost {
    fn platform_info(&self) -> PlatformInfo {
        self.platform.clone()
    }

    fn installed_addons(&self) -> Vec<String> {
        self.addons.clone()
    }

    fn preference(&self, name: &str) -> Option<Value> {
        self.preferences.get(name).cloned()
    }

    fn preference_children(&self, branch: &str) -> Vec<String> {
        self.preferences
            .keys()
            .filter_map(|name| name.strip_prefix(branch))
            .filter(|child| !child.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn debug_logging_at_start(&self) -> bool {
        self.debug_at_start
    }

    fn debug_logging_now(&self) -> bool {
        self.debug_now
    }

    fn error_log(&self) -> Vec<String> {
        self.errors.clone()
    }

    fn console_log(&self) -> Vec<String> {
        self.console.clone()
    }

    fn reference_export(&self) -> Option<String> {
        self.references.clone()
    }
}
