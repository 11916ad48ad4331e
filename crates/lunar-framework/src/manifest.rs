//! Plugin manifests and unit discovery on disk.
//!
//! A unit is either `<name>.toml` or a directory `<name>/` holding a
//! `plugin.toml`. The manifest declares how the unit is triggered:
//!
//! ```toml
//! trigger = "ping"      # or "Any" / "*" for every event
//! priority = 10         # lower runs first, default 999
//! help = "replies pong"
//! handler = "ping"      # catalog key, defaults to the unit name
//! enabled = true
//!
//! [config]
//! reply = "pong"
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Manifest file name inside a directory unit.
pub const ENTRYPOINT: &str = "plugin.toml";

/// Priority used when a manifest does not set one.
pub const DEFAULT_PRIORITY: i64 = 999;

/// Storage-name prefix that marks a unit disabled (legacy layout).
pub(crate) const LEGACY_DISABLED_PREFIX: &str = "d_";

/// What a plugin reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A command word, matched against the command name or as a text prefix.
    Literal(String),
    /// Every event.
    Wildcard,
}

impl Trigger {
    /// Parses a manifest trigger. `Any` and `*` are wildcards; blank is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            "Any" | "*" => Some(Self::Wildcard),
            word => Some(Self::Literal(word.to_string())),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(word) => Some(word),
            Self::Wildcard => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(word) => f.write_str(word),
            Self::Wildcard => f.write_str("Any"),
        }
    }
}

/// How a unit is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    File,
    Directory,
}

/// A validated manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub trigger: Trigger,
    pub priority: i64,
    pub help: String,
    /// Catalog key; `None` means "same as the unit name".
    pub handler: Option<String>,
    pub enabled: bool,
    /// The `[config]` table as JSON, `Null` when absent.
    pub config: Value,
}

impl Manifest {
    /// Parses and validates manifest text.
    pub fn parse(text: &str) -> Result<Self, String> {
        RawManifest::parse(text)?.validate()
    }

    /// Catalog key for a unit called `unit`.
    pub fn handler_key<'a>(&'a self, unit: &'a str) -> &'a str {
        self.handler.as_deref().unwrap_or(unit)
    }
}

/// Manifest fields as written, before validation.
///
/// Disabled units are recognised from this form so that a disabled unit
/// with an otherwise broken manifest is still reported as disabled.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawManifest {
    trigger: Option<String>,
    priority: Option<i64>,
    help: Option<String>,
    handler: Option<String>,
    enabled: Option<bool>,
    config: Option<toml::Table>,
}

impl RawManifest {
    pub(crate) fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("invalid manifest: {}", e.message()))
    }

    pub(crate) fn read(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("unreadable manifest: {e}"))?;
        Self::parse(&text)
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub(crate) fn validate(self) -> Result<Manifest, String> {
        let enabled = self.enabled();
        let trigger = self
            .trigger
            .as_deref()
            .and_then(Trigger::parse)
            .ok_or_else(|| "manifest has no trigger".to_string())?;
        let config = match self.config {
            Some(table) => serde_json::to_value(table)
                .map_err(|e| format!("config table is not representable: {e}"))?,
            None => Value::Null,
        };
        Ok(Manifest {
            trigger,
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
            help: self.help.unwrap_or_default(),
            handler: self.handler.filter(|key| !key.trim().is_empty()),
            enabled,
            config,
        })
    }
}

/// A unit found in the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    /// Unit name with the legacy prefix stripped.
    pub name: String,
    /// The directory entry itself (file or directory).
    pub entry: PathBuf,
    pub manifest_path: PathBuf,
    pub kind: UnitKind,
    /// Stored under the legacy `d_` prefix.
    pub legacy_disabled: bool,
}

impl Candidate {
    /// Where the unit lives once the legacy prefix is dropped.
    pub fn enabled_entry(&self) -> PathBuf {
        let file_name = match self.kind {
            UnitKind::File => format!("{}.toml", self.name),
            UnitKind::Directory => self.name.clone(),
        };
        self.entry.with_file_name(file_name)
    }
}

/// Lists the units under `root`, sorted by entry name.
///
/// Entries starting with `_` or `.` are ignored, as are files that are not
/// `.toml`. A directory without an entrypoint is skipped with a warning.
pub(crate) fn candidates(root: &Path) -> io::Result<Vec<Candidate>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if file_name.starts_with('_') || file_name.starts_with('.') {
            continue;
        }
        entries.push((file_name, entry.path(), entry.file_type()?));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut found = Vec::with_capacity(entries.len());
    for (file_name, path, file_type) in entries {
        let (stem, manifest_path, kind) = if file_type.is_dir() {
            let manifest = path.join(ENTRYPOINT);
            if !manifest.is_file() {
                warn!(unit = %file_name, "Skipping plugin directory without {ENTRYPOINT}");
                continue;
            }
            (file_name.as_str(), manifest, UnitKind::Directory)
        } else {
            match file_name.strip_suffix(".toml") {
                Some(stem) if !stem.is_empty() => (stem, path.clone(), UnitKind::File),
                _ => continue,
            }
        };

        let (name, legacy_disabled) = match stem.strip_prefix(LEGACY_DISABLED_PREFIX) {
            Some(rest) if !rest.is_empty() => (rest, true),
            _ => (stem, false),
        };
        found.push(Candidate {
            name: name.to_string(),
            entry: path,
            manifest_path,
            kind,
            legacy_disabled,
        });
    }
    Ok(found)
}

/// Rewrites the `enabled` flag of the manifest at `path`.
///
/// Returns `false` without touching the file when the flag already matches.
pub(crate) fn write_enabled_flag(path: &Path, enabled: bool) -> Result<bool, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("unreadable manifest: {e}"))?;
    let mut table: toml::Table = text
        .parse()
        .map_err(|e: toml::de::Error| format!("invalid manifest: {}", e.message()))?;

    let current = match table.get("enabled") {
        Some(toml::Value::Boolean(flag)) => *flag,
        Some(_) => return Err("`enabled` must be a boolean".into()),
        None => true,
    };
    if current == enabled {
        return Ok(false);
    }

    table.insert("enabled".into(), toml::Value::Boolean(enabled));
    let rendered = toml::to_string(&table).map_err(|e| format!("cannot render manifest: {e}"))?;
    fs::write(path, rendered).map_err(|e| format!("cannot write manifest: {e}"))?;
    Ok(true)
}
