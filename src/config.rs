//! Per-GPU fan mode store.
//!
//! The document lives in `config.json` and maps device keys (`"gpu0"`,
//! `"gpu1"`, ...) to mode entries:
//!
//! ```json
//! {
//!   "gpu0": { "mode": "manual", "speed": 75 },
//!   "gpu1": { "mode": "curve" }
//! }
//! ```
//!
//! The store never caches: every [`ConfigStore::read`] goes back to disk so
//! that edits made by another process are seen on the next read.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::StorageError,
    fan_curve::{Curve, CurveStore},
    storage,
};

/// Fan policy of one GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Mode {
    /// The driver controls the fans.
    Auto,
    /// Fans pinned to a fixed percentage.
    Manual { speed: u32 },
    /// Speed follows the fan curve.
    Curve,
}

impl Mode {
    /// Interprets one stored entry.
    ///
    /// Anything that is not a well-formed `manual` or `curve` entry is
    /// [`Mode::Auto`], including a `manual` entry without an integer speed.
    pub fn from_entry(entry: &Value) -> Self {
        let Some(fields) = entry.as_object() else {
            return Self::Auto;
        };

        match fields.get("mode").and_then(Value::as_str) {
            Some("manual") => fields
                .get("speed")
                .and_then(Value::as_u64)
                .and_then(|speed| u32::try_from(speed).ok())
                .map_or(Self::Auto, |speed| Self::Manual { speed }),
            Some("curve") => Self::Curve,
            _ => Self::Auto,
        }
    }

    /// Stored form of the mode; only `manual` carries a speed.
    pub fn to_entry(self) -> Value {
        match self {
            Self::Auto => serde_json::json!({ "mode": "auto" }),
            Self::Manual { speed } => serde_json::json!({ "mode": "manual", "speed": speed }),
            Self::Curve => serde_json::json!({ "mode": "curve" }),
        }
    }

    /// Mode encoded by a pre-JSON configuration file.
    ///
    /// `auto` and `curve` name their modes, an integer in 0..=100 is a
    /// fixed speed, and anything else falls back to [`Mode::Auto`].
    pub fn from_legacy_token(token: &str) -> Self {
        match token.trim() {
            "auto" => Self::Auto,
            "curve" => Self::Curve,
            other => other
                .parse::<u32>()
                .ok()
                .filter(|speed| *speed <= 100)
                .map_or(Self::Auto, |speed| Self::Manual { speed }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto (driver-controlled)"),
            Self::Manual { speed } => write!(f, "Fixed speed {speed}%"),
            Self::Curve => f.write_str("Custom curve"),
        }
    }
}

/// Key under which a GPU's mode is stored.
pub fn device_key(index: u32) -> String {
    format!("gpu{index}")
}

/// In-memory copy of the mode document.
///
/// Entries this version does not understand are kept verbatim so that
/// rewriting one device never drops another one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigDocument {
    entries: Map<String, Value>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective mode of `key`; absent devices are [`Mode::Auto`].
    pub fn mode(&self, key: &str) -> Mode {
        self.entries.get(key).map_or(Mode::Auto, Mode::from_entry)
    }

    /// Raw stored entry of `key`, if any.
    pub fn entry(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Replaces (or inserts) the entry of `key`.
    pub fn set_mode(&mut self, key: impl Into<String>, mode: Mode) {
        self.entries.insert(key.into(), mode.to_entry());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn from_json(text: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(text).ok()? {
            Value::Object(entries) => Some(Self { entries }),
            _ => None,
        }
    }
}

/// Locations of the files written by older releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyPaths {
    /// Plain-text or JSON mode file.
    pub config: PathBuf,
    /// JSON curve file.
    pub curve: PathBuf,
}

/// What [`ConfigStore::migrate_legacy`] carried over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub curve_migrated: bool,
    pub config_migrated: bool,
}

/// Durable home of the [`ConfigDocument`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document fresh from disk.
    ///
    /// A missing or corrupt file yields an empty document.
    pub fn read(&self) -> ConfigDocument {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return ConfigDocument::new();
        };
        ConfigDocument::from_json(&text).unwrap_or_else(|| {
            debug!("Ignoring unreadable config {}", self.path.display());
            ConfigDocument::new()
        })
    }

    /// Sets the mode of one device and commits the whole document.
    pub fn write_mode(&self, key: &str, mode: Mode) -> Result<(), StorageError> {
        self.write_modes([(key.to_string(), mode)])
    }

    /// Sets the mode of several devices in a single commit.
    pub fn write_modes(
        &self,
        modes: impl IntoIterator<Item = (String, Mode)>,
    ) -> Result<(), StorageError> {
        let mut doc = self.read();
        for (key, mode) in modes {
            debug!("{key}: {mode}");
            doc.set_mode(key, mode);
        }
        storage::write_json(&self.path, &doc)
    }

    /// One-shot upgrade of files written by older releases.
    ///
    /// Each legacy file is migrated only when it exists and its current
    /// counterpart does not; current files are never overwritten.
    pub fn migrate_legacy(
        &self,
        legacy: &LegacyPaths,
        curves: &CurveStore,
    ) -> Result<MigrationReport, StorageError> {
        let mut report = MigrationReport::default();

        if legacy.curve.exists() && !curves.path().exists() {
            match fs::read_to_string(&legacy.curve)
                .ok()
                .and_then(|text| serde_json::from_str::<Curve>(&text).ok())
            {
                Some(curve) => {
                    curves.persist(&curve)?;
                    info!(
                        "Migrated fan curve: {} -> {}",
                        legacy.curve.display(),
                        curves.path().display()
                    );
                    report.curve_migrated = true;
                }
                None => debug!("Legacy curve {} is unreadable", legacy.curve.display()),
            }
        }

        if legacy.config.exists() && !self.path.exists() {
            let text = fs::read_to_string(&legacy.config)
                .map_err(|e| StorageError::io("read", &legacy.config, e))?;

            if let Some(doc) = ConfigDocument::from_json(&text) {
                storage::write_json(&self.path, &doc)?;
                info!(
                    "Migrated config (JSON): {} -> {}",
                    legacy.config.display(),
                    self.path.display()
                );
                report.config_migrated = true;
            } else if let Some(line) = text.lines().next() {
                let mut doc = ConfigDocument::new();
                doc.set_mode(device_key(0), Mode::from_legacy_token(line));
                storage::write_json(&self.path, &doc)?;
                info!(
                    "Migrated config (plain text): {} -> {}",
                    legacy.config.display(),
                    self.path.display()
                );
                report.config_migrated = true;
            }
        }

        Ok(report)
    }
}
