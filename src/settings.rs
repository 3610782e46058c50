//! Daemon settings for nvfand.
//!
//! Settings describe *where* the per-GPU mode document and the fan curve
//! live and how the reconciliation loop behaves. They are read once at
//! startup; the mode document itself is re-read on every tick.

use crate::config::LegacyPaths;
use anyhow::{Context, Result};
use log::info;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "NVFAND_SETTINGS";

const SYSTEM_SETTINGS: &str = "/etc/nvfand/settings.yml";

/// Top-level settings structure.
///
/// Every field is optional in the file; an absent file yields
/// [`Settings::default`].
///
/// # Example
///
/// ```yaml
/// version: 1
/// tick_seconds: 5
/// config_dir: /etc/nvfd
/// legacy_config_file: /etc/infinirc_gpu_fan_control.conf
/// legacy_curve_file: /etc/infinirc_gpu_fan_curve.json
/// min_fan_speed: 30
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Settings format version.
    #[serde(default = "defaults::version")]
    pub version: u8,

    /// Reconciliation interval in seconds.
    #[serde(default = "defaults::tick_seconds")]
    pub tick_seconds: u16,

    /// Directory holding `config.json` and `curve.json`.
    #[serde(default = "defaults::config_dir")]
    pub config_dir: PathBuf,

    /// Mode file written by releases before the JSON store.
    #[serde(default = "defaults::legacy_config_file")]
    pub legacy_config_file: PathBuf,

    /// Curve file written by releases before the JSON store.
    #[serde(default = "defaults::legacy_curve_file")]
    pub legacy_curve_file: PathBuf,

    /// Lowest speed ever pushed to a fan, in percent.
    #[serde(default = "defaults::min_fan_speed")]
    pub min_fan_speed: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: defaults::version(),
            tick_seconds: defaults::tick_seconds(),
            config_dir: defaults::config_dir(),
            legacy_config_file: defaults::legacy_config_file(),
            legacy_curve_file: defaults::legacy_curve_file(),
            min_fan_speed: defaults::min_fan_speed(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or from the standard locations.
    ///
    /// Lookup order:
    /// 1. explicit `path`
    /// 2. `NVFAND_SETTINGS` environment variable
    /// 3. `/etc/nvfand/settings.yml`
    ///
    /// An explicit path must exist. Otherwise a missing file means defaults.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nvfand::settings::Settings;
    ///
    /// let settings = Settings::load(None)?;
    /// println!("ticking every {}s", settings.tick_seconds);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => match locate_settings() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        info!("Loading settings from: {}", path.display());
        Self::load_from_path(&path)
    }

    /// Parses and validates one settings file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        settings
            .validate()
            .with_context(|| format!("Settings validation failed for: {}", path.display()))?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported settings version {}", self.version);
        }
        if self.tick_seconds == 0 {
            anyhow::bail!("tick_seconds must be at least 1");
        }
        if self.min_fan_speed > 100 {
            anyhow::bail!(
                "min_fan_speed must be a percentage, got {}",
                self.min_fan_speed
            );
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn curve_path(&self) -> PathBuf {
        self.config_dir.join("curve.json")
    }

    pub fn legacy_paths(&self) -> LegacyPaths {
        LegacyPaths {
            config: self.legacy_config_file.clone(),
            curve: self.legacy_curve_file.clone(),
        }
    }
}

fn locate_settings() -> Option<PathBuf> {
    if let Some(env_path) = env::var_os(SETTINGS_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let etc = Path::new(SYSTEM_SETTINGS);
    etc.exists().then(|| etc.to_path_buf())
}

mod defaults {
    use std::path::PathBuf;

    pub fn version() -> u8 {
        1
    }

    pub fn tick_seconds() -> u16 {
        5
    }

    pub fn config_dir() -> PathBuf {
        PathBuf::from("/etc/nvfd")
    }

    pub fn legacy_config_file() -> PathBuf {
        PathBuf::from("/etc/infinirc_gpu_fan_control.conf")
    }

    pub fn legacy_curve_file() -> PathBuf {
        PathBuf::from("/etc/infinirc_gpu_fan_curve.json")
    }

    pub fn min_fan_speed() -> u8 {
        30
    }
}
