//! Controller settings stored in `ttdctl.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default location of the settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = "ttdctl.toml";

/// Controller settings (TOML).
///
/// Every field is optional in the file; command-line flags override loaded values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Server executable, looked up on `PATH` when not a path.
    pub server: String,

    /// Minutes between autosaves.
    pub autosave_minutes: u64,

    /// Directory holding the server's runtime `openttd.cfg` and `default.cfg`.
    pub personal_dir: PathBuf,

    /// Symlink that always points at the most recently started session.
    pub last_link: PathBuf,

    /// Seconds to wait for the server to exit after `quit` before killing it.
    pub quit_grace_secs: u64,

    /// Seconds to wait for a requested savegame to appear on disk.
    pub save_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server: "openttd".to_string(),
            autosave_minutes: 30,
            personal_dir: PathBuf::from("."),
            last_link: PathBuf::from("game.last"),
            quit_grace_secs: 5,
            save_timeout_secs: 100,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(anyhow!("server must be a non-empty command"));
        }
        if self.autosave_minutes == 0 {
            return Err(anyhow!("autosave_minutes must be > 0"));
        }
        if self.save_timeout_secs == 0 {
            return Err(anyhow!("save_timeout_secs must be > 0"));
        }
        if self.last_link.as_os_str().is_empty() {
            return Err(anyhow!("last_link must be a non-empty path"));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `ControllerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ControllerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        let cfg = ControllerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ControllerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(cfg)
}
