//! Application configuration management.
//!
//! The config file holds session key overrides plus where session data and
//! logs go. It is stored at `~/.config/mindpal/config.json`; a missing file
//! means all defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mindpal_core::SessionConfig;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "mindpal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Durable store file name, inside the data directory
const DURABLE_FILE: &str = "durable.json";

/// Transient store file name, inside the transient directory
const TRANSIENT_FILE: &str = "transient.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub data_dir: Option<PathBuf>,
    pub transient_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the durable store lives. Survives reboots.
    pub fn durable_path(&self) -> Result<PathBuf> {
        let dir = match self.data_dir {
            Some(ref dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?
                .join(APP_NAME),
        };
        Ok(dir.join(DURABLE_FILE))
    }

    /// Where the transient store lives. The runtime directory is emptied
    /// when the user's login session ends; the temp directory is the
    /// fallback on platforms without one. The directory name carries the
    /// user name because the temp directory is shared.
    pub fn transient_path(&self) -> PathBuf {
        let dir = match self.transient_dir {
            Some(ref dir) => dir.clone(),
            None => dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(transient_dir_name(current_user().as_deref())),
        };
        dir.join(TRANSIENT_FILE)
    }
}

fn current_user() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|name| !name.is_empty()))
}

/// `mindpal-<user>`, with path separators and other odd characters replaced
/// so the name stays a single path component.
fn transient_dir_name(user: Option<&str>) -> String {
    let user: String = user
        .unwrap_or("unknown")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    format!("{}-{}", APP_NAME, user)
}
