//! User settings for the grid viewer.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/gridview/settings.json
//! - Linux: ~/.config/gridview/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\gridview\settings.json
//!
//! Every field has a default, so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_column_width() -> u32 {
    100
}

fn default_heartbeat_timeout_secs() -> u64 {
    2
}

fn default_window_width() -> f64 {
    960.0
}

fn default_window_height() -> f64 {
    550.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    /// Display width given to every column descriptor
    #[serde(default = "default_column_width")]
    pub column_width: u32,

    /// Helper template to use instead of the bundled one
    #[serde(default)]
    pub template_path: Option<PathBuf>,

    /// Abort a kernel execution after this many seconds. Unset means wait forever.
    #[serde(default)]
    pub execute_timeout_secs: Option<u64>,

    /// How long to wait for a heartbeat before declaring the kernel dead
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    #[serde(default = "default_window_width")]
    pub window_width: f64,

    #[serde(default = "default_window_height")]
    pub window_height: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        GridSettings {
            column_width: default_column_width(),
            template_path: None,
            execute_timeout_secs: None,
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl GridSettings {
    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_secs.map(Duration::from_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridview")
        .join("settings.json")
}

/// Load settings from `path`, returning defaults if the file is missing or unreadable
pub fn load_settings_from(path: &Path) -> GridSettings {
    if !path.exists() {
        return GridSettings::default();
    }
    match std::fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed settings file {:?}: {}", path, e);
            GridSettings::default()
        }),
        Err(e) => {
            log::warn!("Failed to read settings file {:?}: {}", path, e);
            GridSettings::default()
        }
    }
}

/// Load settings from the default location
pub fn load_settings() -> GridSettings {
    load_settings_from(&settings_path())
}
