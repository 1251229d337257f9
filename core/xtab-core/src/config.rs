//! Daemon runtime configuration.
//!
//! Loaded from `~/.xtab/daemon.toml`. Every field has a default, so a missing
//! file, a missing key, or a malformed document all end up at a usable config.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, XtabError};

pub const DEFAULT_NOTIFICATION_DISMISS_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// How long the re-enable notice stays up before it is dismissed.
    pub notification_dismiss_secs: u64,
    /// When false, `openInNewTab` requests are acknowledged and logged only.
    pub open_tabs: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            notification_dismiss_secs: DEFAULT_NOTIFICATION_DISMISS_SECS,
            open_tabs: true,
        }
    }
}

impl DaemonConfig {
    /// Reads the config file. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(err) => {
                return Err(XtabError::Io {
                    context: format!("reading {}", path.display()),
                    source: err,
                })
            }
        };

        toml::from_str(&content).map_err(|err| XtabError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load daemon config; using defaults");
                Self::default()
            }
        }
    }
}
