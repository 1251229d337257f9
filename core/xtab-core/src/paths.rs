//! Path management for xtab data.
//!
//! All file locations live under one root (`~/.xtab` by default) so both the
//! daemon and the CLI agree on where the shared store and socket are.
//! Tests use [`XtabPaths::with_root`] to point everything at a temp dir.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, XtabError};

pub const SOCKET_ENV: &str = "XTAB_DAEMON_SOCKET";

#[derive(Debug, Clone)]
pub struct XtabPaths {
    root: PathBuf,
}

impl XtabPaths {
    /// Resolves `~/.xtab`.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(XtabError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(".xtab"),
        })
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shared key-value document every context reads and writes.
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Daemon socket. `XTAB_DAEMON_SOCKET` overrides the default location.
    pub fn socket_file(&self) -> PathBuf {
        match env::var(SOCKET_ENV) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => self.root.join("daemon.sock"),
        }
    }

    pub fn daemon_config_file(&self) -> PathBuf {
        self.root.join("daemon.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_under_root() {
        let paths = XtabPaths::with_root(PathBuf::from("/tmp/xtab-test"));
        assert_eq!(
            paths.settings_file(),
            PathBuf::from("/tmp/xtab-test/settings.json")
        );
        assert_eq!(
            paths.daemon_config_file(),
            PathBuf::from("/tmp/xtab-test/daemon.toml")
        );
        assert_eq!(paths.logs_dir(), PathBuf::from("/tmp/xtab-test/logs"));
    }
}
