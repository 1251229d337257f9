//! Opens URLs in the user's browser without focusing it.

use tracing::info;

use xtab_core::{TabOpener, XtabError};

pub struct SystemTabs {
    enabled: bool,
}

impl SystemTabs {
    /// With `enabled = false` requests are acknowledged and logged only.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl TabOpener for SystemTabs {
    fn open_background(&self, url: &str) -> xtab_core::Result<()> {
        if !self.enabled {
            info!(url = %url, "Tab opening disabled by config; skipping");
            return Ok(());
        }
        open::that_detached(url).map_err(|err| XtabError::TabOpen(format!("{}: {}", url, err)))
    }
}
