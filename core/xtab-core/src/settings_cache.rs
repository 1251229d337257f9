//! Read-through settings cache for the page-facing side.
//!
//! Populated once from storage, then kept current only by change
//! notifications delivered over an explicit subscription. Until the first
//! load completes, every flag reads as its schema default.
//!
//! Redirect flags are answered from the cached snooze end time as well as the
//! flag itself: a snooze still running keeps the redirect off, and a snooze
//! that has ended turns it back on even if nothing has rewritten the flag yet.

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::feature::{FeatureDescriptor, Toggle};
use crate::storage::{bool_field, millis_field, Record, StorageAdapter};
use crate::FeatureKey;

pub struct SettingsCache {
    values: RwLock<Record>,
    loaded: RwLock<bool>,
    clock: Arc<dyn Clock>,
}

impl SettingsCache {
    /// An unloaded cache that answers with schema defaults.
    pub fn with_defaults(defaults: Record, clock: Arc<dyn Clock>) -> Self {
        Self {
            values: RwLock::new(defaults),
            loaded: RwLock::new(false),
            clock,
        }
    }

    /// Loads every schema key from storage.
    pub async fn load(storage: &StorageAdapter, clock: Arc<dyn Clock>) -> Self {
        let cache = Self::with_defaults(storage.defaults().clone(), clock);
        cache.refresh(storage).await;
        cache
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.read().map(|loaded| *loaded).unwrap_or(false)
    }

    pub async fn refresh(&self, storage: &StorageAdapter) {
        let values = storage.read_all().await;
        if let Ok(mut current) = self.values.write() {
            *current = values;
        }
        if let Ok(mut loaded) = self.loaded.write() {
            *loaded = true;
        }
    }

    /// Applies one storage change. Returns true when a redirect decision
    /// changed, meaning the current page should be re-checked.
    pub fn apply_change(&self, change: &Record) -> bool {
        let now = self.now();
        let Ok(mut values) = self.values.write() else {
            return false;
        };

        let before = FeatureKey::ALL.map(|key| effective_redirect(&values, key, now));
        for (key, value) in change {
            values.insert(key.clone(), value.clone());
        }
        let after = FeatureKey::ALL.map(|key| effective_redirect(&values, key, now));
        before != after
    }

    /// Follows `changes` until the channel closes. A lagged subscriber
    /// reloads from storage rather than trusting a partial view.
    pub async fn follow(
        &self,
        mut changes: broadcast::Receiver<Record>,
        storage: &StorageAdapter,
    ) {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    if self.apply_change(&change) {
                        debug!("Redirect settings changed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Settings cache lagged; reloading");
                    self.refresh(storage).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn toggle_enabled(&self, toggle: Toggle) -> bool {
        let descriptor = toggle.descriptor();
        if let Some(key) = descriptor.guards {
            return self.redirect_enabled(key);
        }
        self.values
            .read()
            .map(|values| bool_field(&values, descriptor.storage_key, descriptor.default_enabled))
            .unwrap_or(descriptor.default_enabled)
    }

    pub fn posts_enabled(&self) -> bool {
        self.toggle_enabled(Toggle::Posts)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.toggle_enabled(Toggle::Notifications)
    }

    pub fn redirect_enabled(&self, key: FeatureKey) -> bool {
        let now = self.now();
        self.values
            .read()
            .map(|values| effective_redirect(&values, key, now))
            .unwrap_or(Toggle::for_feature(key).descriptor().default_enabled)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }
}

fn effective_redirect(values: &Record, key: FeatureKey, now: DateTime<Utc>) -> bool {
    let descriptor = FeatureDescriptor::of(key);
    let default = Toggle::for_feature(key).descriptor().default_enabled;
    let snooze_end =
        millis_field(values, descriptor.snooze_end_key).and_then(DateTime::from_timestamp_millis);
    match snooze_end {
        Some(end) if end > now => false,
        Some(_) => true,
        None => bool_field(values, descriptor.enabled_key, default),
    }
}
