//! Fault-tolerant facade over the shared key-value store.
//!
//! The store is the only state shared between contexts, and it has no
//! transactions. This module makes it safe to lean on:
//!
//! - **Reads never fail**: a failed read resolves to schema defaults.
//! - **Writes always acknowledge**: a failed write is logged, and the caller
//!   continues rather than waiting on a storage outage.
//! - **Defaults are the schema**: stored values override defaults key by key,
//!   so a field added in a newer version reads as its default until written.
//!
//! Successful writes are published on a broadcast channel so other components
//! in the same process (e.g. [`crate::SettingsCache`]) can stay current
//! without polling.

use async_trait::async_trait;
use chrono::NaiveDate;
use fs_err as fs;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Result, XtabError};
use crate::feature::{FeatureDescriptor, LAST_ATTEMPT_DATE_KEY, TOGGLES};
use crate::FeatureKey;

/// A flat set of key/value pairs, as read from or written to the store.
pub type Record = Map<String, Value>;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// The externally provided key-value service.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored values for `keys`. Keys never written are absent.
    async fn get(&self, keys: &[&str]) -> Result<Record>;

    /// Writes every pair in `items`, leaving other keys untouched.
    async fn set(&self, items: Record) -> Result<()>;
}

/// Default value for every key the extension persists.
pub fn schema_defaults() -> Record {
    let mut defaults = Record::new();
    for toggle in TOGGLES.iter() {
        defaults.insert(toggle.storage_key.to_string(), json!(toggle.default_enabled));
    }
    for key in FeatureKey::ALL {
        let descriptor = FeatureDescriptor::of(key);
        defaults.insert(descriptor.snooze_end_key.to_string(), Value::Null);
        defaults.insert(descriptor.attempts_key.to_string(), json!(0));
    }
    defaults.insert(LAST_ATTEMPT_DATE_KEY.to_string(), Value::Null);
    defaults
}

/// Overlays `stored` on `defaults`. Any key present in `stored` wins.
pub fn merge(defaults: &Record, stored: Record) -> Record {
    let mut merged = defaults.clone();
    for (key, value) in stored {
        merged.insert(key, value);
    }
    merged
}

#[derive(Clone)]
pub struct StorageAdapter {
    store: Arc<dyn KeyValueStore>,
    defaults: Arc<Record>,
    changes: broadcast::Sender<Record>,
}

impl StorageAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_defaults(store, schema_defaults())
    }

    pub fn with_defaults(store: Arc<dyn KeyValueStore>, defaults: Record) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            defaults: Arc::new(defaults),
            changes,
        }
    }

    pub fn defaults(&self) -> &Record {
        &self.defaults
    }

    /// Reads `keys`, merged over their defaults. Never fails.
    pub async fn read(&self, keys: &[&str]) -> Record {
        let defaults = self.defaults_for(keys);
        match self.store.get(keys).await {
            Ok(stored) => merge(&defaults, stored),
            Err(err) => {
                warn!(error = %err, keys = ?keys, "Storage read failed; using defaults");
                defaults
            }
        }
    }

    /// Reads every schema key.
    pub async fn read_all(&self) -> Record {
        let keys: Vec<&str> = self.defaults.keys().map(String::as_str).collect();
        self.read(&keys).await
    }

    /// Writes `items`. Resolves even when the underlying write fails.
    pub async fn write(&self, items: Record) {
        if items.is_empty() {
            return;
        }
        match self.store.set(items.clone()).await {
            Ok(()) => {
                debug!(keys = ?items.keys().collect::<Vec<_>>(), "Storage write committed");
                // No subscribers is fine.
                let _ = self.changes.send(items);
            }
            Err(err) => {
                warn!(error = %err, "Storage write failed; continuing without persistence");
            }
        }
    }

    /// Subscribes to successful writes made through this adapter.
    pub fn subscribe(&self) -> broadcast::Receiver<Record> {
        self.changes.subscribe()
    }

    fn defaults_for(&self, keys: &[&str]) -> Record {
        keys.iter()
            .filter_map(|key| {
                self.defaults
                    .get(*key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field accessors
//
// Stored values may be missing or of the wrong type (hand edits, older
// versions). Each accessor degrades to the default instead of failing.
// ─────────────────────────────────────────────────────────────────────────────

pub fn bool_field(record: &Record, key: &str, default: bool) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Epoch-millisecond timestamp; `null`, non-numeric and non-positive read as `None`.
pub fn millis_field(record: &Record, key: &str) -> Option<i64> {
    record
        .get(key)
        .and_then(|value| value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)))
        .filter(|millis| *millis > 0)
}

pub fn count_field(record: &Record, key: &str) -> u32 {
    record
        .get(key)
        .and_then(Value::as_u64)
        .map(|count| count.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

/// `YYYY-MM-DD` date; anything unparseable reads as `None`.
pub fn date_field(record: &Record, key: &str) -> Option<NaiveDate> {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(|value| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

// ─────────────────────────────────────────────────────────────────────────────
// Stores
// ─────────────────────────────────────────────────────────────────────────────

/// In-process store. Failure switches let tests simulate a storage outage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Record>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: Record) -> Self {
        Self {
            values: Mutex::new(values),
            ..Self::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Everything currently stored.
    pub fn snapshot(&self) -> Record {
        self.values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Record> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(XtabError::StorageUnavailable("memory store read disabled".into()));
        }
        let values = self
            .values
            .lock()
            .map_err(|_| XtabError::StorageUnavailable("memory store poisoned".into()))?;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: Record) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(XtabError::StorageUnavailable("memory store write disabled".into()));
        }
        let mut values = self
            .values
            .lock()
            .map_err(|_| XtabError::StorageUnavailable("memory store poisoned".into()))?;
        values.extend(items);
        Ok(())
    }
}

/// A single JSON document on disk, shared by every process.
///
/// Writes are read-modify-write with temp file + rename, so a reader never
/// observes a partially written document. Writers in different processes are
/// not coordinated: last write wins.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_document(&self) -> Result<Record> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Record::new()),
            Err(err) => {
                return Err(XtabError::StorageUnavailable(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    err
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Record::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(XtabError::StorageCorrupt {
                path: self.path.clone(),
                details: "document is not a JSON object".to_string(),
            }),
            Err(err) => Err(XtabError::StorageCorrupt {
                path: self.path.clone(),
                details: err.to_string(),
            }),
        }
    }

    fn persist_document(&self, document: &Record) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| XtabError::StorageUnavailable("settings path has no parent".into()))?;
        fs::create_dir_all(parent).map_err(|err| XtabError::Io {
            context: format!("creating {}", parent.display()),
            source: err,
        })?;

        let content = serde_json::to_vec_pretty(document).map_err(|err| XtabError::Json {
            context: "serializing settings".to_string(),
            source: err,
        })?;

        let mut temp = NamedTempFile::new_in(parent).map_err(|err| XtabError::Io {
            context: "creating temp settings file".to_string(),
            source: err,
        })?;
        temp.write_all(&content).map_err(|err| XtabError::Io {
            context: "writing temp settings file".to_string(),
            source: err,
        })?;
        temp.persist(&self.path).map_err(|err| XtabError::Io {
            context: format!("committing {}", self.path.display()),
            source: err.error,
        })?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<Record> {
        let document = self.load_document()?;
        Ok(keys
            .iter()
            .filter_map(|key| document.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: Record) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| XtabError::StorageUnavailable("settings write lock poisoned".into()))?;

        let mut document = match self.load_document() {
            Ok(document) => document,
            Err(err @ XtabError::StorageCorrupt { .. }) => {
                warn!(error = %err, "Replacing corrupt settings document");
                Record::new()
            }
            Err(err) => return Err(err),
        };
        document.extend(items);
        self.persist_document(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn merge_prefers_stored_and_keeps_new_defaults() {
        let defaults = record(&[("posts", json!(true)), ("exploreRedirect", json!(false))]);
        let stored = record(&[("posts", json!(false))]);

        let merged = merge(&defaults, stored);
        assert_eq!(merged["posts"], json!(false));
        assert_eq!(merged["exploreRedirect"], json!(false));
    }

    #[test]
    fn schema_defaults_cover_every_feature() {
        let defaults = schema_defaults();
        assert_eq!(defaults["homeRedirect"], json!(false));
        assert_eq!(defaults["exploreRedirect"], json!(false));
        assert_eq!(defaults["posts"], json!(true));
        assert_eq!(defaults["snoozeEndTime"], Value::Null);
        assert_eq!(defaults["exploreDisableAttempts"], json!(0));
        assert_eq!(defaults[LAST_ATTEMPT_DATE_KEY], Value::Null);
    }

    #[tokio::test]
    async fn read_failure_returns_defaults() {
        let store = Arc::new(MemoryStore::with_values(record(&[(
            "homeRedirect",
            json!(true),
        )])));
        store.set_fail_reads(true);
        let adapter = StorageAdapter::new(store);

        let values = adapter.read(&["homeRedirect", "posts"]).await;
        assert_eq!(values["homeRedirect"], json!(false));
        assert_eq!(values["posts"], json!(true));
    }

    #[tokio::test]
    async fn write_failure_still_acknowledges() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let adapter = StorageAdapter::new(store.clone());
        let mut changes = adapter.subscribe();

        adapter.write(record(&[("posts", json!(false))])).await;

        assert!(store.snapshot().is_empty());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn successful_write_is_published() {
        let adapter = StorageAdapter::new(Arc::new(MemoryStore::new()));
        let mut changes = adapter.subscribe();

        adapter.write(record(&[("posts", json!(false))])).await;

        let change = changes.try_recv().expect("change published");
        assert_eq!(change["posts"], json!(false));
    }

    #[test]
    fn accessors_tolerate_wrong_types() {
        let values = record(&[
            ("homeRedirect", json!("yes")),
            ("snoozeEndTime", json!("later")),
            ("disableAttempts", json!(-3)),
            ("lastAttemptDate", json!("01/02/2024")),
        ]);
        assert!(!bool_field(&values, "homeRedirect", false));
        assert_eq!(millis_field(&values, "snoozeEndTime"), None);
        assert_eq!(count_field(&values, "disableAttempts"), 0);
        assert_eq!(date_field(&values, "lastAttemptDate"), None);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("settings.json"));

        store
            .set(record(&[("posts", json!(false)), ("homeRedirect", json!(true))]))
            .await
            .unwrap();
        store
            .set(record(&[("homeRedirect", json!(false))]))
            .await
            .unwrap();

        let values = store.get(&["posts", "homeRedirect", "missing"]).await.unwrap();
        assert_eq!(values["posts"], json!(false));
        assert_eq!(values["homeRedirect"], json!(false));
        assert!(!values.contains_key("missing"));
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_error_and_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(path);

        assert!(matches!(
            store.get(&["posts"]).await,
            Err(XtabError::StorageCorrupt { .. })
        ));

        store.set(record(&[("posts", json!(true))])).await.unwrap();
        let values = store.get(&["posts"]).await.unwrap();
        assert_eq!(values["posts"], json!(true));
    }
}
