//! Timer reconciliation: keeps real alarms in step with persisted snoozes.
//!
//! The background process can be torn down at any moment, so nothing here is
//! trusted across restarts. The store says which snoozes exist; alarms are
//! re-derived from it on every startup. A snooze whose alarm cannot be armed
//! is expired on the spot, so a feature is never left snoozed with no wakeup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, XtabError};
use crate::feature::FeatureDescriptor;
use crate::friction::{FrictionEngine, ReenableNotice, SnoozeTimers};
use crate::storage::StorageAdapter;
use crate::FeatureKey;

/// Named one-shot alarms. Creating an alarm under a name that is already
/// pending replaces it.
pub trait AlarmScheduler: Send + Sync {
    fn create(&self, name: &str, when: DateTime<Utc>) -> Result<()>;

    /// Returns whether an alarm was pending under `name`.
    fn clear(&self, name: &str) -> bool;

    /// Pending alarms, for health reporting.
    fn pending(&self) -> Vec<(String, DateTime<Utc>)>;
}

/// Surface for the re-enable notice.
pub trait Notifier: Send + Sync {
    fn show(&self, notice: &ReenableNotice);

    /// Notices currently on screen.
    fn active_count(&self) -> usize {
        0
    }
}

/// [`SnoozeTimers`] backed directly by an alarm scheduler, using each
/// feature's reserved alarm name.
#[derive(Clone)]
pub struct SnoozeAlarms {
    scheduler: Arc<dyn AlarmScheduler>,
}

impl SnoozeAlarms {
    pub fn new(scheduler: Arc<dyn AlarmScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn pending(&self) -> Vec<(String, DateTime<Utc>)> {
        self.scheduler.pending()
    }
}

#[async_trait]
impl SnoozeTimers for SnoozeAlarms {
    async fn arm(&self, key: FeatureKey, when: DateTime<Utc>) -> bool {
        let name = FeatureDescriptor::of(key).alarm_name;
        self.scheduler.clear(name);
        match self.scheduler.create(name, when) {
            Ok(()) => {
                debug!(alarm = name, fire_at = %when, "Alarm armed");
                true
            }
            Err(err) => {
                warn!(alarm = name, error = %err, "Failed to arm alarm");
                false
            }
        }
    }

    async fn cancel(&self, key: FeatureKey) {
        let name = FeatureDescriptor::of(key).alarm_name;
        if self.scheduler.clear(name) {
            debug!(alarm = name, "Alarm cleared");
        }
    }
}

/// What [`TimerReconciler::on_startup`] did for each feature.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub expired: Vec<FeatureKey>,
    pub rearmed: Vec<FeatureKey>,
}

pub struct TimerReconciler {
    engine: FrictionEngine,
    alarms: SnoozeAlarms,
    notifier: Arc<dyn Notifier>,
}

impl TimerReconciler {
    pub fn new(
        storage: StorageAdapter,
        scheduler: Arc<dyn AlarmScheduler>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let alarms = SnoozeAlarms::new(scheduler);
        let engine = FrictionEngine::new(storage, Arc::new(alarms.clone()), clock);
        Self {
            engine,
            alarms,
            notifier,
        }
    }

    pub fn engine(&self) -> &FrictionEngine {
        &self.engine
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn pending_alarms(&self) -> Vec<(String, DateTime<Utc>)> {
        self.alarms.pending()
    }

    /// Arms (or re-arms) the expiration alarm for `key`. Last call wins.
    pub async fn arm_timer(&self, key: FeatureKey, when: DateTime<Utc>) -> bool {
        self.alarms.arm(key, when).await
    }

    pub async fn cancel_timer(&self, key: FeatureKey) {
        self.alarms.cancel(key).await;
    }

    /// Rebuilds alarms from persisted snoozes after a (re)start.
    pub async fn on_startup(&self) -> StartupReport {
        let now = self.engine.now();
        let mut report = StartupReport::default();

        for key in FeatureKey::ALL {
            let state = self.engine.peek_state(key).await;
            let Some(end) = state.snooze_end_time else {
                continue;
            };

            if end <= now {
                info!(feature = %key, snooze_end = %end, "Snooze ended while not running");
                self.alarms.cancel(key).await;
                self.expire_and_notify(key).await;
                report.expired.push(key);
            } else if self.alarms.arm(key, end).await {
                info!(feature = %key, snooze_end = %end, "Snooze alarm restored");
                report.rearmed.push(key);
            } else {
                warn!(feature = %key, "Could not restore snooze alarm; expiring now");
                self.expire_and_notify(key).await;
                report.expired.push(key);
            }
        }

        report
    }

    /// Handles a fired alarm. Returns the notice shown, if the feature was
    /// actually re-enabled.
    pub async fn on_timer_fired(&self, name: &str) -> Option<ReenableNotice> {
        let Some(descriptor) = FeatureDescriptor::for_alarm(name) else {
            warn!(alarm = name, "Ignoring unknown alarm");
            return None;
        };
        let key = descriptor.key;

        let state = self.engine.peek_state(key).await;
        match state.snooze_end_time {
            None => {
                debug!(feature = %key, "Alarm fired with no snooze recorded; ignoring");
                None
            }
            Some(end) if end > self.engine.now() => {
                debug!(feature = %key, snooze_end = %end, "Alarm fired early; re-arming");
                if !self.alarms.arm(key, end).await {
                    return Some(self.expire_and_notify(key).await);
                }
                None
            }
            Some(_) => Some(self.expire_and_notify(key).await),
        }
    }

    async fn expire_and_notify(&self, key: FeatureKey) -> ReenableNotice {
        let notice = self.engine.expire(key).await;
        self.notifier.show(&notice);
        notice
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

/// Alarm scheduler that never fires on its own. Tests pull due alarms with
/// [`ManualAlarms::take_due`].
#[derive(Debug, Default)]
pub struct ManualAlarms {
    alarms: Mutex<HashMap<String, DateTime<Utc>>>,
    fail_create: AtomicBool,
}

impl ManualAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, name: &str) -> Option<DateTime<Utc>> {
        self.alarms
            .lock()
            .ok()
            .and_then(|alarms| alarms.get(name).copied())
    }

    /// Removes and returns every alarm due at `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let Ok(mut alarms) = self.alarms.lock() else {
            return Vec::new();
        };
        let due: Vec<String> = alarms
            .iter()
            .filter(|(_, when)| **when <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &due {
            alarms.remove(name);
        }
        due
    }
}

impl AlarmScheduler for ManualAlarms {
    fn create(&self, name: &str, when: DateTime<Utc>) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(XtabError::AlarmScheduling {
                name: name.to_string(),
                details: "scheduler refused".to_string(),
            });
        }
        let mut alarms = self.alarms.lock().map_err(|_| XtabError::AlarmScheduling {
            name: name.to_string(),
            details: "alarm table poisoned".to_string(),
        })?;
        alarms.insert(name.to_string(), when);
        Ok(())
    }

    fn clear(&self, name: &str) -> bool {
        self.alarms
            .lock()
            .map(|mut alarms| alarms.remove(name).is_some())
            .unwrap_or(false)
    }

    fn pending(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut pending: Vec<_> = self
            .alarms
            .lock()
            .map(|alarms| alarms.iter().map(|(n, w)| (n.clone(), *w)).collect())
            .unwrap_or_default();
        pending.sort();
        pending
    }
}

/// Collects shown notices.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<ReenableNotice>>,
}

impl RecordingNotifier {
    pub fn shown(&self) -> Vec<ReenableNotice> {
        self.shown
            .lock()
            .map(|shown| shown.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, notice: &ReenableNotice) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(notice.clone());
        }
    }

    fn active_count(&self) -> usize {
        self.shown.lock().map(|shown| shown.len()).unwrap_or(0)
    }
}
