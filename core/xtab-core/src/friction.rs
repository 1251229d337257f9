//! Friction engine: the enabled / snoozed / disabled state machine for each
//! guarded feature.
//!
//! ```text
//!   ENABLED ──apply_snooze──▶ SNOOZED ──expire / request_enable──▶ ENABLED
//!   ENABLED ──apply_permanent_disable──▶ DISABLED ──request_enable──▶ ENABLED
//! ```
//!
//! Only disabling is gated. The UI walks the gates in order:
//! [`FrictionEngine::request_disable`] (pure query) → confirmation →
//! [`FrictionEngine::confirm_disable_intent`] (counts the attempt) → snooze or
//! permanent choice → countdown → [`FrictionEngine::apply_snooze`] or
//! [`FrictionEngine::apply_permanent_disable`]. Abandoning any step before the
//! final call leaves `enabled` untouched.
//!
//! All state lives in the shared store. Multi-field transitions are written
//! as sequenced writes, ordered so a concurrent reader never sees a feature
//! that is both active and snoozed into the future.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Result, XtabError};
use crate::feature::{FeatureDescriptor, Toggle, LAST_ATTEMPT_DATE_KEY};
use crate::snooze::SnoozeDuration;
use crate::storage::{
    bool_field, count_field, date_field, millis_field, Record, StorageAdapter,
};
use crate::FeatureKey;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Where expiration timers get armed. In the background process this is the
/// alarm scheduler itself; in the UI it is a message to the background process.
#[async_trait]
pub trait SnoozeTimers: Send + Sync {
    /// Arms the expiration timer for `key`, replacing any pending one.
    /// Returns `false` when the timer could not be armed.
    async fn arm(&self, key: FeatureKey, when: DateTime<Utc>) -> bool;

    /// Best-effort cancel. A missing timer is not an error.
    async fn cancel(&self, key: FeatureKey);
}

/// Persisted friction state for one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrictionState {
    pub feature: FeatureKey,
    pub enabled: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub snooze_end_time: Option<DateTime<Utc>>,
    pub disable_attempts: u32,
    pub last_attempt_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeatureStatus {
    Enabled,
    Snoozed { until: DateTime<Utc> },
    Disabled,
}

impl FrictionState {
    pub fn status(&self) -> FeatureStatus {
        match (self.enabled, self.snooze_end_time) {
            (true, _) => FeatureStatus::Enabled,
            (false, Some(until)) => FeatureStatus::Snoozed { until },
            (false, None) => FeatureStatus::Disabled,
        }
    }

    /// Time left on an active snooze.
    pub fn snooze_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.snooze_end_time
            .filter(|end| *end > now)
            .map(|end| end - now)
    }
}

/// Identifies the feature a disable flow is operating on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisableToken(FeatureKey);

impl DisableToken {
    pub fn feature(self) -> FeatureKey {
        self.0
    }
}

/// The next gate the UI should present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisableGate {
    /// Nothing to do: the feature is already off (snoozed or disabled).
    AlreadyDisabled,
    Confirm {
        title: &'static str,
        message: &'static str,
        attempts_today: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisableOutcome {
    pub token: DisableToken,
    pub gate: DisableGate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeApplied {
    pub feature: FeatureKey,
    pub duration: SnoozeDuration,
    pub end_time: DateTime<Utc>,
    /// False when the expiration timer could not be armed. The snooze is
    /// still recorded; lazy expiration and startup reconciliation cover it.
    pub timer_armed: bool,
}

/// Shown after a snooze ends and the feature turns itself back on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReenableNotice {
    pub feature: FeatureKey,
    pub title: String,
    pub message: String,
}

impl ReenableNotice {
    fn for_feature(key: FeatureKey) -> Self {
        let descriptor = FeatureDescriptor::of(key);
        Self {
            feature: key,
            title: "Xtab Focus Feature Re-enabled".to_string(),
            message: format!(
                "Your {} feature is now active again to help maintain your focus.",
                descriptor.label
            ),
        }
    }
}

#[derive(Clone)]
pub struct FrictionEngine {
    storage: StorageAdapter,
    timers: Arc<dyn SnoozeTimers>,
    clock: Arc<dyn Clock>,
}

impl FrictionEngine {
    pub fn new(
        storage: StorageAdapter,
        timers: Arc<dyn SnoozeTimers>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            timers,
            clock,
        }
    }

    pub fn storage(&self) -> &StorageAdapter {
        &self.storage
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    /// Current state, with any past-due snooze expired first. Never fails.
    pub async fn get_state(&self, key: FeatureKey) -> FrictionState {
        let mut state = self.load(key).await;
        if let Some(end) = state.snooze_end_time {
            if end <= self.now() {
                debug!(feature = %key, snooze_end = %end, "Lazily expiring stale snooze");
                self.expire(key).await;
                state.enabled = true;
                state.snooze_end_time = None;
            }
        }
        state
    }

    pub async fn status_all(&self) -> Vec<FrictionState> {
        let mut states = Vec::with_capacity(FeatureKey::ALL.len());
        for key in FeatureKey::ALL {
            states.push(self.get_state(key).await);
        }
        states
    }

    /// Turns the feature on. Clears any snooze and its timer; no friction.
    pub async fn request_enable(&self, key: FeatureKey) -> FrictionState {
        let descriptor = FeatureDescriptor::of(key);
        let mut state = self.load(key).await;

        if state.snooze_end_time.is_some() {
            self.timers.cancel(key).await;
            self.write_field(descriptor.snooze_end_key, Value::Null).await;
        }
        self.write_field(descriptor.enabled_key, json!(true)).await;

        info!(feature = %key, "Feature enabled");
        state.enabled = true;
        state.snooze_end_time = None;
        state
    }

    /// Entry point of the disable flow. Reads only; counts nothing.
    pub async fn request_disable(&self, key: FeatureKey) -> DisableOutcome {
        let state = self.get_state(key).await;
        let token = DisableToken(key);
        if !state.enabled {
            return DisableOutcome {
                token,
                gate: DisableGate::AlreadyDisabled,
            };
        }

        let descriptor = FeatureDescriptor::of(key);
        DisableOutcome {
            token,
            gate: DisableGate::Confirm {
                title: descriptor.confirm_title,
                message: descriptor.confirm_message,
                attempts_today: self.attempts_today(&state),
            },
        }
    }

    /// Records one completed confirmation. Returns today's attempt count.
    ///
    /// The first attempt on a new local calendar day restarts the counters
    /// before incrementing, so the result is never 0.
    pub async fn confirm_disable_intent(&self, key: FeatureKey) -> u32 {
        let today = self.clock.now().date_naive();
        let mut keys: Vec<&str> = FeatureKey::ALL
            .iter()
            .map(|k| FeatureDescriptor::of(*k).attempts_key)
            .collect();
        keys.push(LAST_ATTEMPT_DATE_KEY);
        let values = self.storage.read(&keys).await;

        let attempts_key = FeatureDescriptor::of(key).attempts_key;
        let mut updates = Record::new();
        let current = if date_field(&values, LAST_ATTEMPT_DATE_KEY) == Some(today) {
            count_field(&values, attempts_key)
        } else {
            // lastAttemptDate is shared, so a rollover restarts every counter.
            for other in FeatureKey::ALL {
                updates.insert(
                    FeatureDescriptor::of(other).attempts_key.to_string(),
                    json!(0),
                );
            }
            0
        };

        let attempts = current.saturating_add(1);
        updates.insert(attempts_key.to_string(), json!(attempts));
        updates.insert(
            LAST_ATTEMPT_DATE_KEY.to_string(),
            json!(today.format(DATE_FORMAT).to_string()),
        );
        self.storage.write(updates).await;

        info!(feature = %key, attempts, "Disable attempt recorded");
        attempts
    }

    /// Suspends the feature until the end of `duration` and arms the timer.
    pub async fn apply_snooze(&self, key: FeatureKey, duration: SnoozeDuration) -> SnoozeApplied {
        let descriptor = FeatureDescriptor::of(key);
        let end_time = duration.end_time(&self.clock.now());

        self.write_field(descriptor.enabled_key, json!(false)).await;
        self.write_field(descriptor.snooze_end_key, json!(end_time.timestamp_millis()))
            .await;

        let timer_armed = self.timers.arm(key, end_time).await;
        if timer_armed {
            info!(feature = %key, snooze_end = %end_time, duration = duration.code(), "Feature snoozed");
        } else {
            warn!(
                feature = %key,
                snooze_end = %end_time,
                "Feature snoozed but expiration timer was not armed"
            );
        }

        SnoozeApplied {
            feature: key,
            duration,
            end_time,
            timer_armed,
        }
    }

    pub async fn apply_permanent_disable(&self, key: FeatureKey) -> FrictionState {
        let descriptor = FeatureDescriptor::of(key);
        self.timers.cancel(key).await;
        self.write_field(descriptor.enabled_key, json!(false)).await;
        self.write_field(descriptor.snooze_end_key, Value::Null).await;

        info!(feature = %key, "Feature disabled");
        let mut state = self.load(key).await;
        state.enabled = false;
        state.snooze_end_time = None;
        state
    }

    /// Ends a snooze: clears it and re-enables the feature.
    pub async fn expire(&self, key: FeatureKey) -> ReenableNotice {
        let descriptor = FeatureDescriptor::of(key);
        self.write_field(descriptor.snooze_end_key, Value::Null).await;
        self.write_field(descriptor.enabled_key, json!(true)).await;
        info!(feature = %key, "Snooze expired; feature re-enabled");
        ReenableNotice::for_feature(key)
    }

    /// Sets a settings toggle. Toggles that require friction can be turned on
    /// here but must go through the friction flow to be turned off.
    pub async fn set_toggle(&self, toggle: Toggle, on: bool) -> Result<()> {
        let descriptor = toggle.descriptor();
        if descriptor.requires_friction && !on {
            return Err(XtabError::FrictionRequired(toggle.to_string()));
        }
        match descriptor.guards {
            Some(key) if on => {
                self.request_enable(key).await;
            }
            _ => {
                self.write_field(descriptor.storage_key, json!(on)).await;
            }
        }
        Ok(())
    }

    /// Checked state of every toggle, lazy expiration included.
    pub async fn toggle_states(&self) -> Vec<(Toggle, bool)> {
        let keys: Vec<&str> = Toggle::ALL
            .iter()
            .map(|toggle| toggle.descriptor().storage_key)
            .collect();
        let values = self.storage.read(&keys).await;

        let mut states = Vec::with_capacity(Toggle::ALL.len());
        for toggle in Toggle::ALL {
            let descriptor = toggle.descriptor();
            let enabled = match descriptor.guards {
                Some(key) => self.get_state(key).await.enabled,
                None => bool_field(&values, descriptor.storage_key, descriptor.default_enabled),
            };
            states.push((toggle, enabled));
        }
        states
    }

    /// Attempts counted today. States loaded by this engine are already
    /// rolled over; this also covers states held across midnight.
    pub fn attempts_today(&self, state: &FrictionState) -> u32 {
        if state.last_attempt_date == Some(self.clock.now().date_naive()) {
            state.disable_attempts
        } else {
            0
        }
    }

    /// Stored state as-is, without lazy expiration. For reconciliation only.
    pub async fn peek_state(&self, key: FeatureKey) -> FrictionState {
        self.load(key).await
    }

    async fn load(&self, key: FeatureKey) -> FrictionState {
        let descriptor = FeatureDescriptor::of(key);
        let values = self
            .storage
            .read(&[
                descriptor.enabled_key,
                descriptor.snooze_end_key,
                descriptor.attempts_key,
                LAST_ATTEMPT_DATE_KEY,
            ])
            .await;

        let snooze_end_time = millis_field(&values, descriptor.snooze_end_key)
            .and_then(DateTime::from_timestamp_millis);
        let stored_enabled = bool_field(&values, descriptor.enabled_key, false);
        // A future snooze always wins over a stale "enabled" flag.
        let enabled = match snooze_end_time {
            Some(end) if end > self.now() => false,
            _ => stored_enabled,
        };

        // Counts from an earlier local day read as zero.
        let last_attempt_date = date_field(&values, LAST_ATTEMPT_DATE_KEY);
        let disable_attempts = if last_attempt_date == Some(self.clock.now().date_naive()) {
            count_field(&values, descriptor.attempts_key)
        } else {
            0
        };

        FrictionState {
            feature: key,
            enabled,
            snooze_end_time,
            disable_attempts,
            last_attempt_date,
        }
    }

    async fn write_field(&self, key: &str, value: Value) {
        let mut record = Record::new();
        record.insert(key.to_string(), value);
        self.storage.write(record).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TimerCall {
        Arm(FeatureKey, DateTime<Utc>),
        Cancel(FeatureKey),
    }

    #[derive(Default)]
    struct RecordingTimers {
        calls: Mutex<Vec<TimerCall>>,
        refuse: bool,
    }

    #[async_trait]
    impl SnoozeTimers for RecordingTimers {
        async fn arm(&self, key: FeatureKey, when: DateTime<Utc>) -> bool {
            self.calls.lock().unwrap().push(TimerCall::Arm(key, when));
            !self.refuse
        }

        async fn cancel(&self, key: FeatureKey) {
            self.calls.lock().unwrap().push(TimerCall::Cancel(key));
        }
    }

    struct Harness {
        engine: FrictionEngine,
        store: Arc<MemoryStore>,
        timers: Arc<RecordingTimers>,
        clock: Arc<ManualClock>,
    }

    fn harness_at(now: &str, values: Record, timers: RecordingTimers) -> Harness {
        let store = Arc::new(MemoryStore::with_values(values));
        let timers = Arc::new(timers);
        let clock = Arc::new(ManualClock::at(now).unwrap());
        let engine = FrictionEngine::new(
            StorageAdapter::new(store.clone()),
            timers.clone(),
            clock.clone(),
        );
        Harness {
            engine,
            store,
            timers,
            clock,
        }
    }

    fn harness(values: Record) -> Harness {
        harness_at("2024-01-01T12:00:00+00:00", values, RecordingTimers::default())
    }

    fn values(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn millis(rfc3339: &str) -> i64 {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .timestamp_millis()
    }

    #[tokio::test]
    async fn fresh_install_defaults_to_disabled() {
        let h = harness(Record::new());
        let state = h.engine.get_state(FeatureKey::Home).await;
        assert!(!state.enabled);
        assert_eq!(state.snooze_end_time, None);
        assert_eq!(state.disable_attempts, 0);
        assert_eq!(state.status(), FeatureStatus::Disabled);
    }

    #[tokio::test]
    async fn past_snooze_is_expired_on_read() {
        let h = harness(values(&[
            ("homeRedirect", json!(false)),
            ("snoozeEndTime", json!(millis("2024-01-01T11:59:59+00:00"))),
        ]));

        let state = h.engine.get_state(FeatureKey::Home).await;
        assert!(state.enabled);
        assert_eq!(state.snooze_end_time, None);

        let stored = h.store.snapshot();
        assert_eq!(stored["homeRedirect"], json!(true));
        assert_eq!(stored["snoozeEndTime"], Value::Null);
    }

    #[tokio::test]
    async fn future_snooze_overrides_stale_enabled_flag() {
        let h = harness(values(&[
            ("exploreRedirect", json!(true)),
            ("exploreSnoozeEndTime", json!(millis("2024-01-01T13:00:00+00:00"))),
        ]));

        let state = h.engine.get_state(FeatureKey::Explore).await;
        assert!(!state.enabled);
        assert!(matches!(state.status(), FeatureStatus::Snoozed { .. }));
    }

    #[tokio::test]
    async fn storage_outage_returns_defaults() {
        let h = harness(values(&[("homeRedirect", json!(true))]));
        h.store.set_fail_reads(true);

        let state = h.engine.get_state(FeatureKey::Home).await;
        assert!(!state.enabled);
        assert_eq!(state.snooze_end_time, None);
    }

    #[tokio::test]
    async fn request_disable_does_not_mutate_or_count() {
        let h = harness(values(&[("homeRedirect", json!(true))]));
        let before = h.store.snapshot();

        let outcome = h.engine.request_disable(FeatureKey::Home).await;
        assert_eq!(outcome.token.feature(), FeatureKey::Home);
        assert!(matches!(
            outcome.gate,
            DisableGate::Confirm {
                attempts_today: 0,
                ..
            }
        ));
        assert_eq!(h.store.snapshot(), before);
    }

    #[tokio::test]
    async fn request_disable_on_snoozed_feature_is_already_disabled() {
        let h = harness(values(&[
            ("homeRedirect", json!(false)),
            ("snoozeEndTime", json!(millis("2024-01-01T15:00:00+00:00"))),
        ]));
        let outcome = h.engine.request_disable(FeatureKey::Home).await;
        assert_eq!(outcome.gate, DisableGate::AlreadyDisabled);
    }

    #[tokio::test]
    async fn confirm_resets_then_increments_on_new_day() {
        let h = harness_at(
            "2024-01-02T10:00:00+00:00",
            values(&[
                ("homeRedirect", json!(true)),
                ("disableAttempts", json!(3)),
                ("exploreDisableAttempts", json!(2)),
                ("lastAttemptDate", json!("2024-01-01")),
            ]),
            RecordingTimers::default(),
        );

        let attempts = h.engine.confirm_disable_intent(FeatureKey::Home).await;
        assert_eq!(attempts, 1);

        let stored = h.store.snapshot();
        assert_eq!(stored["disableAttempts"], json!(1));
        assert_eq!(stored["exploreDisableAttempts"], json!(0));
        assert_eq!(stored["lastAttemptDate"], json!("2024-01-02"));
    }

    #[tokio::test]
    async fn confirm_increments_within_same_day() {
        let h = harness(values(&[
            ("exploreDisableAttempts", json!(2)),
            ("lastAttemptDate", json!("2024-01-01")),
        ]));
        assert_eq!(h.engine.confirm_disable_intent(FeatureKey::Explore).await, 3);
        assert_eq!(h.engine.confirm_disable_intent(FeatureKey::Explore).await, 4);
    }

    #[tokio::test]
    async fn day_rollover_uses_local_date() {
        // 23:30 UTC on Jan 1 is already Jan 2 at +02:00.
        let h = harness_at(
            "2024-01-02T01:30:00+02:00",
            values(&[
                ("disableAttempts", json!(5)),
                ("lastAttemptDate", json!("2024-01-01")),
            ]),
            RecordingTimers::default(),
        );
        assert_eq!(h.engine.confirm_disable_intent(FeatureKey::Home).await, 1);
    }

    #[tokio::test]
    async fn apply_snooze_writes_state_and_arms_timer() {
        let h = harness(values(&[("homeRedirect", json!(true))]));

        let applied = h
            .engine
            .apply_snooze(FeatureKey::Home, SnoozeDuration::FourHours)
            .await;

        let expected = DateTime::parse_from_rfc3339("2024-01-01T16:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(applied.end_time, expected);
        assert!(applied.timer_armed);
        assert_eq!(
            *h.timers.calls.lock().unwrap(),
            vec![TimerCall::Arm(FeatureKey::Home, expected)]
        );

        let state = h.engine.get_state(FeatureKey::Home).await;
        assert!(!state.enabled);
        assert_eq!(state.snooze_end_time, Some(expected));
    }

    #[tokio::test]
    async fn snooze_is_recorded_even_when_timer_refused() {
        let h = harness_at(
            "2024-01-01T12:00:00+00:00",
            values(&[("exploreRedirect", json!(true))]),
            RecordingTimers {
                refuse: true,
                ..RecordingTimers::default()
            },
        );

        let applied = h
            .engine
            .apply_snooze(FeatureKey::Explore, SnoozeDuration::FifteenMinutes)
            .await;
        assert!(!applied.timer_armed);

        let state = h.engine.get_state(FeatureKey::Explore).await;
        assert_eq!(state.snooze_end_time, Some(applied.end_time));

        h.clock.advance(Duration::minutes(16));
        let state = h.engine.get_state(FeatureKey::Explore).await;
        assert!(state.enabled);
    }

    #[tokio::test]
    async fn permanent_disable_reverses_without_friction() {
        let h = harness(values(&[
            ("homeRedirect", json!(true)),
            ("disableAttempts", json!(1)),
            ("lastAttemptDate", json!("2024-01-01")),
        ]));

        let state = h.engine.apply_permanent_disable(FeatureKey::Home).await;
        assert_eq!(state.status(), FeatureStatus::Disabled);
        h.timers.calls.lock().unwrap().clear();

        let state = h.engine.request_enable(FeatureKey::Home).await;
        assert!(state.enabled);
        assert_eq!(state.disable_attempts, 1);
        assert!(h.timers.calls.lock().unwrap().is_empty());
        assert_eq!(h.store.snapshot()["disableAttempts"], json!(1));
    }

    #[tokio::test]
    async fn early_enable_clears_snooze_and_cancels_timer() {
        let h = harness(values(&[
            ("homeRedirect", json!(false)),
            ("snoozeEndTime", json!(millis("2024-01-01T13:00:00+00:00"))),
        ]));

        let state = h.engine.request_enable(FeatureKey::Home).await;
        assert!(state.enabled);
        assert_eq!(state.snooze_end_time, None);
        assert_eq!(
            *h.timers.calls.lock().unwrap(),
            vec![TimerCall::Cancel(FeatureKey::Home)]
        );
        assert_eq!(h.store.snapshot()["snoozeEndTime"], Value::Null);
    }

    #[tokio::test]
    async fn abandoned_flow_keeps_attempt_but_not_disable() {
        let h = harness(values(&[("homeRedirect", json!(true))]));

        h.engine.request_disable(FeatureKey::Home).await;
        h.engine.confirm_disable_intent(FeatureKey::Home).await;
        // User cancels at the snooze choice or during the countdown.

        let state = h.engine.get_state(FeatureKey::Home).await;
        assert!(state.enabled);
        assert_eq!(state.disable_attempts, 1);
    }

    #[tokio::test]
    async fn expire_re_enables_and_returns_notice() {
        let h = harness(values(&[
            ("exploreRedirect", json!(false)),
            ("exploreSnoozeEndTime", json!(millis("2024-01-01T12:30:00+00:00"))),
        ]));

        let notice = h.engine.expire(FeatureKey::Explore).await;
        assert_eq!(notice.feature, FeatureKey::Explore);
        assert!(notice.message.contains("Explore Redirect"));

        let stored = h.store.snapshot();
        assert_eq!(stored["exploreRedirect"], json!(true));
        assert_eq!(stored["exploreSnoozeEndTime"], Value::Null);
    }

    #[tokio::test]
    async fn get_state_reports_zero_attempts_on_a_new_day() {
        let h = harness_at(
            "2024-01-02T10:00:00+00:00",
            values(&[
                ("homeRedirect", json!(true)),
                ("disableAttempts", json!(3)),
                ("lastAttemptDate", json!("2024-01-01")),
            ]),
            RecordingTimers::default(),
        );

        let state = h.engine.get_state(FeatureKey::Home).await;
        assert_eq!(state.disable_attempts, 0);
        let all = h.engine.status_all().await;
        assert!(all.iter().all(|state| state.disable_attempts == 0));
        // Reading never rewrites the stored counter.
        assert_eq!(h.store.snapshot()["disableAttempts"], json!(3));
    }

    #[tokio::test]
    async fn guarded_toggle_cannot_be_switched_off_directly() {
        let h = harness(values(&[("homeRedirect", json!(true))]));

        let err = h.engine.set_toggle(Toggle::HomeRedirect, false).await;
        assert!(matches!(err, Err(XtabError::FrictionRequired(_))));

        h.engine.set_toggle(Toggle::Posts, false).await.unwrap();
        let states = h.engine.toggle_states().await;
        assert!(states.contains(&(Toggle::Posts, false)));
        assert!(states.contains(&(Toggle::HomeRedirect, true)));
    }
}
