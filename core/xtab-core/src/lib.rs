//! # xtab-core
//!
//! Shared library for every xtab context: the background daemon, the settings
//! CLI and anything that needs to answer "should this page be redirected?".
//!
//! ## Layering
//!
//! - [`storage`]: fault-tolerant facade over the shared key-value store
//! - [`friction`]: the enabled / snoozed / disabled state machine
//! - [`reconcile`]: keeps alarms in step with persisted snoozes
//! - [`messaging`]: request routing for the background process, and the
//!   client-side timer port that forwards to it
//!
//! Supporting modules hold static descriptors ([`feature`]), snooze math
//! ([`snooze`]), the countdown ([`countdown`]), file locations ([`paths`]),
//! daemon config ([`config`]) and page rules ([`navigation`]).
//!
//! Nothing in the friction path returns an error to its caller for storage
//! or timer trouble. Those are logged and degraded; see [`storage`] and
//! [`reconcile`] for the exact fallbacks.

pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod feature;
pub mod friction;
pub mod messaging;
pub mod navigation;
pub mod paths;
pub mod reconcile;
pub mod settings_cache;
pub mod snooze;
pub mod storage;

pub use xtab_daemon_protocol::FeatureKey;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DaemonConfig;
pub use countdown::{Countdown, CountdownStep};
pub use error::{Result, XtabError};
pub use feature::{FeatureDescriptor, Toggle, ToggleDescriptor, TOGGLES};
pub use friction::{
    DisableGate, DisableOutcome, DisableToken, FeatureStatus, FrictionEngine, FrictionState,
    ReenableNotice, SnoozeApplied, SnoozeTimers,
};
pub use messaging::{MessageRouter, MessageSender, RemoteTimers, TabOpener};
pub use paths::XtabPaths;
pub use reconcile::{AlarmScheduler, Notifier, SnoozeAlarms, StartupReport, TimerReconciler};
pub use settings_cache::SettingsCache;
pub use snooze::{format_remaining, SnoozeDuration, PERMANENT_DISABLE_COUNTDOWN_SECS};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, Record, StorageAdapter};
