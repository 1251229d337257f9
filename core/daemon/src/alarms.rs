//! Named one-shot alarms on the tokio runtime.
//!
//! Each alarm is a task that sleeps toward a wall-clock instant and then
//! sends its name on the fired channel. Sleeps are sliced so a machine that
//! suspends past the deadline fires shortly after wake, not a full monotonic
//! interval later.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use xtab_core::{AlarmScheduler, XtabError};

const MAX_SLEEP_SLICE: Duration = Duration::from_secs(30);

struct PendingAlarm {
    generation: u64,
    when: DateTime<Utc>,
    task: JoinHandle<()>,
}

type AlarmTable = Arc<Mutex<HashMap<String, PendingAlarm>>>;

pub struct TokioAlarms {
    handle: Handle,
    fired: mpsc::UnboundedSender<String>,
    pending: AlarmTable,
    generation: AtomicU64,
}

impl TokioAlarms {
    /// Returns the scheduler and the channel fired alarm names arrive on.
    pub fn new(handle: Handle) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fired, receiver) = mpsc::unbounded_channel();
        let alarms = Self {
            handle,
            fired,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        };
        (alarms, receiver)
    }
}

async fn sleep_until_wall_clock(when: DateTime<Utc>) {
    loop {
        let Ok(remaining) = (when - Utc::now()).to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(MAX_SLEEP_SLICE)).await;
    }
}

/// Removes the entry if it still belongs to `generation`. A task that woke
/// after being replaced or cleared gets false and must not fire.
fn claim(table: &AlarmTable, alarm: &str, generation: u64) -> bool {
    let Ok(mut pending) = table.lock() else {
        return true;
    };
    if pending
        .get(alarm)
        .is_some_and(|entry| entry.generation == generation)
    {
        pending.remove(alarm);
        true
    } else {
        false
    }
}

impl AlarmScheduler for TokioAlarms {
    fn create(&self, name: &str, when: DateTime<Utc>) -> xtab_core::Result<()> {
        let mut pending = self.pending.lock().map_err(|_| XtabError::AlarmScheduling {
            name: name.to_string(),
            details: "alarm table poisoned".to_string(),
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let table = Arc::clone(&self.pending);
        let fired = self.fired.clone();
        let alarm = name.to_string();

        let task = self.handle.spawn(async move {
            sleep_until_wall_clock(when).await;
            if !claim(&table, &alarm, generation) {
                debug!(alarm = %alarm, generation, "Superseded alarm woke; not firing");
                return;
            }
            if fired.send(alarm.clone()).is_err() {
                debug!(alarm = %alarm, "Alarm fired after shutdown; dropped");
            }
        });

        if let Some(previous) = pending.insert(
            name.to_string(),
            PendingAlarm {
                generation,
                when,
                task,
            },
        ) {
            previous.task.abort();
        }
        Ok(())
    }

    fn clear(&self, name: &str) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        match pending.remove(name) {
            Some(entry) => {
                entry.task.abort();
                true
            }
            None => false,
        }
    }

    fn pending(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut pending: Vec<_> = self
            .pending
            .lock()
            .map(|table| {
                table
                    .iter()
                    .map(|(name, entry)| (name.clone(), entry.when))
                    .collect()
            })
            .unwrap_or_default();
        pending.sort();
        pending
    }
}
