//! Re-enable notices. Each notice is logged, kept as active, and dismissed
//! after a fixed delay by a detached task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

use xtab_core::{Notifier, ReenableNotice};

pub struct NotificationCenter {
    handle: Handle,
    dismiss_after: Duration,
    active: Arc<Mutex<HashMap<u64, ReenableNotice>>>,
    next_id: AtomicU64,
}

impl NotificationCenter {
    pub fn new(handle: Handle, dismiss_after: Duration) -> Self {
        Self {
            handle,
            dismiss_after,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Notifier for NotificationCenter {
    fn show(&self, notice: &ReenableNotice) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        info!(
            notification_id = id,
            feature = %notice.feature,
            title = %notice.title,
            message = %notice.message,
            "Notification shown"
        );
        if let Ok(mut active) = self.active.lock() {
            active.insert(id, notice.clone());
        }

        let active = Arc::clone(&self.active);
        let dismiss_after = self.dismiss_after;
        self.handle.spawn(async move {
            tokio::time::sleep(dismiss_after).await;
            if let Ok(mut active) = active.lock() {
                if active.remove(&id).is_some() {
                    debug!(notification_id = id, "Notification dismissed");
                }
            }
        });
    }

    fn active_count(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }
}
