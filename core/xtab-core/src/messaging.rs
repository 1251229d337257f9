//! Cross-context messaging.
//!
//! The UI cannot own durable timers, so it asks the background process to arm
//! them. [`MessageRouter`] is the background side: it turns a validated
//! [`Request`] into calls on the reconciler and the tab opener.
//! [`RemoteTimers`] is the UI side: a [`SnoozeTimers`] implementation that
//! forwards over any [`MessageSender`].
//!
//! Delivery is at-most-once. Nothing here retries; a failed send is reported
//! to the caller as "not armed" and the already-committed storage state
//! stands.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use xtab_daemon_protocol::{millis_to_datetime, Message, Request, Response, PROTOCOL_VERSION};

use crate::error::Result;
use crate::friction::SnoozeTimers;
use crate::reconcile::TimerReconciler;
use crate::FeatureKey;

/// Opens a URL without taking focus.
pub trait TabOpener: Send + Sync {
    fn open_background(&self, url: &str) -> Result<()>;
}

/// Transport for one request/response exchange.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

pub struct MessageRouter {
    reconciler: Arc<TimerReconciler>,
    tabs: Arc<dyn TabOpener>,
    version: &'static str,
}

impl MessageRouter {
    pub fn new(reconciler: Arc<TimerReconciler>, tabs: Arc<dyn TabOpener>) -> Self {
        Self {
            reconciler,
            tabs,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Reported in `getHealth`; the binary passes its own version.
    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub async fn handle(&self, request: Request) -> Response {
        let id = request.id;
        debug!(action = request.message.name(), "Handling message");

        match request.message {
            Message::OpenInNewTab { url } => match self.tabs.open_background(&url) {
                Ok(()) => Response::success(id),
                Err(err) => {
                    warn!(url = %url, error = %err, "Failed to open background tab");
                    Response::failure(id, "tab_open_failed", err.to_string())
                }
            },
            Message::SetupSnoozeAlarm {
                feature_type,
                snooze_end_time,
            } => {
                let when = match millis_to_datetime(snooze_end_time) {
                    Ok(when) => when,
                    Err(err) => return Response::error_with_info(id, err),
                };
                if self.reconciler.arm_timer(feature_type, when).await {
                    Response::success(id)
                } else {
                    Response::failure(id, "alarm_not_armed", "snooze alarm could not be scheduled")
                }
            }
            Message::ClearSnoozeAlarm { feature_type } => {
                self.reconciler.cancel_timer(feature_type).await;
                Response::success(id)
            }
            Message::GetHealth => Response::with_data(id, self.health()),
        }
    }

    fn health(&self) -> serde_json::Value {
        let alarms: Vec<_> = self
            .reconciler
            .pending_alarms()
            .into_iter()
            .map(|(name, when)| json!({ "name": name, "scheduledTime": when.timestamp_millis() }))
            .collect();

        json!({
            "status": "ok",
            "pid": std::process::id(),
            "version": self.version,
            "protocolVersion": PROTOCOL_VERSION,
            "alarms": alarms,
            "activeNotifications": self.reconciler.notifier().active_count(),
        })
    }
}

/// Snooze timers owned by another process.
#[derive(Clone)]
pub struct RemoteTimers {
    sender: Arc<dyn MessageSender>,
}

impl RemoteTimers {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl SnoozeTimers for RemoteTimers {
    async fn arm(&self, key: FeatureKey, when: DateTime<Utc>) -> bool {
        let request = Request::new(
            None,
            Message::SetupSnoozeAlarm {
                feature_type: key,
                snooze_end_time: when.timestamp_millis(),
            },
        );
        match self.sender.send(request).await {
            Ok(response) if response.success => true,
            Ok(response) => {
                warn!(feature = %key, error = ?response.error, "Background process refused snooze alarm");
                false
            }
            Err(err) => {
                warn!(feature = %key, error = %err, "Could not reach background process");
                false
            }
        }
    }

    async fn cancel(&self, key: FeatureKey) {
        let request = Request::new(None, Message::ClearSnoozeAlarm { feature_type: key });
        if let Err(err) = self.sender.send(request).await {
            debug!(feature = %key, error = %err, "Alarm cancel not delivered");
        }
    }
}
