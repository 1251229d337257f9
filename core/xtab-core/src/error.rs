//! Error types for xtab-core operations.
//!
//! Most failures in the friction path are recovered locally (defaults,
//! immediate expiry) and only logged; these types cover the boundaries where a
//! caller genuinely needs to know something went wrong.

use std::path::PathBuf;

/// All errors that can occur in xtab-core operations.
#[derive(Debug, thiserror::Error)]
pub enum XtabError {
    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage document corrupt: {path}: {details}")]
    StorageCorrupt { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Timer Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to schedule alarm {name}: {details}")]
    AlarmScheduling { name: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Messaging Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Message delivery failed: {0}")]
    MessageDelivery(String),

    #[error("Tab could not be opened: {0}")]
    TabOpen(String),

    // ─────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Unknown toggle: {0}")]
    UnknownToggle(String),

    #[error("Unknown snooze duration: {0}")]
    UnknownSnoozeDuration(String),

    #[error("Toggle {0} requires the friction flow to disable")]
    FrictionRequired(String),

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using XtabError.
pub type Result<T> = std::result::Result<T, XtabError>;
