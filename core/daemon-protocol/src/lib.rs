//! IPC protocol types and validation for xtab-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients reuse the same
//! types to construct valid requests.
//!
//! Every request is one JSON object on a single line. The `action` tag selects
//! the message; the remaining fields are the message payload:
//!
//! ```json
//! {"protocolVersion":1,"id":"req-1","action":"setupSnoozeAlarm","featureType":"home","snoozeEndTime":1704103200000}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// A guarded feature. Each one is tracked independently by the friction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKey {
    Home,
    Explore,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 2] = [FeatureKey::Home, FeatureKey::Explore];

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKey::Home => "home",
            FeatureKey::Explore => "explore",
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKey {
    type Err = ErrorInfo;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "home" => Ok(FeatureKey::Home),
            "explore" => Ok(FeatureKey::Explore),
            other => Err(ErrorInfo::new(
                "unknown_feature",
                format!("unknown feature '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    /// Open `url` in a tab that does not take focus. Fire-and-forget.
    OpenInNewTab { url: String },
    /// Arm the expiration alarm for `feature_type` at `snooze_end_time` (epoch ms).
    #[serde(rename_all = "camelCase")]
    SetupSnoozeAlarm {
        feature_type: FeatureKey,
        snooze_end_time: i64,
    },
    /// Cancel the expiration alarm for `feature_type`, if any.
    #[serde(rename_all = "camelCase")]
    ClearSnoozeAlarm { feature_type: FeatureKey },
    GetHealth,
}

impl Message {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self {
            Message::OpenInNewTab { url } => validate_tab_url(url),
            Message::SetupSnoozeAlarm {
                snooze_end_time, ..
            } => millis_to_datetime(*snooze_end_time).map(|_| ()),
            Message::ClearSnoozeAlarm { .. } | Message::GetHealth => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::OpenInNewTab { .. } => "openInNewTab",
            Message::SetupSnoozeAlarm { .. } => "setupSnoozeAlarm",
            Message::ClearSnoozeAlarm { .. } => "clearSnoozeAlarm",
            Message::GetHealth => "getHealth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub protocol_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub message: Message,
}

impl Request {
    pub fn new(id: Option<String>, message: Message) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            id,
            message,
        }
    }
}

/// Reply to a request. `success` is the only field callers are required to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

impl Response {
    pub fn success(id: Option<String>) -> Self {
        Self {
            success: true,
            id,
            data: None,
            error: None,
        }
    }

    pub fn with_data(id: Option<String>, data: Value) -> Self {
        Self {
            success: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    /// A well-formed request whose side effect did not happen (e.g. alarm not armed).
    pub fn failure(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self::error_with_info(id, ErrorInfo::new(code, message))
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            success: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Parses and validates one request line (without the trailing newline).
pub fn parse_request(bytes: &[u8]) -> Result<Request, ErrorInfo> {
    if bytes.len() > MAX_REQUEST_BYTES {
        return Err(ErrorInfo::new(
            "request_too_large",
            "request exceeded maximum size",
        ));
    }
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let request: Request = serde_json::from_slice(bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not a valid message: {}", err),
        )
    })?;

    if request.protocol_version != PROTOCOL_VERSION {
        return Err(ErrorInfo::new(
            "protocol_mismatch",
            "unsupported protocol version",
        ));
    }

    request.message.validate()?;
    Ok(request)
}

pub fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, ErrorInfo> {
    if millis <= 0 {
        return Err(ErrorInfo::new(
            "invalid_timestamp",
            "snoozeEndTime must be a positive epoch-millisecond value",
        ));
    }
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        ErrorInfo::new("invalid_timestamp", "snoozeEndTime is out of range")
    })
}

fn validate_tab_url(value: &str) -> Result<(), ErrorInfo> {
    let parsed = url::Url::parse(value.trim())
        .map_err(|err| ErrorInfo::new("invalid_url", format!("url is invalid: {}", err)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ErrorInfo::new(
            "invalid_url",
            format!("unsupported url scheme '{}'", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_setup_snooze_alarm_wire_shape() {
        let line = br#"{"protocolVersion":1,"action":"setupSnoozeAlarm","featureType":"explore","snoozeEndTime":1704103200000}"#;
        let request = parse_request(line).expect("valid request");
        assert_eq!(
            request.message,
            Message::SetupSnoozeAlarm {
                feature_type: FeatureKey::Explore,
                snooze_end_time: 1_704_103_200_000,
            }
        );
        assert_eq!(request.id, None);
    }

    #[test]
    fn serializes_open_in_new_tab_with_action_tag() {
        let request = Request::new(
            Some("req-1".to_string()),
            Message::OpenInNewTab {
                url: "https://x.com/someone/status/1".to_string(),
            },
        );
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["action"], "openInNewTab");
        assert_eq!(value["url"], "https://x.com/someone/status/1");
        assert_eq!(value["protocolVersion"], PROTOCOL_VERSION);
    }

    #[test]
    fn rejects_unknown_feature_type() {
        let line = br#"{"protocolVersion":1,"action":"setupSnoozeAlarm","featureType":"notifications","snoozeEndTime":1}"#;
        let err = parse_request(line).unwrap_err();
        assert_eq!(err.code, "invalid_json");
    }

    #[test]
    fn rejects_missing_feature_type() {
        let line = br#"{"protocolVersion":1,"action":"setupSnoozeAlarm","snoozeEndTime":1704103200000}"#;
        assert!(parse_request(line).is_err());
    }

    #[test]
    fn rejects_non_positive_snooze_end_time() {
        let line = br#"{"protocolVersion":1,"action":"setupSnoozeAlarm","featureType":"home","snoozeEndTime":0}"#;
        let err = parse_request(line).unwrap_err();
        assert_eq!(err.code, "invalid_timestamp");
    }

    #[test]
    fn rejects_protocol_mismatch() {
        let line = br#"{"protocolVersion":99,"action":"getHealth"}"#;
        let err = parse_request(line).unwrap_err();
        assert_eq!(err.code, "protocol_mismatch");
    }

    #[test]
    fn rejects_non_http_tab_url() {
        let line = br#"{"protocolVersion":1,"action":"openInNewTab","url":"javascript:alert(1)"}"#;
        let err = parse_request(line).unwrap_err();
        assert_eq!(err.code, "invalid_url");
    }

    #[test]
    fn rejects_blank_request() {
        let err = parse_request(b"   ").unwrap_err();
        assert_eq!(err.code, "empty_request");
    }

    #[test]
    fn failure_response_carries_success_false() {
        let response = Response::failure(Some("a".to_string()), "alarm_failed", "boom");
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "alarm_failed");
    }

    #[test]
    fn feature_key_round_trips_through_str() {
        for key in FeatureKey::ALL {
            assert_eq!(key.as_str().parse::<FeatureKey>().unwrap(), key);
        }
        assert!("bookmarks".parse::<FeatureKey>().is_err());
    }
}
