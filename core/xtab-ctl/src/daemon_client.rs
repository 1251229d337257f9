//! Client side of the daemon socket.
//!
//! One request per connection, delivered at most once. Only a failed connect
//! is retried (once, after a short delay), since nothing has been written by
//! then. Once the request is on the wire, any failure is handed back to the
//! caller, which decides what "not delivered" means for it.

use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::warn;

use xtab_core::{MessageSender, XtabError};
use xtab_daemon_protocol::{Request, Response, MAX_REQUEST_BYTES};

const ENABLE_ENV: &str = "XTAB_DAEMON_ENABLED";
const EXCHANGE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

pub fn daemon_enabled() -> bool {
    match env::var(ENABLE_ENV) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
        Err(_) => true,
    }
}

pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    pub fn new(socket: PathBuf) -> Self {
        Self { socket }
    }

    async fn connect(&self) -> Result<UnixStream, String> {
        UnixStream::connect(&self.socket)
            .await
            .map_err(|err| format!("Failed to connect to daemon socket: {}", err))
    }

    async fn connect_with_retry(&self, action: &str) -> Result<UnixStream, String> {
        match self.connect().await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                warn!(error = %err, action, "Failed to reach daemon");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                self.connect().await
            }
        }
    }

    async fn exchange(
        &self,
        mut stream: UnixStream,
        request: &Request,
    ) -> Result<Response, String> {
        let mut line = serde_json::to_vec(request)
            .map_err(|err| format!("Failed to serialize request: {}", err))?;
        line.push(b'\n');
        stream
            .write_all(&line)
            .await
            .map_err(|err| format!("Failed to write request: {}", err))?;

        let (reader, _writer) = stream.into_split();
        let mut reader = BufReader::new(reader.take(MAX_REQUEST_BYTES as u64 + 1));
        let mut buffer = Vec::new();
        reader
            .read_until(b'\n', &mut buffer)
            .await
            .map_err(|err| format!("Failed to read response: {}", err))?;
        parse_response(&buffer)
    }

    async fn exchange_with_timeout(
        &self,
        stream: UnixStream,
        request: &Request,
    ) -> Result<Response, String> {
        tokio::time::timeout(
            Duration::from_millis(EXCHANGE_TIMEOUT_MS),
            self.exchange(stream, request),
        )
        .await
        .unwrap_or_else(|_| Err("Timed out waiting for daemon response".to_string()))
    }
}

#[async_trait]
impl MessageSender for DaemonClient {
    async fn send(&self, mut request: Request) -> xtab_core::Result<Response> {
        if !daemon_enabled() {
            return Err(XtabError::MessageDelivery("daemon disabled".to_string()));
        }
        if request.id.is_none() {
            request.id = Some(make_request_id());
        }

        let action = request.message.name();
        let stream = self.connect_with_retry(action).await.map_err(|err| {
            warn!(error = %err, action, "Retry failed reaching daemon");
            XtabError::MessageDelivery(err)
        })?;

        self.exchange_with_timeout(stream, &request)
            .await
            .map_err(|err| {
                warn!(error = %err, action, "Daemon exchange failed; not resending");
                XtabError::MessageDelivery(err)
            })
    }
}

fn parse_response(buffer: &[u8]) -> Result<Response, String> {
    if buffer.len() > MAX_REQUEST_BYTES {
        return Err("Response exceeded maximum size".to_string());
    }
    let end = buffer
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(buffer.len());
    let bytes = &buffer[..end];
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err("Daemon response was empty".to_string());
    }
    serde_json::from_slice(bytes).map_err(|err| format!("Failed to parse response JSON: {}", err))
}

fn make_request_id() -> String {
    let mut random = rand::thread_rng();
    format!(
        "req-{}-{}-{:x}",
        Utc::now().timestamp_millis(),
        std::process::id(),
        random.next_u64()
    )
}
