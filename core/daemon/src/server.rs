//! Socket side of the daemon: one newline-terminated request and one
//! response per connection.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use xtab_core::MessageRouter;
use xtab_daemon_protocol::{parse_request, ErrorInfo, Request, Response, MAX_REQUEST_BYTES};

const READ_TIMEOUT_SECS: u64 = 2;

pub async fn handle_connection(stream: UnixStream, router: Arc<MessageRouter>) {
    let (reader, mut writer) = stream.into_split();

    let response = match read_request(reader).await {
        Ok(request) => {
            debug!(action = request.message.name(), id = ?request.id, "Daemon request received");
            router.handle(request).await
        }
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            Response::error_with_info(None, err)
        }
    };

    if let Err(err) = write_response(&mut writer, &response).await {
        debug!(error = %err, "Client went away before the response was written");
    }
}

async fn read_request<R>(reader: R) -> Result<Request, ErrorInfo>
where
    R: AsyncRead + Unpin,
{
    // One byte past the limit so oversize input is detectable.
    let mut limited = BufReader::new(reader.take(MAX_REQUEST_BYTES as u64 + 1));
    let mut buffer = Vec::new();

    let read = tokio::time::timeout(
        Duration::from_secs(READ_TIMEOUT_SECS),
        limited.read_until(b'\n', &mut buffer),
    )
    .await;

    match read {
        Err(_) => return Err(ErrorInfo::new("read_timeout", "request timed out")),
        Ok(Err(err)) => {
            return Err(ErrorInfo::new(
                "read_error",
                format!("failed to read request: {}", err),
            ))
        }
        Ok(Ok(_)) => {}
    }

    while matches!(buffer.last(), Some(b'\n' | b'\r')) {
        buffer.pop();
    }
    parse_request(&buffer)
}

async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_one_line_and_ignores_trailing_data() {
        let input: &[u8] =
            b"{\"protocolVersion\":1,\"id\":\"h\",\"action\":\"getHealth\"}\r\n{\"junk\":true}\n";
        let request = read_request(input).await.unwrap();
        assert_eq!(request.id.as_deref(), Some("h"));
    }

    #[tokio::test]
    async fn oversize_request_is_rejected() {
        let input = vec![b'x'; MAX_REQUEST_BYTES + 10];
        let err = read_request(input.as_slice()).await.unwrap_err();
        assert_eq!(err.code, "request_too_large");
    }

    #[tokio::test]
    async fn empty_connection_is_rejected() {
        let err = read_request(&b""[..]).await.unwrap_err();
        assert_eq!(err.code, "empty_request");
    }

    #[tokio::test]
    async fn response_is_newline_terminated_json() {
        let mut out = Vec::new();
        write_response(&mut out, &Response::success(Some("1".into())))
            .await
            .unwrap();
        assert_eq!(out.last(), Some(&b'\n'));
        let parsed: Response = serde_json::from_slice(&out[..out.len() - 1]).unwrap();
        assert!(parsed.success);
    }
}
