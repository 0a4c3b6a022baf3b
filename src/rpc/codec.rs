// SPDX-License-Identifier: MIT
//! Length-delimited wire framing.
//!
//! One frame is:
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JSON>
//! ```
//! the stdio framing of LSP 3.17. Unknown header lines (e.g. `Content-Type`)
//! are skipped. A malformed header or a stream that ends mid-frame is a
//! framing error — fatal to the connection that hits it.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::rpc::message::WireMessage;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame header missing Content-Length")]
    MissingContentLength,
    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),
    #[error("stream ended mid-frame")]
    UnexpectedEof,
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Write one message as a complete frame.
///
/// The body is serialized in full before any byte reaches the writer, so a
/// serialization failure never leaves a half-sent frame on the wire.
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(msg)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one frame, blocking until it is complete.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary. An EOF
/// inside a header or body is `CodecError::UnexpectedEof`.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<WireMessage>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut first_line = true;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if first_line {
                return Ok(None);
            }
            return Err(CodecError::UnexpectedEof);
        }
        first_line = false;

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let value = value.trim();
            content_length = Some(
                value
                    .parse()
                    .map_err(|_| CodecError::InvalidContentLength(value.to_string()))?,
            );
        }
        // Other headers (Content-Type, ...) are tolerated and ignored.
    }

    let length = content_length.ok_or(CodecError::MissingContentLength)?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof
        } else {
            CodecError::Io(e)
        }
    })?;

    Ok(Some(serde_json::from_slice(&body)?))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::message::{Message, RpcError};
    use serde_json::json;
    use std::io::Cursor;
    use tokio::io::BufReader;

    async fn roundtrip(msg: Message) -> Message {
        let mut buf = Vec::new();
        write_message(&mut buf, &msg.clone().into_wire())
            .await
            .unwrap();
        let mut reader = BufReader::new(Cursor::new(buf));
        let wire = read_message(&mut reader).await.unwrap().unwrap();
        Message::from_wire(wire).unwrap()
    }

    #[tokio::test]
    async fn roundtrip_request_with_object_params() {
        let msg = Message::request(1, "initialize", Some(json!({"processId": 99, "rootUri": "file:///w"})));
        assert_eq!(roundtrip(msg.clone()).await, msg);
    }

    #[tokio::test]
    async fn roundtrip_request_with_array_params() {
        let msg = Message::request(2, "batch", Some(json!([1, "two", null])));
        assert_eq!(roundtrip(msg.clone()).await, msg);
    }

    #[tokio::test]
    async fn roundtrip_null_result_response() {
        let msg = Message::response(json!(3), Ok(json!(null)));
        assert_eq!(roundtrip(msg.clone()).await, msg);
    }

    #[tokio::test]
    async fn roundtrip_error_with_data() {
        let err = RpcError::internal_error("boom").with_data(json!({"at": "dispatch"}));
        let msg = Message::response(json!("abc"), Err(err));
        assert_eq!(roundtrip(msg.clone()).await, msg);
    }

    #[tokio::test]
    async fn roundtrip_notification() {
        let msg = Message::notification("textDocument/didChange", Some(json!({"version": 2})));
        assert_eq!(roundtrip(msg.clone()).await, msg);
    }

    #[tokio::test]
    async fn two_frames_back_to_back() {
        let mut buf = Vec::new();
        let a = Message::notification("first", None);
        let b = Message::notification("second", None);
        write_message(&mut buf, &a.clone().into_wire()).await.unwrap();
        write_message(&mut buf, &b.clone().into_wire()).await.unwrap();

        let mut reader = BufReader::new(Cursor::new(buf));
        let first = read_message(&mut reader).await.unwrap().unwrap();
        let second = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(Message::from_wire(first).unwrap(), a);
        assert_eq!(Message::from_wire(second).unwrap(), b);
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clean_eof_returns_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extra_headers_are_skipped() {
        let body = br#"{"jsonrpc":"2.0","method":"m"}"#;
        let mut buf = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        buf.extend_from_slice(body);
        let mut reader = BufReader::new(Cursor::new(buf));
        let wire = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(wire.method.as_deref(), Some("m"));
    }

    #[tokio::test]
    async fn missing_content_length_is_error() {
        let buf = b"Content-Type: text/plain\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(Cursor::new(buf));
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::MissingContentLength)
        ));
    }

    #[tokio::test]
    async fn garbage_content_length_is_error() {
        let buf = b"Content-Length: twelve\r\n\r\n{}".to_vec();
        let mut reader = BufReader::new(Cursor::new(buf));
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::InvalidContentLength(_))
        ));
    }

    #[tokio::test]
    async fn truncated_body_is_error() {
        let buf = b"Content-Length: 100\r\n\r\n{\"jsonrpc\":\"2.0\"}".to_vec();
        let mut reader = BufReader::new(Cursor::new(buf));
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn eof_inside_headers_is_error() {
        let buf = b"Content-Length: 10\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(buf));
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn non_json_body_is_error() {
        let buf = b"Content-Length: 3\r\n\r\nnot".to_vec();
        let mut reader = BufReader::new(Cursor::new(buf));
        assert!(matches!(
            read_message(&mut reader).await,
            Err(CodecError::Json(_))
        ));
    }
}
