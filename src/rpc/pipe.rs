// SPDX-License-Identifier: MIT
//! In-process duplex byte pipe.
//!
//! `pair()` is the in-memory substitute for a loopback socket: two cross-wired
//! endpoints, each end's writes visible as the other end's reads, in order,
//! with no process boundary involved. Closing an endpoint is idempotent and
//! severs both directions — pending reads on the paired endpoint observe
//! end-of-stream and its writes fail with a broken-pipe error instead of
//! hanging.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

/// Buffered capacity of each pipe direction.
const PIPE_CAPACITY: usize = 64 * 1024;

/// One end of an in-process duplex pipe.
pub struct PipeEndpoint {
    // `None` after close — both directions are gone at that point.
    inner: Option<DuplexStream>,
}

/// Create a cross-wired endpoint pair.
pub fn pair() -> (PipeEndpoint, PipeEndpoint) {
    let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
    (PipeEndpoint { inner: Some(a) }, PipeEndpoint { inner: Some(b) })
}

impl PipeEndpoint {
    /// Close both directions of this endpoint. Idempotent.
    ///
    /// After close, local reads return end-of-stream and local writes fail;
    /// the paired endpoint's pending reads unblock with end-of-stream and its
    /// writes fail with a broken-pipe error.
    pub async fn close(&mut self) -> io::Result<()> {
        if let Some(mut stream) = self.inner.take() {
            // Flush the write direction before dropping severs the pair.
            stream.shutdown().await.ok();
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl AsyncRead for PipeEndpoint {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            // Closed endpoint: end-of-stream, never a hang.
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for PipeEndpoint {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.inner.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, data),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe endpoint closed",
            ))),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.inner.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
