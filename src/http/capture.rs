//! Response body capture.
//!
//! # Responsibilities
//! - Count the body bytes sent to the client
//! - Mirror the first `CAPTURE_LIMIT` bytes for error-body logging
//! - Finish the request's log entry exactly once
//!
//! # Design Decisions
//! - The entry is finished when the body ends, fails, or is dropped; the
//!   drop path covers clients that disconnect mid-stream
//! - Bytes past the capture limit are counted but not stored

use axum::body::Bytes;
use axum::http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::http::entry::{LogEntry, ResponseSummary};

/// Capacity of the response capture buffer.
pub const CAPTURE_LIMIT: usize = 512;

/// Byte buffer that silently drops everything past its limit.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Append as much of `data` as fits. Returns the number of bytes kept.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let room = self.limit.saturating_sub(self.buf.len());
        let kept = room.min(data.len());
        self.buf.extend_from_slice(&data[..kept]);
        kept
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.limit
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new(CAPTURE_LIMIT)
    }
}

/// Response state collected while the body streams out.
#[derive(Debug)]
struct Finisher {
    entry: Option<LogEntry>,
    status: i32,
    headers: HeaderMap,
    bytes: u64,
    capture: CaptureBuffer,
}

impl Finisher {
    fn record(&mut self, data: &[u8]) {
        if self.entry.is_none() {
            return;
        }
        self.bytes += data.len() as u64;
        if self.status >= 400 && !self.capture.is_full() {
            self.capture.write(data);
        }
    }

    fn finish(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let elapsed = entry.started_at().elapsed();
        let body = (self.status >= 400)
            .then(|| std::mem::take(&mut self.capture).into_bytes());

        entry.finish(ResponseSummary {
            status: self.status,
            bytes: self.bytes,
            headers: std::mem::take(&mut self.headers),
            elapsed,
            body,
        });
    }
}

impl Drop for Finisher {
    fn drop(&mut self) {
        self.finish();
    }
}

pin_project! {
    /// Body wrapper that feeds a [`LogEntry`] and finishes it at the end.
    #[derive(Debug)]
    pub struct LoggedBody<B> {
        #[pin]
        inner: B,
        finisher: Finisher,
    }
}

impl<B> LoggedBody<B> {
    /// Wrap `inner`, finishing `entry` with `status` and `headers` once the
    /// body is done.
    pub fn new(inner: B, entry: LogEntry, status: u16, headers: HeaderMap) -> Self {
        Self {
            inner,
            finisher: Finisher {
                entry: Some(entry),
                status: i32::from(status),
                headers,
                bytes: 0,
                capture: CaptureBuffer::default(),
            },
        }
    }

    /// Number of body bytes seen so far.
    pub fn bytes_written(&self) -> u64 {
        self.finisher.bytes
    }
}

impl<B> Body for LoggedBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.finisher.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                this.finisher.finish();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finisher.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
