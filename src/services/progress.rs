//! Byte-counting wrapper for upload body streams.

use bytes::Bytes;
use futures_util::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Duration, Instant};

/// Counts bytes as they pass through and logs progress against the
/// declared total at a bounded rate.
pub struct ProgressStream<S> {
    inner: S,
    transferred: u64,
    declared: Option<u64>,
    last_log: Instant,
    log_interval: Duration,
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, declared: Option<u64>) -> Self {
        Self {
            inner,
            transferred: 0,
            declared,
            last_log: Instant::now(),
            log_interval: Duration::from_millis(600),
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.transferred += bytes.len() as u64;
                let now = Instant::now();
                if now.duration_since(self.last_log) >= self.log_interval {
                    match self.declared {
                        Some(total) if total > 0 => {
                            tracing::debug!(transferred = self.transferred, total, "upload progress")
                        }
                        _ => tracing::debug!(transferred = self.transferred, "upload progress"),
                    }
                    self.last_log = now;
                }
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
