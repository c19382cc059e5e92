//! Upstream body relay.
//!
//! Wraps the upstream body stream so that the request's connection slot is
//! released when the body ends, when it fails, or when the caller goes away
//! and the response body is dropped, whichever happens first.

use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::load_balancer::{Completion, ConnectionGuard};

/// Body stream that owns its request's [`ConnectionGuard`].
pub struct GuardedStream<S> {
    inner: S,
    guard: ConnectionGuard,
    chunks: usize,
    bytes: usize,
}

impl<S> GuardedStream<S> {
    pub fn new(inner: S, guard: ConnectionGuard) -> Self {
        Self {
            inner,
            guard,
            chunks: 0,
            bytes: 0,
        }
    }
}

impl<S, B, E> Stream for GuardedStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    type Item = Result<B, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.chunks += 1;
                this.bytes += chunk.as_ref().len();
                if this.chunks == 1 {
                    tracing::debug!(
                        backend = %this.guard.backend().name,
                        size = chunk.as_ref().len(),
                        "First chunk received from upstream"
                    );
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(
                    backend = %this.guard.backend().name,
                    error = %e,
                    chunks = this.chunks,
                    "Upstream response error"
                );
                this.guard.complete(Completion::UpstreamError);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if this.guard.complete(Completion::UpstreamEnd) {
                    tracing::info!(
                        backend = %this.guard.backend().name,
                        chunks = this.chunks,
                        bytes = this.bytes,
                        "Upstream response ended"
                    );
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Drop for GuardedStream<S> {
    fn drop(&mut self) {
        if !self.guard.is_complete() {
            tracing::info!(
                backend = %self.guard.backend().name,
                chunks = self.chunks,
                "Client connection closed before upstream finished"
            );
        }
        // The guard's own drop releases the slot if nothing else did.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::{Backend, ConnectionTracker};
    use futures_util::{stream, StreamExt};
    use std::sync::Arc;

    fn setup() -> (Arc<ConnectionTracker>, ConnectionGuard) {
        let tracker = Arc::new(ConnectionTracker::new());
        let backend = Arc::new(Backend::new("b", "127.0.0.1", 8000, None).unwrap());
        let guard = tracker.acquire(backend);
        (tracker, guard)
    }

    #[tokio::test]
    async fn test_release_on_end() {
        let (tracker, guard) = setup();
        let chunks = stream::iter(vec![Ok::<_, String>(b"data: 1\n\n".to_vec()), Ok(b"data: [DONE]\n\n".to_vec())]);
        let mut relay = GuardedStream::new(chunks, guard);

        assert!(relay.next().await.is_some());
        assert_eq!(tracker.count("b"), 1);
        assert!(relay.next().await.is_some());
        assert!(relay.next().await.is_none());
        assert_eq!(tracker.count("b"), 0);

        drop(relay);
        assert_eq!(tracker.count("b"), 0);
    }

    #[tokio::test]
    async fn test_release_on_error() {
        let (tracker, guard) = setup();
        let chunks = stream::iter(vec![Ok(b"partial".to_vec()), Err("reset".to_string())]);
        let mut relay = GuardedStream::new(chunks, guard);

        relay.next().await;
        assert!(matches!(relay.next().await, Some(Err(_))));
        assert_eq!(tracker.count("b"), 0);
        drop(relay);
        assert_eq!(tracker.count("b"), 0);
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let (tracker, guard) = setup();
        let mut relay = GuardedStream::new(stream::pending::<Result<Vec<u8>, String>>().boxed(), guard);

        let next = tokio::time::timeout(std::time::Duration::from_millis(10), relay.next()).await;
        assert!(next.is_err());
        assert_eq!(tracker.count("b"), 1);

        drop(relay);
        assert_eq!(tracker.count("b"), 0);
    }
}
