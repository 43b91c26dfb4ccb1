use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{Fuse, FusedStream, FuturesUnordered};
use futures::{Future, Stream, StreamExt};
use pin_project_lite::pin_project;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    _refill: Arc<RefillTask>,
}

#[derive(Debug)]
struct RefillTask(JoinHandle<()>);

impl Drop for RefillTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl RateLimiter {
    /// Must be called from within a tokio runtime.
    pub fn new(per_second: usize) -> Self {
        let permits = Arc::new(Semaphore::new(per_second));

        let permits_c = permits.clone();
        let refill = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(Duration::from_secs(1));
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let available = permits_c.available_permits();
                permits_c.add_permits(per_second.saturating_sub(available));
            }
        });

        Self {
            permits,
            _refill: Arc::new(RefillTask(refill)),
        }
    }

    pub fn try_acquire_owned(&self) -> Result<OwnedSemaphorePermit, TryAcquireError> {
        self.permits.clone().try_acquire_owned()
    }

    async fn acquire_owned(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().acquire_owned().await.ok()
    }
}

pin_project! {
    pub struct PermittedFuture<F> {
        #[pin]
        fut: F,
        permit: Option<OwnedSemaphorePermit>,
    }

    impl<F> PinnedDrop for PermittedFuture<F> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(p) = this.permit.take() { p.forget() }
        }
    }
}

impl<F> Future for PermittedFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        this.fut.poll(cx)
    }
}

pin_project! {
    pub struct RateLimited<St>
    where
        St: Stream,
    {
        #[pin]
        stream: Fuse<St>,
        in_progress_queue: FuturesUnordered<PermittedFuture<St::Item>>,
        limiter: RateLimiter,
        pending_permit: Option<Pin<Box<dyn Future<Output = Option<OwnedSemaphorePermit>> + Send>>>,
    }
}

impl<St> fmt::Debug for RateLimited<St>
where
    St: Stream + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimited")
            .field("stream", &self.stream)
            .field("in_progress_queue", &self.in_progress_queue.len())
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl<St> RateLimited<St>
where
    St: Stream,
    St::Item: Future,
{
    pub fn new(stream: St, limiter: RateLimiter) -> Self {
        Self {
            stream: stream.fuse(),
            in_progress_queue: FuturesUnordered::new(),
            limiter,
            pending_permit: None,
        }
    }
}

impl<St> Stream for RateLimited<St>
where
    St: Stream,
    St::Item: Future,
{
    type Item = <St::Item as Future>::Output;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // First up, try to spawn off as many futures as permits allow
        while !this.stream.is_done() {
            let permit = match this.pending_permit.as_mut() {
                Some(waiting) => match waiting.as_mut().poll(cx) {
                    Poll::Ready(permit) => {
                        *this.pending_permit = None;
                        permit
                    }
                    Poll::Pending => break,
                },
                None => match this.limiter.try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        // Register for a wakeup once the limiter refills
                        let limiter = this.limiter.clone();
                        *this.pending_permit =
                            Some(Box::pin(async move { limiter.acquire_owned().await }));
                        continue;
                    }
                },
            };
            let Some(permit) = permit else { break };

            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(fut)) => this.in_progress_queue.push(PermittedFuture {
                    permit: Some(permit),
                    fut,
                }),
                Poll::Ready(None) | Poll::Pending => break,
            }
        }

        // Attempt to pull the next value from the in_progress_queue
        match this.in_progress_queue.poll_next_unpin(cx) {
            x @ Poll::Pending | x @ Poll::Ready(Some(_)) => return x,
            Poll::Ready(None) => {}
        }

        // If more values are still coming from the stream, we're not done yet
        if this.stream.is_done() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let queue_len = self.in_progress_queue.len();
        let (lower, upper) = self.stream.size_hint();
        let lower = lower.saturating_add(queue_len);
        let upper = match upper {
            Some(x) => x.checked_add(queue_len),
            None => None,
        };
        (lower, upper)
    }
}

impl<St> FusedStream for RateLimited<St>
where
    St: Stream,
    St::Item: Future,
{
    fn is_terminated(&self) -> bool {
        self.in_progress_queue.is_terminated() && self.stream.is_terminated()
    }
}

pub trait RateLimitedExt: Stream {
    fn rate_limited(self, limiter: RateLimiter) -> RateLimited<Self>
    where
        Self::Item: Future,
        Self: Sized,
    {
        RateLimited::new(self, limiter)
    }
}

impl<T: ?Sized> RateLimitedExt for T where T: Stream {}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn limits_items_per_second() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        let out = stream::iter(0..4)
            .map(|i| async move { i })
            .rate_limited(limiter)
            .collect::<Vec<_>>()
            .await;

        let mut sorted = out.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn empty_stream_terminates() {
        let out = stream::iter(Vec::<u8>::new())
            .map(|i| async move { i })
            .rate_limited(RateLimiter::new(1))
            .collect::<Vec<_>>()
            .await;
        assert!(out.is_empty());
    }
}
