//! The serialized request queue (C5): a single-producer-multi-caller FIFO
//! with at-most-one in-flight request per database.
//!
//! Submissions are type-erased as a boxed future that, once polled to
//! completion by the worker task, delivers its (typed) result over its own
//! `oneshot` channel. The queue itself only ever stores
//! `Pin<Box<dyn Future<Output = ()> + Send>>`, so callers of differing
//! return types share one FIFO without any `dyn Any` downcasting.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Error, RateLimiter, Result};
use crate::logging;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Inner {
    queue: Mutex<VecDeque<Job>>,
    /// 1 while the worker is between popping a job and delivering its
    /// result; 0 otherwise. Counted against `max_pending` alongside the
    /// waiting queue, so a single long-running request still occupies a
    /// capacity slot for as long as it executes.
    in_flight: AtomicUsize,
    running: AtomicBool,
    overflow_signaled: AtomicBool,
    max_pending: usize,
    time_between_requests: Duration,
    rate_limiter: Arc<RateLimiter>,
}

/// Configuration for a [`RequestQueue`], sourced from the builder
/// configuration keys `time_between_requests_millis` / `max_requests_pending`.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub time_between_requests: Duration,
    pub max_pending: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            time_between_requests: Duration::from_millis(500),
            max_pending: 500,
        }
    }
}

/// The FIFO described by C5. Cheap to clone (an `Arc` handle).
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<Inner>,
}

impl RequestQueue {
    pub fn new(config: QueueConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                in_flight: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                overflow_signaled: AtomicBool::new(false),
                max_pending: config.max_pending.max(1),
                time_between_requests: config.time_between_requests,
                rate_limiter,
            }),
        }
    }

    /// Requests currently waiting or executing.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().unwrap().len() + self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Submits a request. Returns:
    /// - `Ok(Some(value))` once the worker has executed it,
    /// - `Err(e)` if the request's executor failed, or if this is the
    ///   first submission to observe the queue at capacity (`Overflow`,
    ///   surfaced once per overflow episode, per §4.4),
    /// - `Ok(None)` if the queue was still full when this call arrived but
    ///   `Overflow` had already been raised for the current episode (the
    ///   cancelled/null marker).
    pub async fn submit<F, T>(&self, operation: &str, executor: F) -> Result<Option<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T>>();

        {
            let mut queue = self.inner.queue.lock().unwrap();
            let pending = queue.len() + self.inner.in_flight.load(Ordering::SeqCst);
            if pending >= self.inner.max_pending {
                logging::warn_ratelimited(
                    &self.inner.rate_limiter,
                    &format!("queue overflow on '{operation}'; at capacity ({} pending)", self.inner.max_pending),
                );
                return if !self.inner.overflow_signaled.swap(true, Ordering::SeqCst) {
                    Err(Error::Overflow {
                        operation: operation.to_string(),
                        max_pending: self.inner.max_pending,
                    })
                } else {
                    Ok(None)
                };
            }

            self.inner.overflow_signaled.store(false, Ordering::SeqCst);

            let job: Job = Box::pin(async move {
                let result = executor.await;
                let _ = tx.send(result);
            });
            queue.push_back(job);
        }

        self.spawn_worker_if_idle();

        match rx.await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    fn spawn_worker_if_idle(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut queue = inner.queue.lock().unwrap();
                    let job = queue.pop_front();
                    if job.is_some() {
                        inner.in_flight.store(1, Ordering::SeqCst);
                    }
                    job
                };
                let Some(job) = job else {
                    inner.running.store(false, Ordering::SeqCst);
                    return;
                };
                job.await;
                inner.in_flight.store(0, Ordering::SeqCst);
                tokio::time::sleep(inner.time_between_requests).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_queue(max_pending: usize) -> RequestQueue {
        RequestQueue::new(
            QueueConfig {
                time_between_requests: Duration::from_millis(1),
                max_pending,
            },
            Arc::new(RateLimiter::default()),
        )
    }

    #[tokio::test]
    async fn submissions_complete_in_submission_order() {
        let queue = fast_queue(10);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .submit("test", async move {
                        order.lock().unwrap().push(i);
                        Ok::<_, Error>(i)
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn overflow_raises_once_then_cancels_while_full() {
        let queue = fast_queue(3);
        let gate = Arc::new(tokio::sync::Notify::new());

        // Request 1 occupies the sole in-flight slot by blocking on `gate`.
        let blocking = {
            let queue = queue.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                queue
                    .submit("test", async move {
                        gate.notified().await;
                        Ok::<_, Error>(())
                    })
                    .await
            })
        };
        // Let the worker pick request 1 up so `in_flight` is set.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.pending(), 1);

        // Requests 2 and 3 fill the remaining capacity without executing
        // (the worker is blocked on request 1).
        let second = tokio::spawn({
            let queue = queue.clone();
            async move { queue.submit("test", async { Ok::<_, Error>(()) }).await }
        });
        let third = tokio::spawn({
            let queue = queue.clone();
            async move { queue.submit("test", async { Ok::<_, Error>(()) }).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.pending(), 3);

        // Request 4 observes the queue at capacity: first overflow.
        let overflow = queue.submit("test", async { Ok::<_, Error>(()) }).await;
        assert!(matches!(overflow, Err(Error::Overflow { .. })));

        // Request 5, while still full, is cancelled rather than re-raising.
        let cancelled = queue.submit("test", async { Ok::<_, Error>(()) }).await;
        assert!(matches!(cancelled, Ok(None)));

        gate.notify_one();
        blocking.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        third.await.unwrap().unwrap();

        // Once drained, submissions proceed normally again.
        let recovered = queue.submit("test", async { Ok::<_, Error>(()) }).await;
        assert!(matches!(recovered, Ok(Some(()))));
    }

    #[tokio::test]
    async fn worker_restarts_after_draining() {
        let queue = fast_queue(10);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            queue
                .submit("test", async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(())
                })
                .await
                .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(queue.pending(), 0);

        queue.submit("test", async { Ok::<_, Error>(()) }).await.unwrap();
    }
}
