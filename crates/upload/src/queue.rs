//! Throttled retry queue.
//!
//! Bounds how many tasks run at once and how fast new ones start, and
//! retries failed tasks in place with exponential backoff plus jitter.
//! Pending entries are admitted in FIFO order.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Queue configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Ceiling on simultaneously running tasks.
    pub max_concurrent: usize,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Wait after the first failure.
    pub retry_delay: Duration,
    /// Growth factor of the wait for each further failure.
    pub backoff_multiplier: f64,
    /// Upper bound of the random extra wait, as a fraction of the base
    /// delay. Clamped so jittered delays still strictly increase.
    pub jitter_ratio: f64,
    /// Pause after a task settles before the next pending entry is admitted.
    pub delay_between_requests: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.1,
            delay_between_requests: Duration::from_millis(100),
        }
    }
}

impl ThrottleConfig {
    /// One task at a time.
    pub fn sequential() -> Self {
        Self {
            max_concurrent: 1,
            ..Self::default()
        }
    }

    /// Un-jittered wait after `failed_attempts` failures (1-based):
    /// `retry_delay * backoff_multiplier^(failed_attempts - 1)`.
    pub fn base_delay(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(63) as i32;
        let secs = self.retry_delay.as_secs_f64() * self.backoff_multiplier.powi(exp);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Jitter fraction actually applied.
    ///
    /// For a multiplier above 1 it stays below `(multiplier - 1) / 2`, so
    /// the longest wait for attempt k is shorter than the shortest for k+1.
    pub fn effective_jitter(&self) -> f64 {
        let ratio = self.jitter_ratio.max(0.0);
        if self.backoff_multiplier > 1.0 {
            ratio.min((self.backoff_multiplier - 1.0) / 2.0)
        } else {
            ratio
        }
    }

    /// Wait after `failed_attempts` failures, with jitter in
    /// `[base, base * (1 + effective_jitter))`.
    pub fn delay_for_attempt(&self, failed_attempts: u32) -> Duration {
        let base = self.base_delay(failed_attempts);
        let jitter = self.effective_jitter();
        if jitter == 0.0 {
            return base;
        }
        let unit = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / 1_000_000_000.0; // [0.0, 1.0)
        Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + jitter * unit)).unwrap_or(base)
    }
}

/// Why a queued task did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError<E> {
    /// The last attempt failed.
    #[error("task failed: {0}")]
    Task(E),

    /// The entry's cancellation token fired before it finished.
    #[error("task canceled")]
    Canceled,

    /// Dropped from the pending list by [`ThrottledQueue::clear_queue`].
    #[error("task removed from queue")]
    Cleared,
}

/// Attempt bookkeeping passed to [`RetryHooks::on_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptInfo {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
}

pub type AttemptCallback = Box<dyn Fn(AttemptInfo) + Send + Sync>;
pub type RetryCallback<E> = Box<dyn Fn(u32, &E) + Send + Sync>;

/// Per-entry notifications.
pub struct RetryHooks<E> {
    /// Before each attempt starts.
    pub on_progress: Option<AttemptCallback>,
    /// After a failed attempt, before the backoff wait, with the number of
    /// failures so far.
    pub on_retry: Option<RetryCallback<E>>,
}

impl<E> Default for RetryHooks<E> {
    fn default() -> Self {
        Self {
            on_progress: None,
            on_retry: None,
        }
    }
}

impl<E> RetryHooks<E> {
    pub fn on_progress(mut self, f: impl Fn(AttemptInfo) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_retry(mut self, f: impl Fn(u32, &E) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Box::new(f));
        self
    }
}

/// Queue occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub active_uploads: usize,
    pub queue_length: usize,
    pub max_concurrent: usize,
}

type BoxFuture = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

/// A type-erased pending entry.
trait QueuedJob: Send {
    fn is_canceled(&self) -> bool;
    /// Runs every attempt and delivers the outcome.
    fn run(self: Box<Self>) -> BoxFuture;
    /// Settles without running.
    fn abandon(self: Box<Self>, reason: Abandon);
}

#[derive(Debug, Clone, Copy)]
enum Abandon {
    Canceled,
    Cleared,
}

struct Job<T, E, F> {
    task: F,
    hooks: RetryHooks<E>,
    cancel: CancellationToken,
    config: ThrottleConfig,
    tx: oneshot::Sender<Result<T, QueueError<E>>>,
}

impl<T, E, F, Fut> QueuedJob for Job<T, E, F>
where
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn run(self: Box<Self>) -> BoxFuture {
        let Job {
            mut task,
            hooks,
            cancel,
            config,
            tx,
        } = *self;

        Box::pin(async move {
            let max_attempts = config.max_retries.saturating_add(1);
            let mut attempt = 0;

            let outcome = loop {
                if cancel.is_cancelled() {
                    break Err(QueueError::Canceled);
                }
                attempt += 1;
                if let Some(cb) = &hooks.on_progress {
                    cb(AttemptInfo {
                        attempt,
                        max_attempts,
                    });
                }

                match task().await {
                    Ok(value) => break Ok(value),
                    Err(e) if attempt >= max_attempts => {
                        warn!(attempt, error = %e, "task failed, no retries left");
                        break Err(QueueError::Task(e));
                    }
                    Err(e) => {
                        let delay = config.delay_for_attempt(attempt);
                        if let Some(cb) = &hooks.on_retry {
                            cb(attempt, &e);
                        }
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "task failed, retrying"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!(attempt, "retry canceled during backoff");
                                break Err(QueueError::Canceled);
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            };

            let _ = tx.send(outcome);
        })
    }

    fn abandon(self: Box<Self>, reason: Abandon) {
        let err = match reason {
            Abandon::Canceled => QueueError::Canceled,
            Abandon::Cleared => QueueError::Cleared,
        };
        let _ = self.tx.send(Err(err));
    }
}

#[derive(Default)]
struct QueueState {
    active: usize,
    pending: VecDeque<(u64, Box<dyn QueuedJob>)>,
}

struct Shared {
    config: ThrottleConfig,
    state: Mutex<QueueState>,
    next_id: AtomicU64,
}

/// Bounded-concurrency task queue with retries.
///
/// Cloning yields another handle to the same queue. Must be used inside a
/// tokio runtime.
#[derive(Clone)]
pub struct ThrottledQueue {
    shared: Arc<Shared>,
}

impl ThrottledQueue {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(QueueState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.shared.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues `task` and waits for its final outcome.
    ///
    /// `task` is called once per attempt, at most `max_retries + 1` times.
    /// Cancelling `cancel` removes a pending entry at once, and stops a
    /// running entry before its next attempt. An attempt already running
    /// is not interrupted.
    pub async fn add_to_queue<T, E, F, Fut>(
        &self,
        task: F,
        hooks: RetryHooks<E>,
        cancel: Option<CancellationToken>,
    ) -> Result<T, QueueError<E>>
    where
        T: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cancel = cancel.unwrap_or_default();
        let (tx, mut rx) = oneshot::channel();
        let job = Job {
            task,
            hooks,
            cancel: cancel.clone(),
            config: self.shared.config.clone(),
            tx,
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.lock();
            state.pending.push_back((id, Box::new(job)));
            debug!(id, queue_length = state.pending.len(), "task queued");
        }
        let _waiter = Waiter {
            queue: self.clone(),
            id,
        };
        self.process();

        tokio::select! {
            outcome = &mut rx => outcome.unwrap_or(Err(QueueError::Canceled)),
            _ = cancel.cancelled() => {
                if self.remove_pending(id) {
                    debug!(id, "pending task canceled");
                    Err(QueueError::Canceled)
                } else {
                    // Already admitted; the runner settles it.
                    rx.await.unwrap_or(Err(QueueError::Canceled))
                }
            }
        }
    }

    /// Current occupancy.
    pub fn get_status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            active_uploads: state.active,
            queue_length: state.pending.len(),
            max_concurrent: self.shared.config.max_concurrent,
        }
    }

    /// Drops every pending entry, settling each with
    /// [`QueueError::Cleared`]. Running tasks are unaffected. Returns the
    /// number of entries dropped.
    pub fn clear_queue(&self) -> usize {
        let drained: Vec<_> = self.lock().pending.drain(..).collect();
        let count = drained.len();
        for (_, job) in drained {
            job.abandon(Abandon::Cleared);
        }
        if count > 0 {
            debug!(count, "queue cleared");
        }
        count
    }

    fn remove_pending(&self, id: u64) -> bool {
        let mut state = self.lock();
        match state.pending.iter().position(|(pid, _)| *pid == id) {
            Some(pos) => {
                state.pending.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Admits pending entries while a slot is free.
    fn process(&self) {
        let max = self.shared.config.max_concurrent.max(1);
        loop {
            let (id, job) = {
                let mut state = self.lock();
                if state.active >= max {
                    return;
                }
                let Some((id, job)) = state.pending.pop_front() else {
                    return;
                };
                if job.is_canceled() {
                    drop(state);
                    job.abandon(Abandon::Canceled);
                    continue;
                }
                state.active += 1;
                debug!(id, active = state.active, "task admitted");
                (id, job)
            };

            let slot = ActiveSlot {
                queue: self.clone(),
                id,
            };
            tokio::spawn(async move {
                job.run().await;
                drop(slot);
            });
        }
    }

    /// Frees a slot, then admits the next entry after the inter-request
    /// delay.
    fn release(&self, id: u64) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            debug!(id, active = state.active, "task settled");
        }
        let queue = self.clone();
        let delay = self.shared.config.delay_between_requests;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.process();
        });
    }
}

/// Removes a still-pending entry when its `add_to_queue` future is dropped.
struct Waiter {
    queue: ThrottledQueue,
    id: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.queue.remove_pending(self.id) {
            debug!(id = self.id, "waiter dropped, pending task removed");
        }
    }
}

/// Holds a concurrency slot; released on drop, including when the task
/// panics.
struct ActiveSlot {
    queue: ThrottledQueue,
    id: u64,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.queue.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    fn config(max_concurrent: usize) -> ThrottleConfig {
        ThrottleConfig {
            max_concurrent,
            max_retries: 3,
            retry_delay: Duration::from_millis(2000),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.0,
            delay_between_requests: Duration::from_millis(100),
        }
    }

    #[test]
    fn base_delays_grow_geometrically() {
        let cfg = config(1);
        assert_eq!(cfg.base_delay(1), Duration::from_millis(2000));
        assert_eq!(cfg.base_delay(2), Duration::from_millis(4000));
        assert_eq!(cfg.base_delay(3), Duration::from_millis(8000));
    }

    #[test]
    fn jittered_delays_stay_monotonic() {
        let cfg = ThrottleConfig {
            jitter_ratio: 5.0,
            ..ThrottleConfig::default()
        };
        assert_eq!(cfg.effective_jitter(), 0.5);
        for attempt in 1..8 {
            let delay = cfg.delay_for_attempt(attempt);
            assert!(delay >= cfg.base_delay(attempt));
            assert!(delay < cfg.base_delay(attempt + 1), "attempt {attempt}");
        }
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let cfg = ThrottleConfig::default();
        assert_eq!(cfg.base_delay(u32::MAX), cfg.base_delay(64));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrent() {
        let queue = ThrottledQueue::new(config(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..7u64 {
            let queue = queue.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .add_to_queue(
                        move || {
                            let running = running.clone();
                            let peak = peak.clone();
                            async move {
                                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(300 + i * 50)).await;
                                running.fetch_sub(1, Ordering::SeqCst);
                                Ok::<_, String>(i)
                            }
                        },
                        RetryHooks::default(),
                        None,
                    )
                    .await
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Ok(i as u64));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn third_task_waits_for_slot_and_delay() {
        let queue = ThrottledQueue::new(config(2));
        let origin = Instant::now();
        let starts = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let queue = queue.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .add_to_queue(
                        move || {
                            let starts = starts.clone();
                            async move {
                                starts.lock().unwrap().push((i, origin.elapsed()));
                                tokio::time::sleep(Duration::from_millis(1000)).await;
                                Ok::<_, String>(())
                            }
                        },
                        RetryHooks::default(),
                        None,
                    )
                    .await
            }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.get_status().active_uploads, 2);
        assert_eq!(queue.get_status().queue_length, 1);

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[0].1, Duration::ZERO);
        assert_eq!(starts[1].1, Duration::ZERO);
        assert_eq!(starts[2].0, 2);
        assert_eq!(starts[2].1, Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_task_runs_max_retries_plus_one() {
        let queue = ThrottledQueue::new(config(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result = queue
            .add_to_queue(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Err::<(), _>(format!("failure {n}")) }
                },
                RetryHooks::default(),
                None,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result, Err(QueueError::Task("failure 4".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_backoff() {
        let queue = ThrottledQueue::new(config(1));
        let origin = Instant::now();
        let calls = Arc::new(AtomicUsize::new(0));
        let retries = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(Mutex::new(Vec::new()));

        let counter = calls.clone();
        let seen_retries = retries.clone();
        let seen_attempts = attempts.clone();
        let result = queue
            .add_to_queue(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(format!("boom {n}"))
                        } else {
                            Ok("uploaded")
                        }
                    }
                },
                RetryHooks::default()
                    .on_retry(move |attempt, err: &String| {
                        seen_retries
                            .lock()
                            .unwrap()
                            .push((attempt, err.clone(), origin.elapsed()));
                    })
                    .on_progress(move |info| {
                        seen_attempts.lock().unwrap().push((info, origin.elapsed()));
                    }),
                None,
            )
            .await;

        assert_eq!(result, Ok("uploaded"));
        let retries = retries.lock().unwrap();
        assert_eq!(
            *retries,
            vec![
                (1, "boom 1".to_string(), Duration::ZERO),
                (2, "boom 2".to_string(), Duration::from_millis(2000)),
            ]
        );
        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[2].0.attempt, 3);
        assert_eq!(attempts[2].0.max_attempts, 4);
        assert_eq!(attempts[2].1, Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_prevents_next_attempt() {
        let queue = ThrottledQueue::new(config(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let counter = calls.clone();
        let canceler = token.clone();
        let result = queue
            .add_to_queue(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>("offline".to_string()) }
                },
                RetryHooks::default().on_retry(move |_, _| canceler.cancel()),
                Some(token),
            )
            .await;

        assert_eq!(result, Err(QueueError::Canceled));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_pending_entry_settles_without_running() {
        let queue = ThrottledQueue::new(config(1));
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .add_to_queue(
                        || async {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            Ok::<_, String>(())
                        },
                        RetryHooks::default(),
                        None,
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let token = CancellationToken::new();
        let waiting = {
            let queue = queue.clone();
            let token = token.clone();
            let ran = ran.clone();
            tokio::spawn(async move {
                queue
                    .add_to_queue(
                        move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                            async { Ok::<_, String>(()) }
                        },
                        RetryHooks::default(),
                        Some(token),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(queue.get_status().queue_length, 1);

        token.cancel();
        assert_eq!(waiting.await.unwrap(), Err(QueueError::Canceled));
        assert_eq!(queue.get_status().queue_length, 0);

        blocker.await.unwrap().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_waiter_removes_pending_entry() {
        let queue = ThrottledQueue::new(config(1));
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .add_to_queue(
                        || async {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            Ok::<_, String>(())
                        },
                        RetryHooks::default(),
                        None,
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let abandoned = {
            let queue = queue.clone();
            let ran = ran.clone();
            tokio::spawn(async move {
                queue
                    .add_to_queue(
                        move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                            async { Ok::<_, String>(()) }
                        },
                        RetryHooks::default(),
                        None,
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(queue.get_status().queue_length, 1);

        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());
        assert_eq!(queue.get_status().queue_length, 0);

        blocker.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.get_status().active_uploads, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_queue_drops_only_pending() {
        let queue = ThrottledQueue::new(config(1));

        let mut handles = Vec::new();
        for i in 0..3 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .add_to_queue(
                        move || async move {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            Ok::<_, String>(i)
                        },
                        RetryHooks::default(),
                        None,
                    )
                    .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            queue.get_status(),
            QueueStatus {
                active_uploads: 1,
                queue_length: 2,
                max_concurrent: 1,
            }
        );

        assert_eq!(queue.clear_queue(), 2);

        let results: Vec<_> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            results,
            vec![Ok(0), Err(QueueError::Cleared), Err(QueueError::Cleared)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_config_runs_one_at_a_time() {
        let queue = ThrottledQueue::new(ThrottleConfig {
            jitter_ratio: 0.0,
            ..ThrottleConfig::sequential()
        });
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut futures = Vec::new();
        for _ in 0..4 {
            let running = running.clone();
            let peak = peak.clone();
            futures.push(queue.add_to_queue(
                move || {
                    let running = running.clone();
                    let peak = peak.clone();
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    }
                },
                RetryHooks::default(),
                None,
            ));
        }
        for r in futures_util::future::join_all(futures).await {
            r.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(queue.get_status().active_uploads, 0);
    }
}
