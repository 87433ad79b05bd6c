//! Scheduler implementation

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Notify, oneshot};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use crate::api::{ApiError, Classify};

use super::backoff::BackoffPolicy;
use super::config::{RetryPlacement, SchedulerConfig};
use super::handle::{RequestError, RequestHandle, SubmitOptions};
use super::queue::{
    QueueEntry, QueueEntryStatus, QueueState, QueuedRequest, SchedulerStats, SchedulerStatus, Thunk, ThunkFuture,
};

/// Internal state protected by mutex
struct SchedulerInner<T, E> {
    /// Requests waiting for dispatch, head first
    queue: VecDeque<QueuedRequest<T, E>>,

    /// True while a worker task is alive
    is_processing: bool,

    /// Backoff timers that will put a request back into the queue
    pending_retries: usize,

    /// Start of the most recent dispatch
    last_dispatch: Option<Instant>,

    /// Request taken off the queue, waiting out pacing or executing
    current: Option<QueueEntry>,

    /// Statistics
    stats: SchedulerStats,
}

struct Shared<T, E> {
    config: SchedulerConfig,
    backoff: Arc<dyn BackoffPolicy>,
    inner: Mutex<SchedulerInner<T, E>>,
    idle: Notify,
}

/// Outcome of a single thunk invocation
enum Attempt<T, E> {
    Succeeded(T),
    Failed(E),
    Cancelled,
    Panicked(String),
}

/// Serializes asynchronous operations through a single paced worker,
/// retrying transient failures with backoff.
///
/// Cloning yields another handle to the same queue. Must be used from within
/// a Tokio runtime: the worker and backoff timers are spawned tasks.
pub struct RequestScheduler<T, E = ApiError> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for RequestScheduler<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> fmt::Debug for RequestScheduler<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<T, E> RequestScheduler<T, E>
where
    T: Send + 'static,
    E: Classify + Send + 'static,
{
    /// Create a new scheduler using the backoff strategy from its configuration
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(?config, "RequestScheduler::new: called");
        let backoff = config
            .backoff
            .build(config.pacing_interval(), config.backoff_multiplier);
        Self::from_parts(config, backoff)
    }

    /// Create a new scheduler with an injected backoff policy
    pub fn with_backoff<P: BackoffPolicy + 'static>(config: SchedulerConfig, policy: P) -> Self {
        debug!(?config, "RequestScheduler::with_backoff: called");
        Self::from_parts(config, Arc::new(policy))
    }

    fn from_parts(config: SchedulerConfig, backoff: Arc<dyn BackoffPolicy>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                backoff,
                inner: Mutex::new(SchedulerInner {
                    queue: VecDeque::new(),
                    is_processing: false,
                    pending_retries: 0,
                    last_dispatch: None,
                    current: None,
                    stats: SchedulerStats::default(),
                }),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Queue an operation with the scheduler's default retry ceiling
    pub fn submit<F, Fut>(&self, thunk: F) -> RequestHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.submit_with(thunk, SubmitOptions::default())
    }

    /// Queue an operation with per-submission overrides
    ///
    /// The thunk is invoked once per attempt, so it must be able to rebuild
    /// its request each time it is called.
    pub fn submit_with<F, Fut>(&self, mut thunk: F, options: SubmitOptions) -> RequestHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let thunk: Thunk<T, E> = Box::new(move || -> ThunkFuture<T, E> { Box::pin(thunk()) });
        let (tx, rx) = oneshot::channel();
        let max_retries = options.max_retries.unwrap_or(self.shared.config.max_retries);
        let request = QueuedRequest::new(thunk, tx, max_retries, options.cancel);
        let id = request.id;
        debug!(%id, max_retries, "RequestScheduler::submit: called");

        let mut inner = self.shared.lock();
        inner.queue.push_back(request);
        inner.stats.total_submitted += 1;
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.queue.len());
        self.shared.ensure_worker(&mut inner);

        RequestHandle::new(id, rx)
    }

    /// Idle once the queue is drained, no request is in flight and no
    /// backoff timer is outstanding
    pub fn status(&self) -> SchedulerStatus {
        self.shared.lock().status()
    }

    /// Resolves the next time the scheduler is idle
    pub async fn wait_idle(&self) {
        debug!("RequestScheduler::wait_idle: called");
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.status() == SchedulerStatus::Idle {
                return;
            }
            notified.await;
        }
    }

    /// Get current queue state
    pub fn queue_state(&self) -> QueueState {
        let inner = self.shared.lock();
        QueueState {
            queued: inner.queue.len(),
            pacing: inner.current.as_ref().is_some_and(|e| e.status == QueueEntryStatus::Pacing),
            in_flight: inner.current.as_ref().is_some_and(|e| e.status == QueueEntryStatus::InFlight),
            pending_retries: inner.pending_retries,
            status: inner.status(),
            stats: inner.stats.clone(),
        }
    }

    /// Current request first (pacing or in flight), then queued requests in
    /// dispatch order
    pub fn queue_details(&self) -> Vec<QueueEntry> {
        let inner = self.shared.lock();
        inner
            .current
            .iter()
            .cloned()
            .chain(inner.queue.iter().map(|r| r.entry(QueueEntryStatus::Queued)))
            .collect()
    }

    /// Get the scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        self.shared.lock().stats.clone()
    }
}

impl<T, E> SchedulerInner<T, E> {
    fn status(&self) -> SchedulerStatus {
        if self.is_processing || self.pending_retries > 0 {
            SchedulerStatus::Processing
        } else {
            SchedulerStatus::Idle
        }
    }
}

impl<T, E> Shared<T, E>
where
    T: Send + 'static,
    E: Classify + Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, SchedulerInner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the worker unless one is already running; caller holds the lock
    fn ensure_worker(self: &Arc<Self>, inner: &mut SchedulerInner<T, E>) {
        if inner.is_processing {
            return;
        }
        debug!(queued = inner.queue.len(), "RequestScheduler::ensure_worker: starting worker");
        inner.is_processing = true;
        tokio::spawn(Arc::clone(self).run_worker());
    }

    /// Pop the head of the queue, or mark the worker finished when empty
    fn next_request(&self) -> Option<QueuedRequest<T, E>> {
        let mut inner = self.lock();
        let next = inner.queue.pop_front();
        inner.current = next.as_ref().map(|r| r.entry(QueueEntryStatus::Pacing));
        if next.is_none() {
            inner.is_processing = false;
            if inner.pending_retries == 0 {
                debug!("RequestScheduler::next_request: queue drained, idle");
                self.idle.notify_waiters();
            } else {
                debug!(pending_retries = inner.pending_retries, "RequestScheduler::next_request: waiting on retries");
            }
        }
        next
    }

    async fn run_worker(self: Arc<Self>) {
        debug!("RequestScheduler::run_worker: started");
        let pacing = self.config.pacing_interval();

        while let Some(mut request) = self.next_request() {
            if request.is_cancelled() {
                self.settle_cancelled(request);
                continue;
            }
            self.wait_for_pacing(pacing).await;
            if request.is_cancelled() {
                self.settle_cancelled(request);
                continue;
            }

            self.begin_dispatch(&request);
            let attempt = Self::attempt(&mut request).await;
            self.lock().current = None;

            match attempt {
                Attempt::Succeeded(value) => {
                    debug!(id = %request.id, retry_count = request.retry_count, "RequestScheduler::run_worker: succeeded");
                    self.lock().stats.total_succeeded += 1;
                    request.settle(Ok(value));
                }
                Attempt::Failed(error) => match self.retry_delay(&error, &request) {
                    Ok(Some(delay)) => {
                        request.retry_count += 1;
                        warn!(
                            id = %request.id,
                            attempt = request.retry_count,
                            max_retries = request.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "RequestScheduler::run_worker: retrying after transient error"
                        );
                        self.schedule_retry(request, delay);
                        continue;
                    }
                    Ok(None) => {
                        debug!(id = %request.id, retry_count = request.retry_count, "RequestScheduler::run_worker: failed");
                        self.lock().stats.total_failed += 1;
                        request.settle(Err(RequestError::Failed(error)));
                    }
                    Err(message) => {
                        warn!(id = %request.id, %message, "RequestScheduler::run_worker: retry policy panicked");
                        self.lock().stats.total_panicked += 1;
                        request.settle(Err(RequestError::Panicked(message)));
                    }
                },
                Attempt::Cancelled => {
                    debug!(id = %request.id, "RequestScheduler::run_worker: cancelled in flight");
                    self.lock().stats.total_cancelled += 1;
                    request.settle(Err(RequestError::Cancelled));
                }
                Attempt::Panicked(message) => {
                    warn!(id = %request.id, %message, "RequestScheduler::run_worker: operation panicked");
                    self.lock().stats.total_panicked += 1;
                    request.settle(Err(RequestError::Panicked(message)));
                }
            }

            sleep(pacing).await;
        }

        debug!("RequestScheduler::run_worker: stopped");
    }

    /// Backoff before the next attempt, or `None` when the failure is final
    ///
    /// Classification and the backoff policy are caller-supplied; a panic in
    /// either comes back as `Err` instead of unwinding through the worker.
    fn retry_delay(&self, error: &E, request: &QueuedRequest<T, E>) -> Result<Option<Duration>, String> {
        std::panic::catch_unwind(AssertUnwindSafe(|| {
            let kind = error.kind();
            debug!(id = %request.id, ?kind, "RequestScheduler::retry_delay: classified");
            if kind.is_retryable() && request.retry_count < request.max_retries {
                Some(self.backoff.delay(request.retry_count + 1))
            } else {
                None
            }
        }))
        .map_err(panic_message)
    }

    /// Hold back until a full pacing interval has passed since the last dispatch
    async fn wait_for_pacing(&self, pacing: Duration) {
        let last_dispatch = self.lock().last_dispatch;
        if let Some(last) = last_dispatch {
            let ready_at = last + pacing;
            if Instant::now() < ready_at {
                sleep_until(ready_at).await;
            }
        }
    }

    fn begin_dispatch(&self, request: &QueuedRequest<T, E>) {
        debug!(id = %request.id, retry_count = request.retry_count, "RequestScheduler::begin_dispatch: called");
        let mut inner = self.lock();
        inner.last_dispatch = Some(Instant::now());
        inner.current = Some(request.entry(QueueEntryStatus::InFlight));
        inner.stats.total_dispatched += 1;
    }

    async fn attempt(request: &mut QueuedRequest<T, E>) -> Attempt<T, E> {
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| (request.thunk)())) {
            Ok(future) => future,
            Err(payload) => return Attempt::Panicked(panic_message(payload)),
        };
        let guarded = AssertUnwindSafe(future).catch_unwind();

        let outcome = match request.cancel.clone() {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = guarded => Some(outcome),
            },
            None => Some(guarded.await),
        };

        match outcome {
            None => Attempt::Cancelled,
            Some(Ok(Ok(value))) => Attempt::Succeeded(value),
            Some(Ok(Err(error))) => Attempt::Failed(error),
            Some(Err(payload)) => Attempt::Panicked(panic_message(payload)),
        }
    }

    fn settle_cancelled(&self, request: QueuedRequest<T, E>) {
        debug!(id = %request.id, "RequestScheduler::settle_cancelled: cancelled before dispatch");
        {
            let mut inner = self.lock();
            inner.current = None;
            inner.stats.total_cancelled += 1;
        }
        request.settle(Err(RequestError::Cancelled));
    }

    /// Park the request on a timer; the worker keeps draining meanwhile
    fn schedule_retry(self: &Arc<Self>, request: QueuedRequest<T, E>, delay: Duration) {
        {
            let mut inner = self.lock();
            inner.pending_retries += 1;
            inner.stats.total_retries += 1;
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let cancelled = match request.cancel.clone() {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => true,
                    _ = sleep(delay) => false,
                },
                None => {
                    sleep(delay).await;
                    false
                }
            };
            shared.requeue(request, cancelled);
        });
    }

    fn requeue(self: &Arc<Self>, request: QueuedRequest<T, E>, cancelled: bool) {
        let mut inner = self.lock();
        inner.pending_retries -= 1;

        if cancelled {
            debug!(id = %request.id, "RequestScheduler::requeue: cancelled during backoff");
            inner.stats.total_cancelled += 1;
            if inner.status() == SchedulerStatus::Idle {
                self.idle.notify_waiters();
            }
            drop(inner);
            request.settle(Err(RequestError::Cancelled));
            return;
        }

        debug!(
            id = %request.id,
            retry_count = request.retry_count,
            placement = ?self.config.retry_placement,
            "RequestScheduler::requeue: backoff elapsed"
        );
        match self.config.retry_placement {
            RetryPlacement::Tail => inner.queue.push_back(request),
            RetryPlacement::Head => inner.queue.push_front(request),
        }
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.queue.len());
        self.ensure_worker(&mut inner);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
