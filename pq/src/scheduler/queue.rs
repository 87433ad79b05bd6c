//! Queue types for the scheduler

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::handle::RequestError;

/// Opaque identifier of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Boxed future returned by one thunk invocation
pub type ThunkFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Zero-argument operation invoked once per attempt
pub type Thunk<T, E> = Box<dyn FnMut() -> ThunkFuture<T, E> + Send>;

pub(crate) type Responder<T, E> = oneshot::Sender<Result<T, RequestError<E>>>;

/// One submission, alive until its handle settles
pub struct QueuedRequest<T, E> {
    pub id: RequestId,
    pub(crate) thunk: Thunk<T, E>,
    pub(crate) responder: Responder<T, E>,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub(crate) cancel: Option<CancellationToken>,
}

impl<T, E> QueuedRequest<T, E> {
    pub(crate) fn new(
        thunk: Thunk<T, E>,
        responder: Responder<T, E>,
        max_retries: u32,
        cancel: Option<CancellationToken>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            thunk,
            responder,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|token| token.is_cancelled())
    }

    /// Deliver the final outcome; consumes the request
    pub(crate) fn settle(self, outcome: Result<T, RequestError<E>>) {
        // Receiver gone means the caller dropped its handle; nothing to deliver
        let _ = self.responder.send(outcome);
    }

    pub(crate) fn entry(&self, status: QueueEntryStatus) -> QueueEntry {
        QueueEntry {
            id: self.id,
            status,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            enqueued_at: self.enqueued_at,
        }
    }
}

impl<T, E> fmt::Debug for QueuedRequest<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("enqueued_at", &self.enqueued_at)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Idle or Processing, as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerStatus {
    Idle,
    Processing,
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_retries: u64,
    pub total_cancelled: u64,
    pub total_panicked: u64,
    pub peak_queue_depth: usize,
}

impl SchedulerStats {
    /// Requests whose handle has been settled
    pub fn total_settled(&self) -> u64 {
        self.total_succeeded + self.total_failed + self.total_cancelled + self.total_panicked
    }
}

/// Snapshot of the scheduler for display
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub queued: usize,
    /// Taken off the queue, waiting out the pacing interval
    pub pacing: bool,
    pub in_flight: bool,
    pub pending_retries: usize,
    pub status: SchedulerStatus,
    pub stats: SchedulerStats,
}

/// Queue entry for display
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: RequestId,
    pub status: QueueEntryStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueEntryStatus {
    InFlight,
    Pacing,
    Queued,
}
