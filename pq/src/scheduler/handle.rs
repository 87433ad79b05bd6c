//! Caller-facing side of a submission

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::queue::RequestId;

/// Why a submission did not produce a value
#[derive(Debug, Error)]
pub enum RequestError<E> {
    /// The operation's own error, unchanged
    #[error("{0}")]
    Failed(E),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request panicked: {0}")]
    Panicked(String),

    /// The scheduler went away before settling (runtime shutdown)
    #[error("Scheduler dropped the request before it settled")]
    Dropped,
}

impl<E> RequestError<E> {
    /// The operation's error, if that is what this is
    pub fn into_inner(self) -> Option<E> {
        match self {
            RequestError::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            RequestError::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }
}

/// Per-submission overrides
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Retry ceiling for this submission; the scheduler default otherwise
    pub max_retries: Option<u32>,

    /// Abandons the submission when fired
    pub cancel: Option<CancellationToken>,
}

impl SubmitOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result token returned by `submit`
///
/// Resolves once the scheduler has finished with the submission, including
/// every retry. Dropping the handle does not cancel the submission; use
/// [`SubmitOptions::cancel`] for that.
#[derive(Debug)]
pub struct RequestHandle<T, E> {
    id: RequestId,
    rx: oneshot::Receiver<Result<T, RequestError<E>>>,
}

impl<T, E> RequestHandle<T, E> {
    pub(crate) fn new(id: RequestId, rx: oneshot::Receiver<Result<T, RequestError<E>>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl<T, E> Future for RequestHandle<T, E> {
    type Output = Result<T, RequestError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RequestError::Dropped)))
    }
}
