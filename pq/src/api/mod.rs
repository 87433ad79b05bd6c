//! API client layer
//!
//! The remote API is an external collaborator. This module defines the
//! contract the scheduler consumes ([`ApiClient`], [`ApiError`] and its
//! [`ErrorKind`] classification), an HTTP implementation, and
//! [`ScheduledApi`], which routes every call through a [`RequestScheduler`].
//!
//! [`RequestScheduler`]: crate::scheduler::RequestScheduler

pub mod client;
mod error;
mod http;
mod scheduled;

pub use client::ApiClient;
pub use error::{ApiError, Classify, ErrorKind};
pub use http::HttpApiClient;
pub use scheduled::ScheduledApi;
