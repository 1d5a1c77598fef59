//! Boundary with the review portal.
//!
//! Each poller depends on exactly one source trait so that it can be driven
//! by anything that yields the same data. [`HttpPortalApi`] implements all of
//! them against the real portal.

use std::future::Future;

use thiserror::Error;

use crate::model::{EmergencyStatus, LogPage, PageQuery, PendingCount};

mod endpoints;
mod http;

pub use endpoints::{Endpoints, ImageSource, PLACEHOLDER_ALT, PLACEHOLDER_IMAGE};
pub use http::HttpPortalApi;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The portal answered with a non-2xx status.
    #[error("portal returned HTTP {code}{}", message_suffix(.message))]
    Status { code: u16, message: Option<String> },

    /// The body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Parse(String),

    #[error("session id {0:?} is not usable in a URL")]
    InvalidSessionId(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ApiError {
    /// Whether this is a transport-level failure (unreachable or non-2xx)
    /// rather than a malformed body.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Status { .. })
    }
}

pub trait StatusSource: Send + Sync + 'static {
    fn emergency_status(&self) -> impl Future<Output = Result<EmergencyStatus, ApiError>> + Send;
}

pub trait PendingCountSource: Send + Sync + 'static {
    fn pending_count(&self) -> impl Future<Output = Result<PendingCount, ApiError>> + Send;
}

pub trait PendingLogSource: Send + Sync + 'static {
    fn pending_logs(&self, query: PageQuery) -> impl Future<Output = Result<LogPage, ApiError>> + Send;
}
