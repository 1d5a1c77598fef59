//! Scripted portal double for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{ApiError, PendingCountSource, PendingLogSource, StatusSource};
use crate::model::{EmergencyStatus, LogPage, LogRecord, PageQuery, PendingCount, SessionId, VerificationMethod};

/// Replies are consumed in order; once a script runs dry the last reply
/// keeps being returned.
#[derive(Default)]
pub struct ScriptedPortal {
    status: Script<EmergencyStatus>,
    count: Script<PendingCount>,
    pages: Script<LogPage>,
    requested_pages: Mutex<Vec<PageQuery>>,
    latency: Mutex<Duration>,
}

struct Script<T> {
    replies: Mutex<VecDeque<Result<T, ApiError>>>,
    last: Mutex<Option<Result<T, ApiError>>>,
    calls: AtomicUsize,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<T: Clone> Script<T> {
    fn push(&self, reply: Result<T, ApiError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next(&self) -> Result<T, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            *last = Some(reply);
        }
        last.clone()
            .unwrap_or_else(|| Err(ApiError::Transport("no scripted reply".into())))
    }
}

pub fn transport_error() -> ApiError {
    ApiError::Transport("connection refused".into())
}

pub fn record(id: usize) -> LogRecord {
    LogRecord {
        log_id: format!("log-{id}"),
        session_id: SessionId::new(format!("session-{id}")),
        timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + id as i64 * 60, 0).unwrap(),
        verification_method: VerificationMethod::RfidOnlyPendingReview,
        employee_name: (id % 2 == 0).then(|| format!("Employee {id}")),
    }
}

/// A page holding records `first..first + len`.
pub fn page(first: usize, len: usize, has_more: bool) -> LogPage {
    LogPage {
        logs: (first..first + len).map(record).collect(),
        has_more,
    }
}

impl ScriptedPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, reply: Result<bool, ApiError>) -> &Self {
        self.status.push(reply.map(|active| EmergencyStatus { active }));
        self
    }

    pub fn push_count(&self, reply: Result<PendingCount, ApiError>) -> &Self {
        self.count.push(reply);
        self
    }

    pub fn push_page(&self, reply: Result<LogPage, ApiError>) -> &Self {
        self.pages.push(reply);
        self
    }

    /// Every reply is picked when the call starts but only returned after
    /// `latency`.
    pub fn with_latency(&self, latency: Duration) -> &Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    async fn respond<T>(&self, reply: Result<T, ApiError>) -> Result<T, ApiError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        reply
    }

    pub fn status_calls(&self) -> usize {
        self.status.calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count.calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.pages.calls.load(Ordering::SeqCst)
    }

    pub fn requested_pages(&self) -> Vec<PageQuery> {
        self.requested_pages.lock().unwrap().clone()
    }
}

impl StatusSource for ScriptedPortal {
    async fn emergency_status(&self) -> Result<EmergencyStatus, ApiError> {
        self.respond(self.status.next()).await
    }
}

impl PendingCountSource for ScriptedPortal {
    async fn pending_count(&self) -> Result<PendingCount, ApiError> {
        self.respond(self.count.next()).await
    }
}

impl PendingLogSource for ScriptedPortal {
    async fn pending_logs(&self, query: PageQuery) -> Result<LogPage, ApiError> {
        self.requested_pages.lock().unwrap().push(query);
        self.respond(self.pages.next()).await
    }
}
