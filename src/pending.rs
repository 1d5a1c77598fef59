//! Pending-review badge poller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiError, PendingCountSource};
use crate::model::PendingCount;

pub const DEFAULT_COUNT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Polls the pending-review count and publishes it to every subscriber.
///
/// Failures keep the last known value and never stop the schedule; the
/// count only drives a badge.
pub struct PendingCountPoller<S> {
    source: Arc<S>,
    value: Arc<watch::Sender<PendingCount>>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: PendingCountSource> PendingCountPoller<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_interval(source, DEFAULT_COUNT_INTERVAL)
    }

    pub fn with_interval(source: Arc<S>, interval: Duration) -> Self {
        let (value, _) = watch::channel(0);
        Self {
            source,
            value: Arc::new(value),
            interval: if interval.is_zero() { DEFAULT_COUNT_INTERVAL } else { interval },
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PendingCount> {
        self.value.subscribe()
    }

    pub fn current(&self) -> PendingCount {
        *self.value.borrow()
    }

    /// Fetches immediately and then on every interval. No-op while running.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        info!(interval = ?self.interval, "starting pending count polling");
        *task = Some(tokio::spawn(poll(self.source.clone(), self.value.clone(), self.interval)));
        true
    }

    /// Cancels the schedule. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return false;
        };
        let was_running = !handle.is_finished();
        handle.abort();
        if was_running {
            info!("stopped pending count polling");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// One fetch outside the schedule, with the same failure policy.
    pub async fn refresh(&self) -> Result<PendingCount, ApiError> {
        fetch(&*self.source, &self.value).await
    }
}

impl<S> Drop for PendingCountPoller<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

async fn fetch<S: PendingCountSource>(
    source: &S,
    value: &watch::Sender<PendingCount>,
) -> Result<PendingCount, ApiError> {
    match source.pending_count().await {
        Ok(count) => {
            debug!(count, "pending count");
            value.send_if_modified(|current| std::mem::replace(current, count) != count);
            Ok(count)
        }
        Err(e) => {
            warn!(%e, kept = *value.borrow(), "failed to fetch pending review count");
            Err(e)
        }
    }
}

#[instrument(skip_all)]
async fn poll<S: PendingCountSource>(source: Arc<S>, value: Arc<watch::Sender<PendingCount>>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let _ = fetch(&*source, &value).await;
    }
}
