//! Emergency banner poller.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::api::StatusSource;
use crate::model::EmergencyStatus;

pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_millis(5000);

/// Consecutive failed checks after which polling gives up.
pub const ERROR_THRESHOLD: u32 = 3;

/// A single on/off visibility control, e.g. the emergency banner.
pub trait Indicator: Send + Sync + 'static {
    fn set_visible(&self, visible: bool);
}

impl Indicator for watch::Sender<bool> {
    fn set_visible(&self, visible: bool) {
        self.send_if_modified(|current| std::mem::replace(current, visible) != visible);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Updated(EmergencyStatus),
    Failed { consecutive: u32 },
    /// The failure threshold was reached; polling is stopped and the
    /// indicator hidden.
    Halted,
}

struct Core<S, I> {
    source: Arc<S>,
    indicator: I,
    consecutive_errors: AtomicU32,
}

impl<S: StatusSource, I: Indicator> Core<S, I> {
    async fn check(&self) -> CheckOutcome {
        match self.source.emergency_status().await {
            Ok(status) => {
                self.consecutive_errors.store(0, Ordering::SeqCst);
                debug!(active = status.active, "emergency status");
                self.indicator.set_visible(status.active);
                CheckOutcome::Updated(status)
            }
            Err(e) => {
                let consecutive = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(%e, consecutive, "emergency status check failed");
                if consecutive >= ERROR_THRESHOLD {
                    warn!("too many consecutive failures, stopping emergency status polling");
                    self.indicator.set_visible(false);
                    CheckOutcome::Halted
                } else {
                    CheckOutcome::Failed { consecutive }
                }
            }
        }
    }
}

/// Keeps an [`Indicator`] in sync with the portal's emergency flag.
///
/// Dropping the poller cancels its schedule.
pub struct StatusPoller<S, I> {
    core: Arc<Core<S, I>>,
    interval: Mutex<Duration>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: StatusSource, I: Indicator> StatusPoller<S, I> {
    pub fn new(source: Arc<S>, indicator: I) -> Self {
        Self {
            core: Arc::new(Core {
                source,
                indicator,
                consecutive_errors: AtomicU32::new(0),
            }),
            interval: Mutex::new(DEFAULT_STATUS_INTERVAL),
            task: Mutex::new(None),
        }
    }

    /// Checks immediately and then every `interval`. Returns `false` without
    /// doing anything if the poller is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval: Duration) -> bool {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let interval = if interval.is_zero() {
            warn!("zero status interval, using {:?}", DEFAULT_STATUS_INTERVAL);
            DEFAULT_STATUS_INTERVAL
        } else {
            interval
        };
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner) = interval;
        self.core.consecutive_errors.store(0, Ordering::SeqCst);

        info!(?interval, "starting emergency status polling");
        *task = Some(tokio::spawn(poll(self.core.clone(), interval)));
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
            info!("stopped emergency status polling");
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

    /// Runs one check outside the schedule. Reaching the failure threshold
    /// stops the schedule as well.
    pub async fn check_once(&self) -> CheckOutcome {
        let outcome = self.core.check().await;
        if outcome == CheckOutcome::Halted {
            self.stop();
        }
        outcome
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.core.consecutive_errors.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follows the host page: hidden pages stop polling, visible pages resume
    /// with the last interval.
    pub fn set_page_visible(&self, visible: bool) {
        if visible {
            self.start(self.interval());
        } else {
            self.stop();
        }
    }
}

impl<S, I> Drop for StatusPoller<S, I> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[instrument(skip_all)]
async fn poll<S: StatusSource, I: Indicator>(core: Arc<Core<S, I>>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // first tick completes immediately
        ticker.tick().await;
        if core.check().await == CheckOutcome::Halted {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::testing::{transport_error, ScriptedPortal};

    fn poller(portal: &Arc<ScriptedPortal>) -> (StatusPoller<ScriptedPortal, watch::Sender<bool>>, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (StatusPoller::new(portal.clone(), tx), rx)
    }

    #[tokio::test]
    async fn stale_banner_survives_failures_below_threshold() {
        let portal = Arc::new(ScriptedPortal::new());
        portal
            .push_status(Ok(true))
            .push_status(Err(transport_error()))
            .push_status(Err(transport_error()))
            .push_status(Ok(false));
        let (poller, banner) = poller(&portal);

        poller.check_once().await;
        assert!(*banner.borrow());

        assert_eq!(poller.check_once().await, CheckOutcome::Failed { consecutive: 1 });
        assert!(*banner.borrow());
        assert_eq!(poller.check_once().await, CheckOutcome::Failed { consecutive: 2 });
        assert!(*banner.borrow());

        poller.check_once().await;
        assert!(!*banner.borrow());
        assert_eq!(poller.consecutive_errors(), 0);
    }

    #[tokio::test]
    async fn threshold_hides_banner() {
        let portal = Arc::new(ScriptedPortal::new());
        portal.push_status(Ok(true)).push_status(Err(transport_error()));
        let (poller, banner) = poller(&portal);

        poller.check_once().await;
        assert!(*banner.borrow());
        poller.check_once().await;
        poller.check_once().await;
        assert_eq!(poller.check_once().await, CheckOutcome::Halted);
        assert!(!*banner.borrow());
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn success_resets_error_counter() {
        let portal = Arc::new(ScriptedPortal::new());
        portal
            .push_status(Err(transport_error()))
            .push_status(Err(ApiError::Parse("bad".into())))
            .push_status(Ok(true))
            .push_status(Err(transport_error()));
        let (poller, banner) = poller(&portal);

        poller.check_once().await;
        poller.check_once().await;
        assert_eq!(poller.consecutive_errors(), 2);
        poller.check_once().await;
        assert_eq!(poller.consecutive_errors(), 0);
        assert_eq!(poller.check_once().await, CheckOutcome::Failed { consecutive: 1 });
        assert!(*banner.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_checks_immediately_then_every_interval() {
        let portal = Arc::new(ScriptedPortal::new());
        portal.push_status(Ok(false));
        let (poller, _banner) = poller(&portal);

        assert!(poller.start(Duration::from_millis(5000)));
        assert!(!poller.start(Duration::from_millis(5000)));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(portal.status_calls(), 1);

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(portal.status_calls(), 3);

        assert!(poller.stop());
        assert!(!poller.stop());
        tokio::time::sleep(Duration::from_millis(20_000)).await;
        assert_eq!(portal.status_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_failures_stop_polling() {
        let portal = Arc::new(ScriptedPortal::new());
        portal.push_status(Ok(true)).push_status(Err(transport_error()));
        let (poller, banner) = poller(&portal);

        poller.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(portal.status_calls(), 4);
        assert!(!*banner.borrow());
        assert!(!poller.is_running());

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(portal.status_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn page_visibility_stops_and_resumes() {
        let portal = Arc::new(ScriptedPortal::new());
        portal.push_status(Ok(false));
        let (poller, _banner) = poller(&portal);

        poller.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(1)).await;
        poller.set_page_visible(false);
        assert!(!poller.is_running());
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(portal.status_calls(), 1);

        poller.set_page_visible(true);
        assert!(poller.is_running());
        assert_eq!(poller.interval(), Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(portal.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn response_after_stop_is_ignored() {
        let portal = Arc::new(ScriptedPortal::new());
        portal.with_latency(Duration::from_secs(2)).push_status(Ok(true));
        let (poller, banner) = poller(&portal);

        poller.start(Duration::from_millis(5000));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(portal.status_calls(), 1);
        assert!(poller.stop());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!*banner.borrow());
        assert_eq!(portal.status_calls(), 1);
        assert_eq!(poller.consecutive_errors(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_poller_cancels_schedule() {
        let portal = Arc::new(ScriptedPortal::new());
        portal.push_status(Ok(false));
        let (poller, _banner) = poller(&portal);

        poller.start(Duration::from_millis(1000));
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(poller);
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(portal.status_calls(), 1);
    }
}
