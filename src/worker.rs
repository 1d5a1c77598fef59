use std::sync::Arc;
use std::time::Duration;

use review_console::api::{PendingCountSource, StatusSource};
use review_console::model::PendingCount;
use review_console::pending::PendingCountPoller;
use review_console::status::StatusPoller;
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, instrument};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ShellEvent {
    Banner(bool),
    PendingCount(PendingCount),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Hide,
    Show,
    Refresh,
    Quit,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "hide" | "h" => Some(ShellCommand::Hide),
            "show" | "s" => Some(ShellCommand::Show),
            "refresh" | "r" => Some(ShellCommand::Refresh),
            "quit" | "q" | "exit" => Some(ShellCommand::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShellSettings {
    pub status_interval: Duration,
    pub count_interval: Duration,
}

/// The mounted view tree: one banner poller and one badge poller shared by
/// every consumer. Unmounting (or dropping) tears both schedules down.
pub struct PortalShell<S: StatusSource + PendingCountSource> {
    status: StatusPoller<S, watch::Sender<bool>>,
    pending: PendingCountPoller<S>,
    banner: watch::Receiver<bool>,
}

impl<S: StatusSource + PendingCountSource> PortalShell<S> {
    #[instrument(skip_all)]
    pub fn mount(source: Arc<S>, settings: ShellSettings) -> Self {
        let (banner_tx, banner) = watch::channel(false);
        let status = StatusPoller::new(source.clone(), banner_tx);
        let pending = PendingCountPoller::with_interval(source, settings.count_interval);

        status.start(settings.status_interval);
        pending.start();
        info!("portal shell mounted");

        Self {
            status,
            pending,
            banner,
        }
    }

    pub fn set_page_visible(&self, visible: bool) {
        info!(visible, "page visibility changed");
        self.status.set_page_visible(visible);
    }

    pub async fn apply(&self, command: ShellCommand) {
        match command {
            ShellCommand::Hide => self.set_page_visible(false),
            ShellCommand::Show => self.set_page_visible(true),
            ShellCommand::Refresh => {
                // failures are already logged and the badge keeps its value
                let _ = self.pending.refresh().await;
            }
            ShellCommand::Quit => {}
        }
    }

    pub fn is_polling_status(&self) -> bool {
        self.status.is_running()
    }

    pub fn banner(&self) -> watch::Receiver<bool> {
        self.banner.clone()
    }

    pub fn pending_count(&self) -> watch::Receiver<PendingCount> {
        self.pending.subscribe()
    }

    /// Current banner and badge values first, then every change.
    pub fn events(&self) -> impl Stream<Item = ShellEvent> + Send + 'static {
        let banner = WatchStream::new(self.banner()).map(ShellEvent::Banner);
        let count = WatchStream::new(self.pending_count()).map(ShellEvent::PendingCount);
        banner.merge(count)
    }

    pub fn unmount(self) {
        self.status.stop();
        self.pending.stop();
        info!("portal shell unmounted");
    }
}
