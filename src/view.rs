use std::fmt::Write;

use chrono::{DateTime, Local, Utc};
use review_console::api::Endpoints;
use review_console::logs::{ListState, PaginatedLogList};
use review_console::model::{LogRecord, PendingCount};

pub const EMERGENCY_BANNER: &str = "!!! EMERGENCY ACTIVE: all doors are in emergency mode !!!";

const NOT_AVAILABLE: &str = "N/A";

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Text card for one pending log, mirroring the portal's log cards.
pub fn render_card(record: &LogRecord, endpoints: &Endpoints) -> String {
    let image = endpoints.image(&record.session_id);
    let mut card = String::new();

    let _ = writeln!(card, "Session: {}...", record.session_id.short());
    let _ = writeln!(card, "  {}", format_timestamp(&record.timestamp));
    let _ = writeln!(card, "  Method: [{}]", record.verification_method);
    let _ = writeln!(card, "  Employee: {}", record.employee_name.as_deref().unwrap_or(NOT_AVAILABLE));
    let _ = writeln!(card, "  Image: {} ({})", image.src(), image.alt());
    match endpoints.detail_url(&record.session_id) {
        Some(url) => {
            let _ = writeln!(card, "  View Details: {url}");
        }
        None => {
            let _ = writeln!(card, "  View Details: {NOT_AVAILABLE}");
        }
    }
    card
}

/// Footer under the list: progress, the load-more hint, or the empty notice.
pub fn render_list_footer<S>(list: &PaginatedLogList<S>) -> Option<String>
where
    S: review_console::api::PendingLogSource,
{
    if list.is_empty_result() {
        return Some("No pending logs found.".to_owned());
    }
    if let Some(e) = list.last_error() {
        return Some(format!("Could not load pending logs ({e}). Try again."));
    }
    match list.state() {
        ListState::Loading => Some("Loading...".to_owned()),
        ListState::HasMore => Some(format!(
            "{} shown, more available (page {} of size {})",
            list.records().len(),
            list.page(),
            list.page_size()
        )),
        ListState::Idle | ListState::Exhausted => None,
    }
}

pub fn render_banner(active: bool) -> Option<&'static str> {
    active.then_some(EMERGENCY_BANNER)
}

/// Sidebar entry with the badge shown only for a non-zero count.
pub fn render_badge(count: PendingCount) -> String {
    if count > 0 {
        format!("Logs ({count})")
    } else {
        "Logs".to_owned()
    }
}
