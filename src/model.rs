use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the portal's emergency flag, fetched fresh on every poll.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmergencyStatus {
    #[serde(rename = "emergency_active")]
    pub active: bool,
}

pub type PendingCount = u64;

/// Review status a log listing is filtered by.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a verification session ended up in the review queue.
///
/// Tags the client does not know about are kept verbatim in `Other` so that
/// one unexpected record does not fail the whole page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum VerificationMethod {
    RfidOnlyPendingReview,
    FaceOnlyPendingReview,
    FaceVerificationFailed,
    Other(String),
}

impl VerificationMethod {
    pub fn as_str(&self) -> &str {
        match self {
            VerificationMethod::RfidOnlyPendingReview => "RFID_ONLY_PENDING_REVIEW",
            VerificationMethod::FaceOnlyPendingReview => "FACE_ONLY_PENDING_REVIEW",
            VerificationMethod::FaceVerificationFailed => "FACE_VERIFICATION_FAILED",
            VerificationMethod::Other(tag) => tag,
        }
    }

    /// Face-only sessions can only be approved once an employee match is picked.
    pub fn requires_match(&self) -> bool {
        matches!(self, VerificationMethod::FaceOnlyPendingReview)
    }
}

impl From<String> for VerificationMethod {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "RFID_ONLY_PENDING_REVIEW" => VerificationMethod::RfidOnlyPendingReview,
            "FACE_ONLY_PENDING_REVIEW" => VerificationMethod::FaceOnlyPendingReview,
            "FACE_VERIFICATION_FAILED" => VerificationMethod::FaceVerificationFailed,
            _ => VerificationMethod::Other(tag),
        }
    }
}

impl From<VerificationMethod> for String {
    fn from(method: VerificationMethod) -> Self {
        match method {
            VerificationMethod::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a verification session, used verbatim in resource paths.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty and made only of RFC 3986 unreserved characters.
    pub fn is_url_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
    }

    /// First eight characters, used as a card title.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub log_id: String,
    pub session_id: SessionId,
    #[serde(with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub verification_method: VerificationMethod,
    #[serde(default)]
    pub employee_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct LogPage {
    pub logs: Vec<LogRecord>,
    #[serde(rename = "hasMore", alias = "has_more")]
    pub has_more: bool,
}

/// Parameters of one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub status: ReviewStatus,
    pub page: u32,
    pub limit: u32,
}

impl PageQuery {
    pub fn pending(page: u32, limit: u32) -> Self {
        Self {
            status: ReviewStatus::Pending,
            page,
            limit,
        }
    }
}

/// ISO-8601 timestamps, with or without an offset. Offset-less values are
/// taken as UTC, which is what the portal backend emits.
mod iso_timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_wire_record() {
        let record: LogRecord = serde_json::from_str(
            r#"{
                "log_id": "l-1",
                "session_id": "5f1c2d3e-aaaa-bbbb-cccc-000000000001",
                "timestamp": "2025-03-01T12:30:00.000Z",
                "verification_method": "FACE_ONLY_PENDING_REVIEW",
                "employee_name": null,
                "status": "pending"
            }"#,
        )
        .unwrap();

        assert_eq!(record.log_id, "l-1");
        assert_eq!(record.verification_method, VerificationMethod::FaceOnlyPendingReview);
        assert_eq!(record.employee_name, None);
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let record: LogRecord = serde_json::from_str(
            r#"{"log_id":"l","session_id":"s","timestamp":"2025-03-01T12:30:00.250000","verification_method":"FACE_VERIFICATION_FAILED"}"#,
        )
        .unwrap();

        assert_eq!(record.timestamp.timestamp_millis() % 1000, 250);
        assert_eq!(record.employee_name, None);
    }

    #[test]
    fn unknown_method_is_kept() {
        let method: VerificationMethod = serde_json::from_str(r#""PIN_ONLY""#).unwrap();
        assert_eq!(method, VerificationMethod::Other("PIN_ONLY".into()));
        assert!(!method.requires_match());
        assert_eq!(serde_json::to_string(&method).unwrap(), r#""PIN_ONLY""#);
    }

    #[test]
    fn page_reads_camel_case_flag() {
        let page: LogPage = serde_json::from_str(r#"{"logs":[],"hasMore":true}"#).unwrap();
        assert!(page.has_more);
        assert!(page.logs.is_empty());
    }

    #[test]
    fn emergency_status_ignores_timestamp() {
        let status: EmergencyStatus =
            serde_json::from_str(r#"{"emergency_active":true,"timestamp":"2025-03-01T00:00:00"}"#).unwrap();
        assert!(status.active);
    }

    #[test]
    fn session_id_safety() {
        assert!(SessionId::new("abc-123_x.y~z").is_url_safe());
        assert!(!SessionId::new("").is_url_safe());
        assert!(!SessionId::new("a/b").is_url_safe());
        assert!(!SessionId::new("a b").is_url_safe());
        assert!(!SessionId::new("../etc").is_url_safe());
    }

    #[test]
    fn short_session_id() {
        assert_eq!(SessionId::new("0123456789").short(), "01234567");
        assert_eq!(SessionId::new("abc").short(), "abc");
    }
}
