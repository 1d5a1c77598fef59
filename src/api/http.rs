use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use super::{ApiError, Endpoints, PendingCountSource, PendingLogSource, StatusSource};
use crate::model::{EmergencyStatus, LogPage, PageQuery, PendingCount};
use crate::selection::ReviewForm;

/// Portal client over blocking `ureq`, with every request moved onto the
/// blocking thread pool so callers stay async.
#[derive(Debug, Clone)]
pub struct HttpPortalApi {
    agent: ureq::Agent,
    endpoints: Arc<Endpoints>,
}

impl HttpPortalApi {
    pub fn new(endpoints: Endpoints) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("review-console/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            endpoints: Arc::new(endpoints),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn get_json<T>(&self, path: &str, query: Vec<(&'static str, String)>) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.endpoints.url(path);
        let agent = self.agent.clone();
        let body = blocking(move || {
            debug!(%url, "GET");
            let mut request = agent.get(&url).set("Cache-Control", "no-cache");
            for (key, value) in &query {
                request = request.query(key, value);
            }
            read_body(request.call())
        })
        .await?;
        parse_json(&body)
    }

    async fn post_form(&self, url: String, fields: Vec<(&'static str, String)>) -> Result<String, ApiError> {
        let agent = self.agent.clone();
        blocking(move || {
            debug!(%url, "POST");
            let pairs: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            read_body(agent.post(&url).send_form(&pairs))
        })
        .await
    }

    /// Clears the emergency flag on the portal and returns the new status.
    #[instrument(skip(self))]
    pub async fn reset_emergency(&self) -> Result<EmergencyStatus, ApiError> {
        let url = self.endpoints.url(&self.endpoints.emergency_reset);
        let body = self.post_form(url, Vec::new()).await?;
        parse_json(&body)
    }

    /// Posts an approve or deny decision. The portal answers with a redirect
    /// to the review list, so only the status is checked.
    #[instrument(skip_all, fields(session = %form.session_id(), action = form.action()))]
    pub async fn submit_review(&self, form: &ReviewForm) -> Result<(), ApiError> {
        let url = self
            .endpoints
            .review_action_url(form.session_id(), form.action())
            .ok_or_else(|| ApiError::InvalidSessionId(form.session_id().to_string()))?;
        self.post_form(url, form.fields()).await.map(|_| ())
    }
}

impl StatusSource for HttpPortalApi {
    async fn emergency_status(&self) -> Result<EmergencyStatus, ApiError> {
        self.get_json(&self.endpoints.emergency_status, Vec::new()).await
    }
}

impl PendingCountSource for HttpPortalApi {
    async fn pending_count(&self) -> Result<PendingCount, ApiError> {
        let value: Value = self.get_json(&self.endpoints.pending_count, Vec::new()).await?;
        parse_count(&value)
    }
}

impl PendingLogSource for HttpPortalApi {
    async fn pending_logs(&self, query: PageQuery) -> Result<LogPage, ApiError> {
        let params = vec![
            ("status", query.status.as_str().to_owned()),
            ("page", query.page.to_string()),
            ("limit", query.limit.to_string()),
        ];
        self.get_json(&self.endpoints.pending_logs, params).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Transport(format!("request task failed: {e}")))?
}

fn read_body(result: Result<ureq::Response, ureq::Error>) -> Result<String, ApiError> {
    match result {
        Ok(response) => {
            trace!(status = response.status(), "response");
            response
                .into_string()
                .map_err(|e| ApiError::Transport(format!("reading body: {e}")))
        }
        Err(ureq::Error::Status(code, response)) => {
            let message = response.into_string().ok().and_then(|body| error_message(&body));
            Err(ApiError::Status { code, message })
        }
        Err(ureq::Error::Transport(transport)) => Err(ApiError::Transport(transport.to_string())),
    }
}

/// The portal reports failures as `{"error": "..."}` when it can.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_owned)
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))
}

/// Accepts a bare integer or an object carrying the count under one of the
/// names the portal has used.
pub(crate) fn parse_count(value: &Value) -> Result<PendingCount, ApiError> {
    let number = match value {
        Value::Object(map) => ["count", "pending_count", "pendingCount"]
            .iter()
            .find_map(|key| map.get(*key))
            .ok_or_else(|| ApiError::Parse(format!("no count field in {value}")))?,
        other => other,
    };
    number
        .as_u64()
        .ok_or_else(|| ApiError::Parse(format!("expected a non-negative integer count, got {number}")))
}
