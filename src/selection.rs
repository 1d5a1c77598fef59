//! Match selection on the review detail page.
//!
//! The page lists candidate employees as mutually exclusive options. Picking
//! one fills the hidden `selected_employee_id` field and enables the approve
//! control; until then approving stays disabled.

use thiserror::Error;
use tracing::debug;

use crate::model::{SessionId, VerificationMethod};

pub const SELECTED_EMPLOYEE_FIELD: &str = "selected_employee_id";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("{0:?} is not one of the offered matches")]
    UnknownOption(String),

    #[error("an employee match must be selected to approve a face-only review")]
    SelectionRequired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSelection {
    options: Vec<String>,
    selected: Option<String>,
}

impl MatchSelection {
    pub fn new<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            selected: None,
        }
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Selects `option`, replacing any earlier choice.
    pub fn select(&mut self, option: &str) -> Result<(), SelectionError> {
        if !self.options.iter().any(|o| o == option) {
            return Err(SelectionError::UnknownOption(option.to_owned()));
        }
        debug!(option, previous = ?self.selected, "match selected");
        self.selected = Some(option.to_owned());
        Ok(())
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Value of the hidden form field; empty while nothing is selected.
    pub fn hidden_value(&self) -> &str {
        self.selected().unwrap_or_default()
    }

    pub fn submit_enabled(&self) -> bool {
        self.selected.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve { employee_id: Option<String> },
    Deny,
}

/// A decision ready to be posted for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewForm {
    session_id: SessionId,
    decision: ReviewDecision,
}

impl ReviewForm {
    /// Builds an approval. Face-only reviews need a selected match; other
    /// methods carry the selection along if there is one.
    pub fn approve(
        session_id: SessionId,
        method: Option<&VerificationMethod>,
        selection: &MatchSelection,
    ) -> Result<Self, SelectionError> {
        if method.is_some_and(VerificationMethod::requires_match) && !selection.submit_enabled() {
            return Err(SelectionError::SelectionRequired);
        }
        Ok(Self {
            session_id,
            decision: ReviewDecision::Approve {
                employee_id: selection.selected().map(str::to_owned),
            },
        })
    }

    pub fn deny(session_id: SessionId) -> Self {
        Self {
            session_id,
            decision: ReviewDecision::Deny,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn decision(&self) -> &ReviewDecision {
        &self.decision
    }

    pub fn action(&self) -> &'static str {
        match self.decision {
            ReviewDecision::Approve { .. } => "approve",
            ReviewDecision::Deny => "deny",
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match &self.decision {
            ReviewDecision::Approve {
                employee_id: Some(id),
            } => vec![(SELECTED_EMPLOYEE_FIELD, id.clone())],
            _ => Vec::new(),
        }
    }
}
