//! JSON error envelope

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::policy::PolicyDecision;

/// Body of every denial and failure: `{code, message, details}`
///
/// `code` always equals the HTTP status of the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonError {
    pub code: u16,
    pub message: String,
    pub details: String,
}

impl JsonError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: status.as_u16(),
            details: message.clone(),
            message,
        }
    }

    /// Envelope for a terminal decision, `None` for `Continue`
    pub fn from_decision(decision: &PolicyDecision) -> Option<Self> {
        decision
            .status_and_message()
            .map(|(status, message)| Self::new(status, message))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
