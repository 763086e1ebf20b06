//! The single place deciding what a caller sees.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::domain::{DomainError, Violation};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_UNAVAILABLE: u16 = 503;

const UNAVAILABLE_MESSAGE: &str = "Upstream service is temporarily unavailable. Please try again later.";
const INTERNAL_MESSAGE: &str = "Internal server error";

/// Terminal result of one request pipeline.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    ValidationFailed(Vec<Violation>),
    UpstreamUnavailable(String),
    InternalFault(String),
}

impl<T> From<Result<T, DomainError>> for Outcome<T> {
    fn from(result: Result<T, DomainError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(DomainError::Validation(violations)) => Outcome::ValidationFailed(violations),
            Err(DomainError::UpstreamUnavailable(cause)) => Outcome::UpstreamUnavailable(cause),
            Err(DomainError::Cancelled) => {
                Outcome::UpstreamUnavailable("request cancelled before completion".into())
            }
            // A rejected upstream call means we built it wrong.
            Err(DomainError::UpstreamRejected(cause)) => {
                Outcome::InternalFault(format!("upstream rejected request: {cause}"))
            }
            Err(DomainError::Internal(cause)) => Outcome::InternalFault(cause),
        }
    }
}

/// JSON payload plus HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn into_parts(self) -> (Value, u16) {
        (self.body, self.status)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    violations: Option<&'a [Violation]>,
}

pub struct ResponseBuilder;

impl ResponseBuilder {
    pub fn build<T: Serialize>(outcome: Outcome<T>) -> ApiResponse {
        match outcome {
            Outcome::Success(value) => Self::success(value, STATUS_OK),
            Outcome::ValidationFailed(violations) => {
                warn!(count = violations.len(), "request rejected by validation");
                let message = violations
                    .iter()
                    .map(|v| v.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                Self::error(STATUS_BAD_REQUEST, &message, Some(&violations))
            }
            Outcome::UpstreamUnavailable(cause) => {
                error!(%cause, "responding 503");
                Self::error(STATUS_UNAVAILABLE, UNAVAILABLE_MESSAGE, None)
            }
            Outcome::InternalFault(cause) => {
                error!(%cause, "responding 500");
                Self::error(STATUS_INTERNAL_ERROR, INTERNAL_MESSAGE, None)
            }
        }
    }

    /// Shorthand for building straight from a service result.
    pub fn from_result<T: Serialize>(result: Result<T, DomainError>) -> ApiResponse {
        Self::build(Outcome::from(result))
    }

    fn success<T: Serialize>(value: T, status: u16) -> ApiResponse {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                return Self::build::<()>(Outcome::InternalFault(format!(
                    "failed to serialize response: {err}"
                )))
            }
        };

        let body = match value {
            Value::Object(fields) => {
                let mut body = Map::with_capacity(fields.len() + 1);
                body.insert("success".into(), Value::Bool(true));
                body.extend(fields);
                Value::Object(body)
            }
            other => json!({ "success": true, "result": other }),
        };

        ApiResponse { status, body }
    }

    fn error(status: u16, message: &str, violations: Option<&[Violation]>) -> ApiResponse {
        let body = serde_json::to_value(ErrorBody {
            success: false,
            error: message,
            violations,
        })
        .unwrap_or_else(|_| json!({ "success": false, "error": message }));
        ApiResponse { status, body }
    }
}
