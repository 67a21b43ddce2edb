use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Service-wide error taxonomy. Kinds, not types: every fallible layer
/// returns one of these and only the HTTP adapter translates them to
/// responses. The hot path never lets one escape to the caller — counter
/// trouble collapses into the policy's fail mode before a response is built.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation failed")]
    Validation(HashMap<String, String>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Duplicate(String),

    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(&'static str),

    #[error("Counter script returned malformed data: {0}")]
    ScriptError(String),

    #[error("Notifier '{0}' failed: {1}")]
    NotifierFailure(String, String),

    #[error("Internal server error")]
    Internal,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl ApiError {
    /// Failures of this kind trip a circuit breaker. Semantic errors
    /// (validation, not-found, duplicates) never count.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(
            self,
            ApiError::StoreUnavailable(_)
                | ApiError::ScriptError(_)
                | ApiError::Database(_)
                | ApiError::Redis(_)
        )
    }

    /// Transport-level failures that are worth retrying against the counter
    /// store. A breaker that is already open is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::StoreUnavailable(_) | ApiError::ScriptError(_) | ApiError::Redis(_)
        )
    }
}

/// Problem-detail response body:
/// `{type, title, status, detail, timestamp[, errors]}`.
#[derive(Serialize)]
struct ProblemDetail {
    #[serde(rename = "type")]
    problem_type: String,
    title: String,
    status: u16,
    detail: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<HashMap<String, String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, problem_type, title, detail, errors) = match self {
            ApiError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid-input",
                "Invalid Parameter".to_string(),
                msg,
                None,
            ),
            ApiError::Validation(field_errors) => (
                StatusCode::BAD_REQUEST,
                "validation",
                "Validation Failed".to_string(),
                "One or more fields are invalid".to_string(),
                Some(field_errors),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "not-found",
                "Not Found".to_string(),
                msg,
                None,
            ),
            ApiError::Duplicate(msg) => (
                StatusCode::CONFLICT,
                "duplicate",
                "Conflict".to_string(),
                msg,
                None,
            ),
            ApiError::StoreUnavailable(msg) => {
                tracing::error!("Counter store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "store-unavailable",
                    "Service Unavailable".to_string(),
                    "Counter store is unreachable".to_string(),
                    None,
                )
            }
            ApiError::CircuitOpen(name) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "circuit-open",
                "Service Unavailable".to_string(),
                format!("Circuit breaker '{}' is open", name),
                None,
            ),
            ApiError::ScriptError(msg) => {
                tracing::error!("Counter script error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "store-unavailable",
                    "Service Unavailable".to_string(),
                    "Counter store returned malformed data".to_string(),
                    None,
                )
            }
            ApiError::NotifierFailure(name, msg) => {
                // Notifier failures are swallowed by the alert engine; if one
                // ever reaches the HTTP layer it is a server-side problem.
                tracing::error!("Notifier '{}' failed: {}", name, msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal Server Error".to_string(),
                    "Alert notification failed".to_string(),
                    None,
                )
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal Server Error".to_string(),
                "An unexpected error occurred".to_string(),
                None,
            ),
            ApiError::Database(e) => {
                // Log full details server-side. Constraint names, table names
                // and error codes are NEVER exposed to the client (CWE-209).
                tracing::error!("Database error: {:?}", e);

                // Unique-constraint violations are user-facing (duplicate
                // name, key hash, default policy) and surface as 409.
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.code().as_deref() == Some("23505") {
                        return problem_response(
                            StatusCode::CONFLICT,
                            "duplicate",
                            "Conflict".to_string(),
                            "A record with that value already exists".to_string(),
                            None,
                        );
                    }
                }

                if matches!(e, sqlx::Error::RowNotFound) {
                    return problem_response(
                        StatusCode::NOT_FOUND,
                        "not-found",
                        "Not Found".to_string(),
                        "Record not found".to_string(),
                        None,
                    );
                }

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal Server Error".to_string(),
                    "A database error occurred".to_string(),
                    None,
                )
            }
            ApiError::Redis(e) => {
                tracing::error!("Redis error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "store-unavailable",
                    "Service Unavailable".to_string(),
                    "Counter store is unreachable".to_string(),
                    None,
                )
            }
        };

        problem_response(status, problem_type, title, detail, errors)
    }
}

fn problem_response(
    status: StatusCode,
    problem_type: &str,
    title: String,
    detail: String,
    errors: Option<HashMap<String, String>>,
) -> Response {
    let body = Json(ProblemDetail {
        problem_type: problem_type.to_string(),
        title,
        status: status.as_u16(),
        detail,
        timestamp: Utc::now().to_rfc3339(),
        errors,
    });

    (status, body).into_response()
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Unexpected error: {:?}", err);
        ApiError::Internal
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid value".to_string());
                (field.to_string(), detail)
            })
            .collect();
        ApiError::Validation(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_failures_exclude_semantic_errors() {
        assert!(ApiError::StoreUnavailable("timeout".into()).is_breaker_failure());
        assert!(ApiError::ScriptError("bad reply".into()).is_breaker_failure());
        assert!(!ApiError::InvalidInput("oversize".into()).is_breaker_failure());
        assert!(!ApiError::NotFound("policy".into()).is_breaker_failure());
        assert!(!ApiError::CircuitOpen("counter-store").is_breaker_failure());
    }

    #[test]
    fn circuit_open_is_not_retryable() {
        assert!(!ApiError::CircuitOpen("counter-store").is_retryable());
        assert!(ApiError::StoreUnavailable("io".into()).is_retryable());
    }
}
