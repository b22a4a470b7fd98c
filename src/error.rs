use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// A single structural problem found in an inbound body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SimpleJsonError {
    #[error("Request validation failed with {} error(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    MissingBody(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Data source contract violation: {0}")]
    ContractViolation(String),

    #[error("Data source unavailable")]
    Unavailable,

    #[error("Not found")]
    NotFound,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SimpleJsonError {
    /// Wraps any backend failure so data sources can use `map_err(SimpleJsonError::backend)`.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        SimpleJsonError::Backend(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SimpleJsonError::Validation(_) | SimpleJsonError::MissingBody(_) => {
                StatusCode::BAD_REQUEST
            }
            SimpleJsonError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            SimpleJsonError::NotFound => StatusCode::NOT_FOUND,
            SimpleJsonError::NotImplemented(_)
            | SimpleJsonError::ContractViolation(_)
            | SimpleJsonError::Backend(_)
            | SimpleJsonError::Config(_)
            | SimpleJsonError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SimpleJsonError::Validation(_) => "validation_failed",
            SimpleJsonError::MissingBody(_) => "missing_body",
            SimpleJsonError::NotImplemented(_) => "not_implemented",
            SimpleJsonError::ContractViolation(_) => "contract_violation",
            SimpleJsonError::Unavailable => "unavailable",
            SimpleJsonError::NotFound => "not_found",
            SimpleJsonError::Backend(_) => "backend_error",
            SimpleJsonError::Config(_) => "config_error",
            SimpleJsonError::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for SimpleJsonError {
    fn from(err: serde_json::Error) -> Self {
        SimpleJsonError::Validation(vec![FieldError::new("$", err.to_string())])
    }
}

impl IntoResponse for SimpleJsonError {
    fn into_response(self) -> Response {
        let status = self.status();

        // The connectivity check and the tag gates answer with a bare status.
        if matches!(self, SimpleJsonError::Unavailable | SimpleJsonError::NotFound) {
            return status.into_response();
        }

        let body = match &self {
            SimpleJsonError::Validation(errors) => Json(json!({
                "error": self.to_string(),
                "code": self.code(),
                "errors": errors,
            })),
            _ => Json(json!({
                "error": self.to_string(),
                "code": self.code(),
            })),
        };

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, SimpleJsonError>;
