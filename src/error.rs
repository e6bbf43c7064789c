//! Error handler for meetup.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// PostgreSQL `unique_violation` code.
const UNIQUE_VIOLATION: &str = "23505";

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("SQL request failed: {0}")]
    Sql(#[source] SQLxError),

    #[error("resource not found")]
    NotFound,

    #[error("insufficient permissions for this action")]
    Forbidden,

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("payment required for paid tickets")]
    PaymentRequired,

    #[error("no places left for this ticket type")]
    CapacityExceeded,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Wrap any error as an internal one.
    pub fn internal<E>(details: &str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.to_owned(),
            source: Some(Box::new(err)),
        }
    }

    /// Machine-readable reason sent along every error body.
    pub fn reason(&self) -> &'static str {
        match self {
            ServerError::Validation(_) | ServerError::Axum(_) | ServerError::Multipart(_) => {
                "validation"
            },
            ServerError::NotFound => "not_found",
            ServerError::Forbidden => "forbidden",
            ServerError::Unauthorized => "unauthorized",
            ServerError::Conflict(_) => "conflict",
            ServerError::InvalidInput(_) => "invalid_input",
            ServerError::InvalidState(_) => "invalid_state",
            ServerError::PaymentRequired => "payment_required",
            ServerError::CapacityExceeded => "capacity_exceeded",
            ServerError::Sql(_) | ServerError::Internal { .. } => "internal",
        }
    }

    /// HTTP status code matching the error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            ServerError::Sql(_) | ServerError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<SQLxError> for ServerError {
    fn from(err: SQLxError) -> Self {
        match err.as_database_error() {
            Some(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                ServerError::Conflict("resource already exists".into())
            },
            _ => ServerError::Sql(err),
        }
    }
}

impl From<crate::crypto::CryptoError> for ServerError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        Self::internal("password hashing failed", err)
    }
}

impl From<jsonwebtoken::errors::Error> for ServerError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::internal("token signing failed", err)
    }
}

impl From<crate::export::ExportError> for ServerError {
    fn from(err: crate::export::ExportError) -> Self {
        Self::internal("export rendering failed", err)
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    reason: &'static str,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Update machine-readable `reason` field.
    pub fn reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            reason: "internal",
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("The request could not be processed.")
            .reason(self.reason())
            .details(&self.to_string())
            .status(self.status());

        let response = match &self {
            ServerError::Validation(validation_errors) => response
                .title("There were validation errors with your request.")
                .errors(validation_errors),

            ServerError::Unauthorized => {
                response.title("Missing or invalid 'Authorization' header.")
            },

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "sql request failed");
                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "reason": "internal",
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
