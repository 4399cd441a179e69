use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::application::blobs::BlobError;
use crate::application::cache::CacheError;
use crate::application::repos::RepoError;
use crate::domain::{error::DomainError, validation::FieldErrors};
use crate::infra::error::InfraError;

/// Diagnostic attached to error responses so the response-logging middleware
/// can report the full cause chain without it reaching the caller.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
    pub correlation_id: Option<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Identifier handed to the caller of a failed request and written to the
/// operator log next to the fault detail.
pub fn correlation_id() -> String {
    format!("REQ-{}", Uuid::new_v4())
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("authentication required")]
    Unauthorized,
    #[error("permission `{0}` required")]
    Forbidden(String),
    #[error("email address not verified")]
    Unverified,
    #[error("conflict: {0}")]
    Conflict(String),
    /// A well-formed request the server declines, e.g. wrong credentials.
    #[error("rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound { .. } | AppError::Domain(DomainError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            AppError::Domain(DomainError::Validation { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::Unverified => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Domain(_)
            | AppError::Repo(_)
            | AppError::Cache(_)
            | AppError::Blob(_)
            | AppError::Infra(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> String {
        match self {
            AppError::Validation(_) | AppError::Domain(DomainError::Validation { .. }) => {
                "Validation failed".to_string()
            }
            AppError::NotFound { entity } | AppError::Domain(DomainError::NotFound { entity }) => {
                format!("{entity} not found")
            }
            AppError::Unauthorized => "Unauthenticated".to_string(),
            AppError::Forbidden(_) => "This action is unauthorized".to_string(),
            AppError::Unverified => "Your email address is not verified.".to_string(),
            AppError::Conflict(message) | AppError::Rejected(message) => message.clone(),
            _ => "An error occurred while processing the request".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let mut report = ErrorReport::from_error("application::error::AppError", status, &self);

        let body = match &self {
            AppError::Validation(errors) => json!({
                "code": status.as_u16(),
                "message": message,
                "data": null,
                "errors": errors,
            }),
            AppError::Domain(DomainError::Validation { message: detail }) => json!({
                "code": status.as_u16(),
                "message": message,
                "data": null,
                "errors": { "request": [detail] },
            }),
            _ if status.is_server_error() => {
                let request_id = correlation_id();
                report = report.with_correlation_id(request_id.clone());
                json!({
                    "code": status.as_u16(),
                    "message": message,
                    "data": null,
                    "request_id": request_id,
                })
            }
            _ => json!({
                "code": status.as_u16(),
                "message": message,
                "data": null,
            }),
        };

        let mut response = (status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(error: AppError) -> (StatusCode, serde_json::Value, ErrorReport) {
        let mut response = error.into_response();
        let report = response
            .extensions_mut()
            .remove::<ErrorReport>()
            .expect("report attached");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap(), report)
    }

    #[tokio::test]
    async fn validation_errors_render_field_map() {
        let (status, body, _) =
            body_of(AppError::Validation(FieldErrors::single("category", "taken"))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["category"][0], "taken");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn not_found_names_the_entity() {
        let (status, body, _) = body_of(AppError::not_found("Category")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Category not found");
        assert!(body.get("request_id").is_none());
    }

    #[tokio::test]
    async fn unverified_callers_are_forbidden() {
        let (status, body, _) = body_of(AppError::Unverified).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Your email address is not verified.");
    }

    #[tokio::test]
    async fn server_faults_hide_detail_behind_correlation_id() {
        let (status, body, report) = body_of(AppError::Repo(RepoError::Persistence(
            "connection refused".into(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let request_id = body["request_id"].as_str().unwrap();
        assert!(request_id.starts_with("REQ-"));
        assert!(!body.to_string().contains("connection refused"));
        assert_eq!(report.correlation_id.as_deref(), Some(request_id));
        assert!(report.messages[0].contains("connection refused"));
    }
}
