use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::services::upload_handling::UploadError;

/// Domain error taxonomy. Every variant renders as `{"error": <message>}`
/// with the status code from [`ResponseError::status_code`]. Variants that
/// wrap a lower-level failure keep it as a source for logging; only the
/// fixed public message is serialized.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Auth(&'static str),

    #[error("failed to store image")]
    Upload(#[from] UploadError),

    #[error("storage operation failed")]
    Persistence(#[from] diesel::result::Error),

    #[error("internal server error")]
    Internal(String),
}

impl From<actix::MailboxError> for ApiError {
    fn from(err: actix::MailboxError) -> Self {
        ApiError::Internal(format!("database actor unreachable: {err}"))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidState(_) => StatusCode::CONFLICT,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upload(_) | ApiError::Persistence(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        // The root cause stays on the server side of the wire.
        match self {
            ApiError::Upload(source) => tracing::error!(%source, "image upload failed"),
            ApiError::Persistence(source) => tracing::error!(%source, "store operation failed"),
            ApiError::Internal(cause) => tracing::error!(%cause, "internal failure"),
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("missing".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidState("sent".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Auth("invalid credentials").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn persistence_error_hides_its_cause() {
        let err = ApiError::from(diesel::result::Error::BrokenTransactionManager);

        assert_eq!(err.to_string(), "storage operation failed");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn response_body_is_an_error_object() {
        let resp = ApiError::NotFound("order not found".into()).error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "order not found" }));
    }
}
