use crate::services::{
    auth_service::AuthError, listing_service::ListingError, signing_service::SignError,
    storage_service::StorageError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
///
/// Renders as `{"error": message}`. Internal failures expose their message
/// as-is; this is a low-sensitivity personal tool.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        }
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StorageError::InvalidBucketName { .. }
            | StorageError::InvalidObjectKey
            | StorageError::InvalidContinuationToken => AppError::bad_request(err.to_string()),
            _ => AppError::internal(err.to_string()),
        }
    }
}

impl From<ListingError> for AppError {
    fn from(err: ListingError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<SignError> for AppError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::MissingSignature | SignError::Expired | SignError::SignatureMismatch => {
                AppError::forbidden(err.to_string())
            }
            SignError::UnaddressableKey(_) => AppError::bad_request(err.to_string()),
            SignError::InvalidBaseUrl(_) | SignError::InvalidSecret => {
                AppError::internal(err.to_string())
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => AppError::unauthorized(err.to_string()),
            AuthError::InvalidToken => AppError::forbidden(err.to_string()),
            AuthError::TokenGenerationFailed => AppError::internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn renders_error_message_as_json() {
        let response = AppError::bad_request("key is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "key is required" }));
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        let missing = StorageError::ObjectNotFound {
            bucket: "photos".into(),
            key: "a.jpg".into(),
        };
        assert_eq!(AppError::from(missing).status, StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(StorageError::InvalidObjectKey).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(SignError::Expired).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(SignError::UnaddressableKey("a/./b".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(AuthError::MissingToken).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::InvalidToken).status,
            StatusCode::FORBIDDEN
        );

        let listing = ListingError::ListingFailed {
            namespace: "photos".into(),
            source: StorageError::Io(std::io::Error::other("disk gone")),
        };
        let app = AppError::from(listing);
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(app.message.contains("disk gone"));
    }
}
