//! API error handling for the SEP-10 endpoints
//!
//! Maps service errors to HTTP status codes and JSON error bodies, for
//! whatever router ends up exposing `Sep10Service`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::{ErrorKind, Sep10Error};

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client; internal details stay in the logs
    fn public_message(&self) -> String {
        match self {
            ApiError::InternalError(_) => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        match &self {
            ApiError::InternalError(_) | ApiError::ExternalServiceError(_) => {
                tracing::error!(error = %self, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %self, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message: self.public_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<Sep10Error> for ApiError {
    fn from(err: Sep10Error) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Input | ErrorKind::Structural | ErrorKind::DomainResolution => {
                ApiError::BadRequest(message)
            }
            ErrorKind::Cryptographic | ErrorKind::Replay => ApiError::Unauthorized(message),
            ErrorKind::LedgerLookup => ApiError::ExternalServiceError(message),
            ErrorKind::Internal => ApiError::InternalError(message),
        }
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccountLookupError, ChallengeError, DomainKeyError};

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                Sep10Error::InvalidRequest("account is required".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                Sep10Error::from(ChallengeError::InvalidSequenceNumber(1)),
                StatusCode::BAD_REQUEST,
            ),
            (
                Sep10Error::from(DomainKeyError::MissingSigningKey),
                StatusCode::BAD_REQUEST,
            ),
            (
                Sep10Error::ThresholdNotMet { got: 5, need: 10 },
                StatusCode::UNAUTHORIZED,
            ),
            (Sep10Error::NonceInvalid, StatusCode::UNAUTHORIZED),
            (
                Sep10Error::AccountLookup(AccountLookupError::Request("timeout".to_string())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                Sep10Error::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = ApiError::from(Sep10Error::Internal("db password leaked".to_string()));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(!err.public_message().contains("password"));

        let err = ApiError::from(Sep10Error::NonceInvalid);
        assert!(err.public_message().contains("nonce is invalid or expired"));
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::from(Sep10Error::NonceInvalid).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
