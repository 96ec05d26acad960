use core::error::Error;

use api_types::ErrorResponse;
use poem::error::ResponseError;
use poem::http::StatusCode;
use poem::Response;

use crate::domain::PlatformError;

/// API server errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ApiError {}

impl ResponseError for PlatformError {
    fn status(&self) -> StatusCode {
        match self {
            PlatformError::Unauthorized => StatusCode::UNAUTHORIZED,
            PlatformError::NotFound { .. } => StatusCode::NOT_FOUND,
            PlatformError::QuotaExceeded { .. } => StatusCode::BAD_REQUEST,
            PlatformError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            PlatformError::Conflict { .. } => StatusCode::CONFLICT,
            PlatformError::InvalidRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn as_response(&self) -> Response
    where
        Self: Error + Send + Sync + 'static,
    {
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            available_units: match self {
                PlatformError::QuotaExceeded { available, .. } => Some(*available),
                _ => None,
            },
        };
        Response::builder()
            .status(self.status())
            .content_type("application/json; charset=utf-8")
            .body(serde_json::to_vec(&body).unwrap_or_default())
    }
}
