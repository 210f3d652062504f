use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use mersal_gateway::{AuthError, RelayError};
use mersal_types::api::MessageResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Failed to upload image")]
    Upload(#[source] anyhow::Error),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthError::Unavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Relay(e) => match e {
                RelayError::MissingContent | RelayError::SelfMessage | RelayError::UnknownReceiver => {
                    StatusCode::BAD_REQUEST
                }
                RelayError::Upload(_) => StatusCode::BAD_GATEWAY,
                RelayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upload(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(MessageResponse::new(self.to_string()))).into_response()
    }
}
