use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::entity::Role;
use crate::error::{AuthError, SessionError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("sign in first")]
    Unauthenticated,

    #[error("role {0} cannot access moderation")]
    Forbidden(Role),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    /// Declined operations are client errors: bad input is 422, a missing
    /// chat is 404, calling in the wrong state is 409.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Session(e) => match e {
                SessionError::EmptyMessage
                | SessionError::EmptyReason
                | SessionError::MissingTopic => StatusCode::UNPROCESSABLE_ENTITY,
                SessionError::ChatNotFound(_) => StatusCode::NOT_FOUND,
                SessionError::NoCurrentChat
                | SessionError::AlreadyMatching
                | SessionError::NotMatching => StatusCode::CONFLICT,
                SessionError::Matchmaker(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Auth(e) => match e {
                AuthError::EmptyUsername | AuthError::VerificationRequired => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AuthError::RoleNotAllowed(_) => StatusCode::FORBIDDEN,
            },
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
