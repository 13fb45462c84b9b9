// Centralized error handling for the game server

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::auth::session::clear_session_cookie;
use crate::models::api::ErrorResponse;

/// Rule violations raised by the game engine. The record is never mutated
/// when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    #[error("Not enough coins: upgrade costs {cost}, balance is {coins}")]
    InsufficientFunds { cost: u64, coins: u64 },

    #[error("Not enough coins to reset: need {threshold}, balance is {coins}")]
    ThresholdNotMet { threshold: u64, coins: u64 },
}

/// Errors from the user record store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("User {0} not found")]
    NotFound(u64),

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Failed to persist user record: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Errors raised while authenticating a request
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("No valid session")]
    MissingSession,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("User not found")]
    UserNotFound,

    #[error("Not enough coins")]
    InsufficientFunds,

    #[error("Not enough coins to reset")]
    ThresholdNotMet,

    #[error("Internal server error")]
    Internal(String),
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::InsufficientFunds { .. } => ApiError::InsufficientFunds,
            GameError::ThresholdNotMet { .. } => ApiError::ThresholdNotMet,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::UserNotFound,
            StoreError::UsernameTaken(_) => ApiError::UsernameTaken,
            StoreError::Persistence(e) => ApiError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::MissingSession => ApiError::Unauthorized,
            AuthError::Hashing(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::UsernameTaken => StatusCode::CONFLICT,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::InsufficientFunds => StatusCode::BAD_REQUEST,
            ApiError::ThresholdNotMet => StatusCode::BAD_REQUEST,
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed with internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
        });

        // A session pointing at a missing account is stale; drop it
        if matches!(self, ApiError::UserNotFound) {
            return (status, [(header::SET_COOKIE, clear_session_cookie())], body).into_response();
        }

        (status, body).into_response()
    }
}
