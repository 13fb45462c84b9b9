use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
use crate::auth::session::{clear_session_cookie, session_cookie};
use crate::core::error::{ApiError, AuthError};
use crate::core::state::AppState;
use crate::models::api::{LoginForm, RegisterForm};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Argon2 is deliberately slow, keep it off the async workers
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Blocking task failed: {}", e)))
}

/// Create an account
///
/// POST /register (form: username, password, confirm_password)
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, ApiError> {
    if form.username.trim().is_empty() {
        return Err(ApiError::Validation("Username must not be empty".to_string()));
    }

    if form.password != form.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }

    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    // Cheap early exit; `create` still enforces uniqueness atomically
    if state.users.load_by_username(&form.username).is_some() {
        warn!(username = %form.username, "Registration with taken username");
        return Err(ApiError::UsernameTaken);
    }

    let password = form.password;
    let password_hash = blocking(move || hash_password(&password)).await??;

    let user = state.users.create(&form.username, password_hash)?;

    info!(user_id = user.id, username = %user.username, "User registered");

    Ok(Redirect::to("/").into_response())
}

/// Log in and receive a session cookie
///
/// POST / (form: username, password)
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let user = state
        .users
        .load_by_username(&form.username)
        .ok_or(AuthError::InvalidCredentials)?;

    let password = form.password;
    let stored_hash = user.password_hash.clone();
    let verified = blocking(move || verify_password(&password, &stored_hash)).await?;

    if !verified {
        warn!(username = %form.username, "Failed login attempt");
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.sessions.issue(user.id);

    info!(user_id = user.id, "User logged in");

    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Redirect::to("/game"),
    )
        .into_response())
}

/// Drop the session cookie
///
/// GET /logout
pub async fn logout_handler() -> Response {
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Redirect::to("/"),
    )
        .into_response()
}
