//! Signed session cookies.
//!
//! A session is `<user id>.<hex HMAC-SHA256 of the id>`. The key is random
//! per process, so restarting the server logs everyone out.

use crate::core::error::{ApiError, AuthError};
use crate::core::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";

pub struct SessionKey {
    key: [u8; 32],
}

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }

    /// Token for the `session` cookie
    pub fn issue(&self, user_id: u64) -> String {
        let id = user_id.to_string();
        let mut mac = self.mac();
        mac.update(id.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{}.{}", id, signature)
    }

    /// User id carried by a token, if the signature checks out
    pub fn verify(&self, token: &str) -> Option<u64> {
        let (id, signature) = token.split_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        id.parse().ok()
    }

    /// Authenticated user id from the request's cookies
    pub fn user_id(&self, headers: &HeaderMap) -> Result<u64, AuthError> {
        session_token(headers)
            .and_then(|token| self.verify(token))
            .ok_or(AuthError::MissingSession)
    }
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

pub fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, token)
}

pub fn clear_session_cookie() -> &'static str {
    "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
}

/// Extractor for routes that require a logged-in player
#[derive(Debug, Clone, Copy)]
pub struct SessionUser(pub u64);

impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = state.sessions.user_id(&parts.headers)?;
        Ok(SessionUser(user_id))
    }
}
