//! Session-token authentication extractor.
//!
//! Extracts the session token from:
//! - `Authorization: Bearer <token>` header
//! - `session=<token>` cookie (browsers cannot set headers on WebSocket upgrades)
//!
//! and resolves it to an [`Identity`] through the `IdentityResolver`.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE, ORIGIN};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use stacks_core::identity::IdentityResolver;
use stacks_types::error::AuthError;
use stacks_types::identity::Identity;

use crate::http::error::AppError;
use crate::state::AppState;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// The authenticated caller. Extracting this validates the session token.
pub struct CurrentIdentity(pub Identity);

impl FromRequestParts<AppState> for CurrentIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        let identity = state.identity.resolve(&token).await.map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            AppError::Auth(e)
        })?;
        Ok(CurrentIdentity(identity))
    }
}

/// Extract the session token from request headers, header first.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Refuse a request whose `Origin` header is present and differs from
/// `allowed`. Without a configured origin every request passes.
pub fn check_origin(headers: &HeaderMap, allowed: Option<&str>) -> Result<(), AppError> {
    let Some(allowed) = allowed else {
        return Ok(());
    };
    match headers.get(ORIGIN).map(|v| v.to_str()) {
        None => Ok(()),
        Some(Ok(origin)) if origin.eq_ignore_ascii_case(allowed) => Ok(()),
        Some(origin) => {
            tracing::warn!(origin = ?origin.ok(), allowed, "Rejected cross-origin upgrade");
            Err(AppError::Forbidden("origin not allowed".to_string()))
        }
    }
}
