//! Caller identity extractor.
//!
//! Identity is established upstream; the gateway forwards it in the
//! `X-User-ID` header. Session routes require it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::AppError;

pub const USER_HEADER: &str = "x-user-id";

/// The caller's user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing X-User-ID header".to_string()))?;
        let user = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid X-User-ID header encoding".to_string()))?
            .trim();
        if user.is_empty() {
            return Err(AppError::Unauthorized("Empty X-User-ID header".to_string()));
        }
        Ok(CurrentUser(user.to_string()))
    }
}
