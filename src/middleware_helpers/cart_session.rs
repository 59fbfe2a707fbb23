use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ApiError;

/// Header carrying the opaque cart session identifier
pub const CART_SESSION_HEADER: &str = "x-cart-session";

static SESSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{8,128}$").expect("valid session pattern"));

/// Cart session identifier taken from the `x-cart-session` header.
///
/// One session owns exactly one cart; the presentation layer mints the id
/// (typically a UUID kept in browser storage) and sends it with every cart call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSession(pub String);

impl CartSession {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim();
        if SESSION_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ApiError::BadRequest {
                message: format!(
                    "{} must be 8-128 characters of letters, digits, '-' or '_'",
                    CART_SESSION_HEADER
                ),
                error_code: Some("invalid_cart_session".to_string()),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CartSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CART_SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest {
                message: format!("missing {} header", CART_SESSION_HEADER),
                error_code: Some("missing_cart_session".to_string()),
            })?;
        CartSession::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uuid_like_sessions() {
        let session = CartSession::parse("3f2b8c1e-6a4d-4e0f-9b57-0c1d2e3f4a5b").unwrap();
        assert_eq!(session.as_str(), "3f2b8c1e-6a4d-4e0f-9b57-0c1d2e3f4a5b");
    }

    #[test]
    fn rejects_short_or_path_like_sessions() {
        assert!(CartSession::parse("abc").is_err());
        assert!(CartSession::parse("../../etc/passwd").is_err());
        assert!(CartSession::parse("session with spaces").is_err());
    }
}
