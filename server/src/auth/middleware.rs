//! Authentication extractor.
//!
//! The principal is the bearer token itself. Token verification belongs to
//! whatever sits in front of this server; here the token only names who owns
//! a client group.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Principal used when no authorization is configured and none is sent.
pub const ANONYMOUS: &str = "anonymous";

/// Authenticated principal extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub principal: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header {
            Some(header) if header.starts_with("Bearer ") => {
                let principal = header.trim_start_matches("Bearer ").trim().to_string();
                if principal.is_empty() {
                    return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
                }
                Ok(AuthUser { principal })
            }
            Some(_) => Err((
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            )),
            None if state.config.auth_secret.is_none() => Ok(AuthUser {
                principal: ANONYMOUS.to_string(),
            }),
            None => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
        }
    }
}
