//! Request extractors for server endpoints.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::common::AppError;

/// Extracted session token from `Authorization: Bearer <token>`.
pub struct BearerToken(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::InvalidSession("missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::InvalidSession("invalid authorization header".to_string()))?;

        if token.trim().is_empty() {
            return Err(AppError::InvalidSession(
                "invalid authorization header".to_string(),
            ));
        }

        Ok(BearerToken(token.trim().to_string()))
    }
}

/// Origin of the request as `scheme://host`, from the `Host` header.
pub struct Origin(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");
        let scheme = parts.uri.scheme_str().unwrap_or("http");
        Ok(Origin(format!("{scheme}://{host}")))
    }
}
