/**
 * Authentication Middleware
 *
 * Protects the REST routes. The bearer token in the `Authorization` header
 * is resolved through the `IdentityProvider`, and the resulting user is
 * attached to the request extensions for handlers to pick up with
 * `AuthUser`.
 */

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::backend::auth::{IdentityProvider, UserIdentity};
use crate::backend::error::ChatError;

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
///
/// Returns 401 when the token is missing, invalid, expired, or names a user
/// that no longer exists.
pub async fn auth_middleware(
    State(identity): State<Arc<dyn IdentityProvider>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ChatError> {
    let token = bearer_token(request.headers()).ok_or_else(|| {
        tracing::warn!("[Auth] Missing or malformed Authorization header");
        ChatError::unauthorized("missing bearer token")
    })?;

    let user = identity.authenticate(token).await?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Axum extractor for the user attached by `auth_middleware`
#[derive(Clone, Debug)]
pub struct AuthUser(pub UserIdentity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserIdentity>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                tracing::warn!("[Auth] UserIdentity not found in request extensions");
                ChatError::unauthorized("not authenticated")
            })
    }
}
