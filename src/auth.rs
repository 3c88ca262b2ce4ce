//! Caller identity.
//!
//! Authentication terminates upstream (API gateway or an auth layer in front
//! of this router); it hands us the verified user id, and handlers read it
//! through the [`AuthenticatedUser`] extractor.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Header carrying the user id verified by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or_else(|| ServiceError::Unauthorized("authentication required".into()))
    }
}

/// Promotes the upstream identity header into a request extension.
/// Malformed ids are dropped, so the request reaches handlers unauthenticated.
pub async fn trusted_user_header(mut request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .map(|user_id| AuthenticatedUser { user_id });

    match user {
        Some(user) => {
            request.extensions_mut().insert(user);
        }
        None => {
            request.extensions_mut().remove::<AuthenticatedUser>();
        }
    }
    next.run(request).await
}
