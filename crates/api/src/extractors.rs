//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use livepoll_common::AppError;
use livepoll_core::AdminIdentity;

/// Admin authenticated by the auth middleware.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AdminIdentity);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminIdentity>()
            .cloned()
            .map(AdminUser)
            .ok_or(AppError::Unauthorized)
    }
}
