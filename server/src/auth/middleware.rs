//! Bearer token check for the admin routes.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Caller allowed to run administrative operations.
///
/// When `ADMIN_TOKEN` is configured the request must carry
/// `Authorization: Bearer <token>`; otherwise anonymous access is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminUser {
    Token,
    Anonymous,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Ok(AdminUser::Anonymous);
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim);

        match token {
            Some(token) if !token.is_empty() && token == expected => Ok(AdminUser::Token),
            Some(_) => {
                tracing::warn!("Rejected admin request with a wrong token");
                Err(AppError::Unauthorized)
            }
            None => Err(AppError::Unauthorized),
        }
    }
}
