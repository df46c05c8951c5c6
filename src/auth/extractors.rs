use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::{claims::Identity, jwt::JwtKeys};
use crate::error::AppError;

/// Authenticated caller, read from the request extensions when the
/// middleware already ran, otherwise verified from the header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(AuthUser(identity.clone()));
        }
        let keys = JwtKeys::from_ref(state);
        let identity = authenticate(&parts.headers, &keys)?;
        parts.extensions.insert(identity.clone());
        Ok(AuthUser(identity))
    }
}

/// Route layer for protected routers. Safe to stack: a request that already
/// carries an identity is passed through untouched.
pub async fn require_auth(
    State(keys): State<JwtKeys>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.extensions().get::<Identity>().is_none() {
        let identity = authenticate(request.headers(), &keys)?;
        request.extensions_mut().insert(identity);
    }
    Ok(next.run(request).await)
}

fn authenticate(headers: &HeaderMap, keys: &JwtKeys) -> Result<Identity, AppError> {
    // Read Authorization header
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Token tidak ditemukan".into()))?;

    // Expect "Bearer <token>"
    let token = auth
        .strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Format token tidak valid".into()))?;

    let claims = keys.verify_access(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        AppError::Unauthorized("Token tidak valid atau kadaluwarsa".into())
    })?;

    Ok(claims.identity())
}
