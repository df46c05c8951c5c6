use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AppError;

pub const UNSUPPORTED_BODY: &str =
    "Body harus berupa application/json atau application/x-www-form-urlencoded";

/// Request body sent either as JSON or as an urlencoded form.
///
/// A request with no `Content-Type` and a zero-length body yields
/// `T::default()`; any other body that is not one of the two formats is
/// rejected instead of being ignored.
#[derive(Debug, Clone, Default)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());

        match content_type.as_deref() {
            None => {
                let body = Bytes::from_request(req, state)
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                if body.is_empty() {
                    Ok(Payload(T::default()))
                } else {
                    debug!(len = body.len(), "body without content type");
                    Err(AppError::Validation(UNSUPPORTED_BODY.into()))
                }
            }
            Some(ct) if ct.starts_with("application/json") => {
                let Json(value) = Json::<T>::from_request(req, state)
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                Ok(Payload(value))
            }
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                let Form(value) = Form::<T>::from_request(req, state)
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                Ok(Payload(value))
            }
            Some(ct) => {
                debug!(content_type = ct, "unsupported body");
                Err(AppError::Validation(UNSUPPORTED_BODY.into()))
            }
        }
    }
}
