use axum::{
    async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
        HeaderMap,
    },
    middleware::Next,
    response::Response,
    Form, Json,
};
use axum_extra::extract::CookieJar;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{dto::PublicUser, jwt::JwtKeys, services::ACCESS_COOKIE};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

/// Access token from the `accessToken` cookie, else from `Authorization: Bearer`.
fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    jar.get(ACCESS_COOKIE)
        .map(|c| c.value().to_owned())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty())
        })
}

/// Resolves the caller from its access token.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<PublicUser> {
    let token = access_token_from_headers(headers)
        .ok_or_else(|| AppError::BadRequest("Unauthorized request".into()))?;

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_access(&token).map_err(|e| {
        warn!(error = %e, "invalid or expired access token");
        AppError::BadRequest("Invalid access token".into())
    })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid access token".into()))?;
    Ok(PublicUser::from(user))
}

/// Gate for routes that need an authenticated caller. Stores the loaded
/// identity in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let user = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

#[derive(Debug, Clone)]
pub struct CurrentUser(pub PublicUser);

/// Identity attached by [`require_auth`].
pub struct AuthUser(pub PublicUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .map(|c| AuthUser(c.0.clone()))
            .ok_or_else(|| AppError::Forbidden("Authentication required".into()))
    }
}

/// Request body as JSON or as `application/x-www-form-urlencoded`,
/// picked by content type.
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            let Form(value) = Form::<T>::from_request(req, state).await?;
            Ok(Self(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state).await?;
            Ok(Self(value))
        }
    }
}
