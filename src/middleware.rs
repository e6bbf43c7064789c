//! Extractors and guards for routes.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::Claims;
use crate::user::Role;

const BEARER: &str = "Bearer ";

/// Token carried by `Authorization: Bearer <token>`.
fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn decode(state: &AppState, token: &str) -> Result<Claims> {
    state.token.decode(token).map_err(|err| {
        tracing::debug!(error = %err, "invalid bearer token");
        ServerError::Unauthorized
    })
}

/// Caller identity. Rejects with `401` without a valid token.
#[derive(Clone, Debug)]
pub struct Auth(pub Claims);

impl FromRequestParts<AppState> for Auth {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Already decoded by `require_admin`.
        if let Some(claims) = parts.extensions.get::<Claims>() {
            return Ok(Auth(claims.clone()));
        }

        let token = bearer(parts).ok_or(ServerError::Unauthorized)?;
        decode(state, token).map(Auth)
    }
}

/// Optional caller identity. A missing or invalid token means anonymous.
#[derive(Clone, Debug)]
pub struct MaybeAuth(pub Option<Claims>);

impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        Ok(MaybeAuth(
            bearer(parts).and_then(|token| decode(state, token).ok()),
        ))
    }
}

/// Custom middleware for admin routes.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let (mut parts, body) = req.into_parts();
    let Auth(claims) = Auth::from_request_parts(&mut parts, &state).await?;
    if !claims.has_role(Role::Admin) {
        tracing::debug!(user_id = %claims.sub, "admin route refused");
        return Err(ServerError::Forbidden);
    }

    parts.extensions.insert(claims);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// JSON body checked with [`Validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request as HttpRequest;

    use super::*;

    fn parts(value: Option<&str>) -> Parts {
        let mut builder = HttpRequest::builder();
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_prefix() {
        assert_eq!(bearer(&parts(Some("Bearer abc.def.ghi"))), Some("abc.def.ghi"));
        assert_eq!(bearer(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer(&parts(Some("Bearer "))), None);
        assert_eq!(bearer(&parts(None)), None);
    }

    #[tokio::test]
    async fn test_invalid_token_is_anonymous() {
        let fixture = crate::tests::Fixture::new().await;
        let MaybeAuth(claims) =
            MaybeAuth::from_request_parts(&mut parts(Some("Bearer nope")), &fixture.state)
                .await
                .unwrap();
        assert!(claims.is_none());

        assert!(matches!(
            Auth::from_request_parts(&mut parts(Some("Bearer nope")), &fixture.state).await,
            Err(ServerError::Unauthorized)
        ));
    }
}
