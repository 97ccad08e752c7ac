//! Extractors resolving the authenticated user.
//!
//! Two credential sources are supported. A session cookie (set by the `/auth/session` form
//! login) is tried first, then an `Authorization: Bearer` token issued by `/auth/token`.

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::{session, tokens},
    db::{
        errors::DbError,
        handlers::{Repository, Tokens, Users},
        models::{tokens::TokenDBResponse, users::UserDBResponse},
    },
    errors::{Error, Result},
};

/// Extract user from the session cookie if present and valid.
/// Returns:
/// - None: no cookie, an invalid or expired cookie, or a cookie for a deleted user
/// - Some(Ok(user)): valid session
/// - Some(Err(error)): the user lookup failed
#[instrument(skip_all)]
pub async fn try_session_auth(parts: &Parts, state: &AppState) -> Option<Result<CurrentUser>> {
    let identity = session::session_from_headers(&parts.headers, &state.config)?;

    let mut conn = match state.db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };
    match Users::new(&mut conn).get_by_id(identity.user_id).await {
        Ok(Some(user)) => Some(Ok(user.into())),
        Ok(None) => {
            debug!("Ignoring session for deleted user {}", identity.user_id);
            None
        }
        Err(e) => Some(Err(e.into())),
    }
}

/// A bearer token from the `Authorization` header, checked against the token store, and its user.
#[derive(Debug, Clone)]
pub struct BearerToken {
    pub token: TokenDBResponse,
    pub user: UserDBResponse,
}

fn bearer_value(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the bearer token. Expired tokens are rejected unless `allow_expired` is set.
#[instrument(skip_all, fields(allow_expired))]
async fn resolve_bearer(parts: &Parts, state: &AppState, allow_expired: bool) -> Result<BearerToken> {
    let access_token = bearer_value(parts).ok_or(Error::Unauthenticated { message: None })?;
    let invalid = || Error::unauthenticated("Invalid authentication token.");

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let token = Tokens::new(&mut conn)
        .get_by_access_token(access_token)
        .await?
        .ok_or_else(invalid)?;
    tokens::decode_bearer(access_token, &state.config)?;

    if !allow_expired && token.is_expired(tokens::lifetime(&state.config)) {
        return Err(Error::unauthenticated("Your session has expired."));
    }

    let user_missing = || Error::unauthenticated("Invalid authentication token. user does not exist.");
    let user_id = token.user_id.ok_or_else(user_missing)?;
    let user = Users::new(&mut conn).get_by_id(user_id).await?.ok_or_else(user_missing)?;

    Ok(BearerToken { token, user })
}

impl FromRequestParts<AppState> for BearerToken {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        resolve_bearer(parts, state, false).await
    }
}

/// Like [`BearerToken`] but accepts expired tokens, for the refresh endpoint.
#[derive(Debug, Clone)]
pub struct ExpiredBearerToken(pub BearerToken);

impl FromRequestParts<AppState> for ExpiredBearerToken {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        resolve_bearer(parts, state, true).await.map(ExpiredBearerToken)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_session_auth(parts, state).await {
            Some(Ok(user)) => {
                trace!("Found session authenticated user: {}", user.id);
                return Ok(user);
            }
            Some(Err(e)) => return Err(e),
            None => trace!("No session authentication"),
        }

        let bearer = resolve_bearer(parts, state, false).await?;
        trace!("Found bearer authenticated user: {}", bearer.user.id);
        Ok(bearer.user.into())
    }
}

/// The authenticated user, or `None` for anonymous requests.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(Error::Unauthenticated { .. }) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// A user authenticated by session cookie only, for the web pages and the chat socket.
///
/// Without a session the request is redirected to the login page. `Option<SessionUser>` yields
/// `None` instead.
#[derive(Debug, Clone)]
pub struct SessionUser(pub CurrentUser);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_session_auth(parts, state).await {
            Some(result) => result.map(SessionUser),
            None => Err(Error::Redirect {
                location: state.config.auth.session.login_url.clone(),
                status: StatusCode::TEMPORARY_REDIRECT,
            }),
        }
    }
}

impl OptionalFromRequestParts<AppState> for SessionUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        try_session_auth(parts, state).await.transpose().map(|user| user.map(SessionUser))
    }
}
