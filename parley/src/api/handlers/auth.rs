//! Token and session authentication endpoints.

use axum::{
    Form, Json,
    extract::State,
    http::HeaderMap,
};
use sqlx::PgConnection;
use tracing::info;

use crate::{
    AppState,
    api::models::{
        auth::{
            CookieRedirect, CsrfFormResponse, CsrfResponse, RegisterForm, SessionLoginForm, TokenRequest, TokenResponse,
            form_field,
        },
        users::{CurrentUser, Role, UserStatus},
    },
    auth::{
        csrf,
        current_user::ExpiredBearerToken,
        password,
        permissions::AnonymousAccess,
        session, tokens,
    },
    db::{
        errors::DbError,
        handlers::{Repository, Tokens, Users},
        models::{tokens::TokenDBResponse, users::{UserCreateDBRequest, UserDBResponse}},
    },
    errors::{Error, Result},
};

/// Look the user up by username and check their password
async fn authenticate(conn: &mut PgConnection, username: &str, password: &str) -> Result<UserDBResponse> {
    let user = Users::new(conn)
        .get_by_username(username)
        .await?
        .ok_or_else(|| Error::not_found("Authentication error: user not found."))?;

    if !password::verify_password(password.to_string(), user.password_hash.clone()).await? {
        return Err(Error::bad_request("Authentication error: credentials are invalid."));
    }
    Ok(user)
}

impl From<TokenDBResponse> for TokenResponse {
    fn from(token: TokenDBResponse) -> Self {
        Self {
            access_token: token.access_token,
            token_type: token.token_type,
        }
    }
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/auth/token",
    tag = "auth",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Bearer token", body = TokenResponse),
        (status = 400, description = "Credentials are invalid"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login_for_access_token(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = authenticate(&mut conn, &request.username, &request.password).await?;
    let token = tokens::get_or_create(&mut conn, &state.config, &user).await?;

    Ok(Json(token.into()))
}

/// Re-sign a bearer token, also accepted shortly after it expired
#[utoipa::path(
    post,
    path = "/auth/token/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "Refreshed bearer token", body = TokenResponse),
        (status = 401, description = "Token is invalid or too old to refresh"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn refresh_access_token(
    State(state): State<AppState>,
    ExpiredBearerToken(bearer): ExpiredBearerToken,
) -> Result<Json<TokenResponse>> {
    if !bearer
        .token
        .can_be_refreshed(tokens::lifetime(&state.config), tokens::refresh_grace(&state.config))
    {
        return Err(Error::unauthenticated("Your session has expired."));
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let token = tokens::refresh(&mut conn, &state.config, &bearer.token, &bearer.user.username).await?;

    Ok(Json(token.into()))
}

fn csrf_form(state: &AppState) -> Result<CsrfFormResponse> {
    let (csrf_token, cookie) = csrf::issue_csrf(&state.config)?;
    Ok(CsrfFormResponse {
        body: CsrfResponse { csrf_token },
        cookie,
    })
}

/// Log `user` into a new session and send them on to the chat page
fn start_session(state: &AppState, user: &UserDBResponse) -> Result<CookieRedirect> {
    let token = session::create_session_token(user.id, &user.username, &state.config)?;
    info!("User {} logged in", user.username);

    Ok(CookieRedirect {
        location: state.config.auth.session.redirect_success.clone(),
        cookies: vec![
            session::create_session_cookie(&token, &state.config),
            csrf::clear_csrf_cookie(&state.config),
        ],
    })
}

/// Session login form
#[utoipa::path(
    get,
    path = "/auth/session",
    tag = "auth",
    responses(
        (status = 200, description = "CSRF token for the login form", body = CsrfResponse),
        (status = 307, description = "Already logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn session_login_form(State(state): State<AppState>, _: AnonymousAccess) -> Result<CsrfFormResponse> {
    csrf_form(&state)
}

/// Session login
#[utoipa::path(
    post,
    path = "/auth/session",
    tag = "auth",
    request_body(content = SessionLoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Logged in, redirecting"),
        (status = 400, description = "Credentials are invalid"),
        (status = 403, description = "CSRF token is missing or invalid"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn session_login(
    State(state): State<AppState>,
    _: AnonymousAccess,
    headers: HeaderMap,
    Form(form): Form<SessionLoginForm>,
) -> Result<CookieRedirect> {
    csrf::validate_csrf(&headers, form_field(&form.extra, &state.config.auth.csrf.token_key), &state.config)?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = authenticate(&mut conn, &form.username, &form.password).await?;
    start_session(&state, &user)
}

/// Registration form
#[utoipa::path(
    get,
    path = "/auth/session/register",
    tag = "auth",
    responses(
        (status = 200, description = "CSRF token for the registration form", body = CsrfResponse),
        (status = 307, description = "Already logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register_form(State(state): State<AppState>, _: AnonymousAccess) -> Result<CsrfFormResponse> {
    csrf_form(&state)
}

/// Create an account and log into it
#[utoipa::path(
    post,
    path = "/auth/session/register",
    tag = "auth",
    request_body(content = RegisterForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Registered and logged in, redirecting"),
        (status = 403, description = "CSRF token is missing or invalid"),
        (status = 409, description = "Username or email is taken"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    _: AnonymousAccess,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Result<CookieRedirect> {
    csrf::validate_csrf(&headers, form_field(&form.extra, &state.config.auth.csrf.token_key), &state.config)?;

    let password_hash = password::hash_password(form.password.clone()).await?;
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username: form.username.clone(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            email: form.email(),
            address: None,
            age: None,
            password_hash: Some(password_hash),
            role: Role::Active,
            status: UserStatus::Active,
        })
        .await?;

    start_session(&state, &user)
}

/// End the session and revoke the user's bearer tokens
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 302, description = "Logged out, redirecting to the login form"),
        (status = 401, description = "Not authenticated"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> Result<CookieRedirect> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let revoked = Tokens::new(&mut conn).delete_for_user(user.id).await?;
    info!("User {} logged out, {revoked} token(s) revoked", user.username);

    Ok(CookieRedirect {
        location: state.config.auth.session.login_url.clone(),
        cookies: vec![session::clear_session_cookie(&state.config)],
    })
}
