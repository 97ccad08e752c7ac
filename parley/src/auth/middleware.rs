use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{debug, trace};

use crate::{AppState, auth::session, errors::Error};

/// Implementation for session_required_middleware. Requests under the web prefix need a valid
/// session cookie unless their path matches one of the exempt patterns.
pub(crate) fn session_required(state: &AppState, request: &Request) -> Result<(), Error> {
    let path = request.uri().path();

    if !path.starts_with(&state.config.auth.web_prefix) || state.exempt_paths.is_match(path) {
        return Ok(());
    }

    if session::session_from_headers(request.headers(), &state.config).is_some() {
        trace!("Session present for {}", path);
        return Ok(());
    }

    debug!("No session for {}, redirecting to login", path);
    Err(Error::Redirect {
        location: state.config.auth.session.login_url.clone(),
        status: StatusCode::TEMPORARY_REDIRECT,
    })
}

/// Middleware redirecting session-less web requests to the login page
pub async fn session_required_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    session_required(&state, &request)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_state, create_test_user, session_cookie};
    use axum::{body::Body, http::header};
    use sqlx::PgPool;

    fn request(uri: &str, cookie: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_web_paths_need_a_session(pool: PgPool) {
        let state = create_test_state(pool.clone());

        let err = session_required(&state, &request("/web/chat", None)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TEMPORARY_REDIRECT);

        let user = create_test_user(&pool, Role::Active).await;
        let cookie = session_cookie(&state.config, &user);
        assert!(session_required(&state, &request("/web/chat", Some(&cookie))).is_ok());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_other_and_exempt_paths_pass(pool: PgPool) {
        let state = create_test_state(pool);

        assert!(session_required(&state, &request("/users", None)).is_ok());
        assert!(session_required(&state, &request("/auth/session", None)).is_ok());
        assert!(session_required(&state, &request("/healthcheck", None)).is_ok());
    }
}
