//! JWT session cookies.
//!
//! The session cookie holds a JWT signed with `secret_key`. Its claims are the user id (under the
//! configured `auth.session.user_key` claim), the username and `exp`.

use axum::http::{HeaderMap, header};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::{Map, Value};

use crate::{
    config::Config,
    errors::{Error, Result},
    types::UserId,
};

/// Identity carried by a valid session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub username: String,
}

/// Create a JWT for a user session
pub fn create_session_token(user_id: UserId, username: &str, config: &Config) -> Result<String> {
    let exp = Utc::now() + config.auth.session.max_age;

    let mut claims = Map::new();
    claims.insert(config.auth.session.user_key.clone(), Value::from(user_id));
    claims.insert("username".to_string(), Value::from(username));
    claims.insert("exp".to_string(), Value::from(exp.timestamp()));

    let key = EncodingKey::from_secret(config.secret()?.as_bytes());
    encode(&Header::new(config.algorithm), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create session JWT: {e}"),
    })
}

/// Verify and decode a session JWT. Invalid or expired tokens yield `None`.
pub fn verify_session_token(token: &str, config: &Config) -> Option<SessionIdentity> {
    let secret = config.secret_key.as_deref()?;
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(config.algorithm);

    let claims = decode::<Map<String, Value>>(token, &key, &validation).ok()?.claims;
    Some(SessionIdentity {
        user_id: claims.get(&config.auth.session.user_key)?.as_i64()?,
        username: claims.get("username")?.as_str()?.to_string(),
    })
}

/// Value of the cookie `name`, if the request carries it
pub fn read_cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Session identity from the request cookies, if valid
pub fn session_from_headers(headers: &HeaderMap, config: &Config) -> Option<SessionIdentity> {
    read_cookie(headers, &config.auth.session.cookie_name).and_then(|token| verify_session_token(token, config))
}

/// `Set-Cookie` value with the configured attributes
pub fn build_cookie(name: &str, value: &str, max_age_secs: u64, config: &Config) -> String {
    let policy = &config.auth.cookie;
    let mut cookie = format!("{name}={value}; Path={}", policy.path);
    if let Some(domain) = &policy.domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    if policy.httponly {
        cookie.push_str("; HttpOnly");
    }
    if policy.secure {
        cookie.push_str("; Secure");
    }
    cookie.push_str(&format!("; SameSite={}; Max-Age={max_age_secs}", policy.samesite));
    cookie
}

pub fn create_session_cookie(token: &str, config: &Config) -> String {
    build_cookie(
        &config.auth.session.cookie_name,
        token,
        config.auth.session.max_age.as_secs(),
        config,
    )
}

pub fn clear_session_cookie(config: &Config) -> String {
    build_cookie(&config.auth.session.cookie_name, "", 0, config)
}
