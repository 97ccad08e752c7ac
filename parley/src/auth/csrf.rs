//! Double-submit CSRF tokens for the session forms.
//!
//! The cookie holds `{token}.{signature}` where the signature is HMAC-SHA256 of the token under
//! `secret_key`, both base64url. A form is accepted when the cookie signature checks out and the
//! submitted token equals the cookie's token.

use axum::http::HeaderMap;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{
    auth::{password::random_urlsafe, session},
    config::Config,
    errors::{Error, Result},
};

type HmacSha256 = Hmac<Sha256>;

fn mac(config: &Config) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(config.secret()?.as_bytes()).map_err(|e| Error::Internal {
        operation: format!("create CSRF signer: {e}"),
    })
}

fn sign(token: &str, config: &Config) -> Result<String> {
    let mut mac = mac(config)?;
    mac.update(token.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// A fresh token for the form, plus the `Set-Cookie` value carrying its signed copy
pub fn issue_csrf(config: &Config) -> Result<(String, String)> {
    let token = random_urlsafe(32);
    let signed = format!("{token}.{}", sign(&token, config)?);
    let cookie = session::build_cookie(
        &config.auth.csrf.cookie_key,
        &signed,
        config.auth.session.max_age.as_secs(),
        config,
    );
    Ok((token, cookie))
}

/// Check the submitted form token against the signed cookie
pub fn validate_csrf(headers: &HeaderMap, form_token: &str, config: &Config) -> Result<()> {
    let cookie = session::read_cookie(headers, &config.auth.csrf.cookie_key)
        .ok_or_else(|| Error::forbidden("Missing CSRF cookie."))?;
    let invalid = || Error::forbidden("The CSRF token is invalid.");

    let (token, signature) = cookie.split_once('.').ok_or_else(invalid)?;
    let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

    let mut mac = mac(config)?;
    mac.update(token.as_bytes());
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    if token != form_token {
        return Err(invalid());
    }
    Ok(())
}

/// Expire the CSRF cookie once its token has been used
pub fn clear_csrf_cookie(config: &Config) -> String {
    session::build_cookie(&config.auth.csrf.cookie_key, "", 0, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;
    use axum::http::{HeaderValue, header};

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    /// The `name=value` part of a Set-Cookie string
    fn cookie_pair(set_cookie: &str) -> &str {
        set_cookie.split(';').next().unwrap()
    }

    #[test]
    fn test_issued_token_validates() {
        let config = create_test_config();
        let (token, set_cookie) = issue_csrf(&config).unwrap();
        assert!(set_cookie.starts_with("fastapi-csrf-token="));

        let headers = headers_with(cookie_pair(&set_cookie));
        validate_csrf(&headers, &token, &config).unwrap();
    }

    #[test]
    fn test_mismatched_form_token() {
        let config = create_test_config();
        let (_, set_cookie) = issue_csrf(&config).unwrap();
        let headers = headers_with(cookie_pair(&set_cookie));

        let err = validate_csrf(&headers, "forged", &config).unwrap_err();
        assert_eq!(err.user_message(), "The CSRF token is invalid.");
    }

    #[test]
    fn test_tampered_signature() {
        let config = create_test_config();
        let (token, _) = issue_csrf(&config).unwrap();
        let headers = headers_with(&format!("fastapi-csrf-token={token}.AAAA"));

        assert!(validate_csrf(&headers, &token, &config).is_err());
    }

    #[test]
    fn test_missing_cookie() {
        let config = create_test_config();
        let err = validate_csrf(&HeaderMap::new(), "anything", &config).unwrap_err();
        assert_eq!(err.user_message(), "Missing CSRF cookie.");
    }
}
