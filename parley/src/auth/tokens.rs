//! Persisted JWT bearer tokens.
//!
//! A token row is the source of truth: the JWT carries `sub` (username), `exp` and `iss`, but
//! expiry is judged from the row's `created_at` so that a refresh (which moves `created_at`)
//! extends the same token id.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{
        handlers::Tokens,
        models::{
            tokens::{TokenCreateDBRequest, TokenDBResponse},
            users::UserDBResponse,
        },
    },
    errors::{Error, Result},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct BearerClaims {
    pub sub: String,
    pub exp: i64,
    pub iss: String,
    /// Makes two tokens issued in the same second distinct
    pub jti: String,
}

pub fn lifetime(config: &Config) -> Duration {
    Duration::minutes(config.auth.access_token_expire_minutes)
}

pub fn refresh_grace(config: &Config) -> Duration {
    Duration::minutes(config.auth.token_refresh_delay_minutes)
}

/// Sign a new bearer JWT for `username`.
pub fn encode_bearer(username: &str, config: &Config) -> Result<String> {
    let claims = BearerClaims {
        sub: username.to_string(),
        exp: (Utc::now() + lifetime(config)).timestamp(),
        iss: config.server_address.clone(),
        jti: Uuid::new_v4().to_string(),
    };
    let key = EncodingKey::from_secret(config.secret()?.as_bytes());

    encode(&Header::new(config.algorithm), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Check the signature and issuer. Expiry is not checked here; see [`TokenDBResponse::is_expired`].
pub fn decode_bearer(token: &str, config: &Config) -> Result<BearerClaims> {
    let key = DecodingKey::from_secret(config.secret()?.as_bytes());
    let mut validation = Validation::new(config.algorithm);
    validation.validate_exp = false;
    validation.set_issuer(&[&config.server_address]);

    decode::<BearerClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| Error::unauthenticated("Invalid authentication token."))
}

/// Reuse the user's stored token while it is valid; otherwise issue a new one.
pub async fn get_or_create(conn: &mut PgConnection, config: &Config, user: &UserDBResponse) -> Result<TokenDBResponse> {
    let mut tokens = Tokens::new(conn);
    if let Some(token) = tokens.get_by_user(user.id).await?
        && token.is_valid(lifetime(config))
    {
        return Ok(token);
    }

    let token = tokens
        .create(&TokenCreateDBRequest {
            access_token: encode_bearer(&user.username, config)?,
            user_id: user.id,
        })
        .await?;
    Ok(token)
}

/// Re-sign the token under the same id.
pub async fn refresh(
    conn: &mut PgConnection,
    config: &Config,
    token: &TokenDBResponse,
    username: &str,
) -> Result<TokenDBResponse> {
    let access_token = encode_bearer(username, config)?;
    Ok(Tokens::new(conn).refresh(token.id, &access_token).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_config, create_test_user};
    use sqlx::PgPool;

    #[test]
    fn test_encode_and_decode() {
        let config = create_test_config();
        let token = encode_bearer("jdoe", &config).unwrap();
        let claims = decode_bearer(&token, &config).unwrap();
        assert_eq!(claims.sub, "jdoe");
        assert_eq!(claims.iss, config.server_address);

        let mut other = create_test_config();
        other.secret_key = Some("another-secret".to_string());
        assert!(matches!(decode_bearer(&token, &other), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_tokens_are_unique() {
        let config = create_test_config();
        assert_ne!(encode_bearer("jdoe", &config).unwrap(), encode_bearer("jdoe", &config).unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_or_create_reuses_valid_token(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Active).await;
        let mut conn = pool.acquire().await.unwrap();

        let first = get_or_create(&mut conn, &config, &user).await.unwrap();
        let second = get_or_create(&mut conn, &config, &user).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.access_token, second.access_token);

        // Age the token past its lifetime: a new one is issued
        sqlx::query("UPDATE jwt_tokens SET created_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
            .bind(first.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        let third = get_or_create(&mut conn, &config, &user).await.unwrap();
        assert_ne!(third.id, first.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_issues_new_access_token(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Active).await;
        let mut conn = pool.acquire().await.unwrap();

        let token = get_or_create(&mut conn, &config, &user).await.unwrap();
        let refreshed = refresh(&mut conn, &config, &token, &user.username).await.unwrap();
        assert_eq!(refreshed.id, token.id);
        assert_ne!(refreshed.access_token, token.access_token);
    }
}
