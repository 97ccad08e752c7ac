//! Password hashing and verification.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::prelude::RngExt;
use rand::rng;

use crate::errors::Error;

/// Hash a string using Argon2id with the crate defaults.
pub fn hash_string(input: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(input.as_bytes(), &salt)
        .map_err(|e| Error::Internal {
            operation: format!("hash string: {e}"),
        })?;

    Ok(hash.to_string())
}

/// Verify a string against a PHC-formatted hash.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Hash on a blocking thread so the runtime keeps serving requests.
pub async fn hash_password(password: String) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_string(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

/// Check a password against a stored hash. Accounts without a hash never match.
pub async fn verify_password(password: String, hash: Option<String>) -> Result<bool, Error> {
    let Some(hash) = hash else {
        return Ok(false);
    };

    tokio::task::spawn_blocking(move || verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}

/// `len` random bytes, base64url encoded without padding.
pub fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rng().fill(&mut bytes[..]);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hashing() {
        let hash = hash_string("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_string("test_password_123", &hash).unwrap());
        assert!(!verify_string("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_same_input_is_salted() {
        assert_ne!(hash_string("password").unwrap(), hash_string("password").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify_string("password", "not-a-phc-string").is_err());
    }

    #[tokio::test]
    async fn test_account_without_hash_never_verifies() {
        assert!(!verify_password("anything".to_string(), None).await.unwrap());

        let hash = hash_password("secret".to_string()).await.unwrap();
        assert!(verify_password("secret".to_string(), Some(hash)).await.unwrap());
    }

    #[test]
    fn test_random_urlsafe() {
        let token = random_urlsafe(65);
        // 65 bytes -> 87 base64 characters without padding
        assert_eq!(token.len(), 87);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, random_urlsafe(65));
    }
}
