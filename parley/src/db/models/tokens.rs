//! Database models for persisted bearer tokens.

use crate::types::{TokenId, UserId};
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct TokenCreateDBRequest {
    pub access_token: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, FromRow)]
pub struct TokenDBResponse {
    pub id: TokenId,
    pub access_token: String,
    pub token_type: String,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl TokenDBResponse {
    pub fn expires_at(&self, lifetime: Duration) -> DateTime<Utc> {
        self.created_at + lifetime
    }

    pub fn is_expired(&self, lifetime: Duration) -> bool {
        self.expires_at(lifetime) < Utc::now()
    }

    pub fn is_valid(&self, lifetime: Duration) -> bool {
        !self.is_expired(lifetime)
    }

    /// Valid tokens can always be refreshed; expired ones only within `grace` of expiring.
    /// The grace window is counted in whole minutes.
    pub fn can_be_refreshed(&self, lifetime: Duration, grace: Duration) -> bool {
        if self.is_valid(lifetime) {
            return true;
        }
        let overdue = Utc::now() - self.expires_at(lifetime);
        overdue.num_minutes() <= grace.num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(age: Duration) -> TokenDBResponse {
        TokenDBResponse {
            id: 1,
            access_token: "abc".to_string(),
            token_type: "bearer".to_string(),
            user_id: Some(1),
            created_at: Utc::now() - age,
        }
    }

    #[test]
    fn test_expiry() {
        let lifetime = Duration::minutes(30);
        assert!(token(Duration::minutes(5)).is_valid(lifetime));
        assert!(token(Duration::minutes(31)).is_expired(lifetime));
    }

    #[test]
    fn test_refresh_grace_window() {
        let lifetime = Duration::minutes(30);
        let grace = Duration::minutes(10);

        assert!(token(Duration::minutes(1)).can_be_refreshed(lifetime, grace));
        // 10 minutes and some seconds past expiry still counts as 10 whole minutes
        assert!(token(Duration::minutes(40) + Duration::seconds(20)).can_be_refreshed(lifetime, grace));
        assert!(!token(Duration::minutes(41) + Duration::seconds(5)).can_be_refreshed(lifetime, grace));
    }
}
