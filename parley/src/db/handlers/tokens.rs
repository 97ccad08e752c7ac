//! Database repository for persisted bearer tokens.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::{DbError, Result},
        models::tokens::{TokenCreateDBRequest, TokenDBResponse},
    },
    types::{TokenId, UserId},
};

pub struct Tokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Tokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = request.user_id), err)]
    pub async fn create(&mut self, request: &TokenCreateDBRequest) -> Result<TokenDBResponse> {
        let token = sqlx::query_as::<_, TokenDBResponse>(
            "INSERT INTO jwt_tokens (access_token, user_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(&request.access_token)
        .bind(request.user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self, access_token), err)]
    pub async fn get_by_access_token(&mut self, access_token: &str) -> Result<Option<TokenDBResponse>> {
        let token = sqlx::query_as::<_, TokenDBResponse>("SELECT * FROM jwt_tokens WHERE access_token = $1")
            .bind(access_token)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    /// The user's most recently issued token
    #[instrument(skip(self), err)]
    pub async fn get_by_user(&mut self, user_id: UserId) -> Result<Option<TokenDBResponse>> {
        let token = sqlx::query_as::<_, TokenDBResponse>(
            "SELECT * FROM jwt_tokens WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Swap in a new access token, keeping the row id. The new lifetime starts one second from now.
    #[instrument(skip(self, access_token), err)]
    pub async fn refresh(&mut self, id: TokenId, access_token: &str) -> Result<TokenDBResponse> {
        let token = sqlx::query_as::<_, TokenDBResponse>(
            r#"
            UPDATE jwt_tokens SET
                access_token = $2,
                created_at = NOW() + INTERVAL '1 second'
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(access_token)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(token)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: TokenId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jwt_tokens WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke every token issued to the user, returning how many were removed
    #[instrument(skip(self), err)]
    pub async fn delete_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jwt_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_keeps_id_and_moves_creation_forward(pool: PgPool) {
        let user = create_test_user(&pool, Role::Active).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tokens::new(&mut conn);

        let token = repo
            .create(&TokenCreateDBRequest {
                access_token: "first".to_string(),
                user_id: user.id,
            })
            .await
            .unwrap();
        assert_eq!(token.token_type, "bearer");

        let refreshed = repo.refresh(token.id, "second").await.unwrap();
        assert_eq!(refreshed.id, token.id);
        assert_eq!(refreshed.access_token, "second");
        assert!(refreshed.created_at > token.created_at);

        assert!(repo.get_by_access_token("first").await.unwrap().is_none());
        assert_eq!(repo.get_by_user(user.id).await.unwrap().unwrap().id, token.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deleting_user_detaches_tokens(pool: PgPool) {
        let user = create_test_user(&pool, Role::Active).await;
        let mut conn = pool.acquire().await.unwrap();

        Tokens::new(&mut conn)
            .create(&TokenCreateDBRequest {
                access_token: "orphan".to_string(),
                user_id: user.id,
            })
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&mut *conn)
            .await
            .unwrap();

        let token = Tokens::new(&mut conn).get_by_access_token("orphan").await.unwrap().unwrap();
        assert!(token.user_id.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_for_user(pool: PgPool) {
        let user = create_test_user(&pool, Role::Active).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tokens::new(&mut conn);

        for access_token in ["a", "b"] {
            repo.create(&TokenCreateDBRequest {
                access_token: access_token.to_string(),
                user_id: user.id,
            })
            .await
            .unwrap();
        }

        assert_eq!(repo.delete_for_user(user.id).await.unwrap(), 2);
        assert!(repo.get_by_user(user.id).await.unwrap().is_none());
    }
}
