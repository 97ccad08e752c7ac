//! Database repository for users.

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::{
            groups::GroupDBResponse,
            permissions::PermissionDBResponse,
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    types::{PermissionId, UserId},
};
use std::collections::HashMap;
use tracing::{info, instrument};
use sqlx::PgConnection;

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (username, first_name, last_name, email, address, age, password_hash, role, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&request.username)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.address)
        .bind(request.age)
        .bind(&request.password_hash)
        .bind(request.role.as_str())
        .bind(request.status.as_str())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<HashMap<Self::Id, UserDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|user| (user.id, user)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users =
            sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2")
                .bind(filter.limit)
                .bind(filter.skip)
                .fetch_all(&mut *self.db)
                .await?;

        Ok(users)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        info!(user_id = id, username = %request.username, "user.before_update");

        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET
                username = $2,
                first_name = $3,
                last_name = $4,
                email = $5,
                address = $6,
                age = $7,
                password_hash = COALESCE($8, password_hash),
                role = $9,
                status = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.username)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.address)
        .bind(request.age)
        .bind(&request.password_hash)
        .bind(request.role.as_str())
        .bind(request.status.as_str())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        info!(user_id = id, username = %user.username, role = user.role.as_str(), "user.after_update");
        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_username(&mut self, username: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Users matching any of `usernames`; unknown names are skipped
    #[instrument(skip(self, usernames), fields(count = usernames.len()), err)]
    pub async fn get_by_usernames(&mut self, usernames: &[String]) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE username = ANY($1) ORDER BY id")
            .bind(usernames)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users)
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Permissions granted directly to the user (not through groups)
    #[instrument(skip(self), err)]
    pub async fn get_permissions(&mut self, user_id: UserId) -> Result<Vec<PermissionDBResponse>> {
        let permissions = sqlx::query_as::<_, PermissionDBResponse>(
            r#"
            SELECT p.* FROM permissions p
            JOIN user_permissions up ON up.permission_id = p.id
            WHERE up.user_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(permissions)
    }

    #[instrument(skip(self), err)]
    pub async fn get_groups(&mut self, user_id: UserId) -> Result<Vec<GroupDBResponse>> {
        let groups = sqlx::query_as::<_, GroupDBResponse>(
            r#"
            SELECT g.* FROM groups g
            JOIN user_groups ug ON ug.group_id = g.id
            WHERE ug.user_id = $1
            ORDER BY g.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(groups)
    }

    /// Grant permissions directly; ones the user already holds are skipped
    #[instrument(skip(self, permission_ids), fields(count = permission_ids.len()), err)]
    pub async fn extend_permissions(&mut self, user_id: UserId, permission_ids: &[PermissionId]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, permission_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(permission_ids)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, permission_ids), fields(count = permission_ids.len()), err)]
    pub async fn remove_permissions(&mut self, user_id: UserId, permission_ids: &[PermissionId]) -> Result<()> {
        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = ANY($2)")
            .bind(user_id)
            .bind(permission_ids)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    #[instrument(skip(self, password_hash), err)]
    pub async fn set_password(&mut self, user_id: UserId, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::{Role, UserStatus};
    use crate::db::handlers::Permissions;
    use crate::db::models::permissions::PermissionCreateDBRequest;
    use sqlx::PgPool;

    fn create_request(username: &str, email: Option<&str>) -> UserCreateDBRequest {
        UserCreateDBRequest {
            username: username.to_string(),
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: email.map(str::to_string),
            address: None,
            age: Some(30),
            password_hash: None,
            role: Role::Active,
            status: UserStatus::Active,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("jdoe", Some("jdoe@example.com"))).await.unwrap();
        assert_eq!(user.username, "jdoe");
        assert_eq!(user.role, Role::Active);
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.email.as_deref(), Some("jdoe@example.com"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_username_is_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&create_request("jdoe", None)).await.unwrap();
        let err = repo.create(&create_request("jdoe", None)).await.unwrap_err();
        match err {
            DbError::UniqueViolation { constraint, .. } => {
                assert_eq!(constraint.as_deref(), Some("users_username_key"))
            }
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_lookups(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&create_request("lookup", Some("lookup@example.com"))).await.unwrap();
        repo.create(&create_request("other", None)).await.unwrap();

        assert_eq!(repo.get_by_username("lookup").await.unwrap().unwrap().id, created.id);
        assert_eq!(repo.get_by_email("lookup@example.com").await.unwrap().unwrap().id, created.id);
        assert!(repo.get_by_username("missing").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 2);

        let found = repo
            .get_by_usernames(&["lookup".to_string(), "nobody".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let bulk = repo.get_bulk(vec![created.id]).await.unwrap();
        assert!(bulk.contains_key(&created.id));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_keeps_password_when_not_given(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let mut request = create_request("pw", None);
        request.password_hash = Some("hash".to_string());
        let user = repo.create(&request).await.unwrap();

        let mut update = UserUpdateDBRequest::from(&user);
        update.first_name = "Jane".to_string();
        update.role = Role::Staff;
        let updated = repo.update(user.id, &update).await.unwrap();

        assert_eq!(updated.first_name, "Jane");
        assert_eq!(updated.role, Role::Staff);
        assert_eq!(updated.password_hash.as_deref(), Some("hash"));

        let missing = repo.update(-1, &update).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_extend_permissions_skips_duplicates(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();

        let permission = Permissions::new(&mut conn)
            .create(&PermissionCreateDBRequest {
                name: "read_users".to_string(),
                display_name: None,
                description: None,
                target_table: Some("users".to_string()),
            })
            .await
            .unwrap();

        let mut repo = Users::new(&mut conn);
        let user = repo.create(&create_request("perms", None)).await.unwrap();

        repo.extend_permissions(user.id, &[permission.id]).await.unwrap();
        repo.extend_permissions(user.id, &[permission.id]).await.unwrap();
        assert_eq!(repo.get_permissions(user.id).await.unwrap().len(), 1);

        repo.remove_permissions(user.id, &[permission.id]).await.unwrap();
        assert!(repo.get_permissions(user.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("gone", None)).await.unwrap();
        assert!(repo.delete(user.id).await.unwrap());
        assert!(!repo.delete(user.id).await.unwrap());
        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
    }
}
