//! Database repository for groups and their user/permission links.

use crate::{
    db::{
        errors::{DbError, Result},
        filter::Filters,
        handlers::repository::Repository,
        models::{
            groups::{GroupCreateDBRequest, GroupDBResponse, GroupUpdateDBRequest},
            permissions::{CrudKind, PermissionDBResponse, crud_data_list, format_permission_name},
            users::UserDBResponse,
        },
    },
    types::{CrudMethod, GroupId, PermissionId, UserId},
};
use sqlx::{Connection, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Filter for listing groups
#[derive(Debug, Clone)]
pub struct GroupFilter {
    pub skip: i64,
    pub limit: i64,
    pub filters: Filters<GroupDBResponse>,
}

impl GroupFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            filters: Filters::new(),
        }
    }

    pub fn with_filters(mut self, filters: Filters<GroupDBResponse>) -> Self {
        self.filters = filters;
        self
    }
}

pub struct Groups<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Groups<'c> {
    type CreateRequest = GroupCreateDBRequest;
    type UpdateRequest = GroupUpdateDBRequest;
    type Response = GroupDBResponse;
    type Id = GroupId;
    type Filter = GroupFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let group = sqlx::query_as::<_, GroupDBResponse>(
            r#"
            INSERT INTO groups (name, display_name, description, target_table)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(&request.display_name)
        .bind(&request.description)
        .bind(&request.target_table)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(group)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let group = sqlx::query_as::<_, GroupDBResponse>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(group)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<GroupId>) -> Result<HashMap<Self::Id, GroupDBResponse>> {
        let groups = sqlx::query_as::<_, GroupDBResponse>("SELECT * FROM groups WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(groups.into_iter().map(|g| (g.id, g)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM groups WHERE TRUE");
        filter.filters.push_where(&mut query);
        query.push(" ORDER BY groups.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let groups = query.build_query_as::<GroupDBResponse>().fetch_all(&mut *self.db).await?;

        Ok(groups)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let group = sqlx::query_as::<_, GroupDBResponse>(
            r#"
            UPDATE groups SET
                name = $2,
                display_name = $3,
                description = $4,
                target_table = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.display_name)
        .bind(&request.description)
        .bind(&request.target_table)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(group)
    }
}

impl<'c> Groups<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str) -> Result<Option<GroupDBResponse>> {
        let group = sqlx::query_as::<_, GroupDBResponse>("SELECT * FROM groups WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(group)
    }

    /// Groups matching any of `names`; unknown names are skipped
    #[instrument(skip(self, names), fields(count = names.len()), err)]
    pub async fn get_by_names(&mut self, names: &[String]) -> Result<Vec<GroupDBResponse>> {
        let groups = sqlx::query_as::<_, GroupDBResponse>("SELECT * FROM groups WHERE name = ANY($1) ORDER BY id")
            .bind(names)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(groups)
    }

    #[instrument(skip(self), err)]
    pub async fn add_user(&mut self, group_id: GroupId, user_id: UserId) -> Result<()> {
        self.extend_users(group_id, &[user_id]).await
    }

    /// Add members; existing members are skipped
    #[instrument(skip(self, user_ids), fields(count = user_ids.len()), err)]
    pub async fn extend_users(&mut self, group_id: GroupId, user_ids: &[UserId]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_groups (group_id, user_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(user_ids)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, user_ids), fields(count = user_ids.len()), err)]
    pub async fn remove_users(&mut self, group_id: GroupId, user_ids: &[UserId]) -> Result<()> {
        sqlx::query("DELETE FROM user_groups WHERE group_id = $1 AND user_id = ANY($2)")
            .bind(group_id)
            .bind(user_ids)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_users(&mut self, group_id: GroupId) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(
            r#"
            SELECT u.* FROM users u
            JOIN user_groups ug ON ug.user_id = u.id
            WHERE ug.group_id = $1
            ORDER BY u.id
            "#,
        )
        .bind(group_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }

    /// Attach permissions; ones already attached are skipped
    #[instrument(skip(self, permission_ids), fields(count = permission_ids.len()), err)]
    pub async fn extend_permissions(&mut self, group_id: GroupId, permission_ids: &[PermissionId]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_permissions (group_id, permission_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(permission_ids)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, permission_ids), fields(count = permission_ids.len()), err)]
    pub async fn remove_permissions(&mut self, group_id: GroupId, permission_ids: &[PermissionId]) -> Result<()> {
        sqlx::query("DELETE FROM group_permissions WHERE group_id = $1 AND permission_id = ANY($2)")
            .bind(group_id)
            .bind(permission_ids)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_permissions(&mut self, group_id: GroupId) -> Result<Vec<PermissionDBResponse>> {
        let permissions = sqlx::query_as::<_, PermissionDBResponse>(
            r#"
            SELECT p.* FROM permissions p
            JOIN group_permissions gp ON gp.permission_id = p.id
            WHERE gp.group_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(group_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(permissions)
    }

    /// Insert the create/read/update/delete groups for `table`, named like the matching permissions.
    ///
    /// Returns nothing when `read_{table}` already exists.
    #[instrument(skip(self), err)]
    pub async fn generate_crud_objects(&mut self, table: &str) -> Result<Vec<GroupDBResponse>> {
        if self
            .get_by_name(&format_permission_name(CrudMethod::Read, table))
            .await?
            .is_some()
        {
            debug!("CRUD groups for {table} already exist");
            return Ok(vec![]);
        }

        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(CrudMethod::ALL.len());
        for entry in crud_data_list(table, CrudKind::Group) {
            created.push(Groups::new(&mut tx).create(&entry).await?);
        }
        tx.commit().await?;

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::handlers::Permissions;
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_generate_crud_groups(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Groups::new(&mut conn);

        let created = repo.generate_crud_objects("chat_rooms").await.unwrap();
        assert_eq!(created.len(), 4);
        assert_eq!(
            created[0].description.as_deref(),
            Some("This group allows user to create the Chat_Rooms model.")
        );
        assert!(repo.generate_crud_objects("chat_rooms").await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_membership(pool: PgPool) {
        let alice = create_test_user(&pool, Role::Active).await;
        let bob = create_test_user(&pool, Role::Active).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Groups::new(&mut conn);
        let group = repo
            .create(&GroupCreateDBRequest {
                name: "moderators".to_string(),
                display_name: None,
                description: None,
                target_table: None,
            })
            .await
            .unwrap();

        repo.add_user(group.id, alice.id).await.unwrap();
        repo.extend_users(group.id, &[alice.id, bob.id]).await.unwrap();
        assert_eq!(repo.get_users(group.id).await.unwrap().len(), 2);

        repo.remove_users(group.id, &[alice.id]).await.unwrap();
        let users = repo.get_users(group.id).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, bob.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_group_permissions(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let permissions = Permissions::new(&mut conn).generate_crud_objects("users").await.unwrap();
        let ids: Vec<_> = permissions.iter().map(|p| p.id).collect();

        let mut repo = Groups::new(&mut conn);
        let group = repo.generate_crud_objects("users").await.unwrap().remove(0);

        repo.extend_permissions(group.id, &ids).await.unwrap();
        repo.extend_permissions(group.id, &ids[..1]).await.unwrap();
        assert_eq!(repo.get_permissions(group.id).await.unwrap().len(), 4);

        repo.remove_permissions(group.id, &ids[1..]).await.unwrap();
        assert_eq!(repo.get_permissions(group.id).await.unwrap().len(), 1);

        let filters = Filters::new().add("name__startswith", "create").unwrap();
        let listed = repo.list(&GroupFilter::new(0, 100).with_filters(filters)).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
