//! Database repository for permissions.

use crate::{
    db::{
        errors::{DbError, Result},
        filter::Filters,
        handlers::repository::Repository,
        models::permissions::{
            CrudKind, PermissionCreateDBRequest, PermissionDBResponse, PermissionUpdateDBRequest, crud_data_list,
            format_permission_name,
        },
    },
    types::{CrudMethod, PermissionId},
};
use sqlx::{Connection, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Filter for listing permissions
#[derive(Debug, Clone)]
pub struct PermissionFilter {
    pub skip: i64,
    pub limit: i64,
    pub filters: Filters<PermissionDBResponse>,
}

impl PermissionFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            filters: Filters::new(),
        }
    }

    pub fn with_filters(mut self, filters: Filters<PermissionDBResponse>) -> Self {
        self.filters = filters;
        self
    }
}

pub struct Permissions<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Permissions<'c> {
    type CreateRequest = PermissionCreateDBRequest;
    type UpdateRequest = PermissionUpdateDBRequest;
    type Response = PermissionDBResponse;
    type Id = PermissionId;
    type Filter = PermissionFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let permission = sqlx::query_as::<_, PermissionDBResponse>(
            r#"
            INSERT INTO permissions (name, display_name, description, target_table)
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

        Ok(permission)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let permission = sqlx::query_as::<_, PermissionDBResponse>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(permission)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<PermissionId>) -> Result<HashMap<Self::Id, PermissionDBResponse>> {
        let permissions = sqlx::query_as::<_, PermissionDBResponse>("SELECT * FROM permissions WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(permissions.into_iter().map(|p| (p.id, p)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM permissions WHERE TRUE");
        filter.filters.push_where(&mut query);
        query.push(" ORDER BY permissions.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let permissions = query
            .build_query_as::<PermissionDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(permissions)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let permission = sqlx::query_as::<_, PermissionDBResponse>(
            r#"
            UPDATE permissions SET
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

        Ok(permission)
    }
}

impl<'c> Permissions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str) -> Result<Option<PermissionDBResponse>> {
        let permission = sqlx::query_as::<_, PermissionDBResponse>("SELECT * FROM permissions WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(permission)
    }

    /// Permissions matching any of `names`; unknown names are skipped
    #[instrument(skip(self, names), fields(count = names.len()), err)]
    pub async fn get_by_names(&mut self, names: &[String]) -> Result<Vec<PermissionDBResponse>> {
        let permissions =
            sqlx::query_as::<_, PermissionDBResponse>("SELECT * FROM permissions WHERE name = ANY($1) ORDER BY id")
                .bind(names)
                .fetch_all(&mut *self.db)
                .await?;

        Ok(permissions)
    }

    /// Insert the create/read/update/delete permissions for `table`.
    ///
    /// Returns nothing when `read_{table}` already exists, so running it on every startup is safe.
    #[instrument(skip(self), err)]
    pub async fn generate_crud_objects(&mut self, table: &str) -> Result<Vec<PermissionDBResponse>> {
        if self
            .get_by_name(&format_permission_name(CrudMethod::Read, table))
            .await?
            .is_some()
        {
            debug!("CRUD permissions for {table} already exist");
            return Ok(vec![]);
        }

        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(CrudMethod::ALL.len());
        for entry in crud_data_list(table, CrudKind::Permission) {
            created.push(Permissions::new(&mut tx).create(&entry).await?);
        }
        tx.commit().await?;

        Ok(created)
    }
}
