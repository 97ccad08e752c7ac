use crate::api::models::permissions::{
    ListPermissionsQuery, PermissionCreate, PermissionResponse, PermissionUpdate, is_unchanged,
};
use crate::auth::permissions::AdminAccess;
use crate::db::errors::DbError;
use crate::db::filter::Filters;
use crate::db::handlers::{Permissions, Repository, permissions::PermissionFilter};
use crate::db::models::permissions::{PermissionDBResponse, PermissionUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::{AppState, types::PermissionId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;

async fn load_permission(conn: &mut PgConnection, id: PermissionId) -> Result<PermissionDBResponse> {
    Permissions::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Permission not found."))
}

async fn apply_update(
    conn: &mut PgConnection,
    stored: PermissionDBResponse,
    request: PermissionUpdateDBRequest,
) -> Result<Json<PermissionResponse>> {
    if is_unchanged(&request, &stored) {
        return Ok(Json(stored.into()));
    }
    let permission = Permissions::new(conn).update(stored.id, &request).await?;
    Ok(Json(permission.into()))
}

#[utoipa::path(
    get,
    path = "/authorizations/permissions",
    tag = "authorizations",
    summary = "List permissions",
    params(ListPermissionsQuery),
    responses(
        (status = 200, description = "Permissions", body = Vec<PermissionResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_permissions(
    State(state): State<AppState>,
    _: AdminAccess,
    Query(query): Query<ListPermissionsQuery>,
) -> Result<Json<Vec<PermissionResponse>>> {
    let (offset, limit) = query.pagination.params();
    let mut filters = Filters::new();
    if let Some(name) = query.name {
        filters = filters.add("name", name)?;
    }
    if let Some(target_table) = query.target_table {
        filters = filters.add("target_table", target_table)?;
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let permissions = Permissions::new(&mut conn)
        .list(&PermissionFilter::new(offset, limit).with_filters(filters))
        .await?;

    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/authorizations/permissions",
    tag = "authorizations",
    summary = "Create permission",
    request_body = PermissionCreate,
    responses(
        (status = 201, description = "Permission created", body = PermissionResponse),
        (status = 409, description = "Name is taken"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_permission(
    State(state): State<AppState>,
    _: AdminAccess,
    Json(create): Json<PermissionCreate>,
) -> Result<(StatusCode, Json<PermissionResponse>)> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let permission = Permissions::new(&mut conn).create(&create.into()).await?;
    Ok((StatusCode::CREATED, Json(permission.into())))
}

#[utoipa::path(
    put,
    path = "/authorizations/permissions/{id}",
    tag = "authorizations",
    summary = "Replace permission",
    request_body = PermissionCreate,
    params(("id" = i64, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission updated", body = PermissionResponse),
        (status = 404, description = "Permission not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn replace_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
    _: AdminAccess,
    Json(replace): Json<PermissionCreate>,
) -> Result<Json<PermissionResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let stored = load_permission(&mut conn, id).await?;
    apply_update(&mut conn, stored, replace.into()).await
}

#[utoipa::path(
    patch,
    path = "/authorizations/permissions/{id}",
    tag = "authorizations",
    summary = "Update permission",
    request_body = PermissionUpdate,
    params(("id" = i64, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission updated", body = PermissionResponse),
        (status = 400, description = "Every field given, use PUT"),
        (status = 404, description = "Permission not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
    _: AdminAccess,
    Json(update): Json<PermissionUpdate>,
) -> Result<Json<PermissionResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let stored = load_permission(&mut conn, id).await?;
    if update.sets_every_field() {
        return Err(Error::bad_request("Cannot use PATCH to update entire registry, use PUT instead."));
    }
    let request = update.merge(&stored.name, &stored.display_name, &stored.description, &stored.target_table);
    apply_update(&mut conn, stored, request).await
}

#[utoipa::path(
    delete,
    path = "/authorizations/permissions/{id}",
    tag = "authorizations",
    summary = "Delete permission",
    params(("id" = i64, Path, description = "Permission ID")),
    responses(
        (status = 204, description = "Permission deleted"),
        (status = 404, description = "Permission not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
    _: AdminAccess,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    if Permissions::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Permission not found."))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{permissions::PermissionResponse, users::Role},
        test_utils::*,
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_seeded_permissions(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &admin).await;

        let all: Vec<PermissionResponse> = app
            .get("/authorizations/permissions")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(all.len(), 20);

        let rooms: Vec<PermissionResponse> = app
            .get("/authorizations/permissions?target_table=chat_rooms")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(rooms.len(), 4);
        let update = rooms.iter().find(|p| p.name == "update_chat_rooms").unwrap();
        assert_eq!(update.display_name.as_deref(), Some("Update chat_rooms"));
        assert_eq!(
            update.description.as_deref(),
            Some("This permission allows user to update the Chat_Rooms model.")
        );

        let page: Vec<PermissionResponse> = app
            .get("/authorizations/permissions?offset=18&limit=5")
            .add_header(name, value)
            .await
            .json();
        assert_eq!(page.len(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_permission_lifecycle(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &admin).await;

        let response = app
            .post("/authorizations/permissions")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "read_reports", "target_table": "reports"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: PermissionResponse = response.json();

        let response = app
            .post("/authorizations/permissions")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "read_reports"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        response.assert_json(&json!({"detail": "A permission with this name already exists"}));

        let response = app
            .patch(&format!("/authorizations/permissions/{}", created.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "a", "display_name": "b", "description": "c", "target_table": "d"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({"detail": "Cannot use PATCH to update entire registry, use PUT instead."}));

        let response = app
            .patch(&format!("/authorizations/permissions/{}", created.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"display_name": "Read reports"}))
            .await;
        response.assert_status_ok();
        let patched: PermissionResponse = response.json();
        assert_eq!(patched.display_name.as_deref(), Some("Read reports"));
        assert_eq!(patched.target_table.as_deref(), Some("reports"));

        let response = app
            .put(&format!("/authorizations/permissions/{}", created.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "read_reports"}))
            .await;
        let replaced: PermissionResponse = response.json();
        assert!(replaced.display_name.is_none());

        let response = app
            .put("/authorizations/permissions/999999")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "x"}))
            .await;
        response.assert_status_not_found();
        response.assert_json(&json!({"detail": "Permission not found."}));

        let response = app
            .patch("/authorizations/permissions/999999")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "a", "display_name": "b", "description": "c", "target_table": "d"}))
            .await;
        response.assert_status_not_found();
        response.assert_json(&json!({"detail": "Permission not found."}));

        app.delete(&format!("/authorizations/permissions/{}", created.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.delete(&format!("/authorizations/permissions/{}", created.id))
            .add_header(name, value)
            .await
            .assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admins_only(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let staff = create_test_user(&pool, Role::Staff).await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &staff).await;

        let response = app.get("/authorizations/permissions").add_header(name, value).await;
        response.assert_status_forbidden();
        response.assert_json(&json!({"detail": "Your role does not allow you to do this action"}));

        app.get("/authorizations/permissions").await.assert_status_unauthorized();
    }
}
