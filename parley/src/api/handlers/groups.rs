use crate::api::models::groups::{GroupCreate, GroupResponse, GroupUpdate, ListGroupsQuery, is_unchanged};
use crate::api::models::permissions::{PermissionList, PermissionResponse};
use crate::api::models::users::{UserList, UserResponse};
use crate::auth::permissions::AdminAccess;
use crate::db::errors::DbError;
use crate::db::filter::Filters;
use crate::db::handlers::{Groups, Permissions, Repository, Users, groups::GroupFilter};
use crate::db::models::groups::{GroupDBResponse, GroupUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::{AppState, types::GroupId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;

async fn load_group(conn: &mut PgConnection, id: GroupId) -> Result<GroupDBResponse> {
    Groups::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("Group not found."))
}

async fn apply_update(
    conn: &mut PgConnection,
    stored: GroupDBResponse,
    request: GroupUpdateDBRequest,
) -> Result<Json<GroupResponse>> {
    if is_unchanged(&request, &stored) {
        return Ok(Json(stored.into()));
    }
    let group = Groups::new(conn).update(stored.id, &request).await?;
    Ok(Json(group.into()))
}

#[utoipa::path(
    get,
    path = "/authorizations/groups",
    tag = "authorizations",
    summary = "List groups",
    params(ListGroupsQuery),
    responses(
        (status = 200, description = "Groups", body = Vec<GroupResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    _: AdminAccess,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Vec<GroupResponse>>> {
    let (offset, limit) = query.pagination.params();
    let mut filters = Filters::new();
    if let Some(name) = query.name {
        filters = filters.add("name__startswith", name)?;
    }
    if let Some(target_table) = query.target_table {
        filters = filters.add("target_table", target_table)?;
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let groups = Groups::new(&mut conn)
        .list(&GroupFilter::new(offset, limit).with_filters(filters))
        .await?;

    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/authorizations/groups",
    tag = "authorizations",
    summary = "Create group",
    request_body = GroupCreate,
    responses(
        (status = 201, description = "Group created", body = GroupResponse),
        (status = 409, description = "Name is taken"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_group(
    State(state): State<AppState>,
    _: AdminAccess,
    Json(create): Json<GroupCreate>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let group = Groups::new(&mut conn).create(&create.into()).await?;
    Ok((StatusCode::CREATED, Json(group.into())))
}

#[utoipa::path(
    put,
    path = "/authorizations/groups/{id}",
    tag = "authorizations",
    summary = "Replace group",
    request_body = GroupCreate,
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group updated", body = GroupResponse),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn replace_group(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: AdminAccess,
    Json(replace): Json<GroupCreate>,
) -> Result<Json<GroupResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let stored = load_group(&mut conn, id).await?;
    apply_update(&mut conn, stored, replace.into()).await
}

#[utoipa::path(
    patch,
    path = "/authorizations/groups/{id}",
    tag = "authorizations",
    summary = "Update group",
    request_body = GroupUpdate,
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group updated", body = GroupResponse),
        (status = 400, description = "Every field given, use PUT"),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: AdminAccess,
    Json(update): Json<GroupUpdate>,
) -> Result<Json<GroupResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let stored = load_group(&mut conn, id).await?;
    if update.sets_every_field() {
        return Err(Error::bad_request("Cannot use PATCH to update entire registry, use PUT instead."));
    }
    let request = update.merge(&stored.name, &stored.display_name, &stored.description, &stored.target_table);
    apply_update(&mut conn, stored, request).await
}

#[utoipa::path(
    delete,
    path = "/authorizations/groups/{id}",
    tag = "authorizations",
    summary = "Delete group",
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_group(State(state): State<AppState>, Path(id): Path<GroupId>, _: AdminAccess) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    if Groups::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("Group not found."))
    }
}

/// Members are added or removed, then the full member list is returned.
async fn change_members(state: &AppState, id: GroupId, usernames: &[String], add: bool) -> Result<Json<Vec<UserResponse>>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    load_group(&mut tx, id).await?;

    let user_ids: Vec<_> = Users::new(&mut tx)
        .get_by_usernames(usernames)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();
    let mut groups = Groups::new(&mut tx);
    if add {
        groups.extend_users(id, &user_ids).await?;
    } else {
        groups.remove_users(id, &user_ids).await?;
    }
    let users = groups.get_users(id).await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(users.into_iter().map(Into::into).collect()))
}

async fn change_permissions(
    state: &AppState,
    id: GroupId,
    names: &[String],
    add: bool,
) -> Result<Json<Vec<PermissionResponse>>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    load_group(&mut tx, id).await?;

    let permission_ids: Vec<_> = Permissions::new(&mut tx)
        .get_by_names(names)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let mut groups = Groups::new(&mut tx);
    if add {
        groups.extend_permissions(id, &permission_ids).await?;
    } else {
        groups.remove_permissions(id, &permission_ids).await?;
    }
    let permissions = groups.get_permissions(id).await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    patch,
    path = "/authorizations/groups/{id}/users/add",
    tag = "authorizations",
    summary = "Add users to group",
    request_body = UserList,
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group members", body = Vec<UserResponse>),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_group_users(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: AdminAccess,
    Json(list): Json<UserList>,
) -> Result<Json<Vec<UserResponse>>> {
    change_members(&state, id, &list.users, true).await
}

#[utoipa::path(
    patch,
    path = "/authorizations/groups/{id}/users/remove",
    tag = "authorizations",
    summary = "Remove users from group",
    request_body = UserList,
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group members", body = Vec<UserResponse>),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_group_users(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: AdminAccess,
    Json(list): Json<UserList>,
) -> Result<Json<Vec<UserResponse>>> {
    change_members(&state, id, &list.users, false).await
}

#[utoipa::path(
    patch,
    path = "/authorizations/groups/{id}/permissions/add",
    tag = "authorizations",
    summary = "Attach permissions to group",
    request_body = PermissionList,
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group permissions", body = Vec<PermissionResponse>),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_group_permissions(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: AdminAccess,
    Json(list): Json<PermissionList>,
) -> Result<Json<Vec<PermissionResponse>>> {
    change_permissions(&state, id, &list.permissions, true).await
}

#[utoipa::path(
    patch,
    path = "/authorizations/groups/{id}/permissions/remove",
    tag = "authorizations",
    summary = "Detach permissions from group",
    request_body = PermissionList,
    params(("id" = i64, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group permissions", body = Vec<PermissionResponse>),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_group_permissions(
    State(state): State<AppState>,
    Path(id): Path<GroupId>,
    _: AdminAccess,
    Json(list): Json<PermissionList>,
) -> Result<Json<Vec<PermissionResponse>>> {
    change_permissions(&state, id, &list.permissions, false).await
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            groups::GroupResponse,
            permissions::PermissionResponse,
            users::{Role, UserResponse},
        },
        test_utils::*,
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_groups_by_prefix(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &admin).await;

        let groups: Vec<GroupResponse> = app
            .get("/authorizations/groups?name=update_")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(groups.len(), 5);
        assert!(groups.iter().all(|g| g.name.starts_with("update_")));

        let groups: Vec<GroupResponse> = app
            .get("/authorizations/groups?target_table=users")
            .add_header(name, value)
            .await
            .json();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["create_users", "read_users", "update_users", "delete_users"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_group_lifecycle(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &admin).await;

        let response = app
            .post("/authorizations/groups")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "moderators", "display_name": "Moderators"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let group: GroupResponse = response.json();

        let response = app
            .patch(&format!("/authorizations/groups/{}", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"description": "Keep the rooms tidy"}))
            .await;
        let patched: GroupResponse = response.json();
        assert_eq!(patched.display_name.as_deref(), Some("Moderators"));
        assert_eq!(patched.description.as_deref(), Some("Keep the rooms tidy"));

        let response = app
            .patch("/authorizations/groups/999999")
            .add_header(name.clone(), value.clone())
            .json(&json!({"description": "x"}))
            .await;
        response.assert_status_not_found();
        response.assert_json(&json!({"detail": "Group not found."}));

        // A missing group is reported before the full-body check
        let response = app
            .patch("/authorizations/groups/999999")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "a", "display_name": "b", "description": "c", "target_table": "d"}))
            .await;
        response.assert_status_not_found();

        app.delete(&format!("/authorizations/groups/{}", group.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_group_members_and_permissions(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool).await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &admin).await;
        let alice = create_test_user(&pool, Role::Active).await;
        let bob = create_test_user(&pool, Role::Active).await;

        let group: GroupResponse = app
            .post("/authorizations/groups")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "moderators"}))
            .await
            .json();

        let members: Vec<UserResponse> = app
            .patch(&format!("/authorizations/groups/{}/users/add", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"users": [alice.username, bob.username, "nobody"]}))
            .await
            .json();
        assert_eq!(members.len(), 2);

        let members: Vec<UserResponse> = app
            .patch(&format!("/authorizations/groups/{}/users/remove", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"users": [alice.username]}))
            .await
            .json();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, bob.username);

        let permissions: Vec<PermissionResponse> = app
            .patch(&format!("/authorizations/groups/{}/permissions/add", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"permissions": ["delete_chat_messages", "read_chat_rooms"]}))
            .await
            .json();
        assert_eq!(permissions.len(), 2);

        let permissions: Vec<PermissionResponse> = app
            .patch(&format!("/authorizations/groups/{}/permissions/remove", group.id))
            .add_header(name, value)
            .json(&json!({"permissions": ["read_chat_rooms"]}))
            .await
            .json();
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].name, "delete_chat_messages");
    }
}
