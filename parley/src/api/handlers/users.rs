use crate::api::models::groups::GroupResponse;
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::permissions::{PermissionList, PermissionResponse};
use crate::api::models::users::{CurrentUser, ListUsersQuery, Role, UserCreate, UserReplace, UserResponse, UserUpdate};
use crate::auth::current_user::MaybeUser;
use crate::auth::password;
use crate::auth::permissions::{AdminAccess, RequiresPermission, policy};
use crate::db::errors::DbError;
use crate::db::handlers::{Permissions, Repository, Users, users::UserFilter};
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest};
use crate::errors::{Error, Result};
use crate::{AppState, types::UserId};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::PgConnection;

const PROHIBITED_FOR_USER: &str = "this action is prohibited with this user currently logged in";

async fn load_user(conn: &mut PgConnection, id: UserId) -> Result<UserDBResponse> {
    Users::new(conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::not_found("User not found."))
}

/// Non-admins may only act on their own account
fn ensure_self_or_admin(author: &CurrentUser, target: UserId) -> Result<()> {
    if author.is_admin() || author.id == target {
        Ok(())
    } else {
        Err(Error::forbidden(PROHIBITED_FOR_USER))
    }
}

fn is_unchanged(request: &UserUpdateDBRequest, stored: &UserDBResponse) -> bool {
    request.password_hash.is_none()
        && request.username == stored.username
        && request.first_name == stored.first_name
        && request.last_name == stored.last_name
        && request.email == stored.email
        && request.address == stored.address
        && request.age == stored.age
        && request.role == stored.role
        && request.status == stored.status
}

async fn apply_update(
    conn: &mut PgConnection,
    stored: UserDBResponse,
    request: UserUpdateDBRequest,
) -> Result<Json<UserResponse>> {
    if is_unchanged(&request, &stored) {
        return Ok(Json(stored.into()));
    }
    let user = Users::new(conn).update(stored.id, &request).await.map_err(|e| match e {
        DbError::NotFound => Error::not_found("User not found."),
        other => other.into(),
    })?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users", body = PaginatedResponse<UserResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (offset, limit) = query.pagination.params();
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut conn);

    let users = repo.list(&UserFilter::new(offset, limit)).await?;
    let total = repo.count().await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
        total,
        &query.pagination,
    )))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Username or email is taken"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    MaybeUser(author): MaybeUser,
    Json(create): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    // Only admins hand out roles
    let role = match author {
        Some(author) if author.is_admin() => create.role,
        _ => Role::Active,
    };
    let password_hash = password::hash_password(create.password).await?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username: create.username,
            first_name: create.first_name,
            last_name: create.last_name,
            email: create.email,
            address: create.address,
            age: create.age,
            password_hash: Some(password_hash),
            role,
            status: Default::default(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    summary = "Get user",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserResponse),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    Ok(Json(load_user(&mut conn, id).await?.into()))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    summary = "Replace user",
    request_body = UserReplace,
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Not allowed to update this user"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn replace_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    guard: RequiresPermission<policy::UpdateUsers>,
    Json(mut replace): Json<UserReplace>,
) -> Result<Json<UserResponse>> {
    let author = guard.into_user();
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let stored = load_user(&mut conn, id).await?;
    ensure_self_or_admin(&author, id)?;
    replace.role_guard(&stored, &author);

    let password_hash = match replace.password {
        Some(password) => Some(password::hash_password(password).await?),
        None => None,
    };
    let request = UserUpdateDBRequest {
        username: replace.username,
        first_name: replace.first_name,
        last_name: replace.last_name,
        email: replace.email,
        address: replace.address,
        age: replace.age,
        password_hash,
        role: replace.role,
        status: replace.status,
    };
    apply_update(&mut conn, stored, request).await
}

#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    summary = "Update user",
    request_body = UserUpdate,
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Every field given, use PUT"),
        (status = 403, description = "Not allowed to update this user"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    guard: RequiresPermission<policy::UpdateUsers>,
    Json(mut update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let author = guard.into_user();
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let stored = load_user(&mut conn, id).await?;
    ensure_self_or_admin(&author, id)?;
    if update.sets_every_field() {
        return Err(Error::bad_request("Cannot use PATCH to update entire object, use PUT instead."));
    }
    update.role_guard(&stored, &author);

    let mut request = UserUpdateDBRequest::from(&stored);
    if let Some(username) = update.username {
        request.username = username;
    }
    if let Some(first_name) = update.first_name {
        request.first_name = first_name;
    }
    if let Some(last_name) = update.last_name {
        request.last_name = last_name;
    }
    if update.email.is_some() {
        request.email = update.email;
    }
    if update.address.is_some() {
        request.address = update.address;
    }
    if update.age.is_some() {
        request.age = update.age;
    }
    if let Some(role) = update.role {
        request.role = role;
    }
    if let Some(password) = update.password {
        request.password_hash = Some(password::hash_password(password).await?);
    }
    apply_update(&mut conn, stored, request).await
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    summary = "Delete user",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Not allowed to delete this user"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    guard: RequiresPermission<policy::DeleteUsers>,
) -> Result<StatusCode> {
    let author = guard.into_user();
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    load_user(&mut conn, id).await?;
    ensure_self_or_admin(&author, id)?;

    if Users::new(&mut conn).delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found("User not found."))
    }
}

#[utoipa::path(
    get,
    path = "/users/permissions",
    tag = "users",
    summary = "Own permissions",
    responses((status = 200, description = "Permissions held directly", body = Vec<PermissionResponse>)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_own_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<PermissionResponse>>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let permissions = Users::new(&mut conn).get_permissions(user.id).await?;
    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/users/groups",
    tag = "users",
    summary = "Own groups",
    responses((status = 200, description = "Groups the user belongs to", body = Vec<GroupResponse>)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_own_groups(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<GroupResponse>>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let groups = Users::new(&mut conn).get_groups(user.id).await?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/users/{id}/permissions",
    tag = "users",
    summary = "User permissions",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Permissions held directly", body = Vec<PermissionResponse>),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user_permissions(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    _: AdminAccess,
) -> Result<Json<Vec<PermissionResponse>>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    load_user(&mut conn, id).await?;
    let permissions = Users::new(&mut conn).get_permissions(id).await?;
    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/users/{id}/groups",
    tag = "users",
    summary = "User groups",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Groups the user belongs to", body = Vec<GroupResponse>),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user_groups(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    _: AdminAccess,
) -> Result<Json<Vec<GroupResponse>>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    load_user(&mut conn, id).await?;
    let groups = Users::new(&mut conn).get_groups(id).await?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/users/{id}/permissions/add",
    tag = "users",
    summary = "Grant permissions",
    request_body = PermissionList,
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Permissions now held directly", body = Vec<PermissionResponse>),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_user_permissions(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    _: AdminAccess,
    Json(grant): Json<PermissionList>,
) -> Result<Json<Vec<PermissionResponse>>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    load_user(&mut tx, id).await?;

    let ids: Vec<_> = Permissions::new(&mut tx)
        .get_by_names(&grant.permissions)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    let mut users = Users::new(&mut tx);
    users.extend_permissions(id, &ids).await?;
    let permissions = users.get_permissions(id).await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(permissions.into_iter().map(Into::into).collect()))
}
