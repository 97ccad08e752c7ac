use crate::api::models::chat::{
    ChatMessageCreate, ChatMessageResponse, ChatRoomCreate, ChatRoomResponse, ListMessagesQuery, ListRoomsQuery,
};
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::{UserList, UserResponse};
use crate::auth::permissions::{ActiveAccess, AdminAccess};
use crate::chat::access::{ChatMessageAccess, ChatMessageDeleteAccess, ChatRoomAccess, ChatRoomEditAccess};
use crate::chat::hub::room_channel;
use crate::db::errors::DbError;
use crate::db::handlers::{ChatMessages, ChatRooms, Repository, Users, chat_rooms::ChatRoomFilter};
use crate::db::models::chat::{ChatMessageCreateDBRequest, ChatRoomCreateDBRequest};
use crate::errors::{Error, Result};
use crate::{AppState, types::RoomId};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use tracing::debug;

#[utoipa::path(
    get,
    path = "/chat/rooms",
    tag = "chat",
    summary = "List rooms",
    params(ListRoomsQuery),
    responses(
        (status = 200, description = "Rooms, oldest first", body = PaginatedResponse<ChatRoomResponse>),
        (status = 403, description = "Admins only"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_rooms(
    State(state): State<AppState>,
    _: AdminAccess,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<PaginatedResponse<ChatRoomResponse>>> {
    let (offset, limit) = query.pagination.params();
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut rooms = ChatRooms::new(&mut conn);
    let data = rooms.list(&ChatRoomFilter::new(offset, limit)).await?;
    let total = rooms.count().await?;

    Ok(Json(PaginatedResponse::new(
        data.into_iter().map(Into::into).collect(),
        total,
        &query.pagination,
    )))
}

#[utoipa::path(
    post,
    path = "/chat/rooms",
    tag = "chat",
    summary = "Create room",
    description = "The caller owns the new room and is its first member.",
    request_body = ChatRoomCreate,
    responses(
        (status = 201, description = "Room created", body = ChatRoomResponse),
        (status = 409, description = "The caller already owns a room with this name"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_room(
    State(state): State<AppState>,
    ActiveAccess(user): ActiveAccess,
    Json(create): Json<ChatRoomCreate>,
) -> Result<(StatusCode, Json<ChatRoomResponse>)> {
    if create.name.trim().is_empty() {
        return Err(Error::bad_request("Room name cannot be empty."));
    }
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let room = ChatRooms::new(&mut conn)
        .create(&ChatRoomCreateDBRequest {
            name: create.name,
            owner_id: user.id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(room.into())))
}

#[utoipa::path(
    delete,
    path = "/chat/rooms/{room_id}",
    tag = "chat",
    summary = "Delete room",
    params(("room_id" = i64, Path, description = "Room ID")),
    responses(
        (status = 204, description = "Room deleted"),
        (status = 403, description = "Only the owner or an admin"),
        (status = 404, description = "Room not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_room(State(state): State<AppState>, access: ChatRoomEditAccess) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    ChatRooms::new(&mut conn).delete(access.room.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_members(state: &AppState, room_id: RoomId, usernames: &[String], add: bool) -> Result<Json<Vec<UserResponse>>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    let user_ids: Vec<_> = Users::new(&mut tx)
        .get_by_usernames(usernames)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();

    let mut rooms = ChatRooms::new(&mut tx);
    if add {
        rooms.extend_members(room_id, &user_ids).await?;
    } else {
        rooms.remove_members(room_id, &user_ids).await?;
    }
    let members = rooms.members(room_id).await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(members.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    patch,
    path = "/chat/rooms/{room_id}/members/add",
    tag = "chat",
    summary = "Add room members",
    request_body = UserList,
    params(("room_id" = i64, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room members", body = Vec<UserResponse>),
        (status = 403, description = "Only the owner or an admin"),
        (status = 404, description = "Room not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_members(
    State(state): State<AppState>,
    access: ChatRoomEditAccess,
    Json(list): Json<UserList>,
) -> Result<Json<Vec<UserResponse>>> {
    change_members(&state, access.room.id, &list.users, true).await
}

#[utoipa::path(
    patch,
    path = "/chat/rooms/{room_id}/members/remove",
    tag = "chat",
    summary = "Remove room members",
    request_body = UserList,
    params(("room_id" = i64, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room members", body = Vec<UserResponse>),
        (status = 403, description = "Only the owner or an admin"),
        (status = 404, description = "Room not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_members(
    State(state): State<AppState>,
    access: ChatRoomEditAccess,
    Json(list): Json<UserList>,
) -> Result<Json<Vec<UserResponse>>> {
    change_members(&state, access.room.id, &list.users, false).await
}

#[utoipa::path(
    get,
    path = "/chat/rooms/{room_id}/messages",
    tag = "chat",
    summary = "List room messages",
    params(("room_id" = i64, Path, description = "Room ID"), ListMessagesQuery),
    responses(
        (status = 200, description = "Messages, oldest first", body = PaginatedResponse<ChatMessageResponse>),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Room not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_messages(
    State(state): State<AppState>,
    access: ChatRoomAccess,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<PaginatedResponse<ChatMessageResponse>>> {
    let (offset, limit) = query.pagination.params();
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut messages = ChatMessages::new(&mut conn);
    let data = messages.list_for_room(access.room.id, offset, limit).await?;
    let total = messages.count_for_room(access.room.id).await?;

    Ok(Json(PaginatedResponse::new(
        data.into_iter().map(Into::into).collect(),
        total,
        &query.pagination,
    )))
}

#[utoipa::path(
    post,
    path = "/chat/rooms/{room_id}/messages",
    tag = "chat",
    summary = "Post a message",
    description = "The message is stored and relayed to sockets watching the room.",
    request_body = ChatMessageCreate,
    params(("room_id" = i64, Path, description = "Room ID")),
    responses(
        (status = 201, description = "Message posted", body = ChatMessageResponse),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Room not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn post_message(
    State(state): State<AppState>,
    access: ChatRoomAccess,
    Json(create): Json<ChatMessageCreate>,
) -> Result<(StatusCode, Json<ChatMessageResponse>)> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let message: ChatMessageResponse = ChatMessages::new(&mut conn)
        .create(&ChatMessageCreateDBRequest {
            content: create.content,
            author_id: access.user.id,
            room_id: access.room.id,
        })
        .await?
        .into();

    let delivered = state.hub.publish(&room_channel(&access.room.name), message.clone());
    debug!(room_id = access.room.id, delivered, "Message published");

    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    get,
    path = "/chat/rooms/{room_id}/messages/{message_id}",
    tag = "chat",
    summary = "Get a message",
    params(
        ("room_id" = i64, Path, description = "Room ID"),
        ("message_id" = i64, Path, description = "Message ID"),
    ),
    responses(
        (status = 200, description = "Message", body = ChatMessageResponse),
        (status = 403, description = "Only the author, the room owner or an admin"),
        (status = 404, description = "Room or message not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_message(access: ChatMessageAccess) -> Json<ChatMessageResponse> {
    Json(access.message.into())
}

#[utoipa::path(
    delete,
    path = "/chat/rooms/{room_id}/messages/{message_id}",
    tag = "chat",
    summary = "Delete a message",
    params(
        ("room_id" = i64, Path, description = "Room ID"),
        ("message_id" = i64, Path, description = "Message ID"),
    ),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 403, description = "Only the author or an admin"),
        (status = 404, description = "Room or message not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_message(State(state): State<AppState>, access: ChatMessageDeleteAccess) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    ChatMessages::new(&mut conn).delete(access.message.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            chat::{ChatMessageResponse, ChatRoomResponse},
            pagination::PaginatedResponse,
            users::{Role, UserResponse},
        },
        chat::hub::room_channel,
        test_utils::*,
    };
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_room_makes_owner_a_member(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool, Role::Active).await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &owner).await;

        let response = app
            .post("/chat/rooms")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "general"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let room: ChatRoomResponse = response.json();
        assert_eq!(room.owner_id, Some(owner.id));

        let response = app
            .post("/chat/rooms")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "general"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let members: Vec<UserResponse> = app
            .patch(&format!("/chat/rooms/{}/members/add", room.id))
            .add_header(name, value)
            .json(&json!({"users": []}))
            .await
            .json();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, owner.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_rooms_is_admin_only(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let admin = create_test_admin_user(&pool).await;
        let user = create_test_user(&pool, Role::Active).await;
        create_test_room(&pool, &user, "first").await;
        create_test_room(&pool, &user, "second").await;

        let (name, value) = bearer_header(&pool, &config, &user).await;
        app.get("/chat/rooms").add_header(name, value).await.assert_status_forbidden();

        let (name, value) = bearer_header(&pool, &config, &admin).await;
        let page: PaginatedResponse<ChatRoomResponse> =
            app.get("/chat/rooms?limit=1").add_header(name, value).await.json();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].name, "first");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_membership_controls_message_access(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let owner = create_test_user(&pool, Role::Active).await;
        let guest = create_test_user(&pool, Role::Active).await;
        let room = create_test_room(&pool, &owner, "general").await;
        let (owner_name, owner_value) = bearer_header(&pool, &config, &owner).await;
        let (guest_name, guest_value) = bearer_header(&pool, &config, &guest).await;

        let response = app
            .get(&format!("/chat/rooms/{}/messages", room.id))
            .add_header(guest_name.clone(), guest_value.clone())
            .await;
        response.assert_status_forbidden();
        response.assert_json(&json!({"detail": "Insufficient rights to carry out this action"}));

        // Only the owner edits membership
        app.patch(&format!("/chat/rooms/{}/members/add", room.id))
            .add_header(guest_name.clone(), guest_value.clone())
            .json(&json!({"users": [guest.username]}))
            .await
            .assert_status_forbidden();

        let members: Vec<UserResponse> = app
            .patch(&format!("/chat/rooms/{}/members/add", room.id))
            .add_header(owner_name.clone(), owner_value.clone())
            .json(&json!({"users": [guest.username]}))
            .await
            .json();
        assert_eq!(members.len(), 2);

        let response = app
            .post(&format!("/chat/rooms/{}/messages", room.id))
            .add_header(guest_name.clone(), guest_value.clone())
            .json(&json!({"content": "hello"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let message: ChatMessageResponse = response.json();
        assert_eq!(message.author.as_deref(), Some(guest.username.as_str()));
        assert_eq!(message.room_id, Some(room.id));

        let page: PaginatedResponse<ChatMessageResponse> = app
            .get(&format!("/chat/rooms/{}/messages", room.id))
            .add_header(owner_name.clone(), owner_value.clone())
            .await
            .json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0], message);

        // The room owner may read the message but only its author deletes it
        app.get(&format!("/chat/rooms/{}/messages/{}", room.id, message.id))
            .add_header(owner_name.clone(), owner_value.clone())
            .await
            .assert_status_ok();
        app.delete(&format!("/chat/rooms/{}/messages/{}", room.id, message.id))
            .add_header(owner_name.clone(), owner_value.clone())
            .await
            .assert_status_forbidden();
        app.delete(&format!("/chat/rooms/{}/messages/{}", room.id, message.id))
            .add_header(guest_name.clone(), guest_value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let members: Vec<UserResponse> = app
            .patch(&format!("/chat/rooms/{}/members/remove", room.id))
            .add_header(owner_name, owner_value)
            .json(&json!({"users": [guest.username]}))
            .await
            .json();
        assert_eq!(members.len(), 1);

        app.get(&format!("/chat/rooms/{}/messages", room.id))
            .add_header(guest_name, guest_value)
            .await
            .assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_room_and_message(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let owner = create_test_user(&pool, Role::Active).await;
        let room = create_test_room(&pool, &owner, "general").await;
        let (name, value) = bearer_header(&pool, &create_test_config(), &owner).await;

        let response = app
            .get("/chat/rooms/999999/messages")
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_not_found();
        response.assert_json(&json!({"detail": "Room not found."}));

        let response = app
            .delete(&format!("/chat/rooms/{}/messages/999999", room.id))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_not_found();
        response.assert_json(&json!({"detail": "Message not found."}));

        app.delete(&format!("/chat/rooms/{}", room.id))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);
        app.delete(&format!("/chat/rooms/{}", room.id))
            .add_header(name, value)
            .await
            .assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_posted_message_reaches_hub(pool: PgPool) {
        let state = create_test_state(pool.clone());
        let app = create_test_app_with_state(state.clone());
        let owner = create_test_user(&pool, Role::Active).await;
        let room = create_test_room(&pool, &owner, "general").await;
        let (name, value) = bearer_header(&pool, &state.config, &owner).await;

        let mut rx = state.hub.subscribe(&room_channel(&room.name));
        let message: ChatMessageResponse = app
            .post(&format!("/chat/rooms/{}/messages", room.id))
            .add_header(name, value)
            .json(&json!({"content": "hello"}))
            .await
            .json();

        assert_eq!(rx.recv().await.unwrap(), message);
    }
}
