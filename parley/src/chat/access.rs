//! Access guards for chat routes, resolved from the `room_id` / `message_id` path parameters.

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use serde::Deserialize;
use sqlx::PgConnection;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    db::{
        errors::DbError,
        handlers::{ChatMessages, ChatRooms, Repository},
        models::chat::{ChatMessageDBResponse, ChatRoomDBResponse},
    },
    errors::{Error, Result},
    types::{MessageId, RoomId},
};

pub const INSUFFICIENT_RIGHTS: &str = "Insufficient rights to carry out this action";

#[derive(Debug, Deserialize)]
struct RoomPath {
    room_id: RoomId,
}

#[derive(Debug, Deserialize)]
struct MessagePath {
    room_id: RoomId,
    message_id: MessageId,
}

async fn path<T>(parts: &mut Parts, state: &AppState) -> Result<T>
where
    T: serde::de::DeserializeOwned + Send,
{
    Path::<T>::from_request_parts(parts, state)
        .await
        .map(|Path(p)| p)
        .map_err(|e| Error::bad_request(e.body_text()))
}

async fn load_room(conn: &mut PgConnection, room_id: RoomId) -> Result<ChatRoomDBResponse> {
    ChatRooms::new(conn)
        .get_by_id(room_id)
        .await?
        .ok_or_else(|| Error::not_found("Room not found."))
}

async fn load_message(conn: &mut PgConnection, room_id: RoomId, message_id: MessageId) -> Result<ChatMessageDBResponse> {
    ChatMessages::new(conn)
        .get_by_id(message_id)
        .await?
        .filter(|m| m.room_id == Some(room_id))
        .ok_or_else(|| Error::not_found("Message not found."))
}

/// Admin, owner or member of the room. Also used by the chat socket's room switch.
pub async fn can_access_room(conn: &mut PgConnection, user: &CurrentUser, room: &ChatRoomDBResponse) -> Result<bool> {
    if user.is_admin() || room.owner_id == Some(user.id) {
        return Ok(true);
    }
    Ok(ChatRooms::new(conn).is_member(room.id, user.id).await?)
}

fn ensure(allowed: bool) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(Error::forbidden(INSUFFICIENT_RIGHTS))
    }
}

/// Read and post in a room
#[derive(Debug, Clone)]
pub struct ChatRoomAccess {
    pub user: CurrentUser,
    pub room: ChatRoomDBResponse,
}

impl FromRequestParts<AppState> for ChatRoomAccess {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let RoomPath { room_id } = path(parts, state).await?;

        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let room = load_room(&mut conn, room_id).await?;
        ensure(can_access_room(&mut conn, &user, &room).await?)?;

        Ok(Self { user, room })
    }
}

/// Delete a room or manage its members
#[derive(Debug, Clone)]
pub struct ChatRoomEditAccess {
    pub user: CurrentUser,
    pub room: ChatRoomDBResponse,
}

impl FromRequestParts<AppState> for ChatRoomEditAccess {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let RoomPath { room_id } = path(parts, state).await?;

        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let room = load_room(&mut conn, room_id).await?;
        ensure(user.is_admin() || room.owner_id == Some(user.id))?;

        Ok(Self { user, room })
    }
}

/// See a single message: admins, the room owner and the author
#[derive(Debug, Clone)]
pub struct ChatMessageAccess {
    pub user: CurrentUser,
    pub room: ChatRoomDBResponse,
    pub message: ChatMessageDBResponse,
}

impl FromRequestParts<AppState> for ChatMessageAccess {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let MessagePath { room_id, message_id } = path(parts, state).await?;

        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let room = load_room(&mut conn, room_id).await?;
        let message = load_message(&mut conn, room_id, message_id).await?;
        ensure(user.is_admin() || room.owner_id == Some(user.id) || message.author_id == Some(user.id))?;

        Ok(Self { user, room, message })
    }
}

/// Delete a message: admins and the author
#[derive(Debug, Clone)]
pub struct ChatMessageDeleteAccess {
    pub user: CurrentUser,
    pub message: ChatMessageDBResponse,
}

impl FromRequestParts<AppState> for ChatMessageDeleteAccess {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let MessagePath { room_id, message_id } = path(parts, state).await?;

        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        load_room(&mut conn, room_id).await?;
        let message = load_message(&mut conn, room_id, message_id).await?;
        ensure(user.is_admin() || message.author_id == Some(user.id))?;

        Ok(Self { user, message })
    }
}
