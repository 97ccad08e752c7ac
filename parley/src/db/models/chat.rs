//! Database models for chat rooms and messages.

use crate::db::filter::{Field, Filterable};
use crate::types::{MessageId, RoomId, UserId, tables};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ChatRoomCreateDBRequest {
    pub name: String,
    pub owner_id: UserId,
}

#[derive(Debug, Clone)]
pub struct ChatRoomUpdateDBRequest {
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatRoomDBResponse {
    pub id: RoomId,
    pub name: String,
    pub owner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Filterable for ChatRoomDBResponse {
    const MODEL: &'static str = "ChatRoom";
    const TABLE: &'static str = tables::CHAT_ROOMS;
    const FIELDS: &'static [Field] = &[
        Field::int("id"),
        Field::text("name"),
        Field::int("owner_id"),
        Field::timestamp("created_at"),
        Field::timestamp("updated_at"),
    ];
}

#[derive(Debug, Clone)]
pub struct ChatMessageCreateDBRequest {
    pub content: String,
    pub author_id: UserId,
    pub room_id: RoomId,
}

/// A message joined with its author's username
#[derive(Debug, Clone, FromRow)]
pub struct ChatMessageDBResponse {
    pub id: MessageId,
    pub content: String,
    pub author_id: Option<UserId>,
    pub author: Option<String>,
    pub room_id: Option<RoomId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
