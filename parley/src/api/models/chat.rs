//! API request/response models for chat rooms and messages.

use super::pagination::Pagination;
use crate::db::models::chat::{ChatMessageDBResponse, ChatRoomDBResponse};
use crate::types::{MessageId, RoomId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRoomCreate {
    #[schema(example = "general")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRoomResponse {
    pub id: RoomId,
    pub name: String,
    pub owner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatRoomDBResponse> for ChatRoomResponse {
    fn from(db: ChatRoomDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            owner_id: db.owner_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessageCreate {
    pub content: String,
}

/// A persisted message. This is also the payload relayed to chat sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessageResponse {
    pub id: MessageId,
    pub content: String,
    pub author_id: Option<UserId>,
    /// Author's username, absent once the author is deleted
    pub author: Option<String>,
    pub room_id: Option<RoomId>,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessageDBResponse> for ChatMessageResponse {
    fn from(db: ChatMessageDBResponse) -> Self {
        Self {
            id: db.id,
            content: db.content,
            author_id: db.author_id,
            author: db.author,
            room_id: db.room_id,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListRoomsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListMessagesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

/// Query parameters for the room search on the web chat page
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct RoomFilterQuery {
    /// Room name prefix, case-insensitive
    pub room_name: Option<String>,
}

/// The web chat page: the session user and the rooms they can open.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatPageResponse {
    pub username: String,
    pub rooms: Vec<ChatRoomResponse>,
}
