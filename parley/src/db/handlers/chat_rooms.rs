//! Database repository for chat rooms and their members.

use crate::{
    db::{
        errors::{DbError, Result},
        filter::{Filters, OrderBy},
        handlers::repository::Repository,
        models::{
            chat::{ChatRoomCreateDBRequest, ChatRoomDBResponse, ChatRoomUpdateDBRequest},
            users::UserDBResponse,
        },
    },
    types::{RoomId, UserId},
};
use sqlx::{Connection, PgConnection, QueryBuilder};
use std::collections::HashMap;
use tracing::instrument;

/// Filter for listing rooms
#[derive(Debug, Clone)]
pub struct ChatRoomFilter {
    pub skip: i64,
    pub limit: i64,
    pub filters: Filters<ChatRoomDBResponse>,
}

impl ChatRoomFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            filters: Filters::new(),
        }
    }

    pub fn with_filters(mut self, filters: Filters<ChatRoomDBResponse>) -> Self {
        self.filters = filters;
        self
    }
}

const BY_CREATION: OrderBy = OrderBy {
    column: "created_at",
    descending: false,
};

pub struct ChatRooms<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for ChatRooms<'c> {
    type CreateRequest = ChatRoomCreateDBRequest;
    type UpdateRequest = ChatRoomUpdateDBRequest;
    type Response = ChatRoomDBResponse;
    type Id = RoomId;
    type Filter = ChatRoomFilter;

    /// Create the room and make its owner the first member
    #[instrument(skip(self, request), fields(name = %request.name, owner_id = request.owner_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let room = sqlx::query_as::<_, ChatRoomDBResponse>(
            "INSERT INTO chat_rooms (name, owner_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(&request.name)
        .bind(request.owner_id)
        .fetch_one(&mut *tx)
        .await?;

        ChatRooms::new(&mut tx).subscribe(room.id, request.owner_id).await?;
        tx.commit().await?;

        Ok(room)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let room = sqlx::query_as::<_, ChatRoomDBResponse>("SELECT * FROM chat_rooms WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(room)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<RoomId>) -> Result<HashMap<Self::Id, ChatRoomDBResponse>> {
        let rooms = sqlx::query_as::<_, ChatRoomDBResponse>("SELECT * FROM chat_rooms WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rooms.into_iter().map(|r| (r.id, r)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new("SELECT * FROM chat_rooms WHERE TRUE");
        filter.filters.push_where(&mut query);
        BY_CREATION.push::<ChatRoomDBResponse>(&mut query);
        query.push(", chat_rooms.id LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let rooms = query
            .build_query_as::<ChatRoomDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rooms)
    }

    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_rooms WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let room = sqlx::query_as::<_, ChatRoomDBResponse>(
            "UPDATE chat_rooms SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&request.name)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(room)
    }
}

impl<'c> ChatRooms<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn subscribe(&mut self, room_id: RoomId, user_id: UserId) -> Result<()> {
        self.extend_members(room_id, &[user_id]).await
    }

    #[instrument(skip(self), err)]
    pub async fn unsubscribe(&mut self, room_id: RoomId, user_id: UserId) -> Result<()> {
        self.remove_members(room_id, &[user_id]).await
    }

    /// Add members; existing members are skipped
    #[instrument(skip(self, user_ids), fields(count = user_ids.len()), err)]
    pub async fn extend_members(&mut self, room_id: RoomId, user_ids: &[UserId]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_room_members (room_id, user_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(user_ids)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, user_ids), fields(count = user_ids.len()), err)]
    pub async fn remove_members(&mut self, room_id: RoomId, user_ids: &[UserId]) -> Result<()> {
        sqlx::query("DELETE FROM chat_room_members WHERE room_id = $1 AND user_id = ANY($2)")
            .bind(room_id)
            .bind(user_ids)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn is_member(&mut self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM chat_room_members WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self), err)]
    pub async fn members(&mut self, room_id: RoomId) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(
            r#"
            SELECT u.* FROM users u
            JOIN chat_room_members m ON m.user_id = u.id
            WHERE m.room_id = $1
            ORDER BY u.id
            "#,
        )
        .bind(room_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }

    /// Rooms the user is a member of, optionally narrowed to names starting with `name_prefix`
    /// (case-insensitive)
    #[instrument(skip(self), err)]
    pub async fn member_rooms(&mut self, user_id: UserId, name_prefix: Option<&str>) -> Result<Vec<ChatRoomDBResponse>> {
        let mut filters = Filters::<ChatRoomDBResponse>::new();
        if let Some(prefix) = name_prefix {
            filters = filters.add("name__istartswith", prefix)?;
        }

        let mut query = QueryBuilder::new(
            "SELECT chat_rooms.* FROM chat_rooms \
             JOIN chat_room_members ON chat_room_members.room_id = chat_rooms.id \
             WHERE chat_room_members.user_id = ",
        );
        query.push_bind(user_id);
        filters.push_where(&mut query);
        BY_CREATION.push::<ChatRoomDBResponse>(&mut query);

        let rooms = query
            .build_query_as::<ChatRoomDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rooms)
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_rooms")
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}
