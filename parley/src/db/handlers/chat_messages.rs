//! Database repository for chat messages.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::chat::{ChatMessageCreateDBRequest, ChatMessageDBResponse},
    },
    types::{MessageId, RoomId},
};

const SELECT_WITH_AUTHOR: &str = r#"
    SELECT m.id, m.content, m.author_id, u.username AS author, m.room_id, m.created_at, m.updated_at
    FROM chat_messages m
    LEFT JOIN users u ON u.id = m.author_id
"#;

pub struct ChatMessages<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ChatMessages<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(room_id = request.room_id, author_id = request.author_id), err)]
    pub async fn create(&mut self, request: &ChatMessageCreateDBRequest) -> Result<ChatMessageDBResponse> {
        let message = sqlx::query_as::<_, ChatMessageDBResponse>(
            r#"
            WITH inserted AS (
                INSERT INTO chat_messages (content, author_id, room_id)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT i.id, i.content, i.author_id, u.username AS author, i.room_id, i.created_at, i.updated_at
            FROM inserted i
            LEFT JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(&request.content)
        .bind(request.author_id)
        .bind(request.room_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(message)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: MessageId) -> Result<Option<ChatMessageDBResponse>> {
        let message = sqlx::query_as::<_, ChatMessageDBResponse>(&format!("{SELECT_WITH_AUTHOR} WHERE m.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(message)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: MessageId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Oldest first
    #[instrument(skip(self), err)]
    pub async fn list_for_room(&mut self, room_id: RoomId, skip: i64, limit: i64) -> Result<Vec<ChatMessageDBResponse>> {
        let messages = sqlx::query_as::<_, ChatMessageDBResponse>(&format!(
            "{SELECT_WITH_AUTHOR} WHERE m.room_id = $1 ORDER BY m.created_at ASC, m.id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(room_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(messages)
    }

    #[instrument(skip(self), err)]
    pub async fn count_for_room(&mut self, room_id: RoomId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}
