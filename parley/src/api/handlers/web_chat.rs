//! Session-only chat pages and the chat socket.

use axum::{
    Json,
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use tracing::debug;

use crate::{
    AppState,
    api::models::chat::{ChatPageResponse, ChatRoomResponse, RoomFilterQuery},
    auth::current_user::SessionUser,
    chat::manager::{handle_socket, reject_socket},
    db::{
        errors::DbError,
        filter::Filters,
        handlers::{ChatRooms, Repository, chat_rooms::ChatRoomFilter},
    },
    errors::Result,
};

#[utoipa::path(
    get,
    path = "/web/chat",
    tag = "web",
    summary = "Chat page",
    description = "The session user and the rooms they belong to.",
    responses(
        (status = 200, description = "Chat page", body = ChatPageResponse),
        (status = 307, description = "No session, redirected to login"),
    ),
    security(("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn chat_page(State(state): State<AppState>, SessionUser(user): SessionUser) -> Result<Json<ChatPageResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let rooms = ChatRooms::new(&mut conn).member_rooms(user.id, None).await?;

    Ok(Json(ChatPageResponse {
        username: user.username,
        rooms: rooms.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/web/chat/filter/rooms",
    tag = "web",
    summary = "Search rooms",
    description = "Admins search every room, other users only the rooms they belong to.",
    params(RoomFilterQuery),
    responses(
        (status = 200, description = "Matching rooms", body = Vec<ChatRoomResponse>),
        (status = 307, description = "No session, redirected to login"),
    ),
    security(("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn filter_rooms(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    Query(query): Query<RoomFilterQuery>,
) -> Result<Json<Vec<ChatRoomResponse>>> {
    let prefix = query.room_name.filter(|name| !name.is_empty());
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut rooms = ChatRooms::new(&mut conn);

    let found = match prefix {
        Some(prefix) if user.is_admin() => {
            let filters = Filters::new().add("name__istartswith", prefix)?;
            rooms.list(&ChatRoomFilter::new(0, i64::MAX).with_filters(filters)).await?
        }
        prefix => rooms.member_rooms(user.id, prefix.as_deref()).await?,
    };

    Ok(Json(found.into_iter().map(Into::into).collect()))
}

/// Upgrade to the chat socket. A session whose user no longer exists gets a policy close frame.
#[tracing::instrument(skip_all)]
pub async fn chat_socket(State(state): State<AppState>, user: Option<SessionUser>, ws: WebSocketUpgrade) -> Response {
    match user {
        Some(SessionUser(user)) => ws.on_upgrade(move |socket| handle_socket(socket, state, user)),
        None => {
            debug!("Anonymous chat socket refused");
            ws.on_upgrade(reject_socket)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::{
            chat::{ChatMessageResponse, ChatPageResponse, ChatRoomResponse},
            users::Role,
        },
        test_utils::*,
    };
    use axum::http::{StatusCode, header};
    use axum_test::WsMessage;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_chat_page_needs_a_session(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Active).await;
        create_test_room(&pool, &user, "general").await;

        let response = app.get("/web/chat").await;
        response.assert_status(StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.header(header::LOCATION), "/auth/session");

        let page: ChatPageResponse = app
            .get("/web/chat")
            .add_header(header::COOKIE, session_cookie(&config, &user))
            .await
            .json();
        assert_eq!(page.username, user.username);
        assert_eq!(page.rooms.len(), 1);
        assert_eq!(page.rooms[0].name, "general");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_filter_rooms(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let admin = create_test_admin_user(&pool).await;
        let user = create_test_user(&pool, Role::Active).await;
        let other = create_test_user(&pool, Role::Active).await;
        create_test_room(&pool, &user, "General").await;
        create_test_room(&pool, &user, "random").await;
        create_test_room(&pool, &other, "gardening").await;

        let rooms: Vec<ChatRoomResponse> = app
            .get("/web/chat/filter/rooms?room_name=g")
            .add_header(header::COOKIE, session_cookie(&config, &user))
            .await
            .json();
        let names: Vec<_> = rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["General"]);

        let rooms: Vec<ChatRoomResponse> = app
            .get("/web/chat/filter/rooms")
            .add_header(header::COOKIE, session_cookie(&config, &user))
            .await
            .json();
        assert_eq!(rooms.len(), 2);

        let rooms: Vec<ChatRoomResponse> = app
            .get("/web/chat/filter/rooms?room_name=G")
            .add_header(header::COOKIE, session_cookie(&config, &admin))
            .await
            .json();
        let names: Vec<_> = rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["General", "gardening"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_socket_relays_room_messages(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let owner = create_test_user(&pool, Role::Active).await;
        let room = create_test_room(&pool, &owner, "general").await;

        let mut socket = app
            .get_websocket("/web/chat/ws")
            .add_header(header::COOKIE, session_cookie(&config, &owner))
            .await
            .into_websocket()
            .await;

        socket
            .send_json(&json!({"action": "change_room", "room_id": room.id}))
            .await;
        socket.send_json(&json!({"action": "send", "message": "hello"})).await;

        let message: ChatMessageResponse = socket.receive_json().await;
        assert_eq!(message.content, "hello");
        assert_eq!(message.room_id, Some(room.id));
        assert_eq!(message.author.as_deref(), Some(owner.username.as_str()));

        // Plain text goes to the current room too
        socket.send_text("plain words").await;
        let message: ChatMessageResponse = socket.receive_json().await;
        assert_eq!(message.content, "plain words");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_socket_ignores_rooms_of_others(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let owner = create_test_user(&pool, Role::Active).await;
        let outsider = create_test_user(&pool, Role::Active).await;
        let private = create_test_room(&pool, &owner, "private").await;
        let own = create_test_room(&pool, &outsider, "own").await;

        let mut socket = app
            .get_websocket("/web/chat/ws")
            .add_header(header::COOKIE, session_cookie(&config, &outsider))
            .await
            .into_websocket()
            .await;

        socket
            .send_json(&json!({"action": "change_room", "room_id": private.id}))
            .await;
        socket.send_json(&json!({"action": "send", "message": "let me in"})).await;

        // Frames are handled in order, so the first relayed message is the one below
        socket.send_json(&json!({"action": "change_room", "room_id": own.id})).await;
        socket.send_json(&json!({"action": "send", "message": "hello"})).await;
        let message: ChatMessageResponse = socket.receive_json().await;
        assert_eq!(message.content, "hello");
        assert_eq!(message.room_id, Some(own.id));

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE room_id = $1")
            .bind(private.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_socket_for_deleted_user_is_closed(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let user = create_test_user(&pool, Role::Active).await;
        let cookie = session_cookie(&config, &user);
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        let mut socket = app
            .get_websocket("/web/chat/ws")
            .add_header(header::COOKIE, cookie)
            .await
            .into_websocket()
            .await;

        match socket.receive_message().await {
            WsMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1008);
                assert_eq!(frame.reason.as_str(), "Not authenticated");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
    }
}
