//! Chat socket connection handling.
//!
//! A connection has one writer task that owns the socket's sending half, and at most one room
//! forwarder relaying hub events for the current room into the writer. Inbound frames select a
//! room or post to it.

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{
    broadcast::{Receiver, error::RecvError},
    mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    AppState,
    api::models::{chat::ChatMessageResponse, users::CurrentUser},
    chat::{
        access::can_access_room,
        hub::{ChatHub, room_channel},
    },
    db::{
        errors::DbError,
        handlers::{ChatMessages, ChatRooms, Repository},
        models::chat::{ChatMessageCreateDBRequest, ChatRoomDBResponse},
    },
    errors::Result,
    types::RoomId,
};

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    Send,
    ChangeRoom,
}

/// An inbound socket frame
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatFrame {
    pub action: ChatAction,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
}

impl ChatFrame {
    /// Text that is not a valid frame is sent to the current room as-is.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Invalid chat frame, sending as plain text: {e}");
                ChatFrame {
                    action: ChatAction::Send,
                    message: Some(text.to_string()),
                    room_id: None,
                }
            }
        }
    }
}

struct Subscription {
    room: ChatRoomDBResponse,
    channel: String,
    cancel: CancellationToken,
}

/// State of one chat socket
pub struct ChatConnection {
    state: AppState,
    user: CurrentUser,
    outbound: mpsc::Sender<String>,
    current: Option<Subscription>,
}

impl ChatConnection {
    pub fn new(state: AppState, user: CurrentUser, outbound: mpsc::Sender<String>) -> Self {
        Self {
            state,
            user,
            outbound,
            current: None,
        }
    }

    pub async fn handle_text(&mut self, text: &str) {
        let frame = ChatFrame::parse(text);
        let result = match frame.action {
            ChatAction::ChangeRoom => match frame.room_id {
                Some(room_id) => self.change_room(room_id).await,
                None => {
                    debug!("change_room without room_id ignored");
                    Ok(())
                }
            },
            ChatAction::Send => self.send(frame.message.as_deref().unwrap_or_default()).await,
        };
        if let Err(e) = result {
            error!("Chat frame from {} failed: {e:#}", self.user.username);
        }
    }

    #[instrument(skip(self), fields(user = %self.user.username))]
    async fn change_room(&mut self, room_id: RoomId) -> Result<()> {
        let mut conn = self.state.db.acquire().await.map_err(DbError::from)?;
        let Some(room) = ChatRooms::new(&mut conn).get_by_id(room_id).await? else {
            warn!("Room {room_id} does not exist");
            return Ok(());
        };
        if !can_access_room(&mut conn, &self.user, &room).await? {
            warn!("User {} may not join room {}", self.user.username, room.name);
            return Ok(());
        }

        self.leave();
        let channel = room_channel(&room.name);
        let rx = self.state.hub.subscribe(&channel);
        let cancel = CancellationToken::new();
        tokio::spawn(forward_room(
            self.state.hub.clone(),
            channel.clone(),
            rx,
            room.id,
            self.outbound.clone(),
            cancel.clone(),
        ));
        info!("User {} switched to room {}", self.user.username, room.name);
        self.current = Some(Subscription { room, channel, cancel });
        Ok(())
    }

    #[instrument(skip(self, content), fields(user = %self.user.username))]
    async fn send(&mut self, content: &str) -> Result<()> {
        let Some(current) = &self.current else {
            debug!("Message without a current room ignored");
            return Ok(());
        };
        if content.trim().is_empty() {
            debug!("Empty message ignored");
            return Ok(());
        }

        let mut conn = self.state.db.acquire().await.map_err(DbError::from)?;
        let message = ChatMessages::new(&mut conn)
            .create(&ChatMessageCreateDBRequest {
                content: content.to_string(),
                author_id: self.user.id,
                room_id: current.room.id,
            })
            .await?;
        self.state.hub.publish(&current.channel, message.into());
        Ok(())
    }

    /// Stop relaying the current room
    pub fn leave(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.cancel.cancel();
        }
    }
}

impl Drop for ChatConnection {
    fn drop(&mut self) {
        self.leave();
    }
}

/// Relay hub events for `room_id` into the writer until cancelled, then unsubscribe.
async fn forward_room(
    hub: ChatHub,
    channel: String,
    mut rx: Receiver<ChatMessageResponse>,
    room_id: RoomId,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => received,
        };
        match received {
            Ok(event) => {
                // Rooms of different owners may share a name, and so a channel
                if event.room_id != Some(room_id) {
                    continue;
                }
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if outbound.send(json).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize chat event: {e}"),
                }
            }
            Err(RecvError::Lagged(count)) => warn!(skipped = count, "Chat socket lagged, skipped events"),
            Err(RecvError::Closed) => break,
        }
    }
    hub.unsubscribe(&channel, rx);
}

/// Serve an upgraded socket for `user` until either side closes.
pub async fn handle_socket(socket: WebSocket, state: AppState, user: CurrentUser) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                debug!("Failed to write to chat socket: {e}");
                break;
            }
        }
    });

    info!("User {} connected to chat", user.username);
    let username = user.username.clone();
    let mut connection = ChatConnection::new(state, user, outbound);

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => connection.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Chat socket error: {e}");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    connection.leave();
    writer.abort();
    info!("User {username} disconnected from chat");
}

/// Refuse an unauthenticated socket
pub async fn reject_socket(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "Not authenticated".into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to close anonymous chat socket: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frames() {
        let frame = ChatFrame::parse(r#"{"action": "change_room", "room_id": 7}"#);
        assert_eq!(frame.action, ChatAction::ChangeRoom);
        assert_eq!(frame.room_id, Some(7));

        let frame = ChatFrame::parse(r#"{"action": "send", "message": "hi"}"#);
        assert_eq!(frame.action, ChatAction::Send);
        assert_eq!(frame.message.as_deref(), Some("hi"));
    }

    #[test]
    fn test_invalid_frame_is_sent_as_text() {
        let frame = ChatFrame::parse("hello there");
        assert_eq!(frame.action, ChatAction::Send);
        assert_eq!(frame.message.as_deref(), Some("hello there"));

        let frame = ChatFrame::parse(r#"{"action": "dance"}"#);
        assert_eq!(frame.action, ChatAction::Send);
        assert_eq!(frame.message.as_deref(), Some(r#"{"action": "dance"}"#));
    }
}
