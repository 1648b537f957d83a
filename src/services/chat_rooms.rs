// services/chat_rooms.rs
//
// One broadcast channel per chat room. Publish is fire-and-forget relative to
// persistence: callers persist first, then publish, so a crash between the
// two can only lose a broadcast, never show peers a message that vanishes on
// reload.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::chat::MessageResponse;

const ROOM_CAPACITY: usize = 128;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum WsEvent {
    NewMessage(MessageResponse),
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        chat_id: String,
    },
}

#[derive(Clone, Default)]
pub struct ChatRooms {
    inner: Arc<RwLock<HashMap<String, broadcast::Sender<WsEvent>>>>,
}

impl ChatRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room, creating it on first subscriber.
    pub async fn subscribe(&self, chat_id: &str) -> broadcast::Receiver<WsEvent> {
        let mut rooms = self.inner.write().await;
        rooms
            .entry(chat_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Publish to every socket in the room, the sender's own included. No
    /// subscribers is fine; slow receivers lag and drop on their own side.
    pub async fn publish(&self, chat_id: &str, event: WsEvent) {
        let mut rooms = self.inner.write().await;
        if let Some(tx) = rooms.get(chat_id) {
            if tx.receiver_count() == 0 {
                rooms.remove(chat_id);
                debug!("Dropped empty chat room {}", chat_id);
                return;
            }
            // Err means all receivers vanished between the check and send.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_event(content: &str) -> WsEvent {
        WsEvent::NewMessage(MessageResponse {
            id: "1".to_string(),
            chat: "c1".to_string(),
            sender: "u1".to_string(),
            content: content.to_string(),
            read: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_all_room_subscribers_including_sender() {
        let rooms = ChatRooms::new();
        let mut rx_sender = rooms.subscribe("chat-1").await;
        let mut rx_peer = rooms.subscribe("chat-1").await;

        rooms.publish("chat-1", message_event("hello")).await;

        for rx in [&mut rx_sender, &mut rx_peer] {
            match rx.recv().await.unwrap() {
                WsEvent::NewMessage(m) => assert_eq!(m.content, "hello"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let rooms = ChatRooms::new();
        let mut rx_a = rooms.subscribe("chat-a").await;
        let _rx_b = rooms.subscribe("chat-b").await;

        rooms.publish("chat-b", message_event("b only")).await;
        rooms
            .publish("chat-a", message_event("a only"))
            .await;

        match rx_a.recv().await.unwrap() {
            WsEvent::NewMessage(m) => assert_eq!(m.content, "a only"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_to_unknown_room_is_a_noop() {
        let rooms = ChatRooms::new();
        rooms.publish("nobody-here", message_event("void")).await;
    }

    #[test]
    fn events_serialize_with_stable_tags() {
        let json = serde_json::to_value(WsEvent::UserTyping {
            user_id: "u1".to_string(),
            chat_id: "c1".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "userTyping");
        assert_eq!(json["data"]["userId"], "u1");

        let json = serde_json::to_value(message_event("hi")).unwrap();
        assert_eq!(json["event"], "newMessage");
        assert_eq!(json["data"]["content"], "hi");
    }
}
