// src/models/chat.rs
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Unordered pair of participant identities.
    pub participants: Vec<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub property: Option<ObjectId>,
    /// Denormalized cache of the newest message. The max-createdAt message is
    /// the source of truth; if the two disagree, the latter wins.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_message: Option<ObjectId>,
    /// Creation stamp of the cached message. Cache writes are conditional on
    /// this moving forward.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_message_at: Option<bson::DateTime>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(a: ObjectId, b: ObjectId, property: Option<ObjectId>, now: DateTime<Utc>) -> Self {
        Chat {
            id: None,
            participants: vec![a, b],
            property,
            last_message: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user_id: &ObjectId) -> bool {
        self.participants.contains(user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub chat: ObjectId,
    pub sender: ObjectId,
    pub content: String,
    pub read: bool,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub participant_id: String,
    pub property_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub chat: String,
    pub sender: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.map(|id| id.to_hex()).unwrap_or_default(),
            chat: message.chat.to_hex(),
            sender: message.sender.to_hex(),
            content: message.content,
            read: message.read,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_check_covers_both_sides() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let outsider = ObjectId::new();
        let chat = Chat::new(a, b, None, Utc::now());

        assert!(chat.has_participant(&a));
        assert!(chat.has_participant(&b));
        assert!(!chat.has_participant(&outsider));
    }
}
