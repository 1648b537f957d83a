// services/chat_service.rs
//
// Single implementation of the message contract, shared by the REST handler
// and the websocket adapter so persistence-then-broadcast ordering and the
// participant check live in exactly one place.
use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use tracing::warn;

use crate::errors::{AppError, Result};
use crate::models::chat::{Chat, Message, MessageResponse};
use crate::models::user::Claims;
use crate::services::chat_rooms::{ChatRooms, WsEvent};

pub fn chats(db: &Database) -> Collection<Chat> {
    db.collection("chats")
}

pub fn messages(db: &Database) -> Collection<Message> {
    db.collection("messages")
}

/// Load a chat and verify membership. Outsiders get an authorization error,
/// not a crash, and nothing is persisted on their behalf.
pub async fn require_participant(
    db: &Database,
    chat_id: ObjectId,
    user_id: &ObjectId,
) -> Result<Chat> {
    let chat = chats(db)
        .find_one(doc! { "_id": chat_id })
        .await?
        .ok_or_else(|| AppError::not_found("Chat not found"))?;

    if !chat.has_participant(user_id) {
        return Err(AppError::not_authorized(
            "Not authorized to access this chat",
        ));
    }
    Ok(chat)
}

/// Find the chat for this participant pair (optionally scoped to a listing),
/// creating it if absent.
pub async fn get_or_create_chat(
    db: &Database,
    me: ObjectId,
    participant: ObjectId,
    property: Option<ObjectId>,
    scoped_to_property: bool,
) -> Result<Chat> {
    if me == participant {
        return Err(AppError::validation("You cannot chat with yourself"));
    }

    let mut filter = doc! {
        "participants": { "$all": [me, participant] },
    };
    if scoped_to_property {
        match property {
            Some(prop) => {
                filter.insert("property", prop);
            }
            None => {
                filter.insert("property", doc! { "$exists": false });
            }
        }
    }

    if let Some(existing) = chats(db).find_one(filter).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let mut chat = Chat::new(me, participant, property, now);
    let inserted = chats(db).insert_one(&chat).await?;
    chat.id = inserted.inserted_id.as_object_id();
    Ok(chat)
}

/// Persist a message, update the chat's denormalized lastMessage pointer and
/// broadcast the *persisted* record to the room. Ordering is mandatory:
/// persistence completes before any socket sees the message.
pub async fn send_message(
    db: &Database,
    rooms: &ChatRooms,
    chat_id: ObjectId,
    sender: ObjectId,
    content: String,
) -> Result<Message> {
    require_participant(db, chat_id, &sender).await?;

    let now = Utc::now();
    let mut message = Message {
        id: None,
        chat: chat_id,
        sender,
        content,
        read: false,
        created_at: now,
    };

    let inserted = messages(db).insert_one(&message).await?;
    let message_id = inserted
        .inserted_id
        .as_object_id()
        .ok_or_else(|| AppError::validation("Failed to read inserted message id"))?;
    message.id = Some(message_id);

    // Conditional cache write: a racing send with a newer stamp wins and
    // this update is dropped, keeping the pointer on the max-createdAt
    // message.
    let stamp = bson::DateTime::from_chrono(now);
    chats(db)
        .update_one(
            last_message_filter(chat_id, stamp),
            doc! { "$set": {
                "lastMessage": message_id,
                "lastMessageAt": stamp,
                "updatedAt": stamp,
            }},
        )
        .await?;

    rooms
        .publish(
            &chat_id.to_hex(),
            WsEvent::NewMessage(MessageResponse::from(message.clone())),
        )
        .await;

    Ok(message)
}

/// Matches the chat only while its cached stamp is absent or not newer than
/// `stamp`, so the lastMessage pointer can never move backwards.
pub fn last_message_filter(chat_id: ObjectId, stamp: bson::DateTime) -> Document {
    doc! {
        "_id": chat_id,
        "$or": [
            { "lastMessageAt": { "$exists": false } },
            { "lastMessageAt": { "$lte": stamp } },
        ],
    }
}

/// Fetch messages in persistence order.
pub async fn list_messages(db: &Database, chat_id: ObjectId) -> Result<Vec<Message>> {
    let cursor = messages(db)
        .find(doc! { "chat": chat_id })
        .sort(doc! { "createdAt": 1 })
        .await?;
    let all: Vec<Message> = cursor.try_collect().await?;
    Ok(all)
}

/// Flip read=true on everything in the chat not sent by `reader`. One bulk
/// update, safe to call redundantly from both the fetch path and room join.
pub async fn mark_read(db: &Database, chat_id: ObjectId, reader: ObjectId) -> Result<u64> {
    let result = messages(db)
        .update_many(
            doc! {
                "chat": chat_id,
                "sender": { "$ne": reader },
                "read": false,
            },
            doc! { "$set": { "read": true } },
        )
        .await?;
    Ok(result.modified_count)
}

/// Delete a message (sender or admin only). If it was the chat's current
/// lastMessage, re-derive the pointer from the newest remaining message.
pub async fn delete_message(
    db: &Database,
    chat_id: ObjectId,
    message_id: ObjectId,
    claims: &Claims,
) -> Result<()> {
    let user_id = claims.user_id()?;
    let chat = require_participant(db, chat_id, &user_id).await?;

    let message = messages(db)
        .find_one(doc! { "_id": message_id, "chat": chat_id })
        .await?
        .ok_or_else(|| AppError::not_found("Message not found"))?;

    if message.sender != user_id && !claims.is_admin() {
        return Err(AppError::not_authorized(
            "Not authorized to delete this message",
        ));
    }

    messages(db)
        .delete_one(doc! { "_id": message_id })
        .await?;

    if chat.last_message == Some(message_id) {
        let new_last = messages(db)
            .find_one(doc! { "chat": chat_id })
            .sort(doc! { "createdAt": -1 })
            .await?;

        let update = match new_last {
            Some(Message {
                id: Some(id),
                created_at,
                ..
            }) => doc! { "$set": {
                "lastMessage": id,
                "lastMessageAt": bson::DateTime::from_chrono(created_at),
            }},
            _ => doc! { "$unset": { "lastMessage": "", "lastMessageAt": "" } },
        };
        if let Err(e) = chats(db).update_one(doc! { "_id": chat_id }, update).await {
            warn!("Failed to re-derive lastMessage for chat {}: {}", chat_id, e);
        }
    }

    Ok(())
}

/// All chats the user belongs to, newest activity first.
pub async fn list_user_chats(db: &Database, user_id: ObjectId) -> Result<Vec<Chat>> {
    let cursor = chats(db)
        .find(doc! { "participants": user_id })
        .sort(doc! { "updatedAt": -1 })
        .await?;
    let all: Vec<Chat> = cursor.try_collect().await?;
    Ok(all)
}

/// Number of unread messages addressed to `reader` in this chat.
pub async fn unread_count(db: &Database, chat_id: ObjectId, reader: ObjectId) -> Result<u64> {
    let count = messages(db)
        .count_documents(doc! {
            "chat": chat_id,
            "sender": { "$ne": reader },
            "read": false,
        })
        .await?;
    Ok(count)
}

/// The cache's source of truth: the newest message by creation time, used by
/// tests to check cache/derivation agreement.
pub fn derive_last_message(all: &[Message]) -> Option<ObjectId> {
    all.iter()
        .max_by_key(|m| m.created_at)
        .and_then(|m| m.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(chat: ObjectId, minutes_ago: i64) -> Message {
        Message {
            id: Some(ObjectId::new()),
            chat,
            sender: ObjectId::new(),
            content: "hi".to_string(),
            read: false,
            created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn racing_sends_cannot_move_the_pointer_backwards() {
        let chat = ObjectId::new();
        let stamp = bson::DateTime::from_chrono(Utc::now());
        let filter = last_message_filter(chat, stamp);

        assert_eq!(filter.get_object_id("_id").unwrap(), chat);

        // A fresh chat (no stamp yet) and an older-or-equal stamp both admit
        // the write; a newer stored stamp means a racing send already
        // advanced the pointer and this write must be dropped.
        let or = filter.get_array("$or").unwrap();
        let fresh = or[0].as_document().unwrap().get_document("lastMessageAt").unwrap();
        assert_eq!(fresh.get_bool("$exists").unwrap(), false);
        let forward = or[1].as_document().unwrap().get_document("lastMessageAt").unwrap();
        assert_eq!(forward.get_datetime("$lte").unwrap(), &stamp);
    }

    #[test]
    fn last_message_derivation_picks_max_timestamp() {
        let chat = ObjectId::new();
        let oldest = msg(chat, 30);
        let newest = msg(chat, 1);
        let middle = msg(chat, 10);

        let derived = derive_last_message(&[oldest, newest.clone(), middle]);
        assert_eq!(derived, newest.id);
    }

    #[test]
    fn last_message_of_empty_chat_is_none() {
        assert_eq!(derive_last_message(&[]), None);
    }

    #[test]
    fn deleting_the_newest_message_falls_back_to_next_most_recent() {
        let chat = ObjectId::new();
        let newest = msg(chat, 1);
        let second = msg(chat, 5);
        let all = vec![newest.clone(), second.clone()];

        assert_eq!(derive_last_message(&all), newest.id);

        let remaining: Vec<Message> = all
            .into_iter()
            .filter(|m| m.id != newest.id)
            .collect();
        assert_eq!(derive_last_message(&remaining), second.id);
    }
}
