// handlers/chat_handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bson::{doc, oid::ObjectId};
use serde_json::json;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::chat::{CreateChatRequest, MessageResponse, SendMessageRequest};
use crate::models::user::Claims;
use crate::services::chat_service;
use crate::state::AppState;

// POST /
pub async fn get_or_create_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateChatRequest>,
) -> Result<impl IntoResponse> {
    let me = claims.user_id()?;
    let participant = ObjectId::parse_str(&payload.participant_id)?;
    let property = payload
        .property_id
        .as_deref()
        .map(ObjectId::parse_str)
        .transpose()?;

    if let Some(property_id) = property {
        let exists = crate::handlers::property_handlers::properties(&state.db)
            .find_one(doc! { "_id": property_id })
            .await?;
        if exists.is_none() {
            return Err(AppError::not_found("Property not found"));
        }
    }

    let chat = chat_service::get_or_create_chat(
        &state.db,
        me,
        participant,
        property,
        state.config.chat_scoped_to_property,
    )
    .await?;

    Ok(Json(json!({ "success": true, "data": chat })))
}

// GET /
pub async fn get_user_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let me = claims.user_id()?;
    let chats = chat_service::list_user_chats(&state.db, me).await?;

    Ok(Json(json!({
        "success": true,
        "count": chats.len(),
        "data": chats,
    })))
}

// GET /:chat_id/messages
pub async fn get_chat_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse> {
    let me = claims.user_id()?;
    let chat_id = ObjectId::parse_str(&chat_id)?;

    chat_service::require_participant(&state.db, chat_id, &me).await?;

    let messages = chat_service::list_messages(&state.db, chat_id).await?;

    // Fetching the list doubles as the read receipt for everything addressed
    // to the reader.
    chat_service::mark_read(&state.db, chat_id, me).await?;

    let responses: Vec<MessageResponse> =
        messages.into_iter().map(MessageResponse::from).collect();

    Ok(Json(json!({
        "success": true,
        "count": responses.len(),
        "data": responses,
    })))
}

// POST /:chat_id/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let me = claims.user_id()?;
    let chat_id = ObjectId::parse_str(&chat_id)?;
    payload.validate()?;

    let message =
        chat_service::send_message(&state.db, &state.rooms, chat_id, me, payload.content)
            .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": MessageResponse::from(message),
        })),
    ))
}

// DELETE /:chat_id/messages/:message_id
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let chat_id = ObjectId::parse_str(&chat_id)?;
    let message_id = ObjectId::parse_str(&message_id)?;

    chat_service::delete_message(&state.db, chat_id, message_id, &claims).await?;

    Ok(Json(json!({ "success": true, "data": {} })))
}

// GET /:chat_id/unread-count
pub async fn get_unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse> {
    let me = claims.user_id()?;
    let chat_id = ObjectId::parse_str(&chat_id)?;

    chat_service::require_participant(&state.db, chat_id, &me).await?;
    let count = chat_service::unread_count(&state.db, chat_id, me).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "unreadCount": count },
    })))
}

// POST /properties/:property_id/chat, initiates a chat with the listing agent
pub async fn initiate_property_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(property_id): Path<String>,
) -> Result<impl IntoResponse> {
    let me = claims.user_id()?;
    let property_id = ObjectId::parse_str(&property_id)?;

    let property = crate::handlers::property_handlers::properties(&state.db)
        .find_one(doc! { "_id": property_id })
        .await?
        .ok_or_else(|| AppError::not_found("Property not found"))?;

    let chat = chat_service::get_or_create_chat(
        &state.db,
        me,
        property.agent,
        Some(property_id),
        state.config.chat_scoped_to_property,
    )
    .await?;

    Ok(Json(json!({ "success": true, "data": chat })))
}
