// src/routes/chat.rs
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::handlers::chat_handlers;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(chat_handlers::get_or_create_chat))
        .route("/", get(chat_handlers::get_user_chats))
        .route("/:chat_id/messages", get(chat_handlers::get_chat_messages))
        .route("/:chat_id/messages", post(chat_handlers::send_message))
        .route(
            "/:chat_id/messages/:message_id",
            delete(chat_handlers::delete_message),
        )
        .route("/:chat_id/unread-count", get(chat_handlers::get_unread_count))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}
