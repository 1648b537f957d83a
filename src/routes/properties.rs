// src/routes/properties.rs
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{chat_handlers, property_handlers};
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(property_handlers::create_property))
        .route("/my-properties", get(property_handlers::get_my_properties))
        .route("/:id", put(property_handlers::update_property))
        .route("/:id", delete(property_handlers::delete_property))
        .route("/:id/feature", put(property_handlers::feature_property))
        .route("/:id/chat", post(chat_handlers::initiate_property_chat))
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/featured", get(property_handlers::get_featured_properties))
        .route("/:id", get(property_handlers::get_property))
        .merge(protected)
}
