// src/routes/subscriptions.rs
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::subscription_handlers;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/my-subscription", get(subscription_handlers::get_my_subscription))
        .route("/subscribe", post(subscription_handlers::subscribe))
        .route("/verify-payment", post(subscription_handlers::verify_payment))
        .route("/cancel", put(subscription_handlers::cancel_subscription))
        .route("/usage", get(subscription_handlers::get_usage))
        .route("/renew", post(subscription_handlers::renew_subscription))
        .route("/all", get(subscription_handlers::get_all_subscriptions))
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Plan table is public
        .route("/plans", get(subscription_handlers::get_plans))
        .merge(protected)
}
