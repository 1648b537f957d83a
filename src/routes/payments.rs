// src/routes/payments.rs
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::payment_handlers;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/initialize", post(payment_handlers::initialize_payment))
        .route("/verify/:reference", get(payment_handlers::verify_payment))
        .route("/transactions/:user_id", get(payment_handlers::get_user_transactions))
        .route("/:id", get(payment_handlers::get_transaction_by_id))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}
