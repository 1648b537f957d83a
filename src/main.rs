use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod database;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use database::connection::get_db_client;
use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = config::AppConfig::from_env();
    let db = get_db_client(&config.database_url, &config.database_name).await;

    let mut app_state = AppState::new(db.clone(), config.clone());

    let paystack = Arc::new(services::paystack::PaystackService::new(config.clone()));
    app_state = app_state.with_paystack(paystack);
    tracing::info!("Paystack service initialized");

    // Hourly subscription expiry sweep, stopped on shutdown. The sweep is
    // stateless; a late or repeated run only catches up.
    let sweep_shutdown = CancellationToken::new();
    let sweep_task = tokio::spawn(services::sweep::run(db, sweep_shutdown.clone()));

    let app = build_router(app_state);
    start_server(app, &config).await;

    sweep_shutdown.cancel();
    if let Err(e) = sweep_task.await {
        tracing::warn!("Sweep task did not stop cleanly: {}", e);
    }
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .route("/ws", get(handlers::ws_handlers::ws_upgrade))
        .nest(
            "/api/v1/subscriptions",
            routes::subscriptions::routes(app_state.clone()),
        )
        .nest("/api/v1/payments", routes::payments::routes(app_state.clone()))
        .nest(
            "/api/v1/properties",
            routes::properties::routes(app_state.clone()),
        )
        .nest("/api/v1/chats", routes::chat::routes(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, config: &config::AppConfig) {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

async fn root_handler() -> &'static str {
    "HavenHQ Real Estate API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    use mongodb::bson::doc;

    let db_status = match state.db.run_command(doc! {"ping": 1}).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "paystack": state.paystack.is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
