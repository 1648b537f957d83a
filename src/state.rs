use std::sync::Arc;

use mongodb::Database;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::services::chat_rooms::ChatRooms;
use crate::services::paystack::PaystackService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub paystack: Option<Arc<PaystackService>>,
    pub rooms: ChatRooms,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        AppState {
            db,
            config,
            paystack: None,
            rooms: ChatRooms::new(),
        }
    }

    pub fn with_paystack(mut self, paystack: Arc<PaystackService>) -> Self {
        self.paystack = Some(paystack);
        self
    }

    pub fn paystack(&self) -> Result<&Arc<PaystackService>> {
        self.paystack
            .as_ref()
            .ok_or_else(|| AppError::Configuration("Payment gateway is not configured".to_string()))
    }
}
