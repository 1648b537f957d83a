// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub paystack_callback_url: String,
    pub jwt_secret: String,
    pub database_url: String,
    pub database_name: String,
    pub port: u16,
    pub host: String,
    /// When true, a chat is keyed by (participants, property); when false,
    /// one chat per participant pair regardless of listing.
    pub chat_scoped_to_property: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        AppConfig {
            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY")
                .expect("PAYSTACK_SECRET_KEY must be set"),
            paystack_base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            paystack_callback_url: env::var("PAYSTACK_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:3000/pricing/success".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "havenhq".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .expect("PORT must be a number"),
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            chat_scoped_to_property: env::var("CHAT_SCOPED_TO_PROPERTY")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    pub fn transaction_initialize_url(&self) -> String {
        format!("{}/transaction/initialize", self.paystack_base_url)
    }

    pub fn transaction_verify_url(&self, reference: &str) -> String {
        format!("{}/transaction/verify/{}", self.paystack_base_url, reference)
    }
}
