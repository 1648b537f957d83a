// services/paystack.rs
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    /// Minor currency unit (kobo): display amount x 100.
    pub amount: i64,
    pub currency: String,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeData {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyCustomer {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyData {
    /// "success", "failed", "abandoned", "pending", ...
    pub status: String,
    /// Kobo, as charged by the gateway.
    pub amount: i64,
    pub paid_at: Option<String>,
    pub channel: Option<String>,
    pub currency: Option<String>,
    pub gateway_response: Option<String>,
    pub customer: Option<VerifyCustomer>,
}

impl VerifyData {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    pub fn amount_major(&self) -> f64 {
        self.amount as f64 / 100.0
    }
}

#[derive(Debug, Clone)]
pub struct PaystackService {
    config: AppConfig,
    client: Client,
}

impl PaystackService {
    pub fn new(config: AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        PaystackService { config, client }
    }

    /// Initialize a transaction. A transport failure or malformed body is an
    /// `ExternalService` error (retryable), never a recorded payment failure.
    pub async fn initialize(&self, request: InitializeRequest) -> Result<InitializeData> {
        info!("Paystack: initializing transaction for {}", request.email);

        let response = self
            .client
            .post(self.config.transaction_initialize_url())
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.paystack_secret_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Paystack initialize failed: {} - {}", status, body);
            return Err(AppError::gateway(format!(
                "Transaction initialize failed: {}",
                status
            )));
        }

        let envelope: ApiEnvelope<InitializeData> = response.json().await?;
        if !envelope.status {
            error!("Paystack initialize rejected: {}", envelope.message);
            return Err(AppError::gateway(envelope.message));
        }

        let data = envelope
            .data
            .ok_or_else(|| AppError::gateway("Initialize response missing data"))?;

        info!("Paystack: transaction initialized, reference {}", data.reference);
        Ok(data)
    }

    /// Verify a transaction by reference. Distinguishes "the gateway said the
    /// payment failed" (a successful call, `status != success` in the data)
    /// from "we could not ask the gateway" (an error here).
    pub async fn verify(&self, reference: &str) -> Result<VerifyData> {
        info!("Paystack: verifying reference {}", reference);

        let response = self
            .client
            .get(self.config.transaction_verify_url(reference))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.paystack_secret_key),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Paystack verify failed: {} - {}", status, body);
            return Err(AppError::gateway(format!(
                "Transaction verify failed: {}",
                status
            )));
        }

        let envelope: ApiEnvelope<VerifyData> = response.json().await?;
        if !envelope.status {
            error!("Paystack verify rejected: {}", envelope.message);
            return Err(AppError::gateway(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| AppError::gateway("Verify response missing data"))
    }
}

/// Kobo conversion for amounts held server-side in naira.
pub fn to_kobo(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kobo_conversion_rounds_to_minor_unit() {
        assert_eq!(to_kobo(5000.0), 500_000);
        assert_eq!(to_kobo(0.5), 50);
        assert_eq!(to_kobo(19.99), 1999);
    }

    #[test]
    fn verify_data_reads_gateway_shape() {
        let raw = serde_json::json!({
            "status": "success",
            "amount": 500000,
            "paid_at": "2024-05-01T12:00:00.000Z",
            "channel": "card",
            "currency": "NGN",
            "gateway_response": "Successful",
            "customer": { "email": "buyer@example.com" }
        });
        let data: VerifyData = serde_json::from_value(raw).unwrap();
        assert!(data.is_success());
        assert_eq!(data.amount_major(), 5000.0);
        assert_eq!(data.customer.unwrap().email.as_deref(), Some("buyer@example.com"));
    }

    #[test]
    fn non_success_status_is_a_denial_not_an_error() {
        let raw = serde_json::json!({ "status": "abandoned", "amount": 0 });
        let data: VerifyData = serde_json::from_value(raw).unwrap();
        assert!(!data.is_success());
    }
}
