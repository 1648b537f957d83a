// models/transaction.rs
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub property: ObjectId,
    pub amount: f64,
    pub status: TransactionStatus,
    /// Gateway reference; the idempotency key for verification.
    pub transaction_id: String,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,

    // Enrichment written on completion only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub paid_at: Option<bson::DateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub customer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gateway_response: Option<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn pending(
        user: ObjectId,
        property: ObjectId,
        amount: f64,
        reference: String,
        authorization_url: String,
        now: DateTime<Utc>,
    ) -> Self {
        Transaction {
            id: None,
            user,
            property,
            amount,
            status: TransactionStatus::Pending,
            transaction_id: reference,
            payment_method: "paystack".to_string(),
            authorization_url: Some(authorization_url),
            paid_at: None,
            channel: None,
            currency: None,
            customer: None,
            gateway_response: None,
            created_at: now,
        }
    }
}

/// What to do with a transaction given the gateway's verdict. A transaction
/// that is already `completed` is terminal: every later verification returns
/// the stored record and performs no side effects.
#[derive(Debug, PartialEq, Eq)]
pub enum VerifyAction {
    AlreadyCompleted,
    Complete,
    MarkFailed,
}

pub fn reconcile_transaction(status: TransactionStatus, gateway_success: bool) -> VerifyAction {
    if status == TransactionStatus::Completed {
        VerifyAction::AlreadyCompleted
    } else if gateway_success {
        VerifyAction::Complete
    } else {
        VerifyAction::MarkFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_transaction_is_terminal() {
        // First verify completes it...
        assert_eq!(
            reconcile_transaction(TransactionStatus::Pending, true),
            VerifyAction::Complete
        );
        // ...every subsequent verify is a no-op, whatever the gateway says.
        assert_eq!(
            reconcile_transaction(TransactionStatus::Completed, true),
            VerifyAction::AlreadyCompleted
        );
        assert_eq!(
            reconcile_transaction(TransactionStatus::Completed, false),
            VerifyAction::AlreadyCompleted
        );
    }

    #[test]
    fn gateway_decline_marks_failed_only_from_pending() {
        assert_eq!(
            reconcile_transaction(TransactionStatus::Pending, false),
            VerifyAction::MarkFailed
        );
    }
}
