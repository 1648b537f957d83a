// src/models/subscription.rs
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Closed set of purchasable plans. Unknown identifiers are rejected at the
/// boundary, never at the point of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Basic,
    Premium,
    Enterprise,
}

impl PlanType {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "basic" => Ok(PlanType::Basic),
            "premium" => Ok(PlanType::Premium),
            "enterprise" => Ok(PlanType::Enterprise),
            other => Err(AppError::validation(format!(
                "Invalid subscription plan: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Basic => "basic",
            PlanType::Premium => "premium",
            PlanType::Enterprise => "enterprise",
        }
    }

    /// Static plan table. Prices are in naira; duration in days.
    pub fn details(&self) -> PlanDetails {
        match self {
            PlanType::Basic => PlanDetails {
                name: "Basic Plan".to_string(),
                price: 5000.0,
                duration: 30,
                property_limit: 10,
                featured_listings: 1,
                priority_support: false,
            },
            PlanType::Premium => PlanDetails {
                name: "Premium Plan".to_string(),
                price: 15000.0,
                duration: 30,
                property_limit: 50,
                featured_listings: 5,
                priority_support: true,
            },
            PlanType::Enterprise => PlanDetails {
                name: "Enterprise Plan".to_string(),
                price: 30000.0,
                duration: 30,
                property_limit: 200,
                featured_listings: 20,
                priority_support: true,
            },
        }
    }

    pub fn all() -> [PlanType; 3] {
        [PlanType::Basic, PlanType::Premium, PlanType::Enterprise]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDetails {
    pub name: String,
    pub price: f64,
    pub duration: i64,
    pub property_limit: i64,
    pub featured_listings: i64,
    pub priority_support: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub paid_at: Option<bson::DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub agent: ObjectId,
    pub plan: PlanType,
    pub plan_details: PlanDetails,
    pub status: SubscriptionStatus,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub end_date: DateTime<Utc>,
    pub properties_posted: i64,
    pub featured_listings_used: i64,
    pub payment_details: PaymentDetails,
    pub auto_renewal: bool,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        agent: ObjectId,
        plan: PlanType,
        auto_renewal: bool,
        reference: String,
        now: DateTime<Utc>,
    ) -> Self {
        let details = plan.details();
        let end_date = now + chrono::Duration::days(details.duration);
        Subscription {
            id: None,
            agent,
            plan,
            plan_details: details.clone(),
            status: SubscriptionStatus::Pending,
            start_date: now,
            end_date,
            properties_posted: 0,
            featured_listings_used: 0,
            payment_details: PaymentDetails {
                transaction_id: Some(reference),
                payment_method: Some("paystack".to_string()),
                amount_paid: Some(details.price),
                paid_at: None,
            },
            auto_renewal,
            created_at: now,
            updated_at: now,
        }
    }

    /// Subscription is usable for quota consumption right now.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && now < self.end_date
    }

    pub fn can_post_property(&self, now: DateTime<Utc>) -> bool {
        self.is_usable(now) && self.properties_posted < self.plan_details.property_limit
    }

    pub fn can_create_featured_listing(&self, now: DateTime<Utc>) -> bool {
        self.is_usable(now)
            && self.featured_listings_used < self.plan_details.featured_listings
    }

    pub fn remaining_properties(&self) -> i64 {
        self.plan_details.property_limit - self.properties_posted
    }

    pub fn remaining_featured_listings(&self) -> i64 {
        self.plan_details.featured_listings - self.featured_listings_used
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let secs = (self.end_date - now).num_seconds();
        (secs as f64 / 86_400.0).ceil() as i64
    }
}

/// Outcome of reconciling a pending subscription against the gateway's view
/// of its payment. The first successful confirmation wins; every later call
/// must take the `AlreadyActive` branch.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    AlreadyActive,
    Activate,
    Cancel,
}

pub fn reconcile_subscription(
    status: SubscriptionStatus,
    gateway_success: bool,
) -> ConfirmOutcome {
    if status == SubscriptionStatus::Active {
        ConfirmOutcome::AlreadyActive
    } else if gateway_success {
        ConfirmOutcome::Activate
    } else {
        ConfirmOutcome::Cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(status: SubscriptionStatus, posted: i64, featured: i64) -> Subscription {
        let now = Utc::now();
        let mut s = Subscription::new(
            ObjectId::new(),
            PlanType::Basic,
            false,
            "ref_1".to_string(),
            now,
        );
        s.status = status;
        s.properties_posted = posted;
        s.featured_listings_used = featured;
        s
    }

    #[test]
    fn plan_table_is_closed_and_exhaustive() {
        assert!(PlanType::parse("basic").is_ok());
        assert!(PlanType::parse("premium").is_ok());
        assert!(PlanType::parse("enterprise").is_ok());
        assert!(PlanType::parse("platinum").is_err());

        let basic = PlanType::Basic.details();
        assert_eq!(basic.property_limit, 10);
        assert_eq!(basic.featured_listings, 1);
        assert_eq!(basic.duration, 30);
    }

    #[test]
    fn posting_allowed_only_while_active_and_under_limit() {
        let now = Utc::now();
        assert!(sub(SubscriptionStatus::Active, 9, 0).can_post_property(now));
        // At the limit: check must flip off, never overshoot.
        assert!(!sub(SubscriptionStatus::Active, 10, 0).can_post_property(now));
        assert!(!sub(SubscriptionStatus::Pending, 0, 0).can_post_property(now));
        assert!(!sub(SubscriptionStatus::Cancelled, 0, 0).can_post_property(now));
    }

    #[test]
    fn expired_end_date_blocks_consumption_without_a_sweep() {
        let mut s = sub(SubscriptionStatus::Active, 0, 0);
        let after_expiry = s.end_date + chrono::Duration::days(1);
        assert!(!s.can_post_property(after_expiry));
        assert!(!s.can_create_featured_listing(after_expiry));
        // Status alone says active; the lazy check still refuses.
        s.properties_posted = 0;
        assert!(!s.is_usable(after_expiry));
    }

    #[test]
    fn featured_limit_enforced_independently_of_listing_limit() {
        let now = Utc::now();
        let s = sub(SubscriptionStatus::Active, 0, 1);
        assert!(s.can_post_property(now));
        assert!(!s.can_create_featured_listing(now));
    }

    #[test]
    fn fresh_subscription_restarts_the_posting_sequence() {
        let now = Utc::now();
        // Basic plan exhausted: 10 of 10 slots used.
        let exhausted = sub(SubscriptionStatus::Active, 10, 0);
        assert!(!exhausted.can_post_property(now));

        // Cancel + subscribe premium: counters start over, so the next
        // posting takes slot 1 under the new subscription.
        let replacement = Subscription::new(
            exhausted.agent,
            PlanType::Premium,
            false,
            "ref_2".to_string(),
            now,
        );
        assert_eq!(replacement.properties_posted, 0);
        assert_eq!(replacement.properties_posted + 1, 1);
        assert_eq!(replacement.plan_details.property_limit, 50);
    }

    #[test]
    fn first_successful_confirmation_wins() {
        assert_eq!(
            reconcile_subscription(SubscriptionStatus::Pending, true),
            ConfirmOutcome::Activate
        );
        // Second verify call sees active and must not re-apply.
        assert_eq!(
            reconcile_subscription(SubscriptionStatus::Active, true),
            ConfirmOutcome::AlreadyActive
        );
        assert_eq!(
            reconcile_subscription(SubscriptionStatus::Active, false),
            ConfirmOutcome::AlreadyActive
        );
        assert_eq!(
            reconcile_subscription(SubscriptionStatus::Pending, false),
            ConfirmOutcome::Cancel
        );
    }
}
