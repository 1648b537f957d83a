// services/quota.rs
//
// Quota ledger for subscription-gated posting. Eligibility check and counter
// increment happen in ONE conditional update so two concurrent postings on
// the same subscription can never jointly exceed the limit: the filter
// re-checks status, end date and counter-vs-limit, and a concurrent winner
// makes the filter miss for the loser.
use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

use crate::errors::{AppError, Result};
use crate::models::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Listing,
    Featured,
}

impl QuotaKind {
    fn counter_field(&self) -> &'static str {
        match self {
            QuotaKind::Listing => "propertiesPosted",
            QuotaKind::Featured => "featuredListingsUsed",
        }
    }

    fn limit_field(&self) -> &'static str {
        match self {
            QuotaKind::Listing => "$planDetails.propertyLimit",
            QuotaKind::Featured => "$planDetails.featuredListings",
        }
    }
}

pub fn subscriptions(db: &Database) -> Collection<Subscription> {
    db.collection("subscriptions")
}

/// Filter matching a subscription that may consume one unit of `kind` at
/// `now`: active, unexpired, and strictly below the plan limit.
pub fn consume_filter(subscription_id: ObjectId, kind: QuotaKind, now: DateTime<Utc>) -> Document {
    doc! {
        "_id": subscription_id,
        "status": "active",
        "endDate": { "$gt": bson::DateTime::from_chrono(now) },
        "$expr": {
            "$lt": [format!("${}", kind.counter_field()), kind.limit_field()]
        }
    }
}

/// Atomically consume one unit of quota. Returns the post-increment
/// subscription, or `QuotaExceeded` if the conditional update found no
/// eligible document (limit hit, expired, or a concurrent consumer won).
pub async fn consume(
    db: &Database,
    subscription_id: ObjectId,
    kind: QuotaKind,
    now: DateTime<Utc>,
) -> Result<Subscription> {
    let filter = consume_filter(subscription_id, kind, now);
    let update = doc! {
        "$inc": { kind.counter_field(): 1_i64 },
        "$set": { "updatedAt": bson::DateTime::from_chrono(now) },
    };

    let updated = subscriptions(db)
        .find_one_and_update(filter, update)
        .return_document(ReturnDocument::After)
        .await?;

    match updated {
        Some(subscription) => Ok(subscription),
        None => Err(classify_miss(db, subscription_id, kind, now).await?),
    }
}

/// A filter miss is ambiguous; re-read once to surface the right error kind.
async fn classify_miss(
    db: &Database,
    subscription_id: ObjectId,
    kind: QuotaKind,
    now: DateTime<Utc>,
) -> Result<AppError> {
    let current = subscriptions(db)
        .find_one(doc! { "_id": subscription_id })
        .await?;

    let err = match current {
        None => AppError::not_found("Subscription not found"),
        Some(sub) if !sub.is_usable(now) => AppError::not_authorized(
            "You need an active subscription to perform this action",
        ),
        Some(_) => match kind {
            QuotaKind::Listing => AppError::quota(
                "You have reached your subscription limit for property postings",
            ),
            QuotaKind::Featured => {
                AppError::quota("You have reached your featured listings limit")
            }
        },
    };
    Ok(err)
}

/// Filter for handing one consumed unit back without ever driving the
/// counter negative.
pub fn refund_filter(subscription_id: ObjectId, kind: QuotaKind) -> Document {
    doc! {
        "_id": subscription_id,
        kind.counter_field(): { "$gt": 0_i64 },
    }
}

/// Give back one unit after a consumer's follow-up write lost its race and
/// nothing was granted.
pub async fn refund(
    db: &Database,
    subscription_id: ObjectId,
    kind: QuotaKind,
) -> Result<()> {
    subscriptions(db)
        .update_one(
            refund_filter(subscription_id, kind),
            doc! { "$inc": { kind.counter_field(): -1_i64 } },
        )
        .await?;
    Ok(())
}

/// Lazy-check lookup used by read paths: the agent's subscription, but only
/// if it is usable right now. Agrees with the sweep by construction (both
/// compare `endDate` against the same clock).
pub async fn find_usable_subscription(
    db: &Database,
    agent: ObjectId,
    now: DateTime<Utc>,
) -> Result<Option<Subscription>> {
    let found = subscriptions(db)
        .find_one(doc! {
            "agent": agent,
            "status": "active",
            "endDate": { "$gt": bson::DateTime::from_chrono(now) },
        })
        .await?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_filter_rechecks_every_eligibility_clause() {
        let id = ObjectId::new();
        let now = Utc::now();
        let filter = consume_filter(id, QuotaKind::Listing, now);

        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        assert_eq!(filter.get_str("status").unwrap(), "active");
        assert!(filter.get_document("endDate").unwrap().contains_key("$gt"));

        // Counter-below-limit comparison rides inside the same filter, so the
        // check and the increment are a single conditional write.
        let expr = filter.get_document("$expr").unwrap();
        let lt = expr.get_array("$lt").unwrap();
        assert_eq!(lt[0].as_str().unwrap(), "$propertiesPosted");
        assert_eq!(lt[1].as_str().unwrap(), "$planDetails.propertyLimit");
    }

    #[test]
    fn featured_kind_targets_its_own_counter() {
        let filter = consume_filter(ObjectId::new(), QuotaKind::Featured, Utc::now());
        let lt = filter
            .get_document("$expr")
            .unwrap()
            .get_array("$lt")
            .unwrap();
        assert_eq!(lt[0].as_str().unwrap(), "$featuredListingsUsed");
        assert_eq!(lt[1].as_str().unwrap(), "$planDetails.featuredListings");
    }

    #[test]
    fn refund_cannot_drive_a_counter_negative() {
        let filter = refund_filter(ObjectId::new(), QuotaKind::Featured);
        let guard = filter.get_document("featuredListingsUsed").unwrap();
        assert_eq!(guard.get_i64("$gt").unwrap(), 0);
    }
}
