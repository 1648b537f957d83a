// services/sweep.rs
//
// Hourly subscription sweep. Stateless and idempotent: each pass is two
// single-step bulk writes, so running late or twice only catches up. The
// lazy check in the quota ledger compares endDate against the same clock, so
// the two paths never disagree about whether a subscription is usable.
use bson::{doc, Document};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mongodb::Database;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::Result;
use crate::services::quota::subscriptions;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Expired subscriptions are kept for this long before pruning.
const RETENTION_DAYS: i64 = 180;

/// Active subscriptions whose end date has passed and that are not flagged
/// for auto-renewal.
pub fn expiry_filter(now: DateTime<Utc>) -> Document {
    doc! {
        "status": "active",
        "endDate": { "$lte": bson::DateTime::from_chrono(now) },
        "autoRenewal": false,
    }
}

/// Expired subscriptions old enough to prune.
pub fn prune_filter(now: DateTime<Utc>) -> Document {
    let cutoff = now - ChronoDuration::days(RETENTION_DAYS);
    doc! {
        "status": "expired",
        "endDate": { "$lte": bson::DateTime::from_chrono(cutoff) },
    }
}

pub async fn sweep_once(db: &Database, now: DateTime<Utc>) -> Result<()> {
    let col = subscriptions(db);

    // Auto-renewal candidates are left active for the renewal flow; only
    // surface them.
    let renewals = col
        .count_documents(doc! {
            "status": "active",
            "endDate": { "$lte": bson::DateTime::from_chrono(now) },
            "autoRenewal": true,
        })
        .await?;
    if renewals > 0 {
        info!("{} subscriptions awaiting auto-renewal", renewals);
    }

    let expired = col
        .update_many(
            expiry_filter(now),
            doc! { "$set": {
                "status": "expired",
                "updatedAt": bson::DateTime::from_chrono(now),
            }},
        )
        .await?;
    if expired.modified_count > 0 {
        info!("Marked {} subscriptions expired", expired.modified_count);
    }

    let pruned = col.delete_many(prune_filter(now)).await?;
    if pruned.deleted_count > 0 {
        info!("Pruned {} old expired subscriptions", pruned.deleted_count);
    }

    Ok(())
}

/// Run the sweep on a fixed interval until the token is cancelled. Each
/// mutation is a single atomic write, so shutdown can never leave a
/// half-applied transition.
pub async fn run(db: Database, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = sweep_once(&db, Utc::now()).await {
                    error!("Subscription sweep failed: {}", e);
                }
            }
            _ = shutdown.cancelled() => {
                info!("Subscription sweep stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_filter_only_touches_overdue_non_renewing_actives() {
        let now = Utc::now();
        let filter = expiry_filter(now);
        assert_eq!(filter.get_str("status").unwrap(), "active");
        assert_eq!(filter.get_bool("autoRenewal").unwrap(), false);
        assert!(filter.get_document("endDate").unwrap().contains_key("$lte"));
    }

    #[test]
    fn prune_cutoff_sits_well_behind_expiry() {
        let now = Utc::now();
        let filter = prune_filter(now);
        assert_eq!(filter.get_str("status").unwrap(), "expired");

        let cutoff = filter
            .get_document("endDate")
            .unwrap()
            .get_datetime("$lte")
            .unwrap()
            .to_chrono();
        assert!(now - cutoff >= ChronoDuration::days(RETENTION_DAYS));
    }
}
