// handlers/subscription_handlers.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bson::doc;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::errors::{is_duplicate_key, AppError, Result};
use crate::models::subscription::{
    reconcile_subscription, ConfirmOutcome, PlanType, Subscription,
};
use crate::models::user::Claims;
use crate::services::paystack::{to_kobo, InitializeRequest};
use crate::services::quota::subscriptions;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub plan_type: String,
    #[serde(default)]
    pub auto_renewal: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub reference: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewRequest {
    pub plan_type: Option<String>,
}

// GET /plans
pub async fn get_plans() -> impl IntoResponse {
    let plans: serde_json::Map<String, serde_json::Value> = PlanType::all()
        .iter()
        .map(|p| {
            (
                p.as_str().to_string(),
                serde_json::to_value(p.details()).unwrap_or_default(),
            )
        })
        .collect();

    Json(json!({ "success": true, "data": plans }))
}

// GET /my-subscription
pub async fn get_my_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;

    let subscription = subscriptions(&state.db)
        .find_one(doc! { "agent": agent })
        .await?;

    match subscription {
        Some(sub) => Ok(Json(json!({ "success": true, "data": sub }))),
        None => Ok(Json(json!({
            "success": true,
            "data": null,
            "message": "No active subscription found",
        }))),
    }
}

// POST /subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;

    // Reject unknown plans at the boundary, before any state is written.
    let plan = PlanType::parse(&payload.plan_type)?;

    // One subscription at a time.
    let existing = subscriptions(&state.db)
        .find_one(doc! {
            "agent": agent,
            "status": { "$in": ["active", "pending"] },
        })
        .await?;
    if existing.is_some() {
        return Err(AppError::conflict(
            "You already have an active or pending subscription",
        ));
    }

    let details = plan.details();
    let payment = state
        .paystack()?
        .initialize(InitializeRequest {
            email: claims.email.clone(),
            amount: to_kobo(details.price),
            currency: "NGN".to_string(),
            metadata: json!({
                "userId": claims.sub,
                "planType": plan.as_str(),
                "subscriptionType": "subscription",
            }),
            callback_url: Some(state.config.paystack_callback_url.clone()),
        })
        .await?;

    let subscription = Subscription::new(
        agent,
        plan,
        payload.auto_renewal,
        payment.reference.clone(),
        Utc::now(),
    );
    // The find_one above is a fast path only; the unique partial index on
    // agent is what actually stops two racing subscribes from both landing.
    if let Err(e) = subscriptions(&state.db).insert_one(&subscription).await {
        if is_duplicate_key(&e) {
            return Err(AppError::conflict(
                "You already have an active or pending subscription",
            ));
        }
        return Err(e.into());
    }

    info!(
        "Subscription pending for agent {} on plan {}",
        agent,
        plan.as_str()
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "subscription": subscription,
                "authorizationUrl": payment.authorization_url,
                "reference": payment.reference,
            },
        })),
    ))
}

// POST /verify-payment
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse> {
    claims.require_agent()?;

    if payload.reference.is_empty() {
        return Err(AppError::validation("Payment reference is required"));
    }

    let subscription = subscriptions(&state.db)
        .find_one(doc! { "paymentDetails.transactionId": &payload.reference })
        .await?
        .ok_or_else(|| AppError::not_found("Subscription not found"))?;

    // Idempotent short-circuit before any gateway round trip.
    if subscription.status == crate::models::subscription::SubscriptionStatus::Active {
        return Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Subscription already activated",
                "data": subscription,
            })),
        ));
    }

    // A gateway failure here propagates as ExternalService and leaves the
    // subscription pending; it is never interpreted as a declined payment.
    let verification = state.paystack()?.verify(&payload.reference).await?;

    match reconcile_subscription(subscription.status, verification.is_success()) {
        ConfirmOutcome::AlreadyActive => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Subscription already activated",
                "data": subscription,
            })),
        )),
        ConfirmOutcome::Activate => {
            let now = Utc::now();
            let paid_at = verification
                .paid_at
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);

            // Conditional on still-pending: the first successful verification
            // wins, a concurrent one falls through to the already-active read.
            let activated = subscriptions(&state.db)
                .find_one_and_update(
                    doc! {
                        "paymentDetails.transactionId": &payload.reference,
                        "status": "pending",
                    },
                    doc! { "$set": {
                        "status": "active",
                        "startDate": bson::DateTime::from_chrono(now),
                        "updatedAt": bson::DateTime::from_chrono(now),
                        "paymentDetails.paidAt": bson::DateTime::from_chrono(paid_at),
                        "paymentDetails.amountPaid": verification.amount_major(),
                    }},
                )
                .return_document(ReturnDocument::After)
                .await?;

            match activated {
                Some(sub) => Ok((
                    StatusCode::OK,
                    Json(json!({
                        "success": true,
                        "message": "Subscription activated successfully",
                        "data": sub,
                    })),
                )),
                None => {
                    // Lost the race to another verify call; return stored state.
                    let current = subscriptions(&state.db)
                        .find_one(doc! { "paymentDetails.transactionId": &payload.reference })
                        .await?
                        .ok_or_else(|| AppError::not_found("Subscription not found"))?;
                    Ok((
                        StatusCode::OK,
                        Json(json!({
                            "success": true,
                            "message": "Subscription already activated",
                            "data": current,
                        })),
                    ))
                }
            }
        }
        ConfirmOutcome::Cancel => {
            let cancelled = subscriptions(&state.db)
                .find_one_and_update(
                    doc! {
                        "paymentDetails.transactionId": &payload.reference,
                        "status": "pending",
                    },
                    doc! { "$set": {
                        "status": "cancelled",
                        "updatedAt": bson::DateTime::from_chrono(Utc::now()),
                    }},
                )
                .return_document(ReturnDocument::After)
                .await?
                .unwrap_or(subscription);

            Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": "Payment verification failed",
                    "data": cancelled,
                })),
            ))
        }
    }
}

// PUT /cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;

    let cancelled = subscriptions(&state.db)
        .find_one_and_update(
            doc! { "agent": agent, "status": "active" },
            doc! { "$set": {
                "status": "cancelled",
                "autoRenewal": false,
                "updatedAt": bson::DateTime::from_chrono(Utc::now()),
            }},
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("No active subscription found"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Subscription cancelled successfully",
        "data": cancelled,
    })))
}

// GET /usage
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;
    let now = Utc::now();

    let subscription = subscriptions(&state.db)
        .find_one(doc! { "agent": agent, "status": "active" })
        .await?
        .ok_or_else(|| AppError::not_found("No active subscription found"))?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "propertiesPosted": subscription.properties_posted,
            "propertyLimit": subscription.plan_details.property_limit,
            "remainingProperties": subscription.remaining_properties(),
            "featuredListingsUsed": subscription.featured_listings_used,
            "featuredListingsLimit": subscription.plan_details.featured_listings,
            "remainingFeaturedListings": subscription.remaining_featured_listings(),
            "subscriptionEndDate": subscription.end_date.to_rfc3339(),
            "daysRemaining": subscription.days_remaining(now),
            "canPostProperty": subscription.can_post_property(now),
            "canCreateFeaturedListing": subscription.can_create_featured_listing(now),
        },
    })))
}

// POST /renew
pub async fn renew_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RenewRequest>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;

    let subscription = subscriptions(&state.db)
        .find_one(doc! { "agent": agent })
        .await?
        .ok_or_else(|| AppError::not_found("No subscription found"))?;

    // Same plan unless a new one was requested.
    let plan = match payload.plan_type.as_deref() {
        Some(plan_type) => PlanType::parse(plan_type)?,
        None => subscription.plan,
    };
    let details = plan.details();

    let payment = state
        .paystack()?
        .initialize(InitializeRequest {
            email: claims.email.clone(),
            amount: to_kobo(details.price),
            currency: "NGN".to_string(),
            metadata: json!({
                "userId": claims.sub,
                "planType": plan.as_str(),
                "subscriptionType": "renewal",
            }),
            callback_url: Some(state.config.paystack_callback_url.clone()),
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "authorizationUrl": payment.authorization_url,
            "reference": payment.reference,
        },
    })))
}

// GET /all (admin)
pub async fn get_all_subscriptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    claims.require_admin()?;

    let cursor = subscriptions(&state.db)
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .await?;
    let all: Vec<Subscription> = cursor.try_collect().await?;

    Ok(Json(json!({
        "success": true,
        "count": all.len(),
        "data": all,
    })))
}
