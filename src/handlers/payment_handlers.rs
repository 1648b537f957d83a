// handlers/payment_handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bson::{doc, oid::ObjectId};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::errors::{AppError, Result};
use crate::models::property::Property;
use crate::models::transaction::{
    reconcile_transaction, Transaction, TransactionStatus, VerifyAction,
};
use crate::models::user::Claims;
use crate::services::paystack::{to_kobo, InitializeRequest};
use crate::state::AppState;

pub fn transactions(db: &Database) -> Collection<Transaction> {
    db.collection("transactions")
}

fn properties(db: &Database) -> Collection<Property> {
    db.collection("properties")
}

/// Direct purchases at or above this amount flip the listing to sold.
const MARK_SOLD_THRESHOLD: f64 = 1000.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    pub property_id: String,
    pub email: String,
}

// POST /initialize
pub async fn initialize_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<InitializePaymentRequest>,
) -> Result<impl IntoResponse> {
    let user = claims.user_id()?;

    if payload.property_id.is_empty() || payload.email.is_empty() {
        return Err(AppError::validation("Property ID and email are required"));
    }

    let property_id = ObjectId::parse_str(&payload.property_id)?;
    let property = properties(&state.db)
        .find_one(doc! { "_id": property_id })
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("Property not found with ID {}", payload.property_id))
        })?;

    // Amount comes from server-held state, never the client.
    let amount = property.price;
    if amount <= 0.0 {
        return Err(AppError::validation("Invalid payment amount"));
    }

    let payment = state
        .paystack()?
        .initialize(InitializeRequest {
            email: payload.email,
            amount: to_kobo(amount),
            currency: "NGN".to_string(),
            metadata: json!({
                "propertyId": payload.property_id,
                "userId": claims.sub,
                "propertyTitle": property.title,
            }),
            callback_url: Some(state.config.paystack_callback_url.clone()),
        })
        .await?;

    let transaction = Transaction::pending(
        user,
        property_id,
        amount,
        payment.reference.clone(),
        payment.authorization_url.clone(),
        Utc::now(),
    );
    let inserted = transactions(&state.db).insert_one(&transaction).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "authorizationUrl": payment.authorization_url,
            "reference": payment.reference,
            "transactionId": inserted.inserted_id.as_object_id().map(|id| id.to_hex()),
        })),
    ))
}

// GET /verify/:reference
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse> {
    if reference.is_empty() {
        return Err(AppError::validation("Reference is required"));
    }

    let transaction = transactions(&state.db)
        .find_one(doc! { "transactionId": &reference })
        .await?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    // Completed is terminal: return the stored record, run no side effects.
    if transaction.status == TransactionStatus::Completed {
        return Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Transaction already completed",
                "data": transaction,
            })),
        ));
    }

    // Gateway unreachable or malformed => ExternalService error; the
    // transaction stays pending for a later retry.
    let verification = state.paystack()?.verify(&reference).await?;

    match reconcile_transaction(transaction.status, verification.is_success()) {
        VerifyAction::AlreadyCompleted => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Transaction already completed",
                "data": transaction,
            })),
        )),
        VerifyAction::Complete => {
            let now = Utc::now();
            let paid_at = verification
                .paid_at
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);

            // Conditional on still-pending so a concurrent verify cannot
            // apply the completion twice.
            let completed = transactions(&state.db)
                .find_one_and_update(
                    doc! { "transactionId": &reference, "status": "pending" },
                    doc! { "$set": {
                        "status": "completed",
                        "paidAt": bson::DateTime::from_chrono(paid_at),
                        "channel": verification.channel.clone(),
                        "currency": verification.currency.clone(),
                        "customer": verification.customer.as_ref().and_then(|c| c.email.clone()),
                        "gatewayResponse": verification.gateway_response.clone(),
                    }},
                )
                .return_document(ReturnDocument::After)
                .await?;

            match completed {
                Some(tx) => {
                    // Side effects belong to the first completion only.
                    if tx.amount >= MARK_SOLD_THRESHOLD {
                        properties(&state.db)
                            .update_one(
                                doc! { "_id": tx.property },
                                doc! { "$set": { "status": "sold" } },
                            )
                            .await?;
                        info!("Property {} marked sold", tx.property);
                    }

                    Ok((
                        StatusCode::OK,
                        Json(json!({
                            "success": true,
                            "message": "Payment verified successfully",
                            "data": tx,
                        })),
                    ))
                }
                None => {
                    // A concurrent verify completed it first.
                    let current = transactions(&state.db)
                        .find_one(doc! { "transactionId": &reference })
                        .await?
                        .ok_or_else(|| AppError::not_found("Transaction not found"))?;
                    Ok((
                        StatusCode::OK,
                        Json(json!({
                            "success": true,
                            "message": "Transaction already completed",
                            "data": current,
                        })),
                    ))
                }
            }
        }
        VerifyAction::MarkFailed => {
            let failed = transactions(&state.db)
                .find_one_and_update(
                    doc! { "transactionId": &reference, "status": "pending" },
                    doc! { "$set": { "status": "failed" } },
                )
                .return_document(ReturnDocument::After)
                .await?
                .unwrap_or(transaction);

            Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "message": format!("Payment {}", verification.status),
                    "data": failed,
                })),
            ))
        }
    }
}

// GET /transactions/:user_id
pub async fn get_user_transactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    let requested = ObjectId::parse_str(&user_id)?;
    if claims.user_id()? != requested && !claims.is_admin() {
        return Err(AppError::not_authorized(
            "Not authorized to view these transactions",
        ));
    }

    let cursor = transactions(&state.db)
        .find(doc! { "user": requested })
        .sort(doc! { "createdAt": -1 })
        .await?;
    let all: Vec<Transaction> = cursor.try_collect().await?;

    Ok(Json(json!({
        "success": true,
        "count": all.len(),
        "data": all,
    })))
}

// GET /:id
pub async fn get_transaction_by_id(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let transaction_id = ObjectId::parse_str(&id)?;

    let transaction = transactions(&state.db)
        .find_one(doc! { "_id": transaction_id })
        .await?
        .ok_or_else(|| AppError::not_found("Transaction not found"))?;

    if transaction.user != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::not_authorized(
            "Not authorized to view this transaction",
        ));
    }

    Ok(Json(json!({
        "success": true,
        "data": transaction,
        "message": format!("Transaction of Id {} found", id),
    })))
}
