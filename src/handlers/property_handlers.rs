// handlers/property_handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bson::{doc, oid::ObjectId, Document};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::property::{
    CreatePropertyRequest, FeaturePropertyRequest, Property, UpdatePropertyRequest,
};
use crate::models::user::Claims;
use crate::services::quota::{self, QuotaKind};
use crate::state::AppState;

pub fn properties(db: &Database) -> Collection<Property> {
    db.collection("properties")
}

// POST /
pub async fn create_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePropertyRequest>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;
    payload.validate()?;

    let now = Utc::now();

    let subscription_id = subscription_id_for(&state, agent, now).await?;

    // Atomic check-and-increment: the returned counter value is this
    // listing's slot, so postingOrder is race-free too.
    let subscription =
        quota::consume(&state.db, subscription_id, QuotaKind::Listing, now).await?;

    let property = Property {
        id: None,
        title: payload.title,
        description: payload.description,
        price: payload.price,
        address: payload.address,
        property_type: payload.property_type,
        status: payload.status,
        bedrooms: payload.bedrooms,
        bathrooms: payload.bathrooms,
        area: payload.area,
        amenities: payload.amenities,
        images: payload.images,
        agent,
        is_featured: false,
        featured_expiry: None,
        subscription_used: subscription
            .id
            .ok_or_else(|| AppError::validation("Subscription missing id"))?,
        posting_order: subscription.properties_posted,
        created_at: now,
    };

    let inserted = properties(&state.db).insert_one(&property).await?;
    info!(
        "Property posted by agent {} (slot {}/{})",
        agent, subscription.properties_posted, subscription.plan_details.property_limit
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "id": inserted.inserted_id.as_object_id().map(|id| id.to_hex()),
                "property": property,
            },
            "subscription": {
                "propertiesRemaining": subscription.remaining_properties(),
                "featuredListingsRemaining": subscription.remaining_featured_listings(),
            },
        })),
    ))
}

async fn subscription_id_for(
    state: &AppState,
    agent: ObjectId,
    now: chrono::DateTime<Utc>,
) -> Result<ObjectId> {
    let subscription = quota::find_usable_subscription(&state.db, agent, now)
        .await?
        .ok_or_else(|| {
            AppError::not_authorized("You need an active subscription to post properties")
        })?;
    subscription
        .id
        .ok_or_else(|| AppError::validation("Subscription missing id"))
}

// GET /:id
pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let property_id = ObjectId::parse_str(&id)?;
    let property = properties(&state.db)
        .find_one(doc! { "_id": property_id })
        .await?
        .ok_or_else(|| AppError::not_found(format!("Property not found with id of {}", id)))?;

    Ok(Json(json!({ "success": true, "data": property })))
}

// PUT /:id
pub async fn update_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePropertyRequest>,
) -> Result<impl IntoResponse> {
    let property_id = ObjectId::parse_str(&id)?;
    let user_id = claims.user_id()?;

    let property = properties(&state.db)
        .find_one(doc! { "_id": property_id })
        .await?
        .ok_or_else(|| AppError::not_found(format!("Property not found with id of {}", id)))?;

    if !property.is_owned_by(&user_id) && !claims.is_admin() {
        return Err(AppError::not_authorized(
            "Not authorized to update this property",
        ));
    }

    // The payload type has no subscription bookkeeping fields, so those can
    // never be reassigned here.
    let mut set = Document::new();
    if let Some(title) = payload.title {
        set.insert("title", title);
    }
    if let Some(description) = payload.description {
        set.insert("description", description);
    }
    if let Some(price) = payload.price {
        set.insert("price", price);
    }
    if let Some(status) = payload.status {
        set.insert("status", bson::to_bson(&status)?);
    }
    if let Some(bedrooms) = payload.bedrooms {
        set.insert("bedrooms", bedrooms);
    }
    if let Some(bathrooms) = payload.bathrooms {
        set.insert("bathrooms", bathrooms);
    }
    if let Some(area) = payload.area {
        set.insert("area", area);
    }
    if let Some(amenities) = payload.amenities {
        set.insert("amenities", amenities);
    }
    if set.is_empty() {
        return Err(AppError::validation("No updatable fields provided"));
    }

    properties(&state.db)
        .update_one(doc! { "_id": property_id }, doc! { "$set": set })
        .await?;

    let updated = properties(&state.db)
        .find_one(doc! { "_id": property_id })
        .await?
        .ok_or_else(|| AppError::not_found("Property not found"))?;

    Ok(Json(json!({ "success": true, "data": updated })))
}

// DELETE /:id
pub async fn delete_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let property_id = ObjectId::parse_str(&id)?;
    let user_id = claims.user_id()?;

    let property = properties(&state.db)
        .find_one(doc! { "_id": property_id })
        .await?
        .ok_or_else(|| AppError::not_found(format!("Property not found with id of {}", id)))?;

    if !property.is_owned_by(&user_id) && !claims.is_admin() {
        return Err(AppError::not_authorized(
            "Not authorized to delete this property",
        ));
    }

    properties(&state.db)
        .delete_one(doc! { "_id": property_id })
        .await?;

    // The quota slot stays consumed; deleting a listing does not refund it.

    Ok(Json(json!({ "success": true, "data": {} })))
}

// PUT /:id/feature
pub async fn feature_property(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<FeaturePropertyRequest>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;
    let property_id = ObjectId::parse_str(&id)?;
    let now = Utc::now();

    if payload.duration_days <= 0 {
        return Err(AppError::validation("durationDays must be positive"));
    }

    let property = properties(&state.db)
        .find_one(doc! { "_id": property_id })
        .await?
        .ok_or_else(|| AppError::not_found(format!("Property not found with id of {}", id)))?;

    if !property.is_owned_by(&agent) {
        return Err(AppError::not_authorized(
            "Not authorized to feature this property",
        ));
    }

    // Derived check: a stale isFeatured flag with a past expiry does not
    // block re-featuring.
    if property.is_featured_active(now) {
        return Err(AppError::conflict("Property is already featured"));
    }

    let subscription_id = quota::find_usable_subscription(&state.db, agent, now)
        .await?
        .and_then(|s| s.id)
        .ok_or_else(|| {
            AppError::not_authorized("You need an active subscription to feature properties")
        })?;

    let subscription =
        quota::consume(&state.db, subscription_id, QuotaKind::Featured, now).await?;

    // Conditional grant: the filter re-checks not-currently-featured, so two
    // racing calls cannot both apply. The loser hands its unit back.
    let expiry = now + chrono::Duration::days(payload.duration_days);
    let applied = properties(&state.db)
        .update_one(
            not_featured_filter(property_id, now),
            doc! { "$set": {
                "isFeatured": true,
                "featuredExpiry": bson::DateTime::from_chrono(expiry),
            }},
        )
        .await?;

    if applied.matched_count == 0 {
        quota::refund(&state.db, subscription_id, QuotaKind::Featured).await?;
        return Err(AppError::conflict("Property is already featured"));
    }

    info!(
        "Property {} featured until {} by agent {}",
        property_id, expiry, agent
    );

    Ok(Json(json!({
        "success": true,
        "data": {
            "propertyId": id,
            "isFeatured": true,
            "featuredExpiry": expiry.to_rfc3339(),
        },
        "subscription": {
            "featuredListingsRemaining": subscription.remaining_featured_listings(),
        },
    })))
}

/// Matches the property only while it is not actively featured at `now`.
fn not_featured_filter(property_id: ObjectId, now: chrono::DateTime<Utc>) -> Document {
    doc! {
        "_id": property_id,
        "$nor": [ {
            "isFeatured": true,
            "featuredExpiry": { "$gt": bson::DateTime::from_chrono(now) },
        } ],
    }
}

// GET /featured
pub async fn get_featured_properties(
    State(state): State<AppState>,
) -> Result<impl IntoResponse> {
    let now = Utc::now();
    let cursor = properties(&state.db)
        .find(doc! {
            "isFeatured": true,
            "featuredExpiry": { "$gt": bson::DateTime::from_chrono(now) },
        })
        .await?;
    let featured: Vec<Property> = cursor.try_collect().await?;

    Ok(Json(json!({
        "success": true,
        "count": featured.len(),
        "data": featured,
    })))
}

// GET /my-properties
pub async fn get_my_properties(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let agent = claims.require_agent()?;
    let now = Utc::now();

    let subscription = quota::find_usable_subscription(&state.db, agent, now).await?;

    let cursor = properties(&state.db)
        .find(doc! { "agent": agent })
        .sort(doc! { "createdAt": -1 })
        .await?;
    let mine: Vec<Property> = cursor.try_collect().await?;

    let subscription_info = subscription.map(|sub| {
        json!({
            "plan": sub.plan.as_str(),
            "planDetails": sub.plan_details,
            "propertiesPosted": sub.properties_posted,
            "featuredListingsUsed": sub.featured_listings_used,
            "remainingProperties": sub.remaining_properties(),
            "remainingFeaturedListings": sub.remaining_featured_listings(),
            "endDate": sub.end_date.to_rfc3339(),
            "canPostMore": sub.can_post_property(now),
            "canCreateFeatured": sub.can_create_featured_listing(now),
        })
    });

    Ok(Json(json!({
        "success": true,
        "count": mine.len(),
        "data": mine,
        "subscription": subscription_info,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_grant_is_refused_while_a_listing_is_actively_featured() {
        let id = ObjectId::new();
        let filter = not_featured_filter(id, Utc::now());

        assert_eq!(filter.get_object_id("_id").unwrap(), id);

        // The $nor clause mirrors the derived featured check, so a racing
        // call that already featured the listing makes this filter miss and
        // the second grant never applies.
        let nor = filter.get_array("$nor").unwrap();
        let clause = nor[0].as_document().unwrap();
        assert_eq!(clause.get_bool("isFeatured").unwrap(), true);
        assert!(clause
            .get_document("featuredExpiry")
            .unwrap()
            .contains_key("$gt"));
    }
}
