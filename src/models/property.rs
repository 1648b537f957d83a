// src/models/property.rs
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Apartment,
    House,
    Condo,
    Land,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Rent,
    Sale,
    Sold,
    Rented,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyImage {
    pub public_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub address: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub status: PropertyStatus,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub area: f64,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<PropertyImage>,
    pub agent: ObjectId,

    // Featured state: "actively featured" is always derived from these two,
    // never stored as its own flag.
    #[serde(default)]
    pub is_featured: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub featured_expiry: Option<bson::DateTime>,

    // Audit trail: which subscription paid for this slot and in what order.
    // Immutable after creation, even if the subscription later expires.
    pub subscription_used: ObjectId,
    pub posting_order: i64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Property {
    /// Derived featured check; the source of truth for "is this listing
    /// currently promoted". No sweep is needed for this to flip off.
    pub fn is_featured_active(&self, now: DateTime<Utc>) -> bool {
        match (self.is_featured, self.featured_expiry) {
            (true, Some(expiry)) => now < expiry.to_chrono(),
            _ => false,
        }
    }

    pub fn is_owned_by(&self, user_id: &ObjectId) -> bool {
        &self.agent == user_id
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePropertyRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub price: f64,
    #[validate(length(min = 1))]
    pub address: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub status: PropertyStatus,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub area: f64,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<PropertyImage>,
}

/// Update payload. Subscription bookkeeping fields are deliberately absent so
/// a client can never reassign `subscriptionUsed` or `postingOrder`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePropertyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub status: Option<PropertyStatus>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<f64>,
    pub amenities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePropertyRequest {
    #[serde(default = "default_feature_duration")]
    pub duration_days: i64,
}

fn default_feature_duration() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(is_featured: bool, expiry: Option<DateTime<Utc>>) -> Property {
        Property {
            id: Some(ObjectId::new()),
            title: "2 bed flat".to_string(),
            description: "desc".to_string(),
            price: 250_000.0,
            address: "12 Marina Rd, Lagos".to_string(),
            property_type: PropertyType::Apartment,
            status: PropertyStatus::Sale,
            bedrooms: 2,
            bathrooms: 1,
            area: 85.0,
            amenities: vec![],
            images: vec![],
            agent: ObjectId::new(),
            is_featured,
            featured_expiry: expiry.map(bson::DateTime::from_chrono),
            subscription_used: ObjectId::new(),
            posting_order: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn featured_is_derived_from_flag_and_expiry() {
        let now = Utc::now();
        let p = property(true, Some(now + chrono::Duration::days(30)));
        assert!(p.is_featured_active(now));

        // Advance the clock past expiry: flips off with no job running.
        let later = now + chrono::Duration::days(31);
        assert!(!p.is_featured_active(later));
    }

    #[test]
    fn flag_without_expiry_is_not_active() {
        let now = Utc::now();
        assert!(!property(true, None).is_featured_active(now));
        assert!(!property(false, Some(now + chrono::Duration::days(1))).is_featured_active(now));
    }

    #[test]
    fn update_payload_cannot_touch_subscription_fields() {
        // subscriptionUsed / postingOrder in the payload are simply ignored.
        let raw = serde_json::json!({
            "title": "new title",
            "subscriptionUsed": "64b000000000000000000000",
            "postingOrder": 99
        });
        let parsed: UpdatePropertyRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("new title"));
    }
}
