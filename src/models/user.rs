// src/models/user.rs
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Authenticated principal, decoded from the bearer token by the auth
/// middleware. Token issuance lives in a separate service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub email: String,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<ObjectId> {
        ObjectId::parse_str(&self.sub).map_err(|e| AppError::InvalidObjectId(e.to_string()))
    }

    pub fn is_agent(&self) -> bool {
        self.role == "agent"
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn require_agent(&self) -> Result<ObjectId> {
        if !self.is_agent() {
            return Err(AppError::not_authorized(
                "Only agents can perform this action",
            ));
        }
        self.user_id()
    }

    pub fn require_admin(&self) -> Result<ObjectId> {
        if !self.is_admin() {
            return Err(AppError::not_authorized("Admin access required"));
        }
        self.user_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: &str) -> Claims {
        Claims {
            sub: ObjectId::new().to_hex(),
            role: role.to_string(),
            email: "agent@example.com".to_string(),
            exp: 4_102_444_800,
        }
    }

    #[test]
    fn agent_gate_rejects_plain_users() {
        assert!(claims("agent").require_agent().is_ok());
        assert!(claims("user").require_agent().is_err());
        assert!(claims("admin").require_agent().is_err());
    }
}
