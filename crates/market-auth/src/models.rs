//! Canonical records shared by the identity, profile and session layers.
//!
//! Server payloads are decoded leniently: apart from the identifier every
//! field may be missing, and unknown fields are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Searches for and rates vendors.
    Consumer,
    /// Offers services to consumers.
    Vendor,
    /// Back-office operator; has no role profile.
    Admin,
}

impl Role {
    /// Parse a role name case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CONSUMER" => Some(Role::Consumer),
            "VENDOR" => Some(Role::Vendor),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "CONSUMER",
            Role::Vendor => "VENDOR",
            Role::Admin => "ADMIN",
        }
    }
}

/// Account status reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
    PendingVerification,
    #[serde(other)]
    Unknown,
}

/// Canonical authenticated-user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Missing or unrecognised roles decode as `None`.
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Option<Role>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub status: Option<AccountStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Actor {
    /// Minimal actor with an id and role, everything else unset.
    pub fn new(id: impl Into<String>, role: Option<Role>) -> Self {
        Self {
            id: id.into(),
            email: None,
            first_name: None,
            last_name: None,
            phone: None,
            role,
            email_verified: false,
            phone_verified: false,
            status: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// "First Last", falling back to the email, then the id.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !full.is_empty() {
            full
        } else if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            email.to_string()
        } else {
            self.id.clone()
        }
    }
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Role::parse))
}

/// Geographic point with an optional human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
}

/// Consumer-specific profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub search_radius_km: Option<f64>,
    /// Preferred service categories.
    #[serde(default)]
    pub preferences: Vec<String>,
}

/// Vendor-specific profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub service_categories: Vec<String>,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub rating_count: u32,
}

/// Role profile loaded after authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleProfile {
    Consumer(ConsumerProfile),
    Vendor(VendorProfile),
}

impl RoleProfile {
    /// Role this profile belongs to.
    pub fn role(&self) -> Role {
        match self {
            RoleProfile::Consumer(_) => Role::Consumer,
            RoleProfile::Vendor(_) => Role::Vendor,
        }
    }
}

/// Registration form sent to `POST /auth/register`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_actor_decodes_minimal_payload() {
        let actor: Actor = serde_json::from_value(json!({"id": "u1", "role": "CONSUMER"})).unwrap();
        assert_eq!(actor.id, "u1");
        assert_eq!(actor.role, Some(Role::Consumer));
        assert!(!actor.email_verified);
        assert_eq!(actor.status, None);
    }

    #[test]
    fn test_actor_decodes_full_payload() {
        let actor: Actor = serde_json::from_value(json!({
            "id": "u2",
            "email": "v@shop.test",
            "firstName": "Vera",
            "lastName": "Stone",
            "role": "VENDOR",
            "emailVerified": true,
            "status": "ACTIVE",
            "createdAt": "2024-03-01T10:00:00Z",
            "somethingNew": 42
        }))
        .unwrap();

        assert_eq!(actor.role, Some(Role::Vendor));
        assert_eq!(actor.status, Some(AccountStatus::Active));
        assert!(actor.email_verified);
        assert!(actor.created_at.is_some());
        assert_eq!(actor.display_name(), "Vera Stone");
    }

    #[test]
    fn test_unknown_role_and_status_are_tolerated() {
        let actor: Actor = serde_json::from_value(json!({
            "id": "u3",
            "role": "SUPERHERO",
            "status": "FROZEN"
        }))
        .unwrap();
        assert_eq!(actor.role, None);
        assert_eq!(actor.status, Some(AccountStatus::Unknown));
    }

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("consumer"), Some(Role::Consumer));
        assert_eq!(Role::parse(" Vendor "), Some(Role::Vendor));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("guest"), None);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut actor = Actor::new("u1", None);
        assert_eq!(actor.display_name(), "u1");

        actor.email = Some("a@b.com".to_string());
        assert_eq!(actor.display_name(), "a@b.com");

        actor.first_name = Some("Ada".to_string());
        assert_eq!(actor.display_name(), "Ada");
    }

    #[test]
    fn test_register_request_wire_shape() {
        let request = RegisterRequest {
            email: "a@b.com".to_string(),
            password: "secret123".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
            role: Role::Vendor,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "email": "a@b.com",
                "password": "secret123",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "role": "VENDOR"
            })
        );
    }
}
