use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Core Application Schemas ---

/// User
///
/// The canonical identity record. `verified` mirrors the email-verification
/// state that the route guard consults (via the Session snapshot) when a route
/// requires the `Verified` capability.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    // Salted SHA-256 digest, never the raw password.
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub verified: bool,
    // One-shot token mailed to the user; cleared once consumed.
    #[serde(skip_serializing)]
    pub verification_token: Option<Uuid>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Category
///
/// A product grouping addressed by slug in `/categories/{category}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Product
///
/// The primary resource behind the `/products` route set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    // Price in minor units (cents) to avoid floating point in money maths.
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// ProductUser
///
/// A per-user product entry (the `/product-users` route set): which products a
/// user keeps on their personal list, and in what quantity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// Credentials posted to POST /login.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Input payload for POST /register. The password is digested before storage
/// and never persisted or logged in the clear.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Input payload for POST /password/email.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Input payload for POST /password/reset. The token must match the one issued
/// by the forgot-password flow for the same email.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: Uuid,
    pub password: String,
}

/// Input payload for POST /products and PUT /products/{id}.
/// On update, absent fields keep their current value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductRequest {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
}

/// Input payload for POST /product-users and PUT /product-users/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProductUserRequest {
    pub product_id: Option<Uuid>,
    pub quantity: Option<i32>,
}

/// UserProfile
///
/// The serializable view of the signed-in user returned by auth endpoints and
/// the dashboard. Deliberately excludes digests and tokens.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub verified: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            verified: user.verified,
        }
    }
}
