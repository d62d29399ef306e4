use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub user_name: String, // always lowercase
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub avatar_url: Option<String>,
    pub cover_image_url: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>, // single live refresh token
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub cover_image_url: String,
}
