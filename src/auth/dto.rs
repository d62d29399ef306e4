use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::User;

/// Text fields of the registration form. Files travel separately.
#[derive(Debug, Default)]
pub struct RegisterRequest {
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// Request body for login. Either `userName` or `email` identifies the user.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "username")]
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for token refresh; the cookie takes precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(alias = "password")]
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Response data returned after login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub cover_image: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            user_name: u.user_name,
            email: u.email,
            full_name: u.full_name,
            avatar: u.avatar_url,
            cover_image: u.cover_image_url,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
