//! Session lifecycle (login, refresh, logout), registration and account
//! updates. Handlers stay thin; every rule about users and tokens lives here.

use axum::extract::FromRef;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{
        ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser, RegisterRequest,
        TokenPair, UpdateProfileRequest,
    },
    jwt::JwtKeys,
    password::{hash_password, is_strong_password, is_valid_email, verify_password, PASSWORD_POLICY},
    repo::StoreError,
    repo_types::{NewUser, User},
};
use crate::{
    error::{AppError, AppResult},
    media::{LocalFile, UploadedMedia},
    state::AppState,
};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

const AVATAR_FOLDER: &str = "avatars";
const COVER_FOLDER: &str = "covers";

fn token_failure() -> AppError {
    AppError::Internal("Error while generating access or refresh token".into())
}

/// Trimmed, lowercased, `None` when blank.
fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn mint_pair(keys: &JwtKeys, user_id: Uuid) -> AppResult<TokenPair> {
    let sign = |res: anyhow::Result<String>| {
        res.map_err(|e| {
            error!(error = %e, %user_id, "jwt sign failed");
            token_failure()
        })
    };
    Ok(TokenPair {
        access_token: sign(keys.sign_access(user_id))?,
        refresh_token: sign(keys.sign_refresh(user_id))?,
    })
}

/// Mints a fresh access/refresh pair and stores the refresh token as the
/// user's only live one.
pub async fn issue_pair(st: &AppState, user_id: Uuid) -> AppResult<TokenPair> {
    let user = st
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "load user for token issue failed");
            token_failure()
        })?
        .ok_or_else(|| {
            error!(%user_id, "token issue for unknown user");
            token_failure()
        })?;

    let tokens = mint_pair(&JwtKeys::from_ref(st), user.id)?;

    st.users
        .set_refresh_token(user.id, Some(&tokens.refresh_token))
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "persist refresh token failed");
            token_failure()
        })?;
    Ok(tokens)
}

pub async fn login(st: &AppState, req: LoginRequest) -> AppResult<LoginResponse> {
    let user_name = normalize(req.user_name.as_deref());
    let email = normalize(req.email.as_deref());
    if user_name.is_none() && email.is_none() {
        return Err(AppError::BadRequest("please provide username or email".into()));
    }
    let password = present(req.password.as_deref())
        .ok_or_else(|| AppError::BadRequest("please provide password".into()))?;

    let user = st
        .users
        .find_by_identifier(user_name.as_deref(), email.as_deref())
        .await?
        .ok_or_else(|| AppError::BadRequest("user not found".into()))?;

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::Unauthorized("Wrong credentials".into()));
    }

    let tokens = issue_pair(st, user.id).await?;
    if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
        return Err(AppError::Internal("Try Again".into()));
    }

    info!(user_id = %user.id, "user logged in");
    Ok(LoginResponse {
        user: PublicUser::from(user),
        tokens,
    })
}

/// Rotates the refresh token. The presented token must be the one currently
/// stored for the user; anything else revokes the stored token.
pub async fn refresh(st: &AppState, incoming: Option<String>) -> AppResult<TokenPair> {
    let incoming = incoming
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Refresh token is required".into()))?;

    let keys = JwtKeys::from_ref(st);
    let claims = keys.verify_refresh(&incoming).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        AppError::BadRequest("Invalid or expired refresh token".into())
    })?;

    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid refresh token".into()))?;

    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        warn!(user_id = %user.id, "stale refresh token presented, revoking session");
        st.users.set_refresh_token(user.id, None).await?;
        return Err(AppError::BadRequest("Refresh token is expired or used".into()));
    }

    let tokens = mint_pair(&keys, user.id)?;
    let rotated = st
        .users
        .rotate_refresh_token(user.id, &incoming, &tokens.refresh_token)
        .await?;
    if !rotated {
        warn!(user_id = %user.id, "refresh token rotated concurrently");
        return Err(AppError::BadRequest("Refresh token is expired or used".into()));
    }

    info!(user_id = %user.id, "tokens refreshed");
    Ok(tokens)
}

pub async fn logout(st: &AppState, user_id: Uuid) -> AppResult<()> {
    st.users.set_refresh_token(user_id, None).await?;
    info!(%user_id, "user logged out");
    Ok(())
}

pub async fn change_password(
    st: &AppState,
    user_id: Uuid,
    req: ChangePasswordRequest,
) -> AppResult<()> {
    let (Some(old), Some(new)) = (
        present(req.old_password.as_deref()),
        present(req.new_password.as_deref()),
    ) else {
        return Err(AppError::BadRequest("Provide password and new password".into()));
    };

    let user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("user not found".into()))?;

    if !verify_password(old, &user.password_hash)? {
        warn!(%user_id, "change password with wrong current password");
        return Err(AppError::BadRequest("Wrong Password".into()));
    }
    if !is_strong_password(new) {
        return Err(AppError::BadRequest(PASSWORD_POLICY.into()));
    }

    let hash = hash_password(new)?;
    st.users.update_password(user_id, &hash).await?;
    info!(%user_id, "password changed");
    Ok(())
}

fn validate_registration(req: &RegisterRequest) -> AppResult<()> {
    if req.user_name.trim().is_empty() {
        return Err(AppError::BadRequest("username is mandatory".into()));
    }
    if !is_valid_email(req.email.trim()) {
        return Err(AppError::BadRequest("Please type a valid email".into()));
    }
    if req.full_name.trim().is_empty() {
        return Err(AppError::BadRequest("fullName is mandatory".into()));
    }
    if !is_strong_password(&req.password) {
        return Err(AppError::BadRequest(PASSWORD_POLICY.into()));
    }
    Ok(())
}

pub async fn register(
    st: &AppState,
    req: RegisterRequest,
    avatar: Option<LocalFile>,
    cover: Option<LocalFile>,
) -> AppResult<PublicUser> {
    validate_registration(&req)?;
    let user_name = req.user_name.trim().to_lowercase();
    let email = req.email.trim().to_lowercase();

    if st
        .users
        .find_by_identifier(Some(&user_name), Some(&email))
        .await?
        .is_some()
    {
        warn!(%user_name, %email, "registration for existing user");
        return Err(AppError::Conflict("User already exist".into()));
    }

    let avatar = avatar.ok_or_else(|| AppError::Conflict("please upload avatar".into()))?;

    let mut uploaded: Vec<UploadedMedia> = Vec::with_capacity(2);
    let result: AppResult<User> = async {
        let avatar = st.media.upload(&avatar, AVATAR_FOLDER).await.map_err(|e| {
            error!(error = %e, "avatar upload failed");
            AppError::Internal("Avatar upload failed".into())
        })?;
        let avatar_url = avatar.url.clone();
        uploaded.push(avatar);

        let cover_image_url = match &cover {
            Some(file) => {
                let media = st.media.upload(file, COVER_FOLDER).await.map_err(|e| {
                    error!(error = %e, "cover image upload failed");
                    AppError::Internal("Cover image upload failed".into())
                })?;
                let url = media.url.clone();
                uploaded.push(media);
                url
            }
            None => String::new(),
        };

        let created = st
            .users
            .create(NewUser {
                user_name,
                email,
                full_name: req.full_name.trim().to_string(),
                password_hash: hash_password(&req.password)?,
                avatar_url: Some(avatar_url),
                cover_image_url,
            })
            .await?;

        st.users.find_by_id(created.id).await?.ok_or_else(|| {
            AppError::Internal("Something went wrong while registering the user".into())
        })
    }
    .await;

    match result {
        Ok(user) => {
            info!(user_id = %user.id, user_name = %user.user_name, "user registered");
            Ok(PublicUser::from(user))
        }
        Err(e) => {
            for media in &uploaded {
                if let Err(del) = st.media.remove(media).await {
                    warn!(error = %del, key = %media.key, "orphaned media object");
                }
            }
            Err(e)
        }
    }
}

pub async fn update_profile(
    st: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> AppResult<PublicUser> {
    let full_name = req.full_name.as_deref().map(str::trim).unwrap_or_default();
    let email = normalize(req.email.as_deref()).unwrap_or_default();
    if full_name.is_empty() || email.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Please type a valid email".into()));
    }

    let user = st
        .users
        .update_profile(user_id, full_name, &email)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => AppError::Conflict("Email already in use".into()),
            other => AppError::from(other),
        })?
        .ok_or_else(|| AppError::BadRequest("user not found".into()))?;
    info!(%user_id, "profile updated");
    Ok(PublicUser::from(user))
}
