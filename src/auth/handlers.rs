use std::path::Path;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar},
    WithRejection,
};
use tracing::instrument;

use super::{
    dto::{
        ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser, RefreshRequest,
        RegisterRequest, TokenPair, UpdateProfileRequest,
    },
    extractors::{require_auth, AuthUser, JsonOrForm},
    services::{self, ACCESS_COOKIE, REFRESH_COOKIE},
};
use crate::{
    error::{AppError, AppResult},
    media::{discard, spool_to_disk, LocalFile},
    response::ApiResponse,
    state::AppState,
};

pub fn public_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/register",
            post(register).layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

pub fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-profile", post(update_profile))
        .route("/update-avatar", post(update_avatar))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

// --- cookies ---

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new());
    cookie.make_removal();
    cookie
}

fn with_session_cookies(jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, tokens.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, tokens.refresh_token.clone()))
}

// --- registration form ---

#[derive(Default)]
struct RegisterForm {
    fields: RegisterRequest,
    avatar: Option<LocalFile>,
    cover: Option<LocalFile>,
}

impl RegisterForm {
    fn files(&self) -> Vec<LocalFile> {
        self.avatar.iter().chain(self.cover.iter()).cloned().collect()
    }
}

async fn read_register_form(
    dir: &Path,
    mp: &mut Multipart,
    form: &mut RegisterForm,
) -> AppResult<()> {
    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "avatar" | "coverImage" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                if data.is_empty() {
                    continue;
                }
                let file = spool_to_disk(dir, data, &content_type, file_name.as_deref()).await?;
                let slot = if name == "avatar" {
                    &mut form.avatar
                } else {
                    &mut form.cover
                };
                if let Some(previous) = slot.replace(file) {
                    discard(&previous).await;
                }
            }
            "userName" | "username" => form.fields.user_name = field.text().await?,
            "email" => form.fields.email = field.text().await?,
            "fullName" => form.fields.full_name = field.text().await?,
            "password" => form.fields.password = field.text().await?,
            _ => {}
        }
    }
    Ok(())
}

// --- handlers ---

/// POST /register (multipart): userName, email, fullName, password, avatar, coverImage?
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    WithRejection(mut mp, _): WithRejection<Multipart, AppError>,
) -> AppResult<ApiResponse<PublicUser>> {
    let mut form = RegisterForm::default();
    let parsed = read_register_form(&state.config.upload_dir, &mut mp, &mut form).await;
    let spooled = form.files();

    let result = match parsed {
        Ok(()) => services::register(&state, form.fields, form.avatar, form.cover).await,
        Err(e) => Err(e),
    };
    for file in &spooled {
        discard(file).await;
    }

    let user = result?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered Successfully",
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonOrForm(payload): JsonOrForm<LoginRequest>,
) -> AppResult<(CookieJar, ApiResponse<LoginResponse>)> {
    let res = services::login(&state, payload).await?;
    let jar = with_session_cookies(jar, &res.tokens);
    Ok((jar, ApiResponse::ok(res, "User logged In Successfully")))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, ApiResponse<serde_json::Value>)> {
    services::logout(&state, user.id).await?;
    let jar = jar
        .add(removal_cookie(ACCESS_COOKIE))
        .add(removal_cookie(REFRESH_COOKIE));
    Ok((jar, ApiResponse::ok(serde_json::json!({}), "User logged Out")))
}

/// POST /refresh-token. Token from the `refreshToken` cookie or the JSON body.
#[instrument(skip(state, jar, body))]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<JsonOrForm<RefreshRequest>>,
) -> AppResult<(CookieJar, ApiResponse<TokenPair>)> {
    let incoming = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|JsonOrForm(b)| b.refresh_token));

    let tokens = services::refresh(&state, incoming).await?;
    let jar = with_session_cookies(jar, &tokens);
    Ok((jar, ApiResponse::ok(tokens, "Access token refreshed")))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonOrForm(payload): JsonOrForm<ChangePasswordRequest>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    services::change_password(&state, user.id, payload).await?;
    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn current_user(AuthUser(user): AuthUser) -> ApiResponse<PublicUser> {
    ApiResponse::ok(user, "User fetched successfully")
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonOrForm(payload): JsonOrForm<UpdateProfileRequest>,
) -> AppResult<ApiResponse<PublicUser>> {
    let user = services::update_profile(&state, user.id, payload).await?;
    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

pub async fn update_avatar(AuthUser(_user): AuthUser) -> AppResult<ApiResponse<PublicUser>> {
    Err(AppError::NotImplemented("Avatar update is not available yet".into()))
}
