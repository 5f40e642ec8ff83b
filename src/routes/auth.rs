// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account and session routes (/api/auth/*).

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidateEmail, ValidationError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::extract::ValidJson;
use crate::middleware::auth::{AuthUser, SESSION_COOKIE};
use crate::models::user::normalize_email;
use crate::models::{AuthMethod, Preferences, Theme, User, UserResponse};
use crate::services::{TokenKind, TokenPair};
use crate::time_utils::now_rfc3339;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 6;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/google", post(google_auth))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", put(update_profile))
        .route("/api/auth/change-password", post(change_password))
        .route("/api/auth/logout", post(logout))
}

// ─── Response bodies ─────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AuthData {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

#[derive(Serialize)]
pub struct UserData {
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct TokensData {
    pub tokens: TokenPair,
}

/// `{ success: true, message?, data }` envelope used by every auth route.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    fn message(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data: None,
        })
    }
}

// ─── Session helpers ─────────────────────────────────────────

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.frontend_url.starts_with("https://"))
        .build()
}

/// Issue a token pair for `user`, set the session cookie, and build the body.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> Result<(CookieJar, Json<ApiResponse<AuthData>>)> {
    let tokens = state.credentials.issue_tokens(&user.id)?;
    let jar = jar.add(session_cookie(state, tokens.access_token.clone()));

    Ok((
        jar,
        ApiResponse::data(AuthData {
            user: UserResponse::from(user),
            tokens,
        }),
    ))
}

async fn hash_password(state: &Arc<AppState>, password: String) -> Result<String> {
    let credentials = state.credentials.clone();
    let hash = tokio::task::spawn_blocking(move || credentials.hash_password(&password)).await??;
    Ok(hash)
}

async fn verify_password(state: &Arc<AppState>, password: String, hash: String) -> Result<bool> {
    let credentials = state.credentials.clone();
    let ok = tokio::task::spawn_blocking(move || credentials.verify_password(&password, &hash))
        .await?;
    Ok(ok)
}

async fn load_user(state: &AppState, user_id: &str) -> Result<User> {
    state
        .db
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn check_new_password(password: &str, confirm: &str) -> std::result::Result<(), ValidationError> {
    if password != confirm {
        return Err(ValidationError::new("mismatch").with_message("Passwords do not match".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new("length")
            .with_message("Password must be at least 6 characters".into()));
    }
    Ok(())
}

// ─── Register ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_register"))]
pub struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
    #[serde(default)]
    full_name: String,
}

fn validate_register(req: &RegisterRequest) -> std::result::Result<(), ValidationError> {
    if blank(&req.email) || req.password.is_empty() || req.confirm_password.is_empty() || blank(&req.full_name) {
        return Err(ValidationError::new("required")
            .with_message("All fields are required".into()));
    }
    check_new_password(&req.password, &req.confirm_password)?;
    if !req.email.trim().validate_email() {
        return Err(ValidationError::new("email")
            .with_message("Please provide a valid email address".into()));
    }
    Ok(())
}

async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse<AuthData>>)> {
    let email = normalize_email(&req.email);

    if state.db.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::DuplicateKey("Email already registered".to_string()));
    }

    let now = now_rfc3339();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        password_hash: Some(hash_password(&state, req.password).await?),
        full_name: req.full_name.trim().to_string(),
        google_id: None,
        avatar: None,
        auth_method: AuthMethod::Password,
        is_email_verified: false,
        preferences: Preferences::default(),
        created_at: now.clone(),
        updated_at: now,
    };

    // The store's unique index catches a racing registration for the same email.
    state.db.create_user(&user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    let (jar, body) = start_session(&state, jar, &user)?;
    Ok((StatusCode::CREATED, jar, body))
}

// ─── Login ───────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_login"))]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn validate_login(req: &LoginRequest) -> std::result::Result<(), ValidationError> {
    if blank(&req.email) || req.password.is_empty() {
        return Err(ValidationError::new("required")
            .with_message("Email and password are required".into()));
    }
    Ok(())
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthData>>)> {
    let bad_credentials = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = state
        .db
        .find_user_by_email(&normalize_email(&req.email))
        .await?
        .ok_or_else(bad_credentials)?;

    // OAuth-only accounts have no password to check.
    let hash = user.password_hash.clone().ok_or_else(bad_credentials)?;
    if !verify_password(&state, req.password, hash).await? {
        tracing::info!(user_id = %user.id, "Login rejected: wrong password");
        return Err(bad_credentials());
    }

    tracing::info!(user_id = %user.id, "User logged in");
    start_session(&state, jar, &user)
}

// ─── Google ──────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_google"))]
pub struct GoogleAuthRequest {
    #[serde(default)]
    google_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    avatar: Option<String>,
}

fn validate_google(req: &GoogleAuthRequest) -> std::result::Result<(), ValidationError> {
    if blank(&req.google_id) || blank(&req.email) || blank(&req.full_name) {
        return Err(ValidationError::new("required").with_message("Google data incomplete".into()));
    }
    Ok(())
}

/// Upsert by Google ID, then by email.
///
/// The Google profile is trusted as sent; the frontend has already completed
/// the OAuth exchange.
async fn google_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidJson(req): ValidJson<GoogleAuthRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthData>>)> {
    let google_id = req.google_id.trim().to_string();
    let email = normalize_email(&req.email);
    let avatar = req.avatar.filter(|a| !blank(a));

    let existing = match state.db.find_user_by_google_id(&google_id).await? {
        Some(user) => Some(user),
        None => state.db.find_user_by_email(&email).await?,
    };

    let user = match existing {
        Some(mut user) => {
            let mut changed = false;
            if user.google_id.is_none() {
                state.db.claim_google_id(&google_id, &user.id).await?;
                user.google_id = Some(google_id);
                user.auth_method = AuthMethod::Oauth;
                changed = true;
            }
            if user.avatar.is_none() && avatar.is_some() {
                user.avatar = avatar;
                changed = true;
            }
            if changed {
                user.updated_at = now_rfc3339();
                state.db.update_user(&user).await?;
            }
            user
        }
        None => {
            let now = now_rfc3339();
            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                email,
                password_hash: None,
                full_name: req.full_name.trim().to_string(),
                google_id: Some(google_id),
                avatar,
                auth_method: AuthMethod::Oauth,
                is_email_verified: true,
                preferences: Preferences::default(),
                created_at: now.clone(),
                updated_at: now,
            };
            state.db.create_user(&user).await?;
            tracing::info!(user_id = %user.id, "User created from Google sign-in");
            user
        }
    };

    start_session(&state, jar, &user)
}

// ─── Refresh ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Refresh token is required"))]
    refresh_token: String,
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> Result<(CookieJar, Json<ApiResponse<TokensData>>)> {
    let verified = state.credentials.verify_token(&req.refresh_token)?;
    if verified.kind != TokenKind::Refresh {
        return Err(AppError::InvalidToken);
    }

    // Deleted users cannot refresh.
    let user = state
        .db
        .find_user_by_id(&verified.user_id)
        .await?
        .ok_or(AppError::InvalidToken)?;

    let tokens = state.credentials.issue_tokens(&user.id)?;
    let jar = jar.add(session_cookie(&state, tokens.access_token.clone()));
    Ok((jar, ApiResponse::data(TokensData { tokens })))
}

// ─── Current user ────────────────────────────────────────────

async fn me(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<UserData>>> {
    let user = load_user(&state, &auth.user_id).await?;
    Ok(ApiResponse::data(UserData {
        user: UserResponse::from(&user),
    }))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200, message = "Full name must be 1-200 characters"))]
    full_name: Option<String>,
    #[validate(url(message = "Avatar must be a valid URL"))]
    avatar: Option<String>,
    theme: Option<Theme>,
    email_notifications: Option<bool>,
}

/// Partial update; absent fields are left alone.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserData>>> {
    let mut user = load_user(&state, &auth.user_id).await?;

    if let Some(full_name) = req.full_name.filter(|n| !blank(n)) {
        user.full_name = full_name.trim().to_string();
    }
    if let Some(avatar) = req.avatar {
        user.avatar = Some(avatar);
    }
    if let Some(theme) = req.theme {
        user.preferences.theme = theme;
    }
    if let Some(enabled) = req.email_notifications {
        user.preferences.email_notifications = enabled;
    }
    user.updated_at = now_rfc3339();

    state.db.update_user(&user).await?;
    tracing::info!(user_id = %user.id, "Profile updated");

    Ok(ApiResponse::data(UserData {
        user: UserResponse::from(&user),
    }))
}

// ─── Password change ─────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_change_password"))]
pub struct ChangePasswordRequest {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
    #[serde(default)]
    confirm_password: String,
}

fn validate_change_password(req: &ChangePasswordRequest) -> std::result::Result<(), ValidationError> {
    if req.current_password.is_empty() || req.new_password.is_empty() || req.confirm_password.is_empty() {
        return Err(ValidationError::new("required")
            .with_message("All fields are required".into()));
    }
    check_new_password(&req.new_password, &req.confirm_password)
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>> {
    let mut user = load_user(&state, &auth.user_id).await?;

    let hash = user.password_hash.clone().ok_or_else(|| {
        AppError::Validation("This account signs in with Google and has no password".to_string())
    })?;

    if !verify_password(&state, req.current_password, hash).await? {
        return Err(AppError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    user.password_hash = Some(hash_password(&state, req.new_password).await?);
    user.updated_at = now_rfc3339();
    state.db.update_user(&user).await?;
    tracing::info!(user_id = %user.id, "Password changed");

    Ok(ApiResponse::message("Password changed successfully"))
}

// ─── Logout ──────────────────────────────────────────────────

/// Tokens are stateless; logout only clears the session cookie.
async fn logout(auth: AuthUser, jar: CookieJar) -> (CookieJar, Json<ApiResponse<()>>) {
    tracing::info!(user_id = %auth.user_id, "User logged out");
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, ApiResponse::message("Logged out successfully"))
}
