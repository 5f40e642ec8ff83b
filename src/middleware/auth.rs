// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication extractor.

use crate::error::AppError;
use crate::services::TokenKind;
use crate::AppState;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Session cookie name, checked before the Authorization header.
pub const SESSION_COOKIE: &str = "form_easy_token";

/// Authenticated user extracted from an access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl AuthUser {
    /// Fail with 403 unless this user owns the resource.
    pub fn ensure_owner(&self, owner_id: &str) -> Result<(), AppError> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Pull the raw token from the session cookie or `Authorization: Bearer`.
fn extract_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Access token required".to_string()))?;

        let verified = state.credentials.verify_token(&token)?;

        // Refresh tokens are only good for /api/auth/refresh.
        if verified.kind != TokenKind::Access {
            return Err(AppError::InvalidToken);
        }

        Ok(AuthUser {
            user_id: verified.user_id,
        })
    }
}
