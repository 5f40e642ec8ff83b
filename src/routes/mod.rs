// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod auth;
pub mod forms;

use crate::AppState;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    /// Which store backend is serving requests.
    pub database: String,
    pub build_id: String,
}

/// Health check response
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        database: state.db.backend_name().to_string(),
        build_id,
    })
}

/// Origins allowed to call the API with credentials.
fn allowed_origin(origin: &HeaderValue, frontend_url: &str) -> bool {
    let origin = origin.to_str().unwrap_or("");
    origin == frontend_url.trim_end_matches('/') || is_local_dev_origin(origin)
}

/// `http://localhost` or `http://127.0.0.1`, with an optional numeric port.
fn is_local_dev_origin(origin: &str) -> bool {
    let Some(authority) = origin.strip_prefix("http://") else {
        return false;
    };
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };
    let port_ok = match port {
        Some(port) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    };
    matches!(host, "localhost" | "127.0.0.1") && port_ok
}

/// Build the complete router with all routes.
///
/// Authentication is per handler (the `AuthUser` extractor), since public and
/// owner-only methods share paths such as `/api/form/{form_id}`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request_parts: &axum::http::request::Parts| {
                allowed_origin(origin, &frontend_url)
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([forms::DEGRADED_HEADER]);

    Router::new()
        .route("/health", get(health_check))
        .merge(auth::routes())
        .merge(forms::routes())
        .layer(middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_origins() {
        let frontend = "https://forms.example.com/";
        let check = |o: &'static str| allowed_origin(&HeaderValue::from_static(o), frontend);

        assert!(check("https://forms.example.com"));
        assert!(check("http://localhost:5173"));
        assert!(check("http://127.0.0.1:3000"));
        assert!(!check("https://evil.example.com"));
        assert!(!check("https://forms.example.com.evil.net"));
        assert!(check("http://localhost"));
        assert!(!check("http://localhost.evil.com"));
        assert!(!check("http://127.0.0.1.evil.net"));
        assert!(!check("http://localhost:5173.evil.com"));
        assert!(!check("http://localhost@evil.com"));
    }
}
