// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use form_easy::config::Config;
use form_easy::db::FirestoreDb;
use form_easy::routes::create_router;
use form_easy::services::{CompletionClient, CompletionError};
use form_easy::AppState;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Completion client with a canned reply for field generation.
///
/// Classification prompts get `classify_reply`.
#[allow(dead_code)]
pub struct ScriptedCompletion {
    pub generation: Result<String, CompletionError>,
    pub classify_reply: String,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedCompletion {
    pub fn replying(generation: &str) -> Arc<Self> {
        Arc::new(Self {
            generation: Ok(generation.to_string()),
            classify_reply: "input-text".to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: CompletionError) -> Arc<Self> {
        Arc::new(Self {
            generation: Err(error),
            classify_reply: "input-text".to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.starts_with("Given a form field") {
            return Ok(self.classify_reply.clone());
        }
        self.generation.clone()
    }
}

/// Create a test app over the in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app_with(completion: Arc<dyn CompletionClient>) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        Config::test_default(),
        FirestoreDb::new_in_memory(),
        completion,
    ));
    (create_router(state.clone()), state)
}

/// Test app whose completion client always fails authorization.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with(ScriptedCompletion::failing(CompletionError::Unauthorized(
        "no key".to_string(),
    )))
}

/// Access token for `user_id`, signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(state: &AppState, user_id: &str) -> String {
    state
        .credentials
        .issue_access_token(user_id)
        .expect("Failed to create JWT")
}

/// Send a request and return status, headers, and parsed JSON body.
#[allow(dead_code)]
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response: Response<Body> = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, json)
}

/// Register a user and return (user id, access token).
#[allow(dead_code)]
pub async fn register(app: &Router, email: &str) -> (String, String) {
    let (status, _, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(serde_json::json!({
            "email": email,
            "password": "secret123",
            "confirmPassword": "secret123",
            "fullName": "Test User",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

    (
        body["data"]["user"]["_id"].as_str().unwrap().to_string(),
        body["data"]["tokens"]["accessToken"]
            .as_str()
            .unwrap()
            .to_string(),
    )
}
