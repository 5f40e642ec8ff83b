// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account and session API tests.

use axum::http::{header, StatusCode};
use serde_json::json;

mod common;
use common::{create_test_app, create_test_jwt, register, send};

#[tokio::test]
async fn test_register_returns_user_without_secrets() {
    let (app, _) = create_test_app();

    let (status, headers, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "email": "  Ada@Example.COM ",
            "password": "secret123",
            "confirmPassword": "secret123",
            "fullName": "Ada Lovelace",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);

    let user = &body["data"]["user"];
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["fullName"], "Ada Lovelace");
    assert_eq!(user["authMethod"], "password");
    assert!(user.get("passwordHash").is_none());
    assert!(!body.to_string().contains("argon2"));

    assert!(body["data"]["tokens"]["accessToken"].is_string());
    assert!(body["data"]["tokens"]["refreshToken"].is_string());

    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("form_easy_token="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_register_validation_messages() {
    let (app, _) = create_test_app();

    let cases = [
        (
            json!({"email": "a@example.com", "password": "secret123"}),
            "All fields are required",
        ),
        (
            json!({"email": "a@example.com", "password": "secret123", "confirmPassword": "secret124", "fullName": "A"}),
            "Passwords do not match",
        ),
        (
            json!({"email": "a@example.com", "password": "abc", "confirmPassword": "abc", "fullName": "A"}),
            "Password must be at least 6 characters",
        ),
    ];

    for (payload, message) in cases {
        let (status, _, body) = send(&app, "POST", "/api/auth/register", None, Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], message);
        assert_eq!(body["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let (app, _) = create_test_app();
    register(&app, "dup@example.com").await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "email": "DUP@example.com",
            "password": "secret123",
            "confirmPassword": "secret123",
            "fullName": "Someone Else",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already registered");
}

#[tokio::test]
async fn test_login_flow() {
    let (app, _) = create_test_app();
    let (user_id, _) = register(&app, "login@example.com").await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "Login@Example.com", "password": "secret123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["_id"], user_id.as_str());
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "login@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "nobody@example.com", "password": "secret123"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_me_requires_token() {
    let (app, state) = create_test_app();
    let (user_id, token) = register(&app, "me@example.com").await;

    let (status, _, body) = send(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _, _) = send(&app, "GET", "/api/auth/me", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["_id"], user_id.as_str());

    // Valid token for a user that doesn't exist
    let ghost = create_test_jwt(&state, "ghost");
    let (status, _, _) = send(&app, "GET", "/api/auth/me", Some(&ghost), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refresh_token_only_refreshes() {
    let (app, state) = create_test_app();
    let (user_id, access) = register(&app, "refresh@example.com").await;
    let refresh = state.credentials.issue_refresh_token(&user_id).unwrap();

    // Refresh tokens are not accepted as session tokens
    let (status, _, body) = send(&app, "GET", "/api/auth/me", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    // ...and access tokens are not accepted for refresh
    let (status, _, _) = send(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({"refreshToken": access})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({"refreshToken": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_access = body["data"]["tokens"]["accessToken"].as_str().unwrap();
    let verified = state.credentials.verify_token(new_access).unwrap();
    assert_eq!(verified.user_id, user_id);
}

#[tokio::test]
async fn test_google_upsert() {
    let (app, _) = create_test_app();

    let payload = json!({
        "googleId": "g-123",
        "email": "g@example.com",
        "fullName": "Grace Hopper",
        "avatar": "https://example.com/g.png",
    });

    let (status, _, first) =
        send(&app, "POST", "/api/auth/google", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["user"]["authMethod"], "oauth");
    assert_eq!(first["data"]["user"]["isEmailVerified"], true);

    let (status, _, second) = send(&app, "POST", "/api/auth/google", None, Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["user"]["_id"], second["data"]["user"]["_id"]);

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/google",
        None,
        Some(json!({"googleId": "g-456", "email": "x@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Google data incomplete");
}

#[tokio::test]
async fn test_google_links_existing_password_account() {
    let (app, _) = create_test_app();
    let (user_id, _) = register(&app, "link@example.com").await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/google",
        None,
        Some(json!({"googleId": "g-789", "email": "link@example.com", "fullName": "Linked"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["_id"], user_id.as_str());

    // Password login keeps working after linking
    let (status, _, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "link@example.com", "password": "secret123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_profile_and_password_change() {
    let (app, _) = create_test_app();
    let (_, token) = register(&app, "profile@example.com").await;

    let (status, _, body) = send(
        &app,
        "PUT",
        "/api/auth/profile",
        Some(&token),
        Some(json!({"fullName": "New Name", "theme": "dark", "emailNotifications": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["fullName"], "New Name");
    assert_eq!(body["data"]["user"]["preferences"]["theme"], "dark");
    assert_eq!(body["data"]["user"]["preferences"]["emailNotifications"], false);

    let (status, _, _) = send(
        &app,
        "PUT",
        "/api/auth/profile",
        Some(&token),
        Some(json!({"theme": "neon"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/auth/change-password",
        Some(&token),
        Some(json!({"currentPassword": "wrong-one", "newPassword": "another1", "confirmPassword": "another1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Current password is incorrect");

    let (status, _, _) = send(
        &app,
        "POST",
        "/api/auth/change-password",
        Some(&token),
        Some(json!({"currentPassword": "secret123", "newPassword": "another1", "confirmPassword": "another1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "profile@example.com", "password": "another1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let (app, _) = create_test_app();
    let (_, token) = register(&app, "logout@example.com").await;

    let (status, headers, body) =
        send(&app, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("form_easy_token="));
    assert!(cookie.contains("Max-Age=0"));
}
