// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end tests for /api/generate-fields with a scripted collaborator.

use axum::http::StatusCode;
use form_easy::services::generator::backfill_catalog;
use form_easy::services::CompletionError;
use serde_json::json;

mod common;
use common::{create_test_app_with, send, ScriptedCompletion};

const DANCE_FIELDS: &str = r#"[
  {"fieldName": "dancerName", "fieldLabel": "Dancer Name", "fieldType": "text", "fieldRequired": true, "fieldOptions": []},
  {"fieldName": "classEnjoyment", "fieldLabel": "How much did you enjoy the class?", "fieldType": "rating", "fieldRequired": true, "fieldOptions": ["1", "2", "3", "4", "5"]},
  {"fieldName": "improvements", "fieldLabel": "What could we improve?", "fieldType": "textarea", "fieldRequired": false, "fieldOptions": []}
]"#;

fn dance_request() -> serde_json::Value {
    json!({"formDescription": "dance class feedback form"})
}

#[tokio::test]
async fn test_short_generation_padded_from_catalog() {
    let completion = ScriptedCompletion::replying(DANCE_FIELDS);
    let (app, _) = create_test_app_with(completion.clone());

    let (status, headers, body) =
        send(&app, "POST", "/api/generate-fields", None, Some(dance_request())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-generation-degraded").is_none());

    let fields = body.as_array().unwrap();
    assert_eq!(fields.len(), 8);
    assert_eq!(fields[0]["fieldName"], "dancerName");
    assert_eq!(fields[1]["fieldName"], "classEnjoyment");
    assert_eq!(fields[2]["fieldName"], "improvements");

    let catalog = backfill_catalog();
    for (field, expected) in fields[3..].iter().zip(&catalog[..5]) {
        assert_eq!(field["fieldName"], expected.name.as_str());
    }

    // Every field got a classified input tag
    assert!(fields.iter().all(|f| f["htmlType"] == "input-text"));
    assert_eq!(completion.call_count(), 1 + 8);
}

#[tokio::test]
async fn test_authorization_failure_serves_fallback() {
    let (app, _) = create_test_app_with(ScriptedCompletion::failing(
        CompletionError::Unauthorized("HTTP 401".to_string()),
    ));

    let (status, headers, body) =
        send(&app, "POST", "/api/generate-fields", None, Some(dance_request())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-generation-degraded").unwrap(), "true");

    let fields = body.as_array().unwrap();
    assert!(fields.len() >= 8);
    assert_eq!(fields[0]["fieldName"], "fullName");
    assert_eq!(fields[1]["htmlType"], "input-email");
}

#[tokio::test]
async fn test_other_collaborator_failure_is_500() {
    let (app, _) = create_test_app_with(ScriptedCompletion::failing(CompletionError::Api {
        status: 503,
        message: "overloaded".to_string(),
    }));

    let (status, _, body) =
        send(&app, "POST", "/api/generate-fields", None, Some(dance_request())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "generation_error");
}

#[tokio::test]
async fn test_unparseable_output_is_500() {
    let (app, _) = create_test_app_with(ScriptedCompletion::replying(
        "Here are some great fields for your dance class!",
    ));

    let (status, _, body) =
        send(&app, "POST", "/api/generate-fields", None, Some(dance_request())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "generation_error");
}

#[tokio::test]
async fn test_description_required() {
    let completion = ScriptedCompletion::replying(DANCE_FIELDS);
    let (app, _) = create_test_app_with(completion.clone());

    let (status, _, body) = send(
        &app,
        "POST",
        "/api/generate-fields",
        None,
        Some(json!({"title": "No description"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "formDescription is required.");
    assert_eq!(completion.call_count(), 0);
}
