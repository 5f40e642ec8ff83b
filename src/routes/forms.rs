// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Form generation, storage, and submission routes.

use crate::error::{AppError, Result};
use crate::extract::ValidJson;
use crate::middleware::auth::AuthUser;
use crate::models::form::validate_fields;
use crate::models::submission::{validate_responses, ANONYMOUS};
use crate::models::{FieldDefinition, Form, ResponseValue, Submission, Theme};
use crate::services::{GeneratedFields, GenerationRequest};
use crate::time_utils::now_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::{Validate, ValidationError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Set on generate-fields responses that carry the canned fallback set.
pub const DEGRADED_HEADER: HeaderName = HeaderName::from_static("x-generation-degraded");

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/generate-fields", post(generate_fields))
        .route("/api/forms", post(create_form))
        .route("/api/forms/{user_id}", get(list_forms))
        .route(
            "/api/form/{form_id}",
            get(get_form).put(update_form).delete(delete_form),
        )
        .route("/api/submit/{form_id}", post(submit_form))
        .route("/api/submissions/{form_id}", get(list_submissions))
}

async fn load_form(state: &AppState, form_id: &str) -> Result<Form> {
    state
        .db
        .get_form(form_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Form not found".to_string()))
}

// ─── Generation ──────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFieldsRequest {
    #[serde(default)]
    #[validate(
        custom(function = "not_blank", message = "formDescription is required."),
        length(max = 5000, message = "formDescription is too long")
    )]
    form_description: String,
    title: Option<String>,
    purpose: Option<String>,
    audience: Option<String>,
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("required"))
    } else {
        Ok(())
    }
}

/// Ask the completion service for fields. Always at least eight on success.
///
/// A degraded (fallback) result is still a 200, flagged with
/// `X-Generation-Degraded: true`.
async fn generate_fields(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<GenerateFieldsRequest>,
) -> Result<Response> {
    let request = GenerationRequest {
        description: req.form_description.trim().to_string(),
        title: req.title,
        purpose: req.purpose,
        audience: req.audience,
    };

    let generated = state.generator.generate_and_classify(&request).await?;

    let degraded = generated.is_degraded();
    if let GeneratedFields::Degraded { reason, .. } = &generated {
        tracing::warn!(reason = %reason, "Serving fallback fields");
    }

    let mut response = Json(generated.into_fields()).into_response();
    if degraded {
        response
            .headers_mut()
            .insert(DEGRADED_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

// ─── Forms ───────────────────────────────────────────────────

/// Body for both create and update.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_form_request"))]
pub struct FormRequest {
    #[serde(default)]
    #[validate(length(max = 200, message = "Title must be at most 200 characters"))]
    title: String,
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    audience: String,
    #[serde(default)]
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    description: String,
    #[serde(default)]
    fields: Vec<FieldDefinition>,
    /// Must match the caller when given.
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    theme: Theme,
    #[serde(default)]
    published: Option<bool>,
}

fn validate_form_request(req: &FormRequest) -> std::result::Result<(), ValidationError> {
    if req.title.trim().is_empty() || req.description.trim().is_empty() {
        return Err(ValidationError::new("required")
            .with_message("Missing required fields: title, description, fields".into()));
    }
    Ok(())
}

impl FormRequest {
    /// Check ownership and field list; returns normalized fields.
    fn checked_fields(&mut self, auth: &AuthUser) -> Result<Vec<FieldDefinition>> {
        if let Some(user_id) = &self.user_id {
            auth.ensure_owner(user_id)?;
        }
        validate_fields(std::mem::take(&mut self.fields)).map_err(AppError::Validation)
    }
}

async fn create_form(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ValidJson(mut req): ValidJson<FormRequest>,
) -> Result<(StatusCode, Json<Form>)> {
    let fields = req.checked_fields(&auth)?;

    let now = now_rfc3339();
    let form = Form {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        purpose: req.purpose.trim().to_string(),
        audience: req.audience.trim().to_string(),
        description: req.description.trim().to_string(),
        fields,
        user_id: auth.user_id,
        theme: req.theme,
        published: req.published.unwrap_or(true),
        submission_count: 0,
        created_at: now.clone(),
        updated_at: now,
    };

    state.db.create_form(&form).await?;
    tracing::info!(form_id = %form.id, user_id = %form.user_id, fields = form.fields.len(), "Form created");

    Ok((StatusCode::CREATED, Json(form)))
}

async fn list_forms(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Form>>> {
    auth.ensure_owner(&user_id)?;
    Ok(Json(state.db.list_forms_by_user(&user_id).await?))
}

async fn get_form(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
) -> Result<Json<Form>> {
    Ok(Json(load_form(&state, &form_id).await?))
}

/// Replace a form's content. The submission counter is left alone.
async fn update_form(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(form_id): Path<String>,
    ValidJson(mut req): ValidJson<FormRequest>,
) -> Result<Json<Form>> {
    let mut form = load_form(&state, &form_id).await?;
    auth.ensure_owner(&form.user_id)?;
    let fields = req.checked_fields(&auth)?;

    form.title = req.title.trim().to_string();
    form.purpose = req.purpose.trim().to_string();
    form.audience = req.audience.trim().to_string();
    form.description = req.description.trim().to_string();
    form.fields = fields;
    form.theme = req.theme;
    if let Some(published) = req.published {
        form.published = published;
    }
    form.updated_at = now_rfc3339();

    state.db.update_form(&form).await?;
    tracing::info!(form_id = %form.id, "Form updated");

    Ok(Json(form))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFormResponse {
    pub success: bool,
    pub message: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub deleted_submissions: usize,
}

/// Delete a form together with all of its submissions.
async fn delete_form(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<DeleteFormResponse>> {
    let form = load_form(&state, &form_id).await?;
    auth.ensure_owner(&form.user_id)?;

    // The count includes the form document itself.
    let deleted_submissions = state.db.delete_form(&form.id).await?.saturating_sub(1);
    tracing::info!(form_id = %form.id, deleted_submissions, "Form deleted");

    Ok(Json(DeleteFormResponse {
        success: true,
        message: "Form deleted".to_string(),
        deleted_submissions,
    }))
}

// ─── Submissions ─────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_submit_request"))]
pub struct SubmitRequest {
    #[serde(default)]
    responses: Option<BTreeMap<String, ResponseValue>>,
    #[serde(default)]
    #[validate(length(max = 200, message = "submittedBy must be at most 200 characters"))]
    submitted_by: Option<String>,
}

fn validate_submit_request(req: &SubmitRequest) -> std::result::Result<(), ValidationError> {
    if req.responses.is_none() {
        return Err(ValidationError::new("required").with_message("responses are required".into()));
    }
    Ok(())
}

/// Public: anyone with the link may submit to a published form.
async fn submit_form(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    ValidJson(req): ValidJson<SubmitRequest>,
) -> Result<(StatusCode, Json<Submission>)> {
    let form = load_form(&state, &form_id).await?;
    if !form.published {
        return Err(AppError::Validation(
            "This form is not accepting submissions".to_string(),
        ));
    }

    let responses = validate_responses(&form, req.responses.unwrap_or_default())
        .map_err(AppError::Validation)?;

    let submitted_by = req
        .submitted_by
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());

    let submission = Submission {
        id: uuid::Uuid::new_v4().to_string(),
        form_id: form.id,
        responses,
        submitted_by,
        submitted_at: now_rfc3339(),
    };

    state.db.create_submission(&submission).await?;
    tracing::info!(
        submission_id = %submission.id,
        form_id = %submission.form_id,
        "Submission recorded"
    );

    Ok((StatusCode::CREATED, Json(submission)))
}

async fn list_submissions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<Vec<Submission>>> {
    let form = load_form(&state, &form_id).await?;
    auth.ensure_owner(&form.user_id)?;
    Ok(Json(state.db.list_submissions_by_form(&form.id).await?))
}
