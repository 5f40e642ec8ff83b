// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request body extraction with validation.

use crate::error::AppError;
use axum::extract::{rejection::JsonRejection, FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

/// JSON body that has been deserialized and passed `Validate`.
///
/// Both malformed bodies and validation failures become
/// `AppError::Validation` (400) instead of axum's default 422.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation(rejection.body_text()))?;

        value
            .validate()
            .map_err(|errors| AppError::Validation(flatten_errors(&errors)))?;

        Ok(ValidJson(value))
    }
}

/// Collapse validator output into one human-readable message.
fn flatten_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let mut messages: Vec<String> = Vec::new();
    for (field, errs) in fields {
        for err in errs.iter() {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid value for {}", field));
            if !messages.contains(&message) {
                messages.push(message);
            }
        }
    }

    if messages.is_empty() {
        "Invalid request".to_string()
    } else {
        messages.join("; ")
    }
}
