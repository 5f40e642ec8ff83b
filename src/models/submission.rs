// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Submission model and response validation.

use super::form::{FieldType, Form};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Label used when the respondent doesn't identify themselves.
pub const ANONYMOUS: &str = "Anonymous";

/// A single answer: plain text, or a list for multi-select fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(untagged)]
pub enum ResponseValue {
    Text(String),
    Many(Vec<String>),
}

impl ResponseValue {
    /// True when nothing meaningful was entered.
    pub fn is_blank(&self) -> bool {
        match self {
            ResponseValue::Text(s) => s.trim().is_empty(),
            ResponseValue::Many(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }
}

/// One respondent's answers, stored in Firestore. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Document ID
    #[serde(rename = "_id")]
    pub id: String,
    pub form_id: String,
    pub responses: BTreeMap<String, ResponseValue>,
    pub submitted_by: String,
    pub submitted_at: String,
}

/// Check answers against the form definition.
///
/// Blank answers to optional fields are dropped from the returned map.
pub fn validate_responses(
    form: &Form,
    mut responses: BTreeMap<String, ResponseValue>,
) -> Result<BTreeMap<String, ResponseValue>, String> {
    if let Some(unknown) = responses
        .keys()
        .find(|name| !form.fields.iter().any(|f| &f.name == *name))
    {
        return Err(format!("Unknown field {:?}", unknown));
    }

    let missing: Vec<&str> = form
        .fields
        .iter()
        .filter(|f| f.required)
        .filter(|f| responses.get(&f.name).map_or(true, ResponseValue::is_blank))
        .map(|f| f.label.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(format!("Please fill in required fields: {}", missing.join(", ")));
    }

    responses.retain(|_, value| !value.is_blank());

    for field in &form.fields {
        let Some(value) = responses.get(&field.name) else {
            continue;
        };

        match (field.field_type, value) {
            (FieldType::Checkbox, ResponseValue::Many(values)) => {
                if let Some(bad) = values.iter().find(|v| !field.options.contains(*v)) {
                    return Err(format!("{:?} is not an option for {}", bad, field.label));
                }
            }
            (t, ResponseValue::Text(v)) if t.is_choice() => {
                if !field.options.contains(v) {
                    return Err(format!("{:?} is not an option for {}", v, field.label));
                }
            }
            (t, ResponseValue::Many(_)) if !t.is_multi_valued() => {
                return Err(format!("{} accepts a single value", field.label));
            }
            _ => {}
        }
    }

    Ok(responses)
}
