// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Form field generation.
//!
//! Pipeline:
//! 1. Build one instruction prompt from the form description and context
//! 2. Ask the completion service for a JSON array of field objects
//! 3. Strip code fences, parse, and repair each entry
//! 4. Pad to `MIN_FIELDS` from the backfill catalog
//! 5. Classify each field's input tag (bounded concurrency, per-field fallback)
//!
//! If the completion service rejects us for credential/quota/model reasons,
//! a fixed fallback form is returned as `GeneratedFields::Degraded` instead of
//! an error.

use crate::models::form::{FieldDefinition, FieldType, InputType};
use crate::services::completion::{CompletionClient, CompletionError};
use futures_util::{stream, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Every generated form has at least this many fields.
pub const MIN_FIELDS: usize = 8;

/// Form metadata used to build the prompt.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub description: String,
    pub title: Option<String>,
    pub purpose: Option<String>,
    pub audience: Option<String>,
}

/// Generation outcome. Callers that don't care can use `into_fields`.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedFields {
    /// Fields came from the completion service (possibly padded).
    Generated(Vec<FieldDefinition>),
    /// The completion service was unavailable; these are the canned fields.
    Degraded {
        fields: Vec<FieldDefinition>,
        reason: String,
    },
}

impl GeneratedFields {
    pub fn fields(&self) -> &[FieldDefinition] {
        match self {
            GeneratedFields::Generated(fields) => fields,
            GeneratedFields::Degraded { fields, .. } => fields,
        }
    }

    pub fn into_fields(self) -> Vec<FieldDefinition> {
        match self {
            GeneratedFields::Generated(fields) => fields,
            GeneratedFields::Degraded { fields, .. } => fields,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, GeneratedFields::Degraded { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Collaborator(#[from] CompletionError),

    #[error("Model output is not a JSON array of fields: {0}")]
    Unparseable(String),
}

/// Orchestrates the completion calls for field generation.
#[derive(Clone)]
pub struct FieldGenerator {
    client: Arc<dyn CompletionClient>,
    call_timeout: Duration,
    classify_concurrency: usize,
}

impl FieldGenerator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        call_timeout: Duration,
        classify_concurrency: usize,
    ) -> Self {
        Self {
            client,
            call_timeout,
            classify_concurrency: classify_concurrency.max(1),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        tokio::time::timeout(self.call_timeout, self.client.complete(prompt))
            .await
            .map_err(|_| CompletionError::Timeout)?
    }

    /// Generate a field list of at least `MIN_FIELDS` entries.
    pub async fn generate_fields(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedFields, GenerationError> {
        let prompt = build_prompt(request);

        let raw = match self.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) if e.is_authorization_class() => {
                tracing::warn!(
                    error = %e,
                    "Completion service unavailable, returning fallback fields"
                );
                return Ok(GeneratedFields::Degraded {
                    fields: fallback_fields(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let parsed = parse_fields(&raw)?;
        let produced = parsed.len();
        let fields = backfill(parsed);

        tracing::info!(
            produced,
            total = fields.len(),
            "Generated form fields"
        );

        Ok(GeneratedFields::Generated(fields))
    }

    /// Ask for the rendering tag of one field. Never fails.
    pub async fn classify_input_type(&self, label: &str, field_type: FieldType) -> InputType {
        let prompt = build_classification_prompt(label, field_type);

        match self.complete(&prompt).await {
            Ok(raw) => parse_input_type(&raw).unwrap_or_else(|| {
                tracing::debug!(label, reply = %raw.trim(), "Unrecognized input type reply");
                InputType::Text
            }),
            Err(e) => {
                tracing::debug!(label, error = %e, "Input type classification failed");
                InputType::Text
            }
        }
    }

    /// Full pipeline: generate, then attach an input tag to every field.
    ///
    /// Degraded results skip classification and use each type's natural tag.
    pub async fn generate_and_classify(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedFields, GenerationError> {
        match self.generate_fields(request).await? {
            GeneratedFields::Generated(fields) => {
                Ok(GeneratedFields::Generated(self.classify_all(fields).await))
            }
            GeneratedFields::Degraded { mut fields, reason } => {
                for field in &mut fields {
                    field.html_type = Some(InputType::from(field.field_type));
                }
                Ok(GeneratedFields::Degraded { fields, reason })
            }
        }
    }

    async fn classify_all(&self, mut fields: Vec<FieldDefinition>) -> Vec<FieldDefinition> {
        let pending: Vec<_> = fields
            .iter()
            .map(|f| self.classify_input_type(&f.label, f.field_type))
            .collect();
        let tags: Vec<InputType> = stream::iter(pending)
        .buffered(self.classify_concurrency)
        .collect()
        .await;

        for (field, tag) in fields.iter_mut().zip(tags) {
            field.html_type = Some(tag);
        }
        fields
    }
}

// ─── Prompts ─────────────────────────────────────────────────

const FIELD_EXAMPLES: &str = r#"- Rating: {"fieldName": "satisfactionRating", "fieldLabel": "Overall Satisfaction", "fieldType": "rating", "fieldRequired": true, "fieldOptions": ["1", "2", "3", "4", "5"]}
- Select: {"fieldName": "department", "fieldLabel": "Department", "fieldType": "select", "fieldRequired": true, "fieldOptions": ["Sales", "Engineering", "Marketing", "HR"]}
- Checkbox: {"fieldName": "interests", "fieldLabel": "Interests", "fieldType": "checkbox", "fieldRequired": false, "fieldOptions": ["Music", "Sports", "Travel"]}
- Textarea: {"fieldName": "additionalComments", "fieldLabel": "Additional Comments", "fieldType": "textarea", "fieldRequired": false, "fieldOptions": []}
- File: {"fieldName": "attachment", "fieldLabel": "Attachment", "fieldType": "file", "fieldRequired": false, "fieldOptions": []}
- Phone: {"fieldName": "phoneNumber", "fieldLabel": "Phone Number", "fieldType": "phone", "fieldRequired": true, "fieldOptions": []}
- URL: {"fieldName": "website", "fieldLabel": "Website URL", "fieldType": "url", "fieldRequired": false, "fieldOptions": []}
- Date: {"fieldName": "startDate", "fieldLabel": "Start Date", "fieldType": "date", "fieldRequired": true, "fieldOptions": []}"#;

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Build the field-generation instruction.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut context = Vec::new();
    if let Some(title) = non_blank(&request.title) {
        context.push(format!("Form Title: {}", title));
    }
    if let Some(purpose) = non_blank(&request.purpose) {
        context.push(format!("Purpose: {}", purpose));
    }
    if let Some(audience) = non_blank(&request.audience) {
        context.push(format!("Target Audience: {}", audience));
    }
    context.push(format!("Description: {}", request.description.trim()));

    let types: Vec<&str> = FieldType::ALL.iter().map(|t| t.as_str()).collect();

    format!(
        "You are an expert form designer. Design the fields for the form described below.\n\
         \n\
         {context}\n\
         \n\
         REQUIREMENTS:\n\
         1. Produce at least {min} fields; 10 to 15 is better.\n\
         2. Every field object has exactly these keys: \"fieldName\", \"fieldLabel\", \"fieldType\", \"fieldRequired\" (boolean), \"fieldOptions\" (array of strings).\n\
         3. fieldName is camelCase and unique (e.g. \"firstName\", \"emailAddress\").\n\
         4. fieldLabel is user-facing text with proper capitalization.\n\
         5. Pick the most specific fieldType for each question.\n\
         6. select, radio, checkbox and rating fields list their choices in fieldOptions; every other type uses [].\n\
         \n\
         AVAILABLE FIELD TYPES:\n\
         {types}\n\
         \n\
         EXAMPLES:\n\
         {examples}\n\
         \n\
         OUTPUT FORMAT: respond with the raw JSON array only. No prose, no markdown, no code fences.",
        context = context.join("\n"),
        min = MIN_FIELDS,
        types = types.join(", "),
        examples = FIELD_EXAMPLES,
    )
}

/// Build the per-field input-tag question.
pub fn build_classification_prompt(label: &str, field_type: FieldType) -> String {
    let tags: Vec<String> = InputType::ALL
        .iter()
        .map(|t| format!("\"{}\"", t.as_str()))
        .collect();

    format!(
        "Given a form field with label \"{}\" and type \"{}\", which HTML input is most appropriate? \
         Choose one of: {}. Respond with ONLY that one value.",
        label,
        field_type.as_str(),
        tags.join(", ")
    )
}

// ─── Parsing & Repair ────────────────────────────────────────

/// Remove markdown code fences and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse model output into repaired field definitions.
///
/// The output must be a JSON array; entries that can't be salvaged are
/// dropped.
pub fn parse_fields(raw: &str) -> Result<Vec<FieldDefinition>, GenerationError> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| GenerationError::Unparseable(e.to_string()))?;

    let Value::Array(entries) = value else {
        return Err(GenerationError::Unparseable(
            "top-level value is not an array".to_string(),
        ));
    };

    let mut seen = HashSet::new();
    let total = entries.len();
    let fields: Vec<FieldDefinition> = entries
        .iter()
        .filter_map(|entry| repair_field(entry, &mut seen))
        .collect();

    if fields.len() < total {
        tracing::debug!(
            dropped = total - fields.len(),
            "Dropped unusable field entries from model output"
        );
    }

    Ok(fields)
}

fn string_key<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn repair_field(entry: &Value, seen: &mut HashSet<String>) -> Option<FieldDefinition> {
    let obj = entry.as_object()?;

    let raw_name = string_key(obj, &["fieldName", "name"]).map(sanitize_identifier);
    let raw_label = string_key(obj, &["fieldLabel", "label"]).map(str::to_string);

    let (name, label) = match (raw_name.filter(|n| !n.is_empty()), raw_label) {
        (Some(name), Some(label)) => (name, label),
        (Some(name), None) => {
            let label = label_from_identifier(&name);
            (name, label)
        }
        (None, Some(label)) => {
            let name = camel_case(&label);
            if name.is_empty() {
                return None;
            }
            (name, label)
        }
        (None, None) => return None,
    };

    let mut field_type = string_key(obj, &["fieldType", "type"])
        .and_then(FieldType::parse)
        .unwrap_or(FieldType::Text);

    let required = match obj.get("fieldRequired").or_else(|| obj.get("required")) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    let mut options: Vec<String> = Vec::new();
    if let Some(Value::Array(raw)) = obj.get("fieldOptions").or_else(|| obj.get("options")) {
        for item in raw {
            let option = match item {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => continue,
            };
            if !option.is_empty() && !options.contains(&option) {
                options.push(option);
            }
        }
    }

    match field_type {
        FieldType::Rating if options.is_empty() => {
            options = (1..=5).map(|n| n.to_string()).collect();
        }
        FieldType::Checkbox if options.is_empty() => {
            options = vec![label.clone()];
        }
        FieldType::Select | FieldType::Radio if options.is_empty() => {
            field_type = FieldType::Text;
        }
        t if !t.is_choice() => options.clear(),
        _ => {}
    }

    let name = unique_name(name, seen);

    Some(FieldDefinition {
        name,
        label,
        field_type,
        required,
        options,
        html_type: None,
    })
}

fn unique_name(name: String, seen: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut suffix = 2;
    while !seen.insert(candidate.to_ascii_lowercase()) {
        candidate = format!("{}{}", name, suffix);
        suffix += 1;
    }
    candidate
}

fn sanitize_identifier(raw: &str) -> String {
    if raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        raw.to_string()
    } else {
        camel_case(raw)
    }
}

/// "Email address (work)" -> "emailAddressWork"
fn camel_case(text: &str) -> String {
    let mut out = String::new();
    for (i, word) in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.push(first.to_ascii_lowercase());
                out.push_str(chars.as_str());
            } else {
                out.push(first.to_ascii_uppercase());
                out.push_str(&chars.as_str().to_ascii_lowercase());
            }
        }
    }
    out
}

/// "emailAddress" -> "Email Address"
fn label_from_identifier(name: &str) -> String {
    let mut label = String::new();
    for (i, c) in name.chars().enumerate() {
        if c == '_' {
            label.push(' ');
        } else if i == 0 {
            label.push(c.to_ascii_uppercase());
        } else {
            if c.is_ascii_uppercase() && !label.ends_with(' ') {
                label.push(' ');
            }
            label.push(c);
        }
    }
    label
}

/// Clean up a classification reply and match it against the tag list.
pub fn parse_input_type(raw: &str) -> Option<InputType> {
    let cleaned = strip_code_fences(raw);
    let cleaned = cleaned.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.');
    InputType::parse(cleaned)
}

// ─── Catalogs ────────────────────────────────────────────────

/// Generic fields appended, in this order, when the model returns too few.
pub fn backfill_catalog() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new(
            "additionalInfo",
            "Additional Information",
            FieldType::Textarea,
            false,
            &[],
        ),
        FieldDefinition::new(
            "contactPreference",
            "Contact Preference",
            FieldType::Select,
            false,
            &["Email", "Phone", "SMS"],
        ),
        FieldDefinition::new(
            "agreeToTerms",
            "I agree to the terms",
            FieldType::Checkbox,
            true,
            &["I agree"],
        ),
        FieldDefinition::new(
            "followUp",
            "Follow up with me",
            FieldType::Checkbox,
            false,
            &["Yes"],
        ),
        FieldDefinition::new(
            "preferredContactTime",
            "Preferred Contact Time",
            FieldType::Radio,
            false,
            &["Morning", "Afternoon", "Evening"],
        ),
        FieldDefinition::new(
            "overallRating",
            "Overall Rating",
            FieldType::Rating,
            false,
            &["1", "2", "3", "4", "5"],
        ),
        FieldDefinition::new(
            "referralSource",
            "How did you hear about us?",
            FieldType::Select,
            false,
            &["Friend", "Social Media", "Search Engine", "Other"],
        ),
        FieldDefinition::new("attachment", "Attachment", FieldType::File, false, &[]),
        FieldDefinition::new("website", "Website", FieldType::Url, false, &[]),
        FieldDefinition::new("phoneNumber", "Phone Number", FieldType::Phone, false, &[]),
    ]
}

/// Canned form returned when the completion service is unavailable.
pub fn fallback_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("fullName", "Full Name", FieldType::Text, true, &[]),
        FieldDefinition::new("email", "Email Address", FieldType::Email, true, &[]),
        FieldDefinition::new("phone", "Phone Number", FieldType::Phone, false, &[]),
        FieldDefinition::new("age", "Age", FieldType::Number, false, &[]),
        FieldDefinition::new(
            "contactPreference",
            "Contact Preference",
            FieldType::Select,
            false,
            &["Email", "Phone", "SMS"],
        ),
        FieldDefinition::new(
            "overallRating",
            "Overall Rating",
            FieldType::Rating,
            false,
            &["1", "2", "3", "4", "5"],
        ),
        FieldDefinition::new(
            "agreeToTerms",
            "I agree to the terms",
            FieldType::Checkbox,
            true,
            &["I agree"],
        ),
        FieldDefinition::new("comments", "Comments", FieldType::Textarea, false, &[]),
    ]
}

/// Pad `fields` to `MIN_FIELDS` from the backfill catalog.
///
/// Model fields keep their order and are never removed; catalog entries
/// whose name or label is already present are skipped.
pub fn backfill(mut fields: Vec<FieldDefinition>) -> Vec<FieldDefinition> {
    if fields.len() >= MIN_FIELDS {
        return fields;
    }

    let mut names: HashSet<String> = fields.iter().map(|f| f.name.to_ascii_lowercase()).collect();
    let mut labels: HashSet<String> = fields.iter().map(|f| f.label.to_lowercase()).collect();

    for candidate in backfill_catalog() {
        if fields.len() >= MIN_FIELDS {
            break;
        }
        let name = candidate.name.to_ascii_lowercase();
        let label = candidate.label.to_lowercase();
        if names.contains(&name) || labels.contains(&label) {
            continue;
        }
        names.insert(name);
        labels.insert(label);
        fields.push(candidate);
    }

    fields
}
