// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Form and field-definition models.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Kind of answer a field collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Password,
    Number,
    Date,
    Time,
    #[serde(alias = "datetime-local")]
    Datetime,
    Textarea,
    Select,
    Radio,
    Checkbox,
    File,
    Url,
    Phone,
    Color,
    Range,
    Rating,
}

impl FieldType {
    pub const ALL: [FieldType; 17] = [
        FieldType::Text,
        FieldType::Email,
        FieldType::Password,
        FieldType::Number,
        FieldType::Date,
        FieldType::Time,
        FieldType::Datetime,
        FieldType::Textarea,
        FieldType::Select,
        FieldType::Radio,
        FieldType::Checkbox,
        FieldType::File,
        FieldType::Url,
        FieldType::Phone,
        FieldType::Color,
        FieldType::Range,
        FieldType::Rating,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Password => "password",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Datetime => "datetime",
            FieldType::Textarea => "textarea",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::File => "file",
            FieldType::Url => "url",
            FieldType::Phone => "phone",
            FieldType::Color => "color",
            FieldType::Range => "range",
            FieldType::Rating => "rating",
        }
    }

    /// Lenient parse used when repairing model output.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        match raw.as_str() {
            "datetime-local" => Some(FieldType::Datetime),
            "tel" => Some(FieldType::Phone),
            other => Self::ALL.into_iter().find(|t| t.as_str() == other),
        }
    }

    /// Choice-like types must carry a non-empty option list.
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            FieldType::Select | FieldType::Radio | FieldType::Checkbox | FieldType::Rating
        )
    }

    /// Types whose answers may be a list of strings.
    pub fn is_multi_valued(self) -> bool {
        matches!(self, FieldType::Checkbox)
    }
}

/// Rendering tag produced by input-type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum InputType {
    #[serde(rename = "input-text")]
    Text,
    #[serde(rename = "input-email")]
    Email,
    #[serde(rename = "input-password")]
    Password,
    #[serde(rename = "input-number")]
    Number,
    #[serde(rename = "input-date")]
    Date,
    #[serde(rename = "input-time")]
    Time,
    #[serde(rename = "input-datetime-local")]
    DatetimeLocal,
    #[serde(rename = "textarea")]
    Textarea,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "input-radio")]
    Radio,
    #[serde(rename = "input-checkbox")]
    Checkbox,
    #[serde(rename = "input-file")]
    File,
    #[serde(rename = "input-url")]
    Url,
    #[serde(rename = "input-phone")]
    Phone,
    #[serde(rename = "input-color")]
    Color,
    #[serde(rename = "input-range")]
    Range,
    #[serde(rename = "rating")]
    Rating,
}

impl InputType {
    pub const ALL: [InputType; 17] = [
        InputType::Text,
        InputType::Email,
        InputType::Password,
        InputType::Number,
        InputType::Date,
        InputType::Time,
        InputType::DatetimeLocal,
        InputType::Textarea,
        InputType::Select,
        InputType::Radio,
        InputType::Checkbox,
        InputType::File,
        InputType::Url,
        InputType::Phone,
        InputType::Color,
        InputType::Range,
        InputType::Rating,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InputType::Text => "input-text",
            InputType::Email => "input-email",
            InputType::Password => "input-password",
            InputType::Number => "input-number",
            InputType::Date => "input-date",
            InputType::Time => "input-time",
            InputType::DatetimeLocal => "input-datetime-local",
            InputType::Textarea => "textarea",
            InputType::Select => "select",
            InputType::Radio => "input-radio",
            InputType::Checkbox => "input-checkbox",
            InputType::File => "input-file",
            InputType::Url => "input-url",
            InputType::Phone => "input-phone",
            InputType::Color => "input-color",
            InputType::Range => "input-range",
            InputType::Rating => "rating",
        }
    }

    /// Exact match against the tag list, ignoring case.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }
}

impl From<FieldType> for InputType {
    /// The tag a field would get without asking the completion service.
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Text => InputType::Text,
            FieldType::Email => InputType::Email,
            FieldType::Password => InputType::Password,
            FieldType::Number => InputType::Number,
            FieldType::Date => InputType::Date,
            FieldType::Time => InputType::Time,
            FieldType::Datetime => InputType::DatetimeLocal,
            FieldType::Textarea => InputType::Textarea,
            FieldType::Select => InputType::Select,
            FieldType::Radio => InputType::Radio,
            FieldType::Checkbox => InputType::Checkbox,
            FieldType::File => InputType::File,
            FieldType::Url => InputType::Url,
            FieldType::Phone => InputType::Phone,
            FieldType::Color => InputType::Color,
            FieldType::Range => InputType::Range,
            FieldType::Rating => InputType::Rating,
        }
    }
}

/// One question in a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FieldDefinition {
    /// Machine identifier, unique within the form
    #[serde(rename = "fieldName")]
    pub name: String,
    #[serde(rename = "fieldLabel")]
    pub label: String,
    #[serde(rename = "fieldType")]
    pub field_type: FieldType,
    #[serde(rename = "fieldRequired")]
    pub required: bool,
    #[serde(rename = "fieldOptions")]
    pub options: Vec<String>,
    /// Rendering hint attached during generation
    #[serde(rename = "htmlType", default, skip_serializing_if = "Option::is_none")]
    pub html_type: Option<InputType>,
}

impl FieldDefinition {
    pub fn new(
        name: &str,
        label: &str,
        field_type: FieldType,
        required: bool,
        options: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type,
            required,
            options: options.iter().map(|o| o.to_string()).collect(),
            html_type: None,
        }
    }

    /// Check a single field against the model invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Every field needs a fieldName".to_string());
        }
        if self.name.chars().any(|c| c.is_whitespace() || c == '.') {
            return Err(format!(
                "Field name {:?} may not contain whitespace or '.'",
                self.name
            ));
        }
        if self.label.trim().is_empty() {
            return Err(format!("Field {:?} needs a fieldLabel", self.name));
        }
        if self.field_type.is_choice() {
            if self.options.is_empty() {
                return Err(format!(
                    "Field {:?} of type {} needs at least one option",
                    self.name,
                    self.field_type.as_str()
                ));
            }
            if self.options.iter().any(|o| o.trim().is_empty()) {
                return Err(format!("Field {:?} has an empty option", self.name));
            }
        }
        Ok(())
    }
}

/// Validate and normalize a field list before it is persisted.
///
/// Non-choice fields have their options cleared; everything else must already
/// satisfy [`FieldDefinition::validate`].
pub fn validate_fields(fields: Vec<FieldDefinition>) -> Result<Vec<FieldDefinition>, String> {
    if fields.is_empty() {
        return Err("A form must contain at least one field".to_string());
    }

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(fields.len());
    for mut field in fields {
        field.name = field.name.trim().to_string();
        field.label = field.label.trim().to_string();
        if !field.field_type.is_choice() {
            field.options.clear();
        }
        field.validate()?;
        if !seen.insert(field.name.clone()) {
            return Err(format!("Duplicate field name {:?}", field.name));
        }
        normalized.push(field);
    }
    Ok(normalized)
}

/// Visual theme shared by forms and user preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Dark,
    Minimal,
    Vibrant,
    Corporate,
}

/// Form stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    /// Document ID
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub audience: String,
    pub description: String,
    /// Ordered; order is user-controlled
    pub fields: Vec<FieldDefinition>,
    /// Owning user ID
    pub user_id: String,
    #[serde(default)]
    pub theme: Theme,
    pub published: bool,
    #[serde(default)]
    pub submission_count: u64,
    pub created_at: String,
    pub updated_at: String,
}
