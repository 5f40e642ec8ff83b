//! User model for storage and API.

use super::form::Theme;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// How the account was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    #[serde(alias = "email")]
    Password,
    #[serde(alias = "google")]
    Oauth,
}

/// User preference bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Default,
            email_notifications: true,
        }
    }
}

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Document ID
    #[serde(rename = "_id")]
    pub id: String,
    /// Lower-cased email address (unique)
    pub email: String,
    /// Argon2 PHC string; None for OAuth-only accounts
    #[serde(default)]
    pub password_hash: Option<String>,
    pub full_name: String,
    /// Google subject ID (unique when present)
    #[serde(default)]
    pub google_id: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default)]
    pub preferences: Preferences,
    pub created_at: String,
    pub updated_at: String,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub auth_method: AuthMethod,
    pub is_email_verified: bool,
    pub preferences: Preferences,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
            auth_method: user.auth_method,
            is_email_verified: user.is_email_verified,
            preferences: user.preferences.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

/// Normalize an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
