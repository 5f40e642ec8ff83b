//! Database layer (Firestore, with an in-memory fallback).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const FORMS: &str = "forms";
    pub const SUBMISSIONS: &str = "submissions";
    /// Uniqueness index: normalized email -> user ID
    pub const USER_EMAILS: &str = "user_emails";
    /// Uniqueness index: Google subject ID -> user ID
    pub const USER_GOOGLE_IDS: &str = "user_google_ids";
}
