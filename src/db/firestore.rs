// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile storage, unique email and Google ID)
//! - Forms (field definitions owned by a user)
//! - Submissions (immutable answers to a form)
//!
//! Firestore has no unique indexes, so uniqueness is enforced by
//! create-only writes into the `user_emails` and `user_google_ids`
//! collections, keyed by the unique value.

use crate::db::collections;
use crate::db::memory::MemoryStore;
use crate::error::AppError;
use crate::models::{Form, Submission, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Reservation document in a uniqueness index collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    user_id: String,
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
}

/// Document store accessor.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
}

fn db_err(e: firestore::errors::FirestoreError) -> AppError {
    AppError::Database(e.to_string())
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create an in-memory store (offline mode, tests).
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::default())),
        }
    }

    /// Short name of the active backend, reported by the health check.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Firestore(_) => "firestore",
            Backend::Memory(_) => "memory",
        }
    }

    // ─── Uniqueness Index ────────────────────────────────────────

    /// Create-only write of `key -> user_id` into an index collection.
    ///
    /// Re-claiming a key already held by the same user succeeds.
    async fn reserve(
        client: &firestore::FirestoreDb,
        collection: &str,
        key: &str,
        user_id: &str,
        what: &str,
    ) -> Result<(), AppError> {
        // Document IDs may not contain '/'.
        let doc_id = urlencoding::encode(key).into_owned();
        let entry = IndexEntry {
            user_id: user_id.to_string(),
        };

        let result: Result<IndexEntry, _> = client
            .fluent()
            .insert()
            .into(collection)
            .document_id(&doc_id)
            .object(&entry)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => {
                let holder: Option<IndexEntry> = client
                    .fluent()
                    .select()
                    .by_id_in(collection)
                    .obj()
                    .one(&doc_id)
                    .await
                    .map_err(db_err)?;
                match holder {
                    Some(h) if h.user_id == user_id => Ok(()),
                    _ => Err(AppError::DuplicateKey(format!("{} already registered", what))),
                }
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn release(client: &firestore::FirestoreDb, collection: &str, key: &str) {
        let doc_id = urlencoding::encode(key).into_owned();
        if let Err(e) = client
            .fluent()
            .delete()
            .from(collection)
            .document_id(&doc_id)
            .execute()
            .await
        {
            tracing::warn!(collection, error = %e, "Failed to release index reservation");
        }
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Create a user, enforcing email and Google ID uniqueness.
    pub async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let client = match &self.backend {
            Backend::Memory(store) => return store.create_user(user),
            Backend::Firestore(client) => client,
        };

        Self::reserve(client, collections::USER_EMAILS, &user.email, &user.id, "Email").await?;

        if let Some(google_id) = &user.google_id {
            if let Err(e) = Self::reserve(
                client,
                collections::USER_GOOGLE_IDS,
                google_id,
                &user.id,
                "Google account",
            )
            .await
            {
                Self::release(client, collections::USER_EMAILS, &user.email).await;
                return Err(e);
            }
        }

        let result: Result<User, _> = client
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await;

        if let Err(e) = result {
            Self::release(client, collections::USER_EMAILS, &user.email).await;
            if let Some(google_id) = &user.google_id {
                Self::release(client, collections::USER_GOOGLE_IDS, google_id).await;
            }
            return Err(db_err(e));
        }

        tracing::debug!(user_id = %user.id, "User created");
        Ok(())
    }

    /// Bind a Google subject ID to an existing user.
    pub async fn claim_google_id(&self, google_id: &str, user_id: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => store.claim_google_id(google_id, user_id),
            Backend::Firestore(client) => {
                Self::reserve(
                    client,
                    collections::USER_GOOGLE_IDS,
                    google_id,
                    user_id,
                    "Google account",
                )
                .await
            }
        }
    }

    /// Get a user by document ID.
    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.find_user_by_id(id)),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::USERS)
                .obj()
                .one(id)
                .await
                .map_err(db_err),
        }
    }

    /// Get a user by (already normalized) email address.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.find_user_by_email(email)),
            Backend::Firestore(client) => {
                let email = email.to_string();
                let users: Vec<User> = client
                    .fluent()
                    .select()
                    .from(collections::USERS)
                    .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
                    .limit(1)
                    .obj()
                    .query()
                    .await
                    .map_err(db_err)?;
                Ok(users.into_iter().next())
            }
        }
    }

    /// Get a user by Google subject ID.
    pub async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.find_user_by_google_id(google_id)),
            Backend::Firestore(client) => {
                let google_id = google_id.to_string();
                let users: Vec<User> = client
                    .fluent()
                    .select()
                    .from(collections::USERS)
                    .filter(move |q| q.for_all([q.field("googleId").eq(google_id.clone())]))
                    .limit(1)
                    .obj()
                    .query()
                    .await
                    .map_err(db_err)?;
                Ok(users.into_iter().next())
            }
        }
    }

    /// Overwrite an existing user document.
    ///
    /// Email and Google ID are not re-indexed here; use `claim_google_id`
    /// before linking a new Google account.
    pub async fn update_user(&self, user: &User) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => store.update_user(user),
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::USERS)
                    .document_id(&user.id)
                    .object(user)
                    .execute()
                    .await
                    .map_err(db_err)?;
                Ok(())
            }
        }
    }

    // ─── Form Operations ─────────────────────────────────────────

    /// Store a new form.
    pub async fn create_form(&self, form: &Form) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store.create_form(form);
                Ok(())
            }
            Backend::Firestore(client) => {
                let _: Form = client
                    .fluent()
                    .insert()
                    .into(collections::FORMS)
                    .document_id(&form.id)
                    .object(form)
                    .execute()
                    .await
                    .map_err(db_err)?;
                Ok(())
            }
        }
    }

    /// Get a form by document ID.
    pub async fn get_form(&self, id: &str) -> Result<Option<Form>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_form(id)),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::FORMS)
                .obj()
                .one(id)
                .await
                .map_err(db_err),
        }
    }

    /// All forms owned by a user, newest first.
    pub async fn list_forms_by_user(&self, user_id: &str) -> Result<Vec<Form>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.list_forms_by_user(user_id)),
            Backend::Firestore(client) => {
                let user_id = user_id.to_string();
                client
                    .fluent()
                    .select()
                    .from(collections::FORMS)
                    .filter(move |q| q.for_all([q.field("userId").eq(user_id.clone())]))
                    .order_by([("createdAt", firestore::FirestoreQueryDirection::Descending)])
                    .obj()
                    .query()
                    .await
                    .map_err(db_err)
            }
        }
    }

    /// Write a form's editable content. `submissionCount` is never touched
    /// here; only `create_submission` moves it.
    pub async fn update_form(&self, form: &Form) -> Result<(), AppError> {
        const EDITABLE: [&str; 8] = [
            "title",
            "purpose",
            "audience",
            "description",
            "fields",
            "theme",
            "published",
            "updatedAt",
        ];

        match &self.backend {
            Backend::Memory(store) => store.update_form(form),
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .fields(EDITABLE.iter().map(|f| f.to_string()).collect::<Vec<_>>())
                    .in_col(collections::FORMS)
                    .document_id(&form.id)
                    .object(form)
                    .execute()
                    .await
                    .map_err(db_err)?;
                Ok(())
            }
        }
    }

    /// Delete a form and all of its submissions.
    ///
    /// Returns the number of documents deleted.
    pub async fn delete_form(&self, id: &str) -> Result<usize, AppError> {
        let client = match &self.backend {
            Backend::Memory(store) => return Ok(store.delete_form(id)),
            Backend::Firestore(client) => client,
        };

        let submissions = self.list_submissions_by_form(id).await?;
        let count = submissions.len();
        self.batch_delete(&submissions, collections::SUBMISSIONS, |s: &Submission| {
            s.id.clone()
        })
        .await?;

        client
            .fluent()
            .delete()
            .from(collections::FORMS)
            .document_id(id)
            .execute()
            .await
            .map_err(db_err)?;

        tracing::info!(form_id = id, submissions = count, "Form deleted");
        Ok(count + 1)
    }

    // ─── Submission Operations ───────────────────────────────────

    /// Store a submission and increment the parent form's counter in one commit.
    pub async fn create_submission(&self, submission: &Submission) -> Result<(), AppError> {
        let client = match &self.backend {
            Backend::Memory(store) => return store.create_submission(submission),
            Backend::Firestore(client) => client,
        };

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let exists = client
            .fluent()
            .select()
            .by_id_in(collections::FORMS)
            .obj::<Form>()
            .one(&submission.form_id)
            .await
            .map_err(db_err)?
            .is_some();

        if !exists {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound("Form not found".to_string()));
        }

        client
            .fluent()
            .update()
            .in_col(collections::SUBMISSIONS)
            .document_id(&submission.id)
            .object(submission)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add submission to transaction: {}", e))
            })?;

        // Increment server-side; no read of the current count.
        client
            .fluent()
            .update()
            .in_col(collections::FORMS)
            .document_id(&submission.form_id)
            .transforms(|t| t.fields([t.field("submissionCount").increment(1)]))
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add counter to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(())
    }

    /// All submissions for a form, newest first.
    pub async fn list_submissions_by_form(
        &self,
        form_id: &str,
    ) -> Result<Vec<Submission>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.list_submissions_by_form(form_id)),
            Backend::Firestore(client) => {
                let form_id = form_id.to_string();
                client
                    .fluent()
                    .select()
                    .from(collections::SUBMISSIONS)
                    .filter(move |q| q.for_all([q.field("formId").eq(form_id.clone())]))
                    .order_by([(
                        "submittedAt",
                        firestore::FirestoreQueryDirection::Descending,
                    )])
                    .obj()
                    .query()
                    .await
                    .map_err(db_err)
            }
        }
    }

    // ─── Helper Methods ────────────────────────────────────────────

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let Backend::Firestore(client) = &self.backend else {
            return Ok(());
        };

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::form::{FieldDefinition, FieldType, Theme};
    use crate::models::{AuthMethod, Preferences, ResponseValue};
    use std::collections::BTreeMap;

    fn user(id: &str, email: &str, google_id: Option<&str>) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: None,
            full_name: "Test User".to_string(),
            google_id: google_id.map(str::to_string),
            avatar: None,
            auth_method: AuthMethod::Oauth,
            is_email_verified: true,
            preferences: Preferences::default(),
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000000Z".to_string(),
        }
    }

    fn form(id: &str, user_id: &str, created_at: &str) -> Form {
        Form {
            id: id.to_string(),
            title: format!("Form {}", id),
            purpose: String::new(),
            audience: String::new(),
            description: "desc".to_string(),
            fields: vec![FieldDefinition::new(
                "name",
                "Name",
                FieldType::Text,
                true,
                &[],
            )],
            user_id: user_id.to_string(),
            theme: Theme::Default,
            published: true,
            submission_count: 0,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn test_email_uniqueness() {
        let db = FirestoreDb::new_in_memory();
        db.create_user(&user("u1", "a@example.com", None))
            .await
            .unwrap();

        let err = db
            .create_user(&user("u2", "a@example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey(_)));

        let found = db.find_user_by_email("a@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_google_id_conflict_releases_email() {
        let db = FirestoreDb::new_in_memory();
        db.create_user(&user("u1", "a@example.com", Some("g-1")))
            .await
            .unwrap();

        let err = db
            .create_user(&user("u2", "b@example.com", Some("g-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey(_)));

        // The failed attempt must not leave b@example.com reserved.
        db.create_user(&user("u3", "b@example.com", None))
            .await
            .unwrap();
        assert_eq!(
            db.find_user_by_google_id("g-1").await.unwrap().unwrap().id,
            "u1"
        );
    }

    #[tokio::test]
    async fn test_forms_listed_newest_first() {
        let db = FirestoreDb::new_in_memory();
        db.create_form(&form("old", "u1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        db.create_form(&form("new", "u1", "2026-02-01T00:00:00.000000Z"))
            .await
            .unwrap();
        db.create_form(&form("other", "u2", "2026-03-01T00:00:00.000000Z"))
            .await
            .unwrap();

        let ids: Vec<String> = db
            .list_forms_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_submission_increments_counter_and_cascades() {
        let db = FirestoreDb::new_in_memory();
        db.create_form(&form("f1", "u1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();

        for (i, at) in ["2026-01-02T00:00:00.000000Z", "2026-01-03T00:00:00.000000Z"]
            .iter()
            .enumerate()
        {
            let mut responses = BTreeMap::new();
            responses.insert("name".to_string(), ResponseValue::Text(format!("R{}", i)));
            db.create_submission(&Submission {
                id: format!("s{}", i),
                form_id: "f1".to_string(),
                responses,
                submitted_by: "Anonymous".to_string(),
                submitted_at: at.to_string(),
            })
            .await
            .unwrap();
        }

        let form = db.get_form("f1").await.unwrap().unwrap();
        assert_eq!(form.submission_count, 2);

        let subs = db.list_submissions_by_form("f1").await.unwrap();
        assert_eq!(subs[0].id, "s1");

        assert_eq!(db.delete_form("f1").await.unwrap(), 3);
        assert!(db.list_submissions_by_form("f1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submission_to_missing_form() {
        let db = FirestoreDb::new_in_memory();
        let err = db
            .create_submission(&Submission {
                id: "s".to_string(),
                form_id: "missing".to_string(),
                responses: BTreeMap::new(),
                submitted_by: "Anonymous".to_string(),
                submitted_at: "2026-01-01T00:00:00.000000Z".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_all_counted() {
        let db = FirestoreDb::new_in_memory();
        db.create_form(&form("f1", "u1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();

        let submissions: Vec<Submission> = (0..16)
            .map(|i| Submission {
                id: format!("s{}", i),
                form_id: "f1".to_string(),
                responses: BTreeMap::new(),
                submitted_by: "Anonymous".to_string(),
                submitted_at: "2026-01-02T00:00:00.000000Z".to_string(),
            })
            .collect();
        let results =
            futures_util::future::join_all(submissions.iter().map(|s| db.create_submission(s)))
                .await;
        assert!(results.iter().all(|r| r.is_ok()));

        let form = db.get_form("f1").await.unwrap().unwrap();
        assert_eq!(form.submission_count, 16);
    }

    #[tokio::test]
    async fn test_update_form_keeps_submission_count() {
        let db = FirestoreDb::new_in_memory();
        db.create_form(&form("f1", "u1", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        db.create_submission(&Submission {
            id: "s1".to_string(),
            form_id: "f1".to_string(),
            responses: BTreeMap::new(),
            submitted_by: "Anonymous".to_string(),
            submitted_at: "2026-01-02T00:00:00.000000Z".to_string(),
        })
        .await
        .unwrap();

        // Stale copy read before the submission landed
        let mut stale = form("f1", "u1", "2026-01-01T00:00:00.000000Z");
        stale.title = "Renamed".to_string();
        db.update_form(&stale).await.unwrap();

        let stored = db.get_form("f1").await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.submission_count, 1);

        let missing = form("nope", "u1", "2026-01-01T00:00:00.000000Z");
        assert!(matches!(
            db.update_form(&missing).await,
            Err(AppError::NotFound(_))
        ));
    }
}
