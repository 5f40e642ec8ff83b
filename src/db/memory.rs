// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store used offline and in tests.
//!
//! Mirrors the Firestore layout: one map per collection plus the two
//! uniqueness index collections.

use crate::error::AppError;
use crate::models::{Form, Submission, User};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    user_emails: DashMap<String, String>,
    user_google_ids: DashMap<String, String>,
    forms: DashMap<String, Form>,
    submissions: DashMap<String, Submission>,
}

fn reserve(
    index: &DashMap<String, String>,
    key: &str,
    user_id: &str,
    what: &str,
) -> Result<(), AppError> {
    match index.entry(key.to_string()) {
        Entry::Occupied(e) if e.get() != user_id => {
            Err(AppError::DuplicateKey(format!("{} already registered", what)))
        }
        Entry::Occupied(_) => Ok(()),
        Entry::Vacant(e) => {
            e.insert(user_id.to_string());
            Ok(())
        }
    }
}

impl MemoryStore {
    // ─── Users ───────────────────────────────────────────────────

    pub fn create_user(&self, user: &User) -> Result<(), AppError> {
        reserve(&self.user_emails, &user.email, &user.id, "Email")?;
        if let Some(google_id) = &user.google_id {
            if let Err(e) = reserve(&self.user_google_ids, google_id, &user.id, "Google account") {
                self.user_emails.remove(&user.email);
                return Err(e);
            }
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    pub fn claim_google_id(&self, google_id: &str, user_id: &str) -> Result<(), AppError> {
        reserve(&self.user_google_ids, google_id, user_id, "Google account")
    }

    pub fn find_user_by_id(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.clone())
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let id = self.user_emails.get(email)?.clone();
        self.find_user_by_id(&id)
    }

    pub fn find_user_by_google_id(&self, google_id: &str) -> Option<User> {
        let id = self.user_google_ids.get(google_id)?.clone();
        self.find_user_by_id(&id)
    }

    pub fn update_user(&self, user: &User) -> Result<(), AppError> {
        match self.users.get_mut(&user.id) {
            Some(mut existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(AppError::NotFound("User not found".to_string())),
        }
    }

    // ─── Forms ───────────────────────────────────────────────────

    pub fn create_form(&self, form: &Form) {
        self.forms.insert(form.id.clone(), form.clone());
    }

    pub fn get_form(&self, id: &str) -> Option<Form> {
        self.forms.get(id).map(|f| f.clone())
    }

    pub fn list_forms_by_user(&self, user_id: &str) -> Vec<Form> {
        let mut forms: Vec<Form> = self
            .forms
            .iter()
            .filter(|f| f.user_id == user_id)
            .map(|f| f.clone())
            .collect();
        forms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        forms
    }

    pub fn update_form(&self, form: &Form) -> Result<(), AppError> {
        match self.forms.get_mut(&form.id) {
            Some(mut existing) => {
                let submission_count = existing.submission_count;
                *existing = form.clone();
                existing.submission_count = submission_count;
                Ok(())
            }
            None => Err(AppError::NotFound("Form not found".to_string())),
        }
    }

    pub fn delete_form(&self, id: &str) -> usize {
        let removed = self.forms.remove(id).is_some() as usize;
        let before = self.submissions.len();
        self.submissions.retain(|_, s| s.form_id != id);
        removed + (before - self.submissions.len())
    }

    // ─── Submissions ─────────────────────────────────────────────

    pub fn create_submission(&self, submission: &Submission) -> Result<(), AppError> {
        // Holding the form entry serializes concurrent submitters on the counter.
        let mut form = self
            .forms
            .get_mut(&submission.form_id)
            .ok_or_else(|| AppError::NotFound("Form not found".to_string()))?;
        self.submissions
            .insert(submission.id.clone(), submission.clone());
        form.submission_count += 1;
        Ok(())
    }

    pub fn list_submissions_by_form(&self, form_id: &str) -> Vec<Submission> {
        let mut submissions: Vec<Submission> = self
            .submissions
            .iter()
            .filter(|s| s.form_id == form_id)
            .map(|s| s.clone())
            .collect();
        submissions.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        submissions
    }
}
