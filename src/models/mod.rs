// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod form;
pub mod submission;
pub mod user;

pub use form::{FieldDefinition, FieldType, Form, InputType, Theme};
pub use submission::{ResponseValue, Submission};
pub use user::{AuthMethod, Preferences, User, UserResponse};
