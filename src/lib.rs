// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Form-Easy: describe a form in plain language, get editable fields back.
//!
//! This crate provides the backend API: accounts and sessions, AI-assisted
//! field generation, and storage for forms and their submissions.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{CompletionClient, CredentialService, FieldGenerator};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub credentials: CredentialService,
    pub generator: FieldGenerator,
}

impl AppState {
    /// Wire the services from configuration around an existing store and
    /// completion client.
    pub fn new(config: Config, db: FirestoreDb, completion: Arc<dyn CompletionClient>) -> Self {
        let credentials = CredentialService::new(
            &config.jwt_signing_key,
            config.access_token_ttl,
            config.refresh_token_ttl,
        );
        let generator = FieldGenerator::new(
            completion,
            config.completion_timeout,
            config.classify_concurrency,
        );

        Self {
            config,
            db,
            credentials,
            generator,
        }
    }
}
