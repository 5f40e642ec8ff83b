// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Form-Easy API Server
//!
//! Turns plain-language form descriptions into editable field lists and
//! stores the resulting forms and their submissions.

use form_easy::{
    config::{Config, StoreBackend},
    db::FirestoreDb,
    services::GeminiClient,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Form-Easy API");

    let db = match config.store_backend {
        StoreBackend::Firestore => FirestoreDb::new(&config.gcp_project_id).await?,
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            FirestoreDb::new_in_memory()
        }
    };
    tracing::info!(backend = db.backend_name(), "Document store ready");

    if config.gemini_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY not set; field generation will serve fallback fields");
    } else {
        tracing::info!(
            model = %config.gemini_model,
            key_len = config.gemini_api_key.len(),
            "Gemini client configured"
        );
    }
    let completion = Arc::new(GeminiClient::new(
        &config.gemini_base_url,
        &config.gemini_model,
        &config.gemini_api_key,
        config.completion_timeout,
    )?);

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), db, completion));

    // Build router
    let app = form_easy::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM (what Cloud Run sends before stopping us).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("form_easy=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
