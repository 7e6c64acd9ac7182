// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! iRcollector
//!
//! Runs the collector loop and the admin API side by side. A fatal error
//! (rejected credentials, changed legacy payload) from either one exits
//! the process so a supervisor restarts it.

use ircollector::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryStore, Store},
    services::{Clock, SystemClock},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        scheme = ?config.auth_scheme,
        store = ?config.store_backend,
        "Starting iRcollector"
    );

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, nothing will be persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::build(config.clone(), store, clock)?);

    let app = ircollector::routes::create_router(state.clone());
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    let collector = state.collector.clone();
    let mut fatal = state.subscribe_fatal();
    tokio::select! {
        result = collector.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Collector stopped");
                std::process::exit(1);
            }
        }
        _ = fatal.wait_for(Option::is_some) => {
            tracing::error!("Admin request hit a fatal error, exiting");
            std::process::exit(1);
        }
        result = axum::serve(listener, app) => {
            result?;
        }
    }
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["ircollector=debug", "info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
