// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! iRcollector: keeps a store of race results from a rate-limited remote
//! racing statistics service up to date.
//!
//! A single collector loop authenticates, paces every request through one
//! shared executor, resolves cached links and chunked result sets, and
//! writes seasons, race weeks, race details and standings to the store.
//! A small admin API triggers on-demand resyncs through the same pipeline.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use error::AppError;
use services::{
    Clock, Collector, CounterRegistry, IracingClient, RequestExecutor, Resolver, SessionManager,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub collector: Arc<Collector>,
    pub metrics: Arc<CounterRegistry>,
    pub clock: Arc<dyn Clock>,
    /// Set once a fatal error is seen outside the collector loop
    fatal_tx: watch::Sender<Option<String>>,
}

impl AppState {
    /// Wire the remote client pipeline (session, executor, resolver) and
    /// the collector on top of `store`.
    pub fn build(
        config: Config,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let metrics = Arc::new(CounterRegistry::new());

        // Session and executor must share the cookie store.
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout)
            .build()?;

        let session = Arc::new(SessionManager::new(
            http.clone(),
            config.credentials.clone(),
            config.auth_scheme,
            &config.endpoints,
            clock.clone(),
            metrics.clone(),
        ));
        let executor = Arc::new(RequestExecutor::new(
            http,
            session,
            clock.clone(),
            metrics.clone(),
            &config.endpoints.legacy_base_url,
        ));
        let resolver = Resolver::new(executor, metrics.clone());
        let client = IracingClient::new(resolver, config.endpoints.clone());

        let collector = Arc::new(Collector::new(
            client,
            store.clone(),
            clock.clone(),
            metrics.clone(),
            config.sync.clone(),
        ));

        let (fatal_tx, _) = watch::channel(None);

        Ok(Self {
            config,
            store,
            collector,
            metrics,
            clock,
            fatal_tx,
        })
    }

    /// Record `error` if it should stop the process. Non-fatal errors are
    /// ignored.
    pub fn report_fatal(&self, error: &AppError) {
        if error.is_fatal() {
            tracing::error!(error = %error, "Fatal error outside the collector loop");
            self.fatal_tx.send_replace(Some(error.to_string()));
        }
    }

    /// Observe fatal errors reported through [`AppState::report_fatal`].
    pub fn subscribe_fatal(&self) -> watch::Receiver<Option<String>> {
        self.fatal_tx.subscribe()
    }
}
