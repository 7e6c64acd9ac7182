// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cached-link indirection and chunked result sets.
//!
//! Heavy data API endpoints answer with a pointer (`{"link": ...}`) to a
//! pre-rendered payload. Some of those payloads are themselves manifests
//! listing chunk files that together make up one logical result set.

use crate::error::AppError;
use crate::services::executor::{ApiRequest, RequestExecutor};
use crate::services::metrics::{Counter, MetricsSink};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// Pointer object returned by cached-link endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CachedLink {
    pub link: String,
    #[serde(default)]
    pub expires: Option<String>,
}

/// Manifest of a chunked result set.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkManifest {
    pub base_download_url: String,
    #[serde(default)]
    pub chunk_file_names: Vec<String>,
    /// Total row count as advertised by the server
    #[serde(default)]
    pub rows: Option<usize>,
}

impl ChunkManifest {
    pub fn chunk_url(&self, file_name: &str) -> String {
        if self.base_download_url.ends_with('/') {
            format!("{}{}", self.base_download_url, file_name)
        } else {
            format!("{}/{}", self.base_download_url, file_name)
        }
    }
}

/// `{"data": {"chunk_info": {...}}}` wrapper around a manifest.
#[derive(Debug, Deserialize)]
struct ChunkedEnvelope {
    data: ChunkedData,
}

#[derive(Debug, Deserialize)]
struct ChunkedData {
    #[serde(default)]
    chunk_info: Option<ChunkManifest>,
}

/// Resolves indirections on top of the executor.
#[derive(Clone)]
pub struct Resolver {
    executor: Arc<RequestExecutor>,
    metrics: Arc<dyn MetricsSink>,
}

impl Resolver {
    pub fn new(executor: Arc<RequestExecutor>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { executor, metrics }
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// Plain authenticated fetch, no indirection.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.executor.execute(&ApiRequest::get(url)).await
    }

    /// Fetch `url`, then fetch the target its cached link points to.
    pub async fn follow_link(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let body = self.fetch(url).await?;
        let link: CachedLink = self.decode(url, &body)?;
        tracing::debug!(url, expires = ?link.expires, "Following cached link");
        self.executor
            .execute(&ApiRequest::unauthenticated(link.link))
            .await
    }

    /// Fetch every chunk of `manifest` in order and concatenate the rows.
    ///
    /// All-or-nothing: the first failing chunk fails the whole result.
    pub async fn collect_chunks<T: DeserializeOwned>(
        &self,
        manifest: &ChunkManifest,
    ) -> Result<Vec<T>, AppError> {
        let mut rows = Vec::with_capacity(manifest.rows.unwrap_or_default());
        for file_name in &manifest.chunk_file_names {
            let url = manifest.chunk_url(file_name);
            let body = self
                .executor
                .execute(&ApiRequest::unauthenticated(url.as_str()))
                .await?;
            let chunk: Vec<T> = self.decode(&url, &body)?;
            rows.extend(chunk);
        }

        if let Some(expected) = manifest.rows {
            if expected != rows.len() {
                tracing::warn!(expected, actual = rows.len(), "Chunk row count mismatch");
            }
        }
        Ok(rows)
    }

    /// Follow a cached link whose target is a chunk manifest.
    ///
    /// A target without `chunk_info` is an empty result set.
    pub async fn follow_chunked<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, AppError> {
        let body = self.follow_link(url).await?;
        let envelope: ChunkedEnvelope = self.decode(url, &body)?;
        match envelope.data.chunk_info {
            Some(manifest) => self.collect_chunks(&manifest).await,
            None => Ok(Vec::new()),
        }
    }

    /// Decode a JSON body, counting failures as request errors.
    pub fn decode<T: DeserializeOwned>(&self, url: &str, body: &[u8]) -> Result<T, AppError> {
        serde_json::from_slice(body).map_err(|e| {
            self.metrics.incr(Counter::RequestError);
            tracing::error!(url, error = %e, "Could not decode response");
            AppError::Decode(format!("{}: {}", url, e))
        })
    }
}
