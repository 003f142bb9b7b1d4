// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock image generator for deterministic testing.
//!
//! `MockGenerator` implements `ImageGenerator` with scripted outcomes and
//! writes real artifacts through an [`ArtifactStore`], so delivery and
//! retention see genuine files.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use vimg_core::{
    AdapterType, FailureKind, GeneratedImage, GenerationFailure, GenerationRequest,
    GenerationResult, HealthStatus, ImageGenerator, PluginAdapter, VimgError,
};
use vimg_storage::ArtifactStore;

use crate::fixtures;

enum Scripted {
    Image { bytes: Vec<u8>, mime_type: String },
    Failure(GenerationFailure),
}

/// A mock generator that plays back queued outcomes.
///
/// Outcomes are popped from a FIFO queue. When the queue is empty, the
/// 1x1 PNG fixture is generated.
pub struct MockGenerator {
    store: ArtifactStore,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockGenerator {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep for `delay` inside every call, to hold requests in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful image.
    pub async fn push_image(&self, bytes: Vec<u8>, mime_type: impl Into<String>) {
        self.script.lock().await.push_back(Scripted::Image {
            bytes,
            mime_type: mime_type.into(),
        });
    }

    /// Queue a terminal failure.
    pub async fn push_failure(&self, failure: GenerationFailure) {
        self.script.lock().await.push_back(Scripted::Failure(failure));
    }

    /// Number of `generate` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().await.last().cloned()
    }

    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

#[async_trait]
impl PluginAdapter for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, VimgError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ImageGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().await.pop_front();
        let (bytes, mime_type) = match next {
            Some(Scripted::Failure(failure)) => return Err(failure),
            Some(Scripted::Image { bytes, mime_type }) => (bytes, mime_type),
            None => (fixtures::png_bytes(), "image/png".to_string()),
        };

        let artifact = self.store.persist(&bytes, &mime_type).await.map_err(|e| {
            GenerationFailure::new(FailureKind::StorageFailed, e.to_string()).with_attempts(1)
        })?;
        Ok(GeneratedImage {
            bytes,
            mime_type,
            artifact,
            attempts: 1,
        })
    }
}
