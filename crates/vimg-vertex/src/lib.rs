// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vertex AI image generation adapter for vimg.
//!
//! This crate implements [`ImageGenerator`] on top of the Vertex AI
//! `generateContent` API: a bounded retry loop around single classified
//! attempts, with successful images persisted to the artifact store before
//! the result is returned.

pub mod client;
pub mod codec;
pub mod keys;
pub mod retry;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use vimg_config::model::VimgConfig;
use vimg_core::{
    AdapterType, FailureKind, GeneratedImage, GenerationFailure, GenerationRequest,
    GenerationResult, HealthStatus, ImageGenerator, PluginAdapter, VimgError,
};
use vimg_storage::ArtifactStore;

pub use crate::client::{DecodedImage, VertexClient, build_request};
pub use crate::codec::CodecError;
pub use crate::keys::ApiKeyRing;
pub use crate::retry::{Backoff, RetryState};
pub use crate::types::GenerationConfig;

/// Attempt ceiling and backoff applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(10)),
        }
    }
}

/// Vertex AI generator implementing [`ImageGenerator`].
pub struct GenerationClient {
    client: VertexClient,
    store: ArtifactStore,
    policy: RetryPolicy,
}

impl GenerationClient {
    /// Creates a generator from the `[vertex]` and `[storage]` sections.
    ///
    /// Fails with [`VimgError::Config`] when no API key is configured.
    pub fn from_config(config: &VimgConfig) -> Result<Self, VimgError> {
        let vertex = &config.vertex;
        let keys = ApiKeyRing::new(&vertex.api_keys)?;
        let client = VertexClient::new(
            keys,
            vertex.base_url.clone(),
            GenerationConfig {
                temperature: vertex.temperature,
                top_p: vertex.top_p,
                max_output_tokens: vertex.max_output_tokens,
            },
            Duration::from_secs(vertex.request_timeout_secs),
        )?;
        let policy = RetryPolicy {
            max_attempts: vertex.max_retry_attempts,
            backoff: Backoff::new(
                Duration::from_millis(vertex.retry_backoff_base_ms),
                Duration::from_millis(vertex.retry_backoff_max_ms),
            ),
        };

        info!(
            model = %vertex.model,
            keys = vertex.api_keys.len(),
            max_attempts = policy.max_attempts,
            "Vertex AI generator initialized"
        );

        Ok(Self::new(
            client,
            ArtifactStore::new(&config.storage.artifact_dir),
            policy,
        ))
    }

    pub fn new(client: VertexClient, store: ArtifactStore, policy: RetryPolicy) -> Self {
        Self {
            client,
            store,
            policy,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl PluginAdapter for GenerationClient {
    fn name(&self) -> &str {
        "vertex"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, VimgError> {
        // Keys are guaranteed by construction; probing the API would spend quota.
        match self.store.probe_writable().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl ImageGenerator for GenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let body = build_request(request, self.client.generation_config());
        let mut state = RetryState::new(self.policy.max_attempts);

        loop {
            let attempt = state.begin_attempt();
            debug!(
                attempt,
                model = request.model(),
                images = request.reference_images().len(),
                "sending generation attempt"
            );

            let failure = match self.client.attempt(&body, request.model()).await {
                Ok(image) => return self.persist(image, attempt).await,
                Err(failure) => failure,
            };

            warn!(
                attempt,
                kind = %failure.kind,
                error = %failure.message,
                "generation attempt failed"
            );
            if !state.record_failure(failure) {
                let failure = state.into_failure();
                error!(
                    attempts = failure.attempts,
                    kind = %failure.kind,
                    "generation failed"
                );
                return Err(failure);
            }

            let delay = self.policy.backoff.delay(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
            tokio::time::sleep(delay).await;
        }
    }
}

impl GenerationClient {
    async fn persist(&self, image: DecodedImage, attempts: u32) -> GenerationResult {
        match self.store.persist(&image.bytes, &image.mime_type).await {
            Ok(artifact) => {
                info!(
                    attempts,
                    path = %artifact.path.display(),
                    mime_type = %image.mime_type,
                    "image generated"
                );
                Ok(GeneratedImage {
                    bytes: image.bytes,
                    mime_type: image.mime_type,
                    artifact,
                    attempts,
                })
            }
            Err(e) => {
                error!(error = %e, "failed to persist generated image");
                Err(GenerationFailure::new(FailureKind::StorageFailed, e.to_string())
                    .with_attempts(attempts))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_api_keys() {
        let config = VimgConfig::default();
        let err = GenerationClient::from_config(&config).err().unwrap();
        assert!(matches!(err, VimgError::Config(_)));
    }

    #[test]
    fn from_config_maps_retry_settings() {
        let mut config = VimgConfig::default();
        config.vertex.api_keys = vec!["k1".into(), "k2".into()];
        config.vertex.max_retry_attempts = 5;
        config.vertex.retry_backoff_base_ms = 250;
        config.vertex.retry_backoff_max_ms = 2000;

        let generator = GenerationClient::from_config(&config).unwrap();
        let policy = generator.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff.base, Duration::from_millis(250));
        assert_eq!(policy.backoff.max, Duration::from_millis(2000));
        assert_eq!(generator.name(), "vertex");
        assert_eq!(generator.adapter_type(), AdapterType::Generator);
    }

    #[tokio::test]
    async fn health_check_reports_unwritable_store() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let mut config = VimgConfig::default();
        config.vertex.api_keys = vec!["k".into()];
        config.storage.artifact_dir = blocker.join("images").display().to_string();
        let generator = GenerationClient::from_config(&config).unwrap();

        let status = generator.health_check().await.unwrap();
        assert!(matches!(status, HealthStatus::Unhealthy(_)), "got {status:?}");
    }
}
