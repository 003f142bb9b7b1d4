// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end request testing.
//!
//! `TestHarness` assembles a real [`RequestOrchestrator`] over a mock
//! generator and temp artifact storage, and drives chat messages through the
//! same [`CommandDispatcher`] the host uses.

use std::sync::Arc;
use std::time::Duration;

use vimg_agent::{CommandDispatcher, RequestOrchestrator};
use vimg_core::{
    ArtifactDelivery, CommandHandler, Destination, FilterMode, HostRequest, HostResponse,
    OriginId, ReferenceImage, VimgError,
};
use vimg_guard::{FilterPolicy, RateLimiter};
use vimg_storage::ArtifactStore;

use crate::mock_delivery::MockDelivery;
use crate::mock_generator::MockGenerator;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    filter_mode: FilterMode,
    filter_list: Vec<String>,
    rate_limit: usize,
    rate_window: Duration,
    destination: Destination,
    delivery: Option<Arc<dyn ArtifactDelivery>>,
    generator_delay: Option<Duration>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            filter_mode: FilterMode::None,
            filter_list: Vec::new(),
            rate_limit: 0,
            rate_window: Duration::from_secs(60),
            destination: Destination::Local,
            delivery: None,
            generator_delay: None,
        }
    }

    /// Set the origin filter.
    pub fn with_filter<I, S>(mut self, mode: FilterMode, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_mode = mode;
        self.filter_list = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Allow `max_calls` per origin per `window`.
    pub fn with_rate_limit(mut self, max_calls: usize, window: Duration) -> Self {
        self.rate_limit = max_calls;
        self.rate_window = window;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Replace the default [`MockDelivery`], e.g. with a real transfer client.
    pub fn with_delivery(mut self, delivery: Arc<dyn ArtifactDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Hold every generation call in flight for `delay`.
    pub fn with_generator_delay(mut self, delay: Duration) -> Self {
        self.generator_delay = Some(delay);
        self
    }

    /// Build the test harness, creating the temp artifact directory.
    pub async fn build(self) -> Result<TestHarness, VimgError> {
        let temp_dir = tempfile::TempDir::new()
            .map_err(|e| VimgError::storage("failed to create temp dir", e))?;
        let store = ArtifactStore::new(temp_dir.path().join("images"));
        store.ensure_root().await?;

        let mut generator = MockGenerator::new(store.clone());
        if let Some(delay) = self.generator_delay {
            generator = generator.with_delay(delay);
        }
        let generator = Arc::new(generator);
        let delivery = self
            .delivery
            .unwrap_or_else(|| Arc::new(MockDelivery::new()));

        let orchestrator = Arc::new(RequestOrchestrator::new(
            FilterPolicy::new(self.filter_mode, self.filter_list),
            RateLimiter::new(self.rate_limit, self.rate_window),
            generator.clone(),
            delivery,
            self.destination,
            "mock-model",
        ));

        Ok(TestHarness {
            dispatcher: CommandDispatcher::new(orchestrator.clone()),
            orchestrator,
            generator,
            store,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock generator and temp storage.
pub struct TestHarness {
    pub orchestrator: Arc<RequestOrchestrator>,
    pub dispatcher: CommandDispatcher,
    /// The mock generator behind the orchestrator.
    pub generator: Arc<MockGenerator>,
    /// Artifact storage (temp dir, cleaned up on drop).
    pub store: ArtifactStore,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Send a text-to-image request from `origin` through the orchestrator.
    pub async fn send(&self, origin: &str, prompt: &str) -> HostResponse {
        self.orchestrator
            .handle(HostRequest {
                origin: Some(OriginId::from(origin)),
                prompt: prompt.to_string(),
                ..HostRequest::default()
            })
            .await
    }

    /// Send a raw chat message (`/command args`) through the dispatcher.
    pub async fn message(
        &self,
        origin: Option<&str>,
        text: &str,
        images: Vec<ReferenceImage>,
    ) -> Option<HostResponse> {
        self.dispatcher
            .handle_message(text, images, origin.map(OriginId::from))
            .await
    }
}
