// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request pipeline: filter, rate check, generate, deliver.
//!
//! Each request walks `Received -> Filtered -> RateChecked -> Generating ->
//! Delivering -> Done`. Rejections are terminal at the stage that produced
//! them; a failed remote delivery is not, since the local artifact still
//! answers the request.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use vimg_core::{
    ArtifactDelivery, ArtifactFile, CommandHandler, DeliveryResult, Destination, FailureKind,
    GenerationFailure, GenerationRequest, HealthStatus, HostRequest, HostResponse, ImageGenerator,
    OriginId, VimgError,
};
use vimg_guard::{FilterPolicy, RateLimiter};

/// Stages of the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Filtered,
    RateChecked,
    Generating,
    Delivering,
    Done,
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStage::Received => write!(f, "received"),
            RequestStage::Filtered => write!(f, "filtered"),
            RequestStage::RateChecked => write!(f, "rate_checked"),
            RequestStage::Generating => write!(f, "generating"),
            RequestStage::Delivering => write!(f, "delivering"),
            RequestStage::Done => write!(f, "done"),
        }
    }
}

/// A request that ended without an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{failure} (stopped while {stage})")]
pub struct RequestFailure {
    /// The stage the request was in when it stopped.
    pub stage: RequestStage,
    pub failure: GenerationFailure,
    /// Time until the origin's oldest call leaves its rate window.
    pub retry_after: Option<Duration>,
}

impl RequestFailure {
    fn new(stage: RequestStage, failure: GenerationFailure) -> Self {
        Self {
            stage,
            failure,
            retry_after: None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.failure.kind
    }

    /// Message for the chat user. Never includes diagnostic detail.
    pub fn user_message(&self) -> String {
        let base = self.failure.kind.user_message();
        match self.retry_after {
            Some(wait) if self.failure.kind == FailureKind::RateLimited => {
                format!("{base} Next slot in {}s.", ceil_secs(wait))
            }
            _ => base.to_string(),
        }
    }
}

fn ceil_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    if wait.subsec_nanos() > 0 { secs + 1 } else { secs }
}

/// A request that produced an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub artifact: ArtifactFile,
    pub delivery: DeliveryResult,
    pub attempts: u32,
}

impl RequestOutcome {
    pub fn local_path(&self) -> &Path {
        &self.artifact.path
    }

    /// The path the chat client should read: the peer's path after a
    /// successful remote delivery, the local path otherwise.
    pub fn reply_path(&self) -> String {
        match &self.delivery {
            DeliveryResult::Remote { remote_path } => remote_path.clone(),
            _ => self.artifact.path.display().to_string(),
        }
    }

    /// Set when remote delivery failed and the reply fell back to the local path.
    pub fn delivery_warning(&self) -> Option<String> {
        self.delivery.warning()
    }
}

/// Composes filtering, rate limiting, generation and delivery.
///
/// Shared across concurrent requests; every piece of mutable state lives in
/// the [`RateLimiter`], which serializes admissions per origin.
pub struct RequestOrchestrator {
    filter: FilterPolicy,
    limiter: RateLimiter,
    generator: Arc<dyn ImageGenerator>,
    delivery: Arc<dyn ArtifactDelivery>,
    destination: Destination,
    model: String,
}

impl RequestOrchestrator {
    pub fn new(
        filter: FilterPolicy,
        limiter: RateLimiter,
        generator: Arc<dyn ImageGenerator>,
        delivery: Arc<dyn ArtifactDelivery>,
        destination: Destination,
        model: impl Into<String>,
    ) -> Self {
        Self {
            filter,
            limiter,
            generator,
            delivery,
            destination,
            model: model.into(),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Whether requests from `origin` pass the filter. Direct messages always do.
    pub fn is_allowed(&self, origin: Option<&OriginId>) -> bool {
        origin.is_none_or(|o| vimg_guard::allowed(o, &self.filter))
    }

    /// Runs one request through the pipeline.
    pub async fn receive(&self, request: HostRequest) -> Result<RequestOutcome, RequestFailure> {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "request",
            request_id = %request_id,
            origin = request.origin.as_ref().map(OriginId::as_str).unwrap_or("direct"),
            images = request.images.len(),
        );
        self.run_pipeline(request).instrument(span).await
    }

    async fn run_pipeline(&self, request: HostRequest) -> Result<RequestOutcome, RequestFailure> {
        let mut stage = RequestStage::Received;
        let origin = request.origin.clone();

        if !self.is_allowed(origin.as_ref()) {
            info!("origin rejected by filter");
            return Err(RequestFailure::new(
                stage,
                GenerationFailure::new(FailureKind::FilteredOut, "origin is not allowed"),
            ));
        }
        advance(&mut stage, RequestStage::Filtered);

        // Validated before the rate check so a malformed request does not use up a slot.
        let model = request.model.unwrap_or_else(|| self.model.clone());
        let generation = GenerationRequest::new(request.prompt, request.images, model, origin.clone())
            .map_err(|e| {
                let message = match e {
                    VimgError::InvalidRequest(message) => message,
                    other => other.to_string(),
                };
                warn!(error = %message, "request rejected before generation");
                RequestFailure::new(
                    stage,
                    GenerationFailure::new(FailureKind::InvalidRequest, message),
                )
            })?;

        if let Some(origin) = &origin {
            let now = Instant::now();
            if !self.limiter.admit(origin, now) {
                let retry_after = self.limiter.retry_after(origin, now);
                info!(retry_after = ?retry_after, "origin is rate limited");
                return Err(RequestFailure {
                    retry_after,
                    ..RequestFailure::new(
                        stage,
                        GenerationFailure::new(
                            FailureKind::RateLimited,
                            format!("origin {origin} exhausted its call budget"),
                        ),
                    )
                });
            }
        }
        advance(&mut stage, RequestStage::RateChecked);

        advance(&mut stage, RequestStage::Generating);
        let image = self.generator.generate(&generation).await.map_err(|failure| {
            warn!(
                kind = %failure.kind,
                attempts = failure.attempts,
                error = %failure.message,
                "generation failed"
            );
            RequestFailure::new(stage, failure)
        })?;

        advance(&mut stage, RequestStage::Delivering);
        let delivery = self.delivery.deliver(&image.artifact, &self.destination).await;
        if let DeliveryResult::LocalUnreadable { path, message } = &delivery {
            warn!(path = %path.display(), error = %message, "artifact vanished before delivery");
            return Err(RequestFailure::new(
                stage,
                GenerationFailure::new(FailureKind::DeliveryFailed, delivery.warning().unwrap_or_default())
                    .with_attempts(image.attempts),
            ));
        }
        if let Some(warning) = delivery.warning() {
            warn!(warning = %warning, "remote delivery failed, replying with local path");
        }

        advance(&mut stage, RequestStage::Done);
        info!(
            path = %image.artifact.path.display(),
            attempts = image.attempts,
            delivered = delivery.is_success(),
            "request completed"
        );
        Ok(RequestOutcome {
            artifact: image.artifact,
            delivery,
            attempts: image.attempts,
        })
    }

    /// Health of the generator and delivery adapters, keyed by adapter name.
    pub async fn health_checks(&self) -> Vec<(String, Result<HealthStatus, VimgError>)> {
        vec![
            (
                self.generator.name().to_string(),
                self.generator.health_check().await,
            ),
            (
                self.delivery.name().to_string(),
                self.delivery.health_check().await,
            ),
        ]
    }
}

fn advance(stage: &mut RequestStage, next: RequestStage) {
    debug!(from = %stage, to = %next, "request stage");
    *stage = next;
}

#[async_trait]
impl CommandHandler for RequestOrchestrator {
    async fn handle(&self, request: HostRequest) -> HostResponse {
        let caption = request.caption.clone();
        match self.receive(request).await {
            Ok(outcome) => HostResponse::Image {
                reply_path: outcome.reply_path(),
                delivery_warning: outcome.delivery_warning(),
                local_path: outcome.artifact.path,
                caption,
            },
            Err(failure) => HostResponse::Failure {
                kind: failure.kind(),
                message: failure.user_message(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vimg_core::{FilterMode, ReferenceImage, TransferStage};
    use vimg_storage::ArtifactStore;
    use vimg_test_utils::{MockDelivery, MockGenerator, fixtures};

    struct Fixture {
        orchestrator: RequestOrchestrator,
        generator: Arc<MockGenerator>,
        delivery: Arc<MockDelivery>,
        _dir: TempDir,
    }

    fn fixture(filter: FilterPolicy, limiter: RateLimiter, delivery: MockDelivery) -> Fixture {
        let dir = TempDir::new().unwrap();
        let generator = Arc::new(MockGenerator::new(ArtifactStore::new(dir.path())));
        let delivery = Arc::new(delivery);
        let orchestrator = RequestOrchestrator::new(
            filter,
            limiter,
            generator.clone(),
            delivery.clone(),
            Destination::Local,
            "test-model",
        );
        Fixture {
            orchestrator,
            generator,
            delivery,
            _dir: dir,
        }
    }

    fn open() -> Fixture {
        fixture(
            FilterPolicy::new(FilterMode::None, Vec::<String>::new()),
            RateLimiter::new(0, Duration::from_secs(60)),
            MockDelivery::new(),
        )
    }

    fn from(origin: &str) -> HostRequest {
        HostRequest {
            origin: Some(origin.into()),
            prompt: "an orange cat on a keyboard".into(),
            ..HostRequest::default()
        }
    }

    #[test]
    fn stage_display() {
        assert_eq!(RequestStage::RateChecked.to_string(), "rate_checked");
        assert_eq!(RequestStage::Done.to_string(), "done");
    }

    #[test]
    fn rate_limited_message_rounds_wait_up() {
        let failure = RequestFailure {
            retry_after: Some(Duration::from_millis(1_200)),
            ..RequestFailure::new(
                RequestStage::Filtered,
                GenerationFailure::new(FailureKind::RateLimited, "budget"),
            )
        };
        assert!(failure.user_message().ends_with("Next slot in 2s."));
    }

    #[tokio::test]
    async fn success_reports_local_path() {
        let f = open();
        let outcome = f.orchestrator.receive(from("g1")).await.unwrap();
        assert!(outcome.local_path().exists());
        assert_eq!(outcome.reply_path(), outcome.local_path().display().to_string());
        assert!(outcome.delivery_warning().is_none());
        assert_eq!(f.generator.call_count(), 1);
        assert_eq!(f.delivery.call_count(), 1);
    }

    #[tokio::test]
    async fn configured_model_is_used_unless_overridden() {
        let f = open();
        f.orchestrator.receive(from("g1")).await.unwrap();
        assert_eq!(f.generator.last_request().await.unwrap().model(), "test-model");

        let request = HostRequest {
            model: Some("other-model".into()),
            ..from("g1")
        };
        f.orchestrator.receive(request).await.unwrap();
        assert_eq!(f.generator.last_request().await.unwrap().model(), "other-model");
    }

    #[tokio::test]
    async fn filtered_origin_never_reaches_generator() {
        let f = fixture(
            FilterPolicy::new(FilterMode::Whitelist, ["allowed"]),
            RateLimiter::new(0, Duration::from_secs(60)),
            MockDelivery::new(),
        );
        let failure = f.orchestrator.receive(from("other")).await.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::FilteredOut);
        assert_eq!(failure.stage, RequestStage::Received);
        assert_eq!(f.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn direct_messages_skip_filter_and_limiter() {
        let f = fixture(
            FilterPolicy::new(FilterMode::Whitelist, ["allowed"]),
            RateLimiter::new(1, Duration::from_secs(60)),
            MockDelivery::new(),
        );
        for _ in 0..3 {
            let request = HostRequest {
                prompt: "dm".into(),
                ..HostRequest::default()
            };
            assert!(f.orchestrator.receive(request).await.is_ok());
        }
        assert_eq!(f.orchestrator.limiter().tracked_origins(), 0);
    }

    #[tokio::test]
    async fn second_call_in_window_is_rate_limited() {
        let f = fixture(
            FilterPolicy::new(FilterMode::None, Vec::<String>::new()),
            RateLimiter::new(1, Duration::from_secs(60)),
            MockDelivery::new(),
        );
        assert!(f.orchestrator.receive(from("g1")).await.is_ok());

        let failure = f.orchestrator.receive(from("g1")).await.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::RateLimited);
        assert!(failure.retry_after.is_some());
        assert!(failure.user_message().contains("Next slot in"));
        assert_eq!(f.generator.call_count(), 1);

        // Other origins are unaffected.
        assert!(f.orchestrator.receive(from("g2")).await.is_ok());
    }

    #[tokio::test]
    async fn too_many_images_do_not_consume_a_slot() {
        let f = fixture(
            FilterPolicy::new(FilterMode::None, Vec::<String>::new()),
            RateLimiter::new(1, Duration::from_secs(60)),
            MockDelivery::new(),
        );
        let request = HostRequest {
            images: vec![ReferenceImage::new(fixtures::png_bytes(), "image/png"); 10],
            ..from("g1")
        };
        let failure = f.orchestrator.receive(request).await.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::InvalidRequest);

        assert!(f.orchestrator.receive(from("g1")).await.is_ok());
    }

    #[tokio::test]
    async fn generation_failure_is_terminal() {
        let f = open();
        f.generator
            .push_failure(GenerationFailure::new(FailureKind::SafetyBlocked, "IMAGE_SAFETY").with_attempts(1))
            .await;
        let failure = f.orchestrator.receive(from("g1")).await.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::SafetyBlocked);
        assert_eq!(failure.stage, RequestStage::Generating);
        assert_eq!(failure.failure.attempts, 1);
        assert_eq!(f.delivery.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_remote_delivery_still_succeeds_with_warning() {
        let f = fixture(
            FilterPolicy::new(FilterMode::None, Vec::<String>::new()),
            RateLimiter::new(0, Duration::from_secs(60)),
            MockDelivery::always(DeliveryResult::TimedOut {
                address: "10.0.0.2:3658".into(),
                stage: TransferStage::Acknowledge,
            }),
        );
        let outcome = f.orchestrator.receive(from("g1")).await.unwrap();
        assert_eq!(outcome.reply_path(), outcome.local_path().display().to_string());
        assert!(outcome.delivery_warning().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn handle_maps_failures_to_user_messages() {
        let f = fixture(
            FilterPolicy::new(FilterMode::Blacklist, ["noisy"]),
            RateLimiter::new(0, Duration::from_secs(60)),
            MockDelivery::new(),
        );
        let response = f.orchestrator.handle(from("noisy")).await;
        assert_eq!(
            response,
            HostResponse::Failure {
                kind: FailureKind::FilteredOut,
                message: FailureKind::FilteredOut.user_message().to_string(),
            }
        );
    }

    #[tokio::test]
    async fn handle_carries_caption_through() {
        let f = open();
        let request = HostRequest {
            caption: Some("done".into()),
            ..from("g1")
        };
        match f.orchestrator.handle(request).await {
            HostResponse::Image {
                caption,
                delivery_warning,
                ..
            } => {
                assert_eq!(caption.as_deref(), Some("done"));
                assert!(delivery_warning.is_none());
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_checks_cover_both_adapters() {
        let f = open();
        let checks = f.orchestrator.health_checks().await;
        let names: Vec<_> = checks.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["mock-generator", "mock-delivery"]);
    }
}
