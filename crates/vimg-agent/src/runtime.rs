// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires configuration into a running orchestrator plus its janitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vimg_config::model::VimgConfig;
use vimg_core::{ArtifactDelivery, ImageGenerator, VimgError};
use vimg_guard::{FilterPolicy, RateLimiter};
use vimg_storage::{ArtifactStore, RetentionJanitor};
use vimg_transfer::TransferClient;
use vimg_vertex::GenerationClient;

use crate::commands::CommandDispatcher;
use crate::orchestrator::RequestOrchestrator;
use crate::shutdown;

/// How long [`AgentRuntime::shutdown`] waits for the janitor.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds an orchestrator over the given adapters with guard and transfer
/// settings taken from `config`.
pub fn orchestrator_with(
    config: &VimgConfig,
    generator: Arc<dyn ImageGenerator>,
    delivery: Arc<dyn ArtifactDelivery>,
) -> RequestOrchestrator {
    let transfer = TransferClient::from_config(&config.transfer);
    RequestOrchestrator::new(
        FilterPolicy::from_config(&config.guard),
        RateLimiter::from_config(&config.guard),
        generator,
        delivery,
        transfer.destination().clone(),
        config.vertex.model.clone(),
    )
}

/// Builds the production orchestrator: Vertex AI generation and TCP delivery.
pub fn build_orchestrator(config: &VimgConfig) -> Result<RequestOrchestrator, VimgError> {
    let generator = GenerationClient::from_config(config)?;
    let delivery = TransferClient::from_config(&config.transfer);
    Ok(orchestrator_with(config, Arc::new(generator), Arc::new(delivery)))
}

/// A running vimg core: the request entry point and its background janitor.
pub struct AgentRuntime {
    dispatcher: CommandDispatcher,
    cancel: CancellationToken,
    janitor: JoinHandle<()>,
}

impl AgentRuntime {
    /// Prepares artifact storage and starts the retention janitor.
    pub async fn start(
        config: &VimgConfig,
        orchestrator: RequestOrchestrator,
        cancel: CancellationToken,
    ) -> Result<Self, VimgError> {
        let store = ArtifactStore::new(&config.storage.artifact_dir);
        store.ensure_root().await?;

        let janitor = RetentionJanitor::new(
            store.root(),
            Duration::from_secs(config.storage.sweep_interval_secs),
        )
        .spawn(cancel.child_token());

        info!(
            agent_name = config.agent.name.as_str(),
            model = orchestrator.model(),
            destination = ?orchestrator.destination(),
            "vimg runtime started"
        );

        Ok(Self {
            dispatcher: CommandDispatcher::new(Arc::new(orchestrator)),
            cancel,
            janitor,
        })
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn orchestrator(&self) -> &Arc<RequestOrchestrator> {
        self.dispatcher.orchestrator()
    }

    /// Stops the janitor and waits for it to finish its current sweep.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        shutdown::drain_tasks(vec![self.janitor], DRAIN_TIMEOUT).await;
    }
}
