// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery channel that records what it was handed.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use vimg_core::{
    AdapterType, ArtifactDelivery, ArtifactFile, DeliveryResult, Destination, HealthStatus,
    PluginAdapter, VimgError,
};

/// A mock delivery channel.
///
/// By default local delivery checks the file exists and remote delivery
/// pretends the peer stored it under `/peer/<file name>`. [`MockDelivery::always`]
/// pins every call to one outcome instead.
pub struct MockDelivery {
    fixed: Option<DeliveryResult>,
    calls: AtomicUsize,
    delivered: Mutex<Vec<(ArtifactFile, Destination)>>,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self {
            fixed: None,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Every delivery returns `result`.
    pub fn always(result: DeliveryResult) -> Self {
        Self {
            fixed: Some(result),
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Artifacts and destinations seen so far, in call order.
    pub async fn deliveries(&self) -> Vec<(ArtifactFile, Destination)> {
        self.delivered.lock().await.clone()
    }
}

impl Default for MockDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockDelivery {
    fn name(&self) -> &str {
        "mock-delivery"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Delivery
    }

    async fn health_check(&self) -> Result<HealthStatus, VimgError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ArtifactDelivery for MockDelivery {
    async fn deliver(&self, artifact: &ArtifactFile, destination: &Destination) -> DeliveryResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.delivered
            .lock()
            .await
            .push((artifact.clone(), destination.clone()));

        if let Some(result) = &self.fixed {
            return result.clone();
        }
        if !artifact.path.is_file() {
            return DeliveryResult::LocalUnreadable {
                path: artifact.path.clone(),
                message: "no such file".into(),
            };
        }
        match destination {
            Destination::Local => DeliveryResult::Local {
                path: artifact.path.clone(),
            },
            Destination::Remote { .. } => DeliveryResult::Remote {
                remote_path: format!("/peer/{}", artifact.file_name()),
            },
        }
    }
}
