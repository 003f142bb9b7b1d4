// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery adapter trait for handing artifacts to the chat client.

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{ArtifactFile, DeliveryResult, Destination};

/// Delivers a finished artifact to local disk or a remote peer.
///
/// Delivery never retries; callers decide how to degrade on failure.
#[async_trait]
pub trait ArtifactDelivery: PluginAdapter {
    async fn deliver(&self, artifact: &ArtifactFile, destination: &Destination) -> DeliveryResult;
}
