// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generator adapter trait for the external image-generation API.

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{GenerationRequest, GenerationResult};

/// Turns a [`GenerationRequest`] into an image persisted as an artifact.
///
/// Implementations own their retry policy; the returned result is final.
#[async_trait]
pub trait ImageGenerator: PluginAdapter {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult;
}
