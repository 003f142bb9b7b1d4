// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions at the seams of the request pipeline.
//!
//! Generator and delivery adapters extend the [`PluginAdapter`] base trait
//! and use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod delivery;
pub mod generator;
pub mod host;

pub use adapter::PluginAdapter;
pub use delivery::ArtifactDelivery;
pub use generator::ImageGenerator;
pub use host::CommandHandler;
