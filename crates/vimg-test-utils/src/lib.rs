// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for vimg integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without the Vertex AI API or a transfer peer.
//!
//! # Components
//!
//! - [`MockGenerator`] - Scripted image generator writing real artifacts
//! - [`MockDelivery`] - Delivery channel that records calls
//! - [`TestHarness`] - A full orchestrator over temp storage
//! - [`fixtures`] - Image bytes

pub mod fixtures;
pub mod harness;
pub mod mock_delivery;
pub mod mock_generator;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_delivery::MockDelivery;
pub use mock_generator::MockGenerator;
