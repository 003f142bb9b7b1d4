// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration for vimg.
//!
//! The [`RequestOrchestrator`] is the central coordinator that:
//! - Applies the origin filter and the per-origin rate limit
//! - Invokes the image generator
//! - Hands the artifact to the delivery channel, degrading to the local path
//! - Answers the host through [`CommandHandler`](vimg_core::CommandHandler)
//!
//! [`CommandDispatcher`] maps chat commands onto it, and [`AgentRuntime`]
//! runs it next to the retention janitor.

pub mod commands;
pub mod orchestrator;
pub mod runtime;
pub mod shutdown;

pub use commands::{CommandDispatcher, Dispatch, ImageCommand, help_text};
pub use orchestrator::{RequestFailure, RequestOrchestrator, RequestOutcome, RequestStage};
pub use runtime::{AgentRuntime, build_orchestrator, orchestrator_with};
