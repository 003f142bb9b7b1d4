// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry point the host chat framework calls into.

use async_trait::async_trait;

use crate::types::{HostRequest, HostResponse};

/// The single capability the host needs: turn a parsed command into a reply.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: HostRequest) -> HostResponse;
}
