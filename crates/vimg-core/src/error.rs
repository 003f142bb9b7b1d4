// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for vimg.

use thiserror::Error;

/// The infrastructural error type shared by every vimg crate.
///
/// Request-level outcomes (a safety block, a rate-limited origin) are not
/// errors in this sense; they travel as [`GenerationFailure`](crate::types::GenerationFailure)
/// or [`DeliveryResult`](crate::types::DeliveryResult) values.
#[derive(Debug, Error)]
pub enum VimgError {
    /// Configuration errors (missing API keys, invalid header values, bad addresses).
    #[error("configuration error: {0}")]
    Config(String),

    /// A request that violates the data model and must not reach the API.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Artifact storage errors (directory creation, write, rename, scan).
    #[error("storage error: {message}")]
    Storage {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Generation API errors (HTTP client construction, transport).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// File-transfer errors (bind failure, framing, peer protocol).
    #[error("transfer error: {message}")]
    Transfer {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VimgError {
    /// Wraps an I/O error raised while touching artifact storage.
    pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps an I/O error raised by the transfer channel or peer.
    pub fn transfer(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transfer {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
