// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-zero retry ceilings, socket addresses, and non-empty paths.

use vimg_core::FilterMode;

use crate::diagnostic::ConfigError;
use crate::model::VimgConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &VimgConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let vertex = &config.vertex;
    if vertex.max_retry_attempts < 1 {
        fail("vertex.max_retry_attempts must be at least 1".to_string());
    }
    if vertex.request_timeout_secs < 1 {
        fail("vertex.request_timeout_secs must be at least 1".to_string());
    }
    if vertex.retry_backoff_base_ms > vertex.retry_backoff_max_ms {
        fail(format!(
            "vertex.retry_backoff_base_ms ({}) must not exceed vertex.retry_backoff_max_ms ({})",
            vertex.retry_backoff_base_ms, vertex.retry_backoff_max_ms
        ));
    }
    if vertex.model.trim().is_empty() {
        fail("vertex.model must not be empty".to_string());
    }
    if !(vertex.base_url.starts_with("http://") || vertex.base_url.starts_with("https://")) {
        fail(format!(
            "vertex.base_url `{}` must be an http(s) URL",
            vertex.base_url
        ));
    }

    let guard = &config.guard;
    if guard.rate_limit_max_calls_per_group > 0 && guard.rate_limit_period_seconds < 1 {
        fail("guard.rate_limit_period_seconds must be at least 1 when rate limiting is enabled".to_string());
    }
    if guard.group_filter_mode == FilterMode::Whitelist && guard.group_filter_list.is_empty() {
        tracing::warn!("guard.group_filter_mode is whitelist with an empty list; every group will be ignored");
    }

    let transfer = &config.transfer;
    let has_remote = transfer
        .remote_host
        .as_deref()
        .is_some_and(|h| !h.trim().is_empty());
    if has_remote && transfer.remote_port == 0 {
        fail("transfer.remote_port must not be 0 when transfer.remote_host is set".to_string());
    }
    if transfer.connect_timeout_secs < 1 || transfer.io_timeout_secs < 1 {
        fail("transfer.connect_timeout_secs and transfer.io_timeout_secs must be at least 1".to_string());
    }
    if transfer
        .listen_address
        .trim()
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        fail(format!(
            "transfer.listen_address `{}` is not a valid socket address",
            transfer.listen_address
        ));
    }
    if transfer.peer_storage_dir.trim().is_empty() {
        fail("transfer.peer_storage_dir must not be empty".to_string());
    }

    if config.storage.artifact_dir.trim().is_empty() {
        fail("storage.artifact_dir must not be empty".to_string());
    }
    if config.storage.sweep_interval_secs < 1 {
        fail("storage.sweep_interval_secs must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
