// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for vimg.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use vimg_core::FilterMode;

/// Top-level vimg configuration.
///
/// Loaded once at startup and treated as an immutable snapshot afterwards.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VimgConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Vertex AI generation settings.
    #[serde(default)]
    pub vertex: VertexConfig,

    /// Origin filtering and rate limiting.
    #[serde(default)]
    pub guard: GuardConfig,

    /// Remote file-transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Artifact storage and retention.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "vimg".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Vertex AI generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VertexConfig {
    /// API keys, rotated after failed attempts.
    /// Accepts a list or a single comma-separated string.
    #[serde(default, deserialize_with = "string_or_list")]
    pub api_keys: Vec<String>,

    /// Model used for every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Publisher models endpoint; `/{model}:generateContent` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Total attempts per request, including the first.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Per-attempt deadline in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Backoff before the second attempt; doubles per attempt.
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,

    /// Upper bound on the backoff between attempts.
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: default_model(),
            base_url: default_base_url(),
            max_retry_attempts: default_max_retry_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

fn default_base_url() -> String {
    "https://aiplatform.googleapis.com/v1/publishers/google/models".to_string()
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_retry_backoff_base_ms() -> u64 {
    1000
}

fn default_retry_backoff_max_ms() -> u64 {
    10_000
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    0.95
}

fn default_max_output_tokens() -> u32 {
    8192
}

/// Origin filtering and per-origin rate limiting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// `none`, `whitelist`, or `blacklist`.
    #[serde(default)]
    pub group_filter_mode: FilterMode,

    /// Origin identifiers the filter mode applies to.
    /// Accepts a list or a single comma-separated string.
    #[serde(default, deserialize_with = "string_or_list")]
    pub group_filter_list: Vec<String>,

    /// Calls allowed per origin per period. 0 disables rate limiting.
    #[serde(default)]
    pub rate_limit_max_calls_per_group: u32,

    /// Length of the sliding rate-limit window in seconds.
    #[serde(default = "default_rate_limit_period_seconds")]
    pub rate_limit_period_seconds: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            group_filter_mode: FilterMode::None,
            group_filter_list: Vec::new(),
            rate_limit_max_calls_per_group: 0,
            rate_limit_period_seconds: default_rate_limit_period_seconds(),
        }
    }
}

fn default_rate_limit_period_seconds() -> u64 {
    60
}

/// Remote file-transfer configuration (client and peer sides).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransferConfig {
    /// Peer host. Unset or `localhost` delivers to local disk only.
    #[serde(default)]
    pub remote_host: Option<String>,

    /// Peer port.
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Deadline for sending the artifact and for receiving the acknowledgement.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,

    /// Send only the artifact path; for peers sharing the filesystem namespace.
    #[serde(default)]
    pub send_path_only: bool,

    /// Address the peer server listens on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Directory the peer server writes received artifacts into.
    #[serde(default = "default_peer_storage_dir")]
    pub peer_storage_dir: String,

    /// Root that path-mode transfers must resolve under on the peer.
    /// Unset means the peer refuses path-mode transfers.
    #[serde(default)]
    pub shared_root: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            remote_host: None,
            remote_port: default_remote_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            io_timeout_secs: default_io_timeout_secs(),
            send_path_only: false,
            listen_address: default_listen_address(),
            peer_storage_dir: default_peer_storage_dir(),
            shared_root: None,
        }
    }
}

fn default_remote_port() -> u16 {
    3658
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_io_timeout_secs() -> u64 {
    30
}

fn default_listen_address() -> String {
    "0.0.0.0:3658".to_string()
}

fn default_peer_storage_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("vimg").join("received"))
        .unwrap_or_else(|| std::path::PathBuf::from("received"))
        .to_string_lossy()
        .into_owned()
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory owned exclusively by vimg for generated images.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Seconds between retention sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_artifact_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("vimg").join("images"))
        .unwrap_or_else(|| std::path::PathBuf::from("images"))
        .to_string_lossy()
        .into_owned()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Accepts `["a", "b"]` or `"a, b"`; trims entries and drops blanks.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrList;

    impl<'de> Visitor<'de> for StringOrList {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of strings or a comma-separated string")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(split_entries(value.split(',')))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(vec![value.to_string()])
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<ListEntry>()? {
                items.push(item.0);
            }
            Ok(split_entries(items.iter().map(String::as_str)))
        }
    }

    deserializer.deserialize_any(StringOrList)
}

/// A list element that may be written as a string or a bare integer (group numbers).
struct ListEntry(String);

impl<'de> Deserialize<'de> for ListEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl Visitor<'_> for EntryVisitor {
            type Value = ListEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(ListEntry(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(ListEntry(value.to_string()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(ListEntry(value.to_string()))
            }
        }

        deserializer.deserialize_any(EntryVisitor)
    }
}

fn split_entries<'a>(entries: impl Iterator<Item = &'a str>) -> Vec<String> {
    entries
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
