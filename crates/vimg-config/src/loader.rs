// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./vimg.toml` > `~/.config/vimg/vimg.toml` > `/etc/vimg/vimg.toml`
//! with environment variable overrides via `VIMG_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::VimgConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/vimg/vimg.toml";

/// Configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "vimg.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/vimg/vimg.toml` (system-wide)
/// 3. `~/.config/vimg/vimg.toml` (user XDG config)
/// 4. `./vimg.toml` (local directory)
/// 5. `VIMG_*` environment variables
pub fn load_config() -> Result<VimgConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<VimgConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VimgConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<VimgConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VimgConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(VimgConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// `~/.config/vimg/vimg.toml` when the platform has a config dir.
pub fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("vimg").join(LOCAL_CONFIG_FILE))
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `VIMG_GUARD_RATE_LIMIT_PERIOD_SECONDS` must map to
/// `guard.rate_limit_period_seconds`.
fn env_provider() -> Env {
    Env::prefixed("VIMG_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: [&str; 5] = ["agent", "vertex", "guard", "transfer", "storage"];

    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("vertex_api_keys"), "vertex.api_keys");
        assert_eq!(
            map_env_key("guard_rate_limit_period_seconds"),
            "guard.rate_limit_period_seconds"
        );
        assert_eq!(map_env_key("transfer_remote_host"), "transfer.remote_host");
        assert_eq!(map_env_key("storage_artifact_dir"), "storage.artifact_dir");
    }

    #[test]
    fn unknown_section_is_left_untouched() {
        assert_eq!(map_env_key("logging_level"), "logging_level");
    }
}
