// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Allow-list / deny-list evaluation of request origins.

use std::collections::HashSet;

use vimg_config::model::GuardConfig;
use vimg_core::{FilterMode, OriginId};

/// Filter mode plus the origins it applies to. Immutable after load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    mode: FilterMode,
    origins: HashSet<String>,
}

impl FilterPolicy {
    /// Builds a policy; identifiers are trimmed and blanks dropped.
    pub fn new<I, S>(mode: FilterMode, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = origins
            .into_iter()
            .map(|o| o.as_ref().trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        Self { mode, origins }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(config.group_filter_mode, &config.group_filter_list)
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn contains(&self, origin: &OriginId) -> bool {
        self.origins.contains(origin.as_str())
    }
}

/// Whether `origin` may use the service under `policy`.
pub fn allowed(origin: &OriginId, policy: &FilterPolicy) -> bool {
    match policy.mode {
        FilterMode::None => true,
        FilterMode::Whitelist => policy.contains(origin),
        FilterMode::Blacklist => !policy.contains(origin),
    }
}
